/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use mail_relay::{Error, HttpFetcher};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    // Usage: fetch_object <host[/path]>
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "example.com/index.html".to_string());

    match HttpFetcher::new(&url).fetch().await {
        Ok(body) => print!("{}", String::from_utf8_lossy(&body)),
        Err(Error::HttpStatus(code)) => eprintln!("{url}: server answered {code}"),
        Err(Error::ObjectTooLarge(len)) => eprintln!("{url}: object of {len} bytes is too large"),
        Err(err) => eprintln!("{url}: {err}"),
    }
}
