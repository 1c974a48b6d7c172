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

use mail_relay::{MessageBuilder, SmtpClientBuilder};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    // Usage: send_mail <relay-host> <relay-port> <to> [cc]
    let mut args = std::env::args().skip(1);
    let relay_host = args.next().unwrap_or_else(|| "localhost".to_string());
    let relay_port = args.next().and_then(|port| port.parse().ok()).unwrap_or(25);
    let to = args.next().unwrap_or_else(|| "jane@example.com".to_string());
    let cc = args.next().unwrap_or_default();

    let message = MessageBuilder::new()
        .to(to)
        .cc(cc)
        .subject("Hello, world!")
        .text("Hello, world!\n.\nThe line above is a single dot.")
        .relay(relay_host, relay_port)
        .build()
        .await
        .unwrap();
    println!("{message}");

    let mut client = SmtpClientBuilder::for_message(&message)
        .connect()
        .await
        .unwrap();
    client.send(&message).await.unwrap();
    client.quit().await.unwrap();
}
