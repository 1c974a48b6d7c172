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

use self::reply::Reply;

pub mod builder;
pub mod client;
pub mod envelope;
pub mod helo;
pub mod message;
pub mod reply;

/// Protocol stage of an [`crate::SmtpClient`].
///
/// A session that is not connected yet has no client value, and a closed
/// one has been consumed by [`crate::SmtpClient::quit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Greeting received, no `HELO` sent yet.
    Connected,
    /// `HELO` accepted, ready for transactions.
    Greeted,
    /// A mail transaction is in progress.
    Transaction,
    /// A command was rejected or the stream failed; only `quit` is allowed.
    Failed,
}

pub trait AssertReply: Sized {
    fn assert_code(self, code: u16) -> crate::Result<()>;
}

impl AssertReply for Reply {
    /// Returns `Ok` if the reply carries the expected code.
    fn assert_code(self, code: u16) -> crate::Result<()> {
        if self.code() == code {
            Ok(())
        } else {
            Err(crate::Error::UnexpectedReply {
                expected: code,
                reply: self,
            })
        }
    }
}
