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

//! # mail-relay
//!
//! _mail-relay_ speaks two text protocols directly over a byte stream, without any
//! mail or HTTP client library underneath:
//!
//! - Builds **e-mail** messages with the minimal Internet Message Format header set
//!   (`From`, `To`, `Cc`, `Subject`, `Date`; _RFC 5322_) and dot-stuffed bodies.
//! - Delivers them to a relay host over plain **SMTP** (`HELO`, `MAIL FROM`, `RCPT TO`,
//!   `DATA`, `QUIT`; _RFC 5321_), checking every reply code.
//! - Fetches a single object over **HTTP/1.1** with a `Content-Length` or
//!   connection-close delimited body and a maximum object size.
//!
//! TLS, SMTP service extensions, redirects, chunked transfer-encoding and
//! persistent connections are not supported.
//!
//! ## Usage Example
//!
//! Send a message through a relay:
//!
//! ```rust
//!     let message = MessageBuilder::new()
//!         .to("jane@example.com")
//!         .cc("john@example.com, james@test.com")
//!         .subject("Hi!")
//!         .text("Hello, world!")
//!         .relay("mail.example.com", 25)
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let mut client = SmtpClientBuilder::for_message(&message)
//!         .connect()
//!         .await
//!         .unwrap();
//!     client.send(&message).await.unwrap();
//!     client.quit().await.unwrap();
//! ```
//!
//! Fetch an object:
//!
//! ```rust
//!     let body = HttpFetcher::new("example.com/index.html")
//!         .fetch()
//!         .await
//!         .unwrap();
//! ```
//!

pub mod http;
pub mod smtp;

use std::{fmt::Display, time::Duration};

pub use http::{
    fetch::{fetch, HttpFetcher},
    response::{Headers, HttpResponse},
};
pub use smtp::{
    message::{is_valid_address, EmailMessage, MessageBuilder, Resolve, SystemResolver},
    reply::{Reply, ReplyParseError},
    Stage,
};

#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Sender, recipient or carbon copy address is not of the form `local@domain`.
    InvalidAddress(String),

    /// Header value contains a line break or other control character.
    InvalidHeader { name: &'static str, value: String },

    /// The relay host name could not be mapped to a network address.
    HostResolution {
        host: String,
        source: std::io::Error,
    },

    /// Failure parsing SMTP reply
    UnparseableReply(ReplyParseError),

    /// Unexpected SMTP reply.
    UnexpectedReply { expected: u16, reply: Reply },

    /// A previous transaction failed on this session.
    SessionUnusable,

    /// HTTP status other than 200.
    HttpStatus(u16),

    /// HTTP object exceeds the configured maximum size.
    ObjectTooLarge(usize),

    /// HTTP response could not be parsed.
    MalformedResponse(String),

    /// Connection timeout.
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;

/// SMTP client driving one connection to a relay host.
pub struct SmtpClient<T> {
    pub stream: T,
    pub timeout: Duration,
    pub stage: Stage,
}

/// Connection settings for an [`SmtpClient`].
#[derive(Clone, Debug)]
pub struct SmtpClientBuilder {
    pub addr: String,
    pub timeout: Duration,
    pub local_host: String,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::InvalidAddress(addr) => write!(f, "Invalid e-mail address: {addr:?}"),
            Error::InvalidHeader { name, value } => {
                write!(f, "Invalid {name} header: {value:?}")
            }
            Error::HostResolution { host, source } => {
                write!(f, "Unknown host {host}: {source}")
            }
            Error::UnparseableReply(e) => write!(f, "Unparseable SMTP reply: {e}"),
            Error::UnexpectedReply { expected, reply } => {
                write!(f, "Expected {expected} reply, got: {reply}")
            }
            Error::SessionUnusable => write!(f, "SMTP session is unusable after a failed command"),
            Error::HttpStatus(code) => write!(f, "HTTP status code {code}"),
            Error::ObjectTooLarge(len) => write!(f, "Object too large: {len} bytes"),
            Error::MalformedResponse(e) => write!(f, "Malformed HTTP response: {e}"),
            Error::Timeout => write!(f, "Connection timeout"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::HostResolution { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ReplyParseError> for Error {
    fn from(err: ReplyParseError) -> Self {
        Error::UnparseableReply(err)
    }
}
