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

use std::time::Duration;

use tokio::net::TcpStream;

use crate::{SmtpClient, SmtpClientBuilder};

use super::message::EmailMessage;

impl SmtpClientBuilder {
    pub fn new(hostname: impl AsRef<str>, port: u16) -> Self {
        Self::with_addr(format!("{}:{}", hostname.as_ref(), port))
    }

    /// Connects to the relay address resolved when the message was built.
    pub fn for_message(message: &EmailMessage) -> Self {
        Self::with_addr(message.relay_addr().to_string())
    }

    fn with_addr(addr: String) -> Self {
        SmtpClientBuilder {
            addr,
            timeout: Duration::from_secs(5 * 60),
            local_host: gethostname::gethostname()
                .to_str()
                .unwrap_or("[127.0.0.1]")
                .to_string(),
        }
    }

    /// Set the HELO hostname
    pub fn helo_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = host.into();
        self
    }

    /// Sets the SMTP connection timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect over clear text, read the greeting and send HELO
    pub async fn connect(&self) -> crate::Result<SmtpClient<TcpStream>> {
        log::info!("Connecting to SMTP relay {}", self.addr);
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| crate::Error::Timeout)??;
        SmtpClient::handshake(stream, &self.local_host, self.timeout).await
    }
}
