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

use tokio::io::{AsyncRead, AsyncWrite};

use crate::SmtpClient;

use super::{AssertReply, Stage};

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Takes over an already connected stream, reads the `220` greeting and
    /// introduces the client with `HELO`.
    pub async fn handshake(stream: T, local_host: &str, timeout: Duration) -> crate::Result<Self> {
        let mut client = SmtpClient {
            stream,
            timeout,
            stage: Stage::Connected,
        };

        client.read_reply().await?.assert_code(220)?;
        client.helo(local_host).await?;

        Ok(client)
    }

    /// Sends a HELO command to the server.
    pub async fn helo(&mut self, hostname: &str) -> crate::Result<()> {
        let result = self
            .cmd(format!("HELO {hostname}\r\n"))
            .await
            .and_then(|reply| reply.assert_code(250));
        self.stage = if result.is_ok() {
            Stage::Greeted
        } else {
            Stage::Failed
        };
        result
    }
}
