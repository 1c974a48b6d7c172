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

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::SmtpClient;

use super::reply::{Reply, ReplyParseError, ReplyParser};

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    pub(crate) async fn read(&mut self) -> crate::Result<Reply> {
        let mut buf = vec![0u8; 1024];
        let mut parser = ReplyParser::default();

        loop {
            let br = self.stream.read(&mut buf).await?;

            if br == 0 {
                return Err(crate::Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while waiting for SMTP reply",
                )));
            }

            match parser.parse(&buf[..br]) {
                Ok(reply) => {
                    log::debug!("S: {reply}");
                    return Ok(reply);
                }
                Err(ReplyParseError::NeedsMoreData) => (),
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reads a reply from the server, bounded by the client timeout.
    pub async fn read_reply(&mut self) -> crate::Result<Reply> {
        tokio::time::timeout(self.timeout, self.read())
            .await
            .map_err(|_| crate::Error::Timeout)?
    }

    /// Sends a command to the SMTP server and waits for a reply.
    pub async fn cmd(&mut self, cmd: impl AsRef<[u8]>) -> crate::Result<Reply> {
        let cmd = cmd.as_ref();
        log::debug!("C: {}", String::from_utf8_lossy(cmd).trim_end());
        tokio::time::timeout(self.timeout, async {
            self.stream.write_all(cmd).await?;
            self.stream.flush().await?;
            self.read().await
        })
        .await
        .map_err(|_| crate::Error::Timeout)?
    }

    /// Writes the message content followed by the end-of-data marker.
    ///
    /// `content` must already be dot-stuffed.
    pub async fn write_message(&mut self, content: &[u8]) -> io::Result<()> {
        log::debug!("C: <{} bytes of message data>", content.len());
        self.stream.write_all(content).await?;
        self.stream.write_all(b"\r\n.\r\n").await?;
        self.stream.flush().await
    }
}
