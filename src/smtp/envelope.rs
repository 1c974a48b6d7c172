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

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::SmtpClient;

use super::{message::EmailMessage, AssertReply, Stage};

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Runs one mail transaction for `message`.
    ///
    /// Any rejected command aborts the transaction and leaves the session
    /// in [`Stage::Failed`], after which only [`SmtpClient::quit`] is useful.
    pub async fn send(&mut self, message: &EmailMessage) -> crate::Result<()> {
        if self.stage != Stage::Greeted {
            return Err(crate::Error::SessionUnusable);
        }

        self.stage = Stage::Transaction;
        let result = self.transaction(message).await;
        self.stage = match &result {
            Ok(_) => Stage::Greeted,
            Err(err) => {
                log::warn!("Mail transaction for {} aborted: {err}", message.recipient());
                Stage::Failed
            }
        };
        result
    }

    async fn transaction(&mut self, message: &EmailMessage) -> crate::Result<()> {
        self.mail_from(message.sender()).await?;
        for rcpt in message.recipients() {
            self.rcpt_to(rcpt).await?;
        }
        self.data(message.content()).await
    }

    /// Sends a MAIL FROM command to the server.
    pub async fn mail_from(&mut self, addr: &str) -> crate::Result<()> {
        self.cmd(format!("MAIL FROM:<{addr}>\r\n"))
            .await?
            .assert_code(250)
    }

    /// Sends a RCPT TO command to the server.
    pub async fn rcpt_to(&mut self, addr: &str) -> crate::Result<()> {
        self.cmd(format!("RCPT TO:<{addr}>\r\n"))
            .await?
            .assert_code(250)
    }

    /// Sends a DATA command to the server.
    pub async fn data(&mut self, message: impl AsRef<[u8]>) -> crate::Result<()> {
        self.cmd(b"DATA\r\n").await?.assert_code(354)?;
        tokio::time::timeout(self.timeout, async {
            self.write_message(message.as_ref()).await?;
            self.read().await
        })
        .await
        .map_err(|_| crate::Error::Timeout)??
        .assert_code(250)
    }

    /// Sends a QUIT command to the server and releases the stream.
    ///
    /// The stream is shut down even when the QUIT exchange fails; the first
    /// failure is returned.
    pub async fn quit(mut self) -> crate::Result<()> {
        let result = match self.cmd(b"QUIT\r\n").await {
            Ok(reply) => reply.assert_code(221),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            log::warn!("QUIT failed: {err}");
        }

        let shutdown = self.stream.shutdown().await;
        if let Err(err) = &shutdown {
            log::warn!("Unable to close SMTP connection: {err}");
        } else {
            log::info!("SMTP connection closed");
        }

        result.and(shutdown.map_err(Into::into))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio_test::io::{Builder, Mock};

    use crate::{
        smtp::message::{test::StaticResolver, EmailMessage, MessageBuilder},
        Error, SmtpClient, Stage,
    };

    async fn message(cc: &str, text: &str) -> EmailMessage {
        MessageBuilder::new()
            .from("alice@client.example.org")
            .to(" bob@example.com ")
            .cc(cc)
            .subject("Greetings")
            .text(text)
            .date(Utc.with_ymd_and_hms(2024, 10, 14, 9, 30, 0).unwrap())
            .relay("relay.example.com", 2525)
            .build_with(&StaticResolver)
            .await
            .unwrap()
    }

    fn greeted(mock: Mock) -> SmtpClient<Mock> {
        SmtpClient {
            stream: mock,
            timeout: Duration::from_secs(30),
            stage: Stage::Greeted,
        }
    }

    #[tokio::test]
    async fn full_transaction() {
        let message = message("carol@example.com, dave@example.net", "Hello\n.\nBye").await;

        let mut client = greeted(
            Builder::new()
                .write(b"MAIL FROM:<alice@client.example.org>\r\n")
                .read(b"250 OK\r\n")
                .write(b"RCPT TO:<bob@example.com>\r\n")
                .read(b"250 OK\r\n")
                .write(b"RCPT TO:<carol@example.com>\r\n")
                .read(b"250 OK\r\n")
                .write(b"RCPT TO:<dave@example.net>\r\n")
                .read(b"250 OK\r\n")
                .write(b"DATA\r\n")
                .read(b"354 Start mail input; end with <CRLF>.<CRLF>\r\n")
                .write(
                    concat!(
                        "From: alice@client.example.org\r\n",
                        "To: bob@example.com\r\n",
                        "Cc: carol@example.com, dave@example.net\r\n",
                        "Subject: Greetings\r\n",
                        "Date: Mon, 14 Oct 2024 09:30:00 GMT\r\n",
                        "\r\n",
                        "Hello\r\n..\r\nBye",
                        "\r\n.\r\n"
                    )
                    .as_bytes(),
                )
                .read(b"250 Queued\r\n")
                .write(b"QUIT\r\n")
                .read(b"221 Bye\r\n")
                .build(),
        );

        client.send(&message).await.unwrap();
        assert_eq!(client.stage, Stage::Greeted);
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn two_transactions_on_one_connection() {
        let message = message("", "Hi").await;
        let mut mock = Builder::new();
        for _ in 0..2 {
            mock.write(b"MAIL FROM:<alice@client.example.org>\r\n")
                .read(b"250 OK\r\n")
                .write(b"RCPT TO:<bob@example.com>\r\n")
                .read(b"250 OK\r\n")
                .write(b"DATA\r\n")
                .read(b"354 Go ahead\r\n")
                .write(
                    concat!(
                        "From: alice@client.example.org\r\n",
                        "To: bob@example.com\r\n",
                        "Subject: Greetings\r\n",
                        "Date: Mon, 14 Oct 2024 09:30:00 GMT\r\n",
                        "\r\n",
                        "Hi\r\n.\r\n"
                    )
                    .as_bytes(),
                )
                .read(b"250 Queued\r\n");
        }
        let mut client = greeted(mock.write(b"QUIT\r\n").read(b"221 Bye\r\n").build());

        client.send(&message).await.unwrap();
        client.send(&message).await.unwrap();
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_sender_aborts_transaction() {
        let message = message("carol@example.com", "Hi").await;
        let mut client = greeted(
            Builder::new()
                .write(b"MAIL FROM:<alice@client.example.org>\r\n")
                .read(b"550 Sender rejected\r\n")
                .write(b"QUIT\r\n")
                .read(b"221 Bye\r\n")
                .build(),
        );

        match client.send(&message).await {
            Err(Error::UnexpectedReply { expected, reply }) => {
                assert_eq!(expected, 250);
                assert_eq!(reply.code(), 550);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(client.stage, Stage::Failed);
        assert!(matches!(
            client.send(&message).await,
            Err(Error::SessionUnusable)
        ));
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_data_start() {
        let message = message("", "Hi").await;
        let mut client = greeted(
            Builder::new()
                .write(b"MAIL FROM:<alice@client.example.org>\r\n")
                .read(b"250 OK\r\n")
                .write(b"RCPT TO:<bob@example.com>\r\n")
                .read(b"250 OK\r\n")
                .write(b"DATA\r\n")
                .read(b"451 Try again later\r\n")
                .build(),
        );

        assert!(matches!(
            client.send(&message).await,
            Err(Error::UnexpectedReply { expected: 354, .. })
        ));
    }

    #[tokio::test]
    async fn failed_quit_still_releases_stream() {
        let client = greeted(
            Builder::new()
                .write(b"QUIT\r\n")
                .read(b"500 What?\r\n")
                .build(),
        );

        assert!(matches!(
            client.quit().await,
            Err(Error::UnexpectedReply { expected: 221, .. })
        ));
    }
}
