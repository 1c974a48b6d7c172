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

use std::{
    borrow::Cow,
    fmt::Display,
    future::Future,
    io,
    net::SocketAddr,
};

use chrono::{DateTime, Utc};

/// A validated message, ready to be relayed.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    sender: String,
    recipient: String,
    cc: Vec<String>,
    headers: Vec<(&'static str, String)>,
    body: String,
    relay_host: String,
    relay_port: u16,
    relay_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct MessageBuilder {
    from: Option<String>,
    to: String,
    cc: String,
    subject: String,
    text: String,
    date: Option<DateTime<Utc>>,
    relay_host: String,
    relay_port: u16,
}

/// Maps a host name to network addresses.
pub trait Resolve {
    fn resolve(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Vec<SocketAddr>>> + Send;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Vec<SocketAddr>>> + Send {
        let host = host.to_string();
        async move {
            let addrs = tokio::net::lookup_host((host.as_str(), port)).await?;
            Ok::<_, io::Error>(addrs.collect())
        }
    }
}

/// Returns `true` if `addr` contains exactly one `@` with text on both sides
/// and no whitespace or control characters.
pub fn is_valid_address(addr: &str) -> bool {
    if addr.chars().any(|ch| ch.is_control() || ch.is_whitespace()) {
        return false;
    }
    match addr.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Doubles the leading `.` of every line so no body line can end the DATA section.
pub fn dot_stuff(text: &str) -> String {
    let mut stuffed = String::with_capacity(text.len() + 8);
    for line in text.split_inclusive('\n') {
        if line.starts_with('.') {
            stuffed.push('.');
        }
        stuffed.push_str(line);
    }
    stuffed
}

/// A header value must stay on its own line.
fn check_header(name: &'static str, value: String) -> crate::Result<String> {
    if value.chars().any(|ch| ch.is_control() && ch != '\t') {
        return Err(crate::Error::InvalidHeader { name, value });
    }
    Ok(value)
}

fn to_crlf(text: &str) -> Cow<'_, str> {
    if !text.contains('\n') {
        return Cow::Borrowed(text);
    }

    let mut result = String::with_capacity(text.len() + 16);
    let mut prev = '\0';
    for ch in text.chars() {
        if ch == '\n' && prev != '\r' {
            result.push('\r');
        }
        result.push(ch);
        prev = ch;
    }
    Cow::Owned(result)
}

fn default_sender() -> String {
    let login = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let hostname = gethostname::gethostname();
    format!("{}@{}", login, hostname.to_str().unwrap_or("localhost"))
}

impl Default for MessageBuilder {
    fn default() -> Self {
        MessageBuilder {
            from: None,
            to: String::new(),
            cc: String::new(),
            subject: String::new(),
            text: String::new(),
            date: None,
            relay_host: "localhost".to_string(),
            relay_port: 25,
        }
    }
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the sender, which defaults to `<login>@<local hostname>`.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = address.into();
        self
    }

    /// Comma separated carbon copy addresses. Empty means no `Cc` header.
    pub fn cc(mut self, addresses: impl Into<String>) -> Self {
        self.cc = addresses.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Overrides the `Date` header, which defaults to the time of `build`.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the SMTP relay host and port.
    pub fn relay(mut self, host: impl Into<String>, port: u16) -> Self {
        self.relay_host = host.into();
        self.relay_port = port;
        self
    }

    /// Validates the addresses and resolves the relay host with the system resolver.
    pub async fn build(self) -> crate::Result<EmailMessage> {
        self.build_with(&SystemResolver).await
    }

    pub async fn build_with(self, resolver: &impl Resolve) -> crate::Result<EmailMessage> {
        let sender = self
            .from
            .map(|from| from.trim().to_string())
            .unwrap_or_else(default_sender);
        let recipient = self.to.trim().to_string();
        let cc = self
            .cc
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        for addr in [&sender, &recipient].into_iter().chain(cc.iter()) {
            if !is_valid_address(addr) {
                return Err(crate::Error::InvalidAddress(addr.clone()));
            }
        }

        let mut headers = Vec::with_capacity(5);
        headers.push(("From", sender.clone()));
        headers.push(("To", recipient.clone()));
        if !cc.is_empty() {
            headers.push(("Cc", cc.join(", ")));
        }
        headers.push((
            "Subject",
            check_header("Subject", self.subject.trim().to_string())?,
        ));
        headers.push((
            "Date",
            self.date
                .unwrap_or_else(Utc::now)
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        ));

        let relay_host = self.relay_host.trim().to_string();
        let relay_addr = resolver
            .resolve(&relay_host, self.relay_port)
            .await
            .and_then(|addrs| {
                addrs.into_iter().next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "no addresses found")
                })
            })
            .map_err(|source| {
                log::warn!("Unknown host: {relay_host}");
                crate::Error::HostResolution {
                    host: relay_host.clone(),
                    source,
                }
            })?;

        Ok(EmailMessage {
            sender,
            recipient,
            cc,
            headers,
            body: dot_stuff(&to_crlf(&self.text)),
            relay_host,
            relay_port: self.relay_port,
            relay_addr,
        })
    }
}

impl EmailMessage {
    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    /// Envelope recipients: the primary recipient followed by every carbon copy.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.recipient.as_str()).chain(self.cc.iter().map(String::as_str))
    }

    /// Header fields in transmission order.
    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }

    /// Dot-stuffed body with CRLF line endings.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn relay_host(&self) -> &str {
        &self.relay_host
    }

    pub fn relay_port(&self) -> u16 {
        self.relay_port
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    /// Header block, blank line and body as transmitted after `DATA`.
    pub fn content(&self) -> String {
        let mut content = String::with_capacity(self.body.len() + 256);
        for (name, value) in &self.headers {
            content.push_str(name);
            content.push_str(": ");
            content.push_str(value);
            content.push_str("\r\n");
        }
        content.push_str("\r\n");
        content.push_str(&self.body);
        content
    }
}

impl Display for EmailMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sender: {}", self.sender)?;
        writeln!(f, "Recipient: {}", self.recipient)?;
        for cc in &self.cc {
            writeln!(f, "Cc: {cc}")?;
        }
        writeln!(
            f,
            "MX-host: {}, address: {}",
            self.relay_host, self.relay_addr
        )?;
        writeln!(f, "Message:")?;
        f.write_str(&self.content())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{
        future::Future,
        io,
        net::{Ipv4Addr, SocketAddr},
    };

    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use crate::Error;

    use super::{dot_stuff, is_valid_address, to_crlf, MessageBuilder, Resolve};

    /// Resolves every host to the loopback address, except `*.invalid`.
    pub(crate) struct StaticResolver;

    impl Resolve for StaticResolver {
        fn resolve(
            &self,
            host: &str,
            port: u16,
        ) -> impl Future<Output = io::Result<Vec<SocketAddr>>> + Send {
            let result = if host.ends_with(".invalid") {
                Err(io::Error::new(io::ErrorKind::NotFound, "unknown host"))
            } else {
                Ok(vec![SocketAddr::from((Ipv4Addr::LOCALHOST, port))])
            };
            async move { result }
        }
    }

    fn unstuff(text: &str) -> String {
        text.split_inclusive('\n')
            .map(|line| line.strip_prefix('.').filter(|_| line.starts_with("..")).unwrap_or(line))
            .collect()
    }

    #[test]
    fn address_validation() {
        for addr in ["a@b", "john.doe@example.com"] {
            assert!(is_valid_address(addr), "{addr}");
        }
        for addr in [
            "a@@b",
            "@b",
            "a@",
            "ab",
            "",
            "a@b@c",
            "a@b\r\nDATA",
            "a@b\n",
            "a b@c",
            "a@b\0",
        ] {
            assert!(!is_valid_address(addr), "{addr}");
        }
    }

    #[test]
    fn dot_stuffing() {
        assert_eq!(dot_stuff(".\r\n"), "..\r\n");
        assert_eq!(dot_stuff("a\r\n.b\r\n..c"), "a\r\n..b\r\n...c");
        assert_eq!(dot_stuff("no dots. here\n"), "no dots. here\n");

        for body in [
            "",
            ".",
            "..",
            "Hello\r\n.\r\nWorld",
            ".leading\n\n.\n..double\ntrailing.",
            "line\n.",
        ] {
            assert_eq!(unstuff(&dot_stuff(body)), body);
        }
    }

    proptest! {
        #[test]
        fn dot_stuffing_round_trip(text in "[.\r\n a-z]{0,64}") {
            let crlf = to_crlf(&text);
            let stuffed = dot_stuff(&crlf);
            prop_assert_eq!(unstuff(&stuffed), &*crlf);
            let framed = format!("\r\n{}\r\n", stuffed);
            prop_assert!(!framed.contains("\r\n.\r\n"));
        }

        #[test]
        fn dot_stuffing_round_trip_any_text(text in any::<String>()) {
            let crlf = to_crlf(&text);
            prop_assert_eq!(unstuff(&dot_stuff(&crlf)), &*crlf);
        }
    }

    #[tokio::test]
    async fn build_message() {
        let message = MessageBuilder::new()
            .from(" alice@client.example.org ")
            .to("bob@example.com\n")
            .cc(" carol@example.com ,dave@example.net, ")
            .subject("  Quarterly report ")
            .text("Numbers:\n.\n1\r\n2")
            .date(Utc.with_ymd_and_hms(2024, 10, 14, 9, 30, 0).unwrap())
            .relay(" relay.example.com ", 2525)
            .build_with(&StaticResolver)
            .await
            .unwrap();

        assert_eq!(message.sender(), "alice@client.example.org");
        assert_eq!(message.recipient(), "bob@example.com");
        assert_eq!(message.cc(), &["carol@example.com", "dave@example.net"]);
        assert_eq!(
            message.recipients().collect::<Vec<_>>(),
            ["bob@example.com", "carol@example.com", "dave@example.net"]
        );
        assert_eq!(
            message.headers(),
            &[
                ("From", "alice@client.example.org".to_string()),
                ("To", "bob@example.com".to_string()),
                ("Cc", "carol@example.com, dave@example.net".to_string()),
                ("Subject", "Quarterly report".to_string()),
                ("Date", "Mon, 14 Oct 2024 09:30:00 GMT".to_string()),
            ]
        );
        assert_eq!(message.body(), "Numbers:\r\n..\r\n1\r\n2");
        assert_eq!(message.relay_host(), "relay.example.com");
        assert_eq!(message.relay_port(), 2525);
        assert_eq!(message.relay_addr().port(), 2525);
        assert!(message.content().starts_with("From: alice@client.example.org\r\n"));
        assert!(message
            .content()
            .ends_with("GMT\r\n\r\nNumbers:\r\n..\r\n1\r\n2"));

        let printed = message.to_string();
        assert!(printed.contains("Cc: carol@example.com\nCc: dave@example.net\n"));
        assert!(printed.contains("MX-host: relay.example.com, address: 127.0.0.1:2525\n"));
    }

    #[tokio::test]
    async fn empty_cc_has_no_header() {
        let message = MessageBuilder::new()
            .from("alice@client.example.org")
            .to("bob@example.com")
            .cc("   ")
            .build_with(&StaticResolver)
            .await
            .unwrap();

        assert!(message.cc().is_empty());
        assert!(message.headers().iter().all(|(name, _)| *name != "Cc"));
        assert_eq!(message.recipients().count(), 1);
    }

    #[tokio::test]
    async fn invalid_addresses() {
        for (from, to, cc, bad) in [
            ("alice@client.example.org", "bob@@example.com", "", "bob@@example.com"),
            ("@client.example.org", "bob@example.com", "", "@client.example.org"),
            ("alice@client.example.org", "bob@example.com", "carol", "carol"),
        ] {
            match MessageBuilder::new()
                .from(from)
                .to(to)
                .cc(cc)
                .relay("unknown.invalid", 25)
                .build_with(&StaticResolver)
                .await
            {
                Err(Error::InvalidAddress(addr)) => assert_eq!(addr, bad),
                other => panic!("unexpected result {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn line_breaks_in_addresses() {
        for (to, cc, bad) in [
            ("bob@example.com\r\nDATA", "", "bob@example.com\r\nDATA"),
            (
                "bob@example.com",
                "carol@example.com\r\nRCPT TO:<eve@example.org>",
                "carol@example.com\r\nRCPT TO:<eve@example.org>",
            ),
        ] {
            match MessageBuilder::new()
                .from("alice@client.example.org")
                .to(to)
                .cc(cc)
                .build_with(&StaticResolver)
                .await
            {
                Err(Error::InvalidAddress(addr)) => assert_eq!(addr, bad),
                other => panic!("unexpected result {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn line_breaks_in_subject() {
        for subject in [
            "Hi\r\n.\r\nMAIL FROM:<evil@x.org>",
            "Hi\nBcc: eve@example.org",
            "Hi\rthere",
        ] {
            match MessageBuilder::new()
                .from("alice@client.example.org")
                .to("bob@example.com")
                .subject(subject)
                .build_with(&StaticResolver)
                .await
            {
                Err(Error::InvalidHeader { name, value }) => {
                    assert_eq!(name, "Subject");
                    assert_eq!(value, subject);
                }
                other => panic!("unexpected result {other:?}"),
            }
        }

        let message = MessageBuilder::new()
            .from("alice@client.example.org")
            .to("bob@example.com")
            .subject("Tabs\tare fine")
            .text("body")
            .build_with(&StaticResolver)
            .await
            .unwrap();
        let content = message.content();
        assert!(content.contains("Subject: Tabs\tare fine\r\n"));
        assert!(!content.contains("\r\n.\r\n"));
    }

    #[tokio::test]
    async fn unknown_relay_host() {
        match MessageBuilder::new()
            .from("alice@client.example.org")
            .to("bob@example.com")
            .relay("relay.invalid", 25)
            .build_with(&StaticResolver)
            .await
        {
            Err(Error::HostResolution { host, source }) => {
                assert_eq!(host, "relay.invalid");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn system_resolver_literal_address() {
        let message = MessageBuilder::new()
            .from("alice@client.example.org")
            .to("bob@example.com")
            .relay("127.0.0.1", 2525)
            .build()
            .await
            .unwrap();
        assert_eq!(message.relay_addr(), SocketAddr::from((Ipv4Addr::LOCALHOST, 2525)));
    }
}
