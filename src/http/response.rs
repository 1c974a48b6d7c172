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

use std::borrow::Cow;

/// Response header fields in arrival order, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `Name: value` line. Lines without a colon are ignored.
    pub fn parse_line(&mut self, line: &str) {
        if let Some((name, value)) = line.split_once(':') {
            self.fields
                .push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    /// Returns the first value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: Headers,
    /// Value of `Content-Length`, if the server sent one.
    pub declared_length: Option<usize>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Reads the status code at its fixed offset in `HTTP/1.x ddd reason`.
pub(crate) fn parse_status_line(line: &str) -> crate::Result<u16> {
    if !line.starts_with("HTTP/") {
        return Err(crate::Error::MalformedResponse(format!(
            "invalid status line {line:?}"
        )));
    }
    line.get(9..12)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| crate::Error::MalformedResponse(format!("invalid status line {line:?}")))
}
