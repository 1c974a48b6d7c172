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

use std::fmt::Display;

pub(crate) const MAX_MESSAGE_LENGTH: usize = 512;

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    message: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, message: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Reply {
            code,
            message: message.into_iter().map(Into::into).collect(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &[String] {
        &self.message
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)?;
        for line in &self.message {
            write!(f, " {line}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyParseError {
    InvalidReplyCode,
    InvalidSeparator,
    CodeMismatch,
    MessageTooLong,
    NeedsMoreData,
}

impl Display for ReplyParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReplyParseError::InvalidReplyCode => "invalid reply code",
            ReplyParseError::InvalidSeparator => "invalid separator after reply code",
            ReplyParseError::CodeMismatch => "reply code changed between lines",
            ReplyParseError::MessageTooLong => "reply text too long",
            ReplyParseError::NeedsMoreData => "incomplete reply",
        })
    }
}

enum ReplyParserState {
    FirstDigit,
    SecondDigit,
    ThirdDigit,
    Separator,
    Description,
}

/// Incremental parser for `ddd[ -]text CRLF` reply lines.
pub struct ReplyParser {
    code: u16,
    current_code: u16,
    state: ReplyParserState,
    is_last: bool,
    buf: Vec<u8>,
    message: Vec<String>,
    message_len: usize,
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self {
            code: u16::MAX,
            current_code: 0,
            state: ReplyParserState::FirstDigit,
            buf: Vec::with_capacity(128),
            is_last: false,
            message: Vec::with_capacity(4),
            message_len: 0,
        }
    }
}

impl ReplyParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state = ReplyParserState::FirstDigit;
        self.code = u16::MAX;
        self.current_code = 0;
        self.message_len = 0;
        self.is_last = false;
        self.buf.clear();
        self.message.clear();
    }

    fn digit(&mut self, byte: u8, weight: u16, next: ReplyParserState) -> Result<(), ReplyParseError> {
        if byte.is_ascii_digit() {
            self.current_code += u16::from(byte - b'0') * weight;
            self.state = next;
            Ok(())
        } else {
            self.reset();
            Err(ReplyParseError::InvalidReplyCode)
        }
    }

    /// Feeds `bytes` to the parser, returning the reply once its last line is complete.
    ///
    /// Bytes following the end of the reply are ignored.
    pub fn parse(&mut self, bytes: &[u8]) -> Result<Reply, ReplyParseError> {
        for &byte in bytes {
            match self.state {
                ReplyParserState::FirstDigit => {
                    self.current_code = 0;
                    self.digit(byte, 100, ReplyParserState::SecondDigit)?;
                }
                ReplyParserState::SecondDigit => {
                    self.digit(byte, 10, ReplyParserState::ThirdDigit)?;
                }
                ReplyParserState::ThirdDigit => {
                    self.digit(byte, 1, ReplyParserState::Separator)?;
                }
                ReplyParserState::Separator => {
                    match byte {
                        b' ' => {
                            self.is_last = true;
                        }
                        b'-' => (),
                        // "250\r\n" is a valid final line without text
                        b'\r' | b'\n' => {
                            self.is_last = true;
                        }
                        _ => {
                            self.reset();
                            return Err(ReplyParseError::InvalidSeparator);
                        }
                    }

                    if self.code == u16::MAX {
                        self.code = self.current_code;
                    } else if self.code != self.current_code {
                        self.reset();
                        return Err(ReplyParseError::CodeMismatch);
                    }
                    self.current_code = 0;
                    self.state = ReplyParserState::Description;

                    if byte == b'\n' {
                        if let Some(reply) = self.end_of_line() {
                            return Ok(reply);
                        }
                    }
                }
                ReplyParserState::Description => match byte {
                    b'\n' => {
                        if let Some(reply) = self.end_of_line() {
                            return Ok(reply);
                        }
                    }
                    b'\r' => (),
                    _ => {
                        if self.message_len < MAX_MESSAGE_LENGTH {
                            self.buf.push(byte);
                            self.message_len += 1;
                        } else {
                            self.reset();
                            return Err(ReplyParseError::MessageTooLong);
                        }
                    }
                },
            }
        }

        Err(ReplyParseError::NeedsMoreData)
    }

    fn end_of_line(&mut self) -> Option<Reply> {
        if !self.buf.is_empty() {
            self.message
                .push(String::from_utf8_lossy(&self.buf).into_owned());
            self.buf.clear();
        }

        self.state = ReplyParserState::FirstDigit;
        self.current_code = 0;

        if self.is_last {
            let code = self.code;

            self.code = u16::MAX;
            self.is_last = false;
            self.message_len = 0;

            Some(Reply {
                code,
                message: std::mem::take(&mut self.message),
            })
        } else {
            None
        }
    }
}
