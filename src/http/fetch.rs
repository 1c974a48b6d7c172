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

use std::{io, time::Duration};

use tokio::{
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
        BufReader,
    },
    net::TcpStream,
};

use super::{
    response::{parse_status_line, Headers, HttpResponse},
    HTTP_PORT, MAX_LINE_LENGTH, MAX_OBJECT_SIZE,
};

const BUF_SIZE: usize = 4096;

/// Downloads one object with a single `GET` request.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    host: String,
    path: String,
    port: u16,
    max_object_size: usize,
    timeout: Duration,
}

/// Fetches `url` (`host[/path]`) from port 80 with the default limits.
pub async fn fetch(url: &str) -> crate::Result<Vec<u8>> {
    HttpFetcher::new(url).fetch().await
}

impl HttpFetcher {
    /// Splits `url` into host and path at the first `/`.
    ///
    /// A leading `http://` is ignored; without a `/` the path is `/`.
    pub fn new(url: impl AsRef<str>) -> Self {
        let url = url.as_ref().trim();
        let url = url.strip_prefix("http://").unwrap_or(url);
        let (host, path) = match url.split_once('/') {
            Some((host, path)) => (host, format!("/{path}")),
            None => (url, "/".to_string()),
        };

        HttpFetcher {
            host: host.to_string(),
            path,
            port: HTTP_PORT,
            max_object_size: MAX_OBJECT_SIZE,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Sets the server port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the largest body that will be accepted
    pub fn max_object_size(mut self, max_object_size: usize) -> Self {
        self.max_object_size = max_object_size;
        self
    }

    /// Sets the connect and exchange timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Request message sent to the server.
    pub fn request(&self) -> String {
        format!("GET {} HTTP/1.1\r\nHost: {}\r\n\r\n", self.path, self.host)
    }

    /// Connects to the server and returns the body of the object.
    pub async fn fetch(&self) -> crate::Result<Vec<u8>> {
        log::info!("Connecting to HTTP server {}:{}", self.host, self.port);
        let stream = tokio::time::timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| crate::Error::Timeout)??;
        self.fetch_from(stream).await
    }

    /// Runs the exchange over an already connected stream and returns the body.
    pub async fn fetch_from<T: AsyncRead + AsyncWrite + Unpin>(
        &self,
        stream: T,
    ) -> crate::Result<Vec<u8>> {
        self.get(stream).await.map(|response| response.body)
    }

    /// Runs the exchange over an already connected stream.
    ///
    /// The stream is shut down on every exit path; shutdown failures are
    /// logged and do not change the result.
    pub async fn get<T: AsyncRead + AsyncWrite + Unpin>(
        &self,
        stream: T,
    ) -> crate::Result<HttpResponse> {
        let mut stream = BufReader::new(stream);
        let result = tokio::time::timeout(self.timeout, self.exchange(&mut stream))
            .await
            .map_err(|_| crate::Error::Timeout)
            .and_then(|result| result);

        match stream.shutdown().await {
            Ok(()) => log::debug!("Connection to {} closed", self.host),
            Err(err) => log::warn!("Unable to close connection to {}: {err}", self.host),
        }

        result
    }

    async fn exchange<T: AsyncRead + AsyncWrite + Unpin>(
        &self,
        stream: &mut BufReader<T>,
    ) -> crate::Result<HttpResponse> {
        let request = self.request();
        log::debug!("Send request: {:?}", request);
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let status_line = read_line(stream).await?.ok_or_else(|| {
            crate::Error::MalformedResponse("connection closed before status line".to_string())
        })?;
        log::debug!("Status line: {status_line}");
        let status_code = parse_status_line(&status_line)?;
        if status_code != 200 {
            log::warn!("Status code {status_code} from {}", self.host);
            return Err(crate::Error::HttpStatus(status_code));
        }

        let mut headers = Headers::new();
        while let Some(line) = read_line(stream).await? {
            if line.trim().is_empty() {
                break;
            }
            headers.parse_line(&line);
        }

        let declared_length = headers
            .get("Content-Length")
            .map(|value| {
                value.parse::<usize>().map_err(|_| {
                    crate::Error::MalformedResponse(format!("invalid Content-Length {value:?}"))
                })
            })
            .transpose()?;

        let body = match declared_length {
            Some(len) if len > self.max_object_size => {
                log::warn!("Object of {len} bytes exceeds limit of {}", self.max_object_size);
                return Err(crate::Error::ObjectTooLarge(len));
            }
            Some(len) => read_body(stream, len).await?,
            None => read_until_close(stream, self.max_object_size).await?,
        };
        log::debug!("Read {} body bytes", body.len());

        Ok(HttpResponse {
            status_code,
            headers,
            declared_length,
            body,
        })
    }
}

/// Reads one line, without its line terminator. `None` at end of stream.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> crate::Result<Option<String>> {
    let mut line = Vec::new();
    let br = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if br == 0 {
        return Ok(None);
    }
    if br == MAX_LINE_LENGTH && line.last() != Some(&b'\n') {
        return Err(crate::Error::MalformedResponse(format!(
            "line longer than {MAX_LINE_LENGTH} bytes"
        )));
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Moves bytes already sitting in the read buffer into `body`, up to `limit` in total.
fn take_buffered<T: AsyncRead + Unpin>(stream: &mut BufReader<T>, body: &mut Vec<u8>, limit: usize) {
    let buffered = stream.buffer();
    let n = buffered.len().min(limit - body.len());
    body.extend_from_slice(&buffered[..n]);
    stream.consume(n);
}

/// Reads exactly `len` bytes, never asking the stream for more.
async fn read_body<T: AsyncRead + Unpin>(
    stream: &mut BufReader<T>,
    len: usize,
) -> io::Result<Vec<u8>> {
    let mut body = Vec::with_capacity(len.min(BUF_SIZE));
    take_buffered(stream, &mut body, len);

    let reader = stream.get_mut();
    let mut buf = [0u8; BUF_SIZE];
    while body.len() < len {
        let want = (len - body.len()).min(BUF_SIZE);
        let br = reader.read(&mut buf[..want]).await?;
        if br == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed after {} of {len} body bytes", body.len()),
            ));
        }
        body.extend_from_slice(&buf[..br]);
    }

    Ok(body)
}

/// Reads until end of stream, failing once more than `max` bytes arrive.
async fn read_until_close<T: AsyncRead + Unpin>(
    stream: &mut BufReader<T>,
    max: usize,
) -> crate::Result<Vec<u8>> {
    let limit = max.saturating_add(1);
    let mut body = Vec::new();
    take_buffered(stream, &mut body, limit);

    let reader = stream.get_mut();
    let mut buf = [0u8; BUF_SIZE];
    while body.len() <= max {
        let want = (limit - body.len()).min(BUF_SIZE);
        let br = reader.read(&mut buf[..want]).await?;
        if br == 0 {
            return Ok(body);
        }
        body.extend_from_slice(&buf[..br]);
    }

    Err(crate::Error::ObjectTooLarge(body.len()))
}
