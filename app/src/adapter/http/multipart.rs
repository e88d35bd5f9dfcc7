use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};

use super::connection::DeviceConnection;
use crate::adapter::EventDialect;
use crate::core::edge::EdgeTriggeredEmitter;
use crate::core::{EventSender, StreamError};

const MAX_BUFFERED: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Part {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// Incremental reader for an endless multipart body.
pub struct MultipartReader<S> {
    stream: S,
    buffer: BytesMut,
    delimiter: Vec<u8>,
    done: bool,
}

/// Extracts the boundary of a multipart response. Hikvision insists on `multipart/mixed`.
pub fn multipart_boundary(headers: &HeaderMap, require_mixed: bool) -> Result<String, StreamError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| StreamError::non_conformant("missing Content-Type"))?;

    let mime: mime::Mime = content_type
        .parse()
        .map_err(|e| StreamError::non_conformant(format!("invalid Content-Type {}: {}", content_type, e)))?;

    if mime.type_() != mime::MULTIPART {
        return Err(StreamError::non_conformant(format!(
            "expected multipart response, got {}",
            content_type
        )));
    }

    if require_mixed && !mime.subtype().as_str().eq_ignore_ascii_case("mixed") {
        return Err(StreamError::non_conformant(format!(
            "expected multipart/mixed, got {}",
            content_type
        )));
    }

    mime.get_param(mime::BOUNDARY)
        .map(|b| b.as_str().to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| StreamError::non_conformant(format!("no boundary in {}", content_type)))
}

/// Reads one streaming session and feeds every decoded frame through edge detection.
/// Returns `Ok(())` when the camera ends the stream.
#[tracing::instrument(skip_all, fields(device = %conn.device().name))]
pub async fn read_events<D: EventDialect>(
    conn: &mut DeviceConnection,
    dialect: &D,
    events: &EventSender,
) -> Result<(), StreamError> {
    let url = conn.device().endpoint(&dialect.stream_path());
    tracing::debug!("Connecting to event stream {}", url);

    let response = conn.get(&url).await?;
    match response.status() {
        status if status.is_success() => {}
        StatusCode::UNAUTHORIZED => return Err(StreamError::authentication("event stream rejected credentials")),
        status => return Err(StreamError::protocol(format!("event stream answered {}", status))),
    }

    let boundary = multipart_boundary(response.headers(), dialect.requires_mixed())?;
    let device = conn.device();
    tracing::info!("Connected to {} camera {}", device.vendor.family(), device.name);

    let mut parts = MultipartReader::new(Box::pin(response.bytes_stream()), &boundary);
    let mut emitter = EdgeTriggeredEmitter::new(&device.name, events);

    while let Some(part) = parts.next_part().await? {
        if part.content_type().is_some_and(|ct| ct.starts_with("image/")) {
            tracing::debug!("Skipping image part from {}", device.name);
            continue;
        }

        let body = String::from_utf8_lossy(&part.body);
        match dialect.parse(body.trim()) {
            Ok(Some(raw)) => emitter.process(raw).await?,
            Ok(None) => {}
            Err(e) => tracing::warn!("Dropping unreadable frame from {}: {:?}", device.name, e),
        }
    }

    Ok(())
}

impl<S, E> MultipartReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<StreamError>,
{
    pub fn new(stream: S, boundary: &str) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            delimiter: format!("--{}", boundary).into_bytes(),
            done: false,
        }
    }

    /// `Ok(None)` once the closing delimiter is seen or the stream ends.
    pub async fn next_part(&mut self) -> Result<Option<Part>, StreamError> {
        if self.done {
            return Ok(None);
        }

        if !self.skip_to_delimiter().await? {
            return self.finish();
        }

        while self.buffer.len() < 2 {
            if !self.fill().await? {
                return self.finish();
            }
        }
        if self.buffer.starts_with(b"--") {
            return self.finish();
        }

        let headers = loop {
            if let Some((end, separator_len)) = header_end(&self.buffer) {
                let block = self.buffer.split_to(end);
                self.buffer.advance(separator_len);
                break parse_headers(&block);
            }
            if !self.fill().await? {
                return self.finish();
            }
        };

        // The delimiter ends the part. Content-Length is only an upper bound, cameras overstate it.
        let mut body = loop {
            if let Some(pos) = find(&self.buffer, &self.delimiter) {
                let mut body = self.buffer.split_to(pos);
                while body.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                    body.truncate(body.len() - 1);
                }
                break body;
            }
            if !self.fill().await? {
                return self.finish();
            }
        };

        if let Some(length) = headers.get("content-length").and_then(|v| v.parse::<usize>().ok()) {
            body.truncate(length);
        }

        Ok(Some(Part {
            headers,
            body: body.freeze(),
        }))
    }

    async fn skip_to_delimiter(&mut self) -> Result<bool, StreamError> {
        loop {
            if let Some(pos) = find(&self.buffer, &self.delimiter) {
                self.buffer.advance(pos + self.delimiter.len());
                return Ok(true);
            }

            let keep = self.delimiter.len() - 1;
            if self.buffer.len() > keep {
                let discard = self.buffer.len() - keep;
                self.buffer.advance(discard);
            }

            if !self.fill().await? {
                return Ok(false);
            }
        }
    }

    async fn fill(&mut self) -> Result<bool, StreamError> {
        if self.buffer.len() > MAX_BUFFERED {
            return Err(StreamError::protocol("multipart part exceeds buffer limit"));
        }

        match self.stream.next().await {
            Some(Ok(chunk)) => {
                self.buffer.extend_from_slice(&chunk);
                Ok(true)
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(false),
        }
    }

    fn finish(&mut self) -> Result<Option<Part>, StreamError> {
        self.done = true;
        self.buffer.clear();
        Ok(None)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn header_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(buffer, b"\r\n\r\n").map(|pos| (pos, 4));
    let lf = find(buffer, b"\n\n").map(|pos| (pos, 2));

    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_headers(block: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(block)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}
