use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Url;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::{STREAM_PATH, parse_alert};
use crate::core::edge::EdgeTriggeredEmitter;
use crate::core::{Device, EventSender, StreamError};

const MAX_ERROR_BODY: usize = 64 * 1024;
const MAX_CHUNK: usize = 1024 * 1024;

/// Where and what to request when bypassing the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawTarget {
    host: String,
    port: u16,
    path: String,
}

impl RawTarget {
    fn parse(device: &Device) -> Result<Self, StreamError> {
        let endpoint = device.endpoint(STREAM_PATH);
        let url = Url::parse(&endpoint)
            .map_err(|e| StreamError::configuration(format!("invalid camera url {}: {}", endpoint, e)))?;

        match url.scheme() {
            "http" => {}
            "https" => return Err(StreamError::configuration("HTTPS is not supported for raw TCP streaming")),
            other => return Err(StreamError::configuration(format!("unsupported url scheme {}", other))),
        }

        let host = url
            .host_str()
            .ok_or_else(|| StreamError::configuration(format!("no host in {}", endpoint)))?
            .to_string();

        Ok(Self {
            host,
            port: url.port_or_known_default().unwrap_or(80),
            path: url.path().to_string(),
        })
    }

    fn request(&self, username: &str, password: &str) -> String {
        let host = if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        };
        let credentials = STANDARD.encode(format!("{}:{}", username, password));

        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nAuthorization: Basic {}\r\nAccept: */*\r\n\r\n",
            self.path, host, credentials
        )
    }
}

/// Streams alerts over a plain socket for cameras whose multipart framing breaks HTTP clients.
/// Only Basic auth is sent on this path.
#[tracing::instrument(skip_all, fields(device = %device.name))]
pub async fn read_events(device: &Device, events: &EventSender) -> Result<(), StreamError> {
    let target = RawTarget::parse(device)?;
    tracing::debug!("Opening raw connection to {}:{}", target.host, target.port);

    let mut stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
    stream
        .write_all(target.request(&device.username, &device.password).as_bytes())
        .await?;
    let mut reader = BufReader::new(stream);

    let Some(status_line) = read_line(&mut reader).await? else {
        return Ok(());
    };
    let (status, reason) = parse_status_line(&status_line)?;

    let Some(headers) = read_headers(&mut reader).await? else {
        return Ok(());
    };

    if status != 200 {
        let body = read_error_body(&mut reader, &headers).await?;
        return Err(StreamError::protocol(format!(
            "camera answered {} {}: {}",
            status,
            reason,
            body.trim()
        )));
    }

    tracing::info!("Connected to hikvision camera {} over raw TCP", device.name);

    let mut emitter = EdgeTriggeredEmitter::new(&device.name, events);
    let mut chunk = String::new();

    while let Some(line) = read_line(&mut reader).await? {
        if !line.trim().is_empty() {
            if chunk.len() + line.len() > MAX_CHUNK {
                return Err(StreamError::protocol("alert exceeds buffer limit"));
            }
            chunk.push_str(&line);
            chunk.push('\n');
            continue;
        }

        let frame = std::mem::take(&mut chunk);
        let Some(xml) = extract_event_xml(&frame) else {
            continue;
        };

        match parse_alert(xml) {
            Ok(raw) => emitter.process(raw).await?,
            Err(e) => tracing::warn!("Dropping unreadable alert from {}: {:?}", device.name, e),
        }
    }

    Ok(())
}

/// Cuts the XML document out of one blank-line delimited chunk, dropping multipart
/// headers before it and a spliced status line of the next response after it.
fn extract_event_xml(frame: &str) -> Option<&str> {
    let start = frame.find('<')?;
    let xml = &frame[start..];

    let end = match root_end(xml) {
        Some(end) => end,
        None => xml.find("HTTP/1.1").unwrap_or(xml.len()),
    };

    Some(xml[..end].trim())
}

/// Byte offset just past the closing tag of the first element, skipping declarations.
fn root_end(xml: &str) -> Option<usize> {
    let (open, _) = xml
        .match_indices('<')
        .find(|(pos, _)| xml[pos + 1..].starts_with(|c: char| c.is_ascii_alphabetic()))?;

    let tag = &xml[open + 1..];
    let name_len = tag.find(|c: char| c.is_whitespace() || c == '>' || c == '/')?;
    let name = &tag[..name_len];

    let after_name = open + 1 + name_len;
    let open_end = after_name + xml[after_name..].find('>')?;
    if xml[..open_end].ends_with('/') {
        return Some(open_end + 1);
    }

    let closing = format!("</{}>", name);
    xml[open_end..]
        .find(&closing)
        .map(|pos| open_end + pos + closing.len())
}

fn parse_status_line(line: &str) -> Result<(u16, String), StreamError> {
    let Some(rest) = line.strip_prefix("HTTP/1.1") else {
        return Err(StreamError::protocol(format!("bad status line: {}", line)));
    };

    let rest = rest.trim_start();
    let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    let code = code
        .parse::<u16>()
        .map_err(|_| StreamError::protocol(format!("bad status code in: {}", line)))?;

    Ok((code, reason.trim().to_string()))
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>, StreamError> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn read_headers<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<HashMap<String, String>>, StreamError> {
    let mut headers = HashMap::new();

    loop {
        let Some(line) = read_line(reader).await? else {
            return Ok(None);
        };

        if line.trim().is_empty() {
            return Ok(Some(headers));
        }

        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
}

async fn read_error_body<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    headers: &HashMap<String, String>,
) -> Result<String, StreamError> {
    let length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
        .min(MAX_ERROR_BODY);

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    Ok(String::from_utf8_lossy(&body).into_owned())
}
