//! Persistent event connection
//!
//! HAP delivers notifications on the same TCP connection that registered
//! them: after the `PUT /characteristics` with `ev: true` is answered, the
//! instance keeps writing `EVENT/1.0 200 OK` frames carrying a
//! `{"characteristics": [...]}` body. When the connection ends a
//! [`PushMessage::Closed`] follows the last event so the registrations can be
//! redone.

use super::{HapEvent, PushMessage, StatusResponse, WriteRequest};
use crate::error::{BridgeError, Result};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const MAX_BODY_LEN: usize = 4 * 1024 * 1024;

/// One HTTP-style message read off the connection
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Message {
    pub start_line: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl Message {
    pub fn is_event(&self) -> bool {
        self.start_line.starts_with("EVENT/")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Serialize a `PUT /characteristics` request
pub(crate) fn encode_put(host: &str, port: u16, pin: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "PUT /characteristics HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Authorization: {pin}\r\n\
         Content-Type: application/hap+json\r\n\
         Content-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);
    request
}

/// Read the next message; `None` on a clean end of stream
pub(crate) async fn read_message<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncBufRead + Unpin,
{
    let mut start_line = String::new();
    loop {
        start_line.clear();
        if reader.read_line(&mut start_line).await? == 0 {
            return Ok(None);
        }
        if !start_line.trim().is_empty() {
            break;
        }
    }
    let start_line = start_line.trim_end().to_string();

    let status = start_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| BridgeError::parse(format!("Malformed start line: {start_line}")))?;

    let mut content_length = 0usize;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(BridgeError::parse("Connection closed inside headers"));
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value
                    .parse()
                    .map_err(|_| BridgeError::parse(format!("Bad content length: {value}")))?;
            } else if name.eq_ignore_ascii_case("transfer-encoding")
                && value.eq_ignore_ascii_case("chunked")
            {
                chunked = true;
            }
        }
    }

    let body = if chunked {
        read_chunked(reader).await?
    } else {
        if content_length > MAX_BODY_LEN {
            return Err(BridgeError::parse(format!(
                "Body of {content_length} bytes exceeds limit"
            )));
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        body
    };

    Ok(Some(Message {
        start_line,
        status,
        body,
    }))
}

async fn read_chunked<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).await?;
        let size_str = size_line.trim().split(';').next().unwrap_or_default();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| BridgeError::parse(format!("Bad chunk size: {size_str}")))?;

        if size == 0 {
            let mut trailer = String::new();
            reader.read_line(&mut trailer).await?;
            return Ok(body);
        }
        if body.len() + size > MAX_BODY_LEN {
            return Err(BridgeError::parse("Chunked body exceeds limit"));
        }

        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..]).await?;
        let mut crlf = String::new();
        reader.read_line(&mut crlf).await?;
    }
}

/// Decode an event body into push events for `host:port`
pub(crate) fn parse_events(host: &str, port: u16, body: &[u8]) -> Result<Vec<HapEvent>> {
    let response: StatusResponse = serde_json::from_slice(body)?;
    Ok(response
        .characteristics
        .into_iter()
        .map(|c| HapEvent {
            host: host.to_string(),
            port,
            aid: c.aid,
            iid: c.iid,
            value: c.value,
        })
        .collect())
}

/// Open an event connection and start forwarding its frames.
///
/// Returns once the instance has accepted the registration; the returned task
/// runs until the instance closes the connection or the receiver is dropped.
/// In the first case it signals [`PushMessage::Closed`] before exiting.
pub async fn open(
    host: &str,
    port: u16,
    pin: &str,
    request: &WriteRequest,
    timeout: Duration,
    events: mpsc::Sender<PushMessage>,
) -> Result<JoinHandle<()>> {
    let body = serde_json::to_vec(request)?;

    let mut stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| BridgeError::timeout(format!("Connecting to {host}:{port}")))?
        .map_err(|e| BridgeError::subscription(format!("Connect to {host}:{port} failed: {e}")))?;

    stream.write_all(&encode_put(host, port, pin, &body)).await?;
    let mut reader = BufReader::new(stream);

    let response = tokio::time::timeout(timeout, read_message(&mut reader))
        .await
        .map_err(|_| BridgeError::timeout(format!("Waiting for {host}:{port} to accept events")))??
        .ok_or_else(|| BridgeError::subscription(format!("{host}:{port} closed the connection")))?;

    if !response.is_success() {
        return Err(BridgeError::subscription(format!(
            "{host}:{port} rejected event registration with status {}",
            response.status
        )));
    }

    let host = host.to_string();
    Ok(tokio::spawn(async move {
        forward_events(&host, port, &mut reader, events).await;
    }))
}

/// Pump events until the stream ends, then report the closed connection
pub(crate) async fn forward_events<R>(
    host: &str,
    port: u16,
    reader: &mut R,
    events: mpsc::Sender<PushMessage>,
) where
    R: AsyncBufRead + Unpin,
{
    if !pump(host, port, reader, &events).await {
        return;
    }
    let closed = PushMessage::Closed {
        host: host.to_string(),
        port,
    };
    let _ = events.send(closed).await;
}

/// Returns false when the receiver is gone
async fn pump<R>(host: &str, port: u16, reader: &mut R, events: &mpsc::Sender<PushMessage>) -> bool
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_message(reader).await {
            Ok(Some(message)) if message.is_event() => {
                match parse_events(host, port, &message.body) {
                    Ok(batch) => {
                        for event in batch {
                            trace!("Event from {host}:{port} aid:{} iid:{}", event.aid, event.iid);
                            if events.send(event.into()).await.is_err() {
                                return false;
                            }
                        }
                    }
                    Err(e) => warn!("Discarding malformed event from {host}:{port}: {e}"),
                }
            }
            Ok(Some(message)) => {
                debug!("Ignoring '{}' on event connection {host}:{port}", message.start_line);
            }
            Ok(None) => {
                debug!("Event connection to {host}:{port} closed");
                return true;
            }
            Err(e) => {
                warn!("Event connection to {host}:{port} failed: {e}");
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_response_then_event() {
        let wire = b"HTTP/1.1 204 No Content\r\n\r\n\
EVENT/1.0 200 OK\r\nContent-Type: application/hap+json\r\nContent-Length: 50\r\n\r\n\
{\"characteristics\":[{\"aid\":2,\"iid\":10,\"value\":1}]}";
        let mut reader = BufReader::new(&wire[..]);

        let response = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(response.status, 204);
        assert!(response.is_success());
        assert!(!response.is_event());

        let event = read_message(&mut reader).await.unwrap().unwrap();
        assert!(event.is_event());
        let events = parse_events("10.0.0.2", 51826, &event.body).unwrap();
        assert_eq!(
            events,
            vec![HapEvent {
                host: "10.0.0.2".to_string(),
                port: 51826,
                aid: 2,
                iid: 10,
                value: json!(1),
            }]
        );

        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_chunked_body() {
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nabcd\r\n2\r\nef\r\n0\r\n\r\n";
        let mut reader = BufReader::new(&wire[..]);
        let message = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(message.body, b"abcdef".to_vec());
    }

    #[tokio::test]
    async fn test_rejects_malformed_start_line() {
        let wire = b"garbage\r\n\r\n";
        let mut reader = BufReader::new(&wire[..]);
        assert!(read_message(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_end_of_stream_follows_last_event() {
        let wire = b"EVENT/1.0 200 OK\r\nContent-Length: 52\r\n\r\n\
{\"characteristics\":[{\"aid\":2,\"iid\":9,\"value\":true}]}";
        let mut reader = BufReader::new(&wire[..]);
        let (tx, mut rx) = mpsc::channel(4);

        forward_events("10.0.0.2", 51826, &mut reader, tx).await;

        assert!(matches!(rx.recv().await, Some(PushMessage::Event(e)) if e.iid == 9));
        assert_eq!(
            rx.recv().await,
            Some(PushMessage::Closed {
                host: "10.0.0.2".to_string(),
                port: 51826,
            })
        );
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_encode_put_carries_pin() {
        let request = encode_put("10.0.0.2", 51826, "031-45-154", b"{}");
        let text = String::from_utf8(request).unwrap();
        assert!(text.starts_with("PUT /characteristics HTTP/1.1\r\n"));
        assert!(text.contains("Authorization: 031-45-154\r\n"));
        assert!(text.ends_with("Content-Length: 2\r\n\r\n{}"));
    }
}
