//! Push channel
//!
//! Long-lived subscription to the backend's event stream. One connection
//! exists per process; decoded events fan out to the session loop over a
//! channel. The wire format is Server-Sent Events: named frames carrying a
//! JSON payload, shaped into typed [`PushEvent`]s at this boundary. A
//! malformed frame is dropped with a warning and the stream keeps going.

use bytes::Bytes;
use futures::StreamExt;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::models::PushEvent;
use crate::validation;

/// Delay before the first reconnect attempt
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Ceiling for the reconnect backoff
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Connection timeout for the stream request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One raw Server-Sent Events frame: an optional event name plus its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE wire parser.
///
/// Fed arbitrary byte chunks, emits complete frames. Field lines accumulate
/// until a blank line dispatches the frame; comment lines (keepalives) and
/// unknown fields are ignored per the SSE format.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data: String,
    event: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect any frames it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let mut line = &line[..line.len() - 1];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &[u8]) -> Option<SseFrame> {
        // Blank line dispatches the accumulated frame.
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            return Some(SseFrame {
                event: self.event.take(),
                data: std::mem::take(&mut self.data),
            });
        }

        // Comment line, used as a keepalive.
        if line.starts_with(b":") {
            trace!("Push stream keepalive");
            return None;
        }

        let line = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => {
                warn!("Dropping non-UTF-8 line on push stream");
                return None;
            }
        };

        let (field, value) = match line.find(':') {
            Some(pos) => {
                let (field, rest) = line.split_at(pos);
                (field, rest[1..].strip_prefix(' ').unwrap_or(&rest[1..]))
            }
            None => (line, ""),
        };

        match field {
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            "event" => self.event = Some(value.to_string()),
            "id" | "retry" => trace!(field, "Ignoring push stream field"),
            _ => trace!(field, "Unknown push stream field"),
        }

        None
    }
}

/// Persistent subscription to the backend's push events.
pub struct PushChannel {
    client: Client,
    events_url: Url,
}

impl PushChannel {
    /// Build the channel with its own HTTP client.
    ///
    /// The stream request must not carry a total request timeout (it lives
    /// indefinitely), so the REST client's pool is not reused here.
    pub fn new(events_url: Url, token: Option<&str>) -> ClientResult<Self> {
        let mut builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClientError::Config(format!("invalid auth token: {}", e)))?;
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        Ok(Self {
            client: builder.build()?,
            events_url,
        })
    }

    /// Run the subscription until the receiving side shuts down.
    ///
    /// Reconnects with jittered exponential backoff; the subscription as a
    /// whole survives any single connection failure.
    pub async fn run(self, tx: mpsc::Sender<PushEvent>) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.stream_events(&tx).await {
                Ok(()) => {
                    info!("Push stream ended");
                    backoff = INITIAL_BACKOFF;
                }
                Err(error) => {
                    warn!(%error, "Push stream failed");
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }

            if tx.is_closed() {
                return;
            }

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
            debug!(delay_ms = (backoff + jitter).as_millis() as u64, "Reconnecting push stream");
            tokio::time::sleep(backoff + jitter).await;
        }
    }

    async fn stream_events(&self, tx: &mpsc::Sender<PushEvent>) -> ClientResult<()> {
        debug!(url = %self.events_url, "Connecting push stream");

        let response = self
            .client
            .get(self.events_url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::status(status, message));
        }

        info!("Push stream connected");

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();

        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk?;
            for frame in parser.feed(&chunk) {
                if let Some(event) = decode_frame(&frame) {
                    if tx.send(event).await.is_err() {
                        // Session loop is gone; stop cleanly.
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

/// Shape one raw frame into a typed event, or drop it with a warning.
fn decode_frame(frame: &SseFrame) -> Option<PushEvent> {
    let name = frame.event.as_deref().unwrap_or("message");

    let data: Value = match serde_json::from_str(&frame.data) {
        Ok(value) => value,
        Err(error) => {
            warn!(event = name, %error, "Dropping unparseable push payload");
            return None;
        }
    };

    match validation::parse_push_event(name, &data) {
        Ok(event) => Some(event),
        Err(error) => {
            warn!(event = name, %error, "Dropping malformed push event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_frame() {
        let mut parser = SseParser::new();

        let frames =
            parser.feed(b"event: reading:new\ndata: {\"deviceId\":1}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("reading:new"));
        assert_eq!(frames[0].data, "{\"deviceId\":1}");
    }

    #[test]
    fn test_parse_chunked_frame() {
        let mut parser = SseParser::new();

        assert!(parser.feed(b"event: device:upd").is_empty());
        assert!(parser.feed(b"ate\ndata: {\"id\"").is_empty());
        let frames = parser.feed(b":2}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("device:update"));
        assert_eq!(frames[0].data, "{\"id\":2}");
    }

    #[test]
    fn test_keepalive_comment_ignored() {
        let mut parser = SseParser::new();

        let frames = parser.feed(b": ping\n\ndata: {}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, None);
    }

    #[test]
    fn test_multiple_frames_one_chunk() {
        let mut parser = SseParser::new();

        let frames = parser.feed(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");

        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();

        let frames = parser.feed(b"event: reading:new\r\ndata: {}\r\n\r\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("reading:new"));
    }

    #[test]
    fn test_event_name_does_not_leak_between_frames() {
        let mut parser = SseParser::new();

        let frames =
            parser.feed(b"event: reading:new\ndata: {}\n\ndata: {}\n\n");

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("reading:new"));
        assert_eq!(frames[1].event, None);
    }

    #[test]
    fn test_decode_valid_reading_frame() {
        let frame = SseFrame {
            event: Some("reading:new".to_string()),
            data: r#"{"deviceId":3,"timestamp":"2024-06-01T12:00:00Z","rainfall_mm":0.2}"#
                .to_string(),
        };

        assert!(matches!(
            decode_frame(&frame),
            Some(PushEvent::ReadingNew { device_id: 3, .. })
        ));
    }

    #[test]
    fn test_decode_drops_bad_frames() {
        let garbage = SseFrame {
            event: Some("reading:new".to_string()),
            data: "not json".to_string(),
        };
        assert!(decode_frame(&garbage).is_none());

        let missing_id = SseFrame {
            event: Some("reading:new".to_string()),
            data: r#"{"timestamp":"2024-06-01T12:00:00Z"}"#.to_string(),
        };
        assert!(decode_frame(&missing_id).is_none());

        let unknown = SseFrame {
            event: Some("image:new".to_string()),
            data: "{}".to_string(),
        };
        assert!(decode_frame(&unknown).is_none());
    }
}
