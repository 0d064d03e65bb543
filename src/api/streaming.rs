//! Streaming relay from the upstream completion to the HTTP response.
//!
//! Decodes the provider's SSE byte stream into plain text fragments and
//! forwards each one to the client as it arrives, without buffering the
//! whole reply. The running transcript is appended to the conversation
//! history when the stream ends, including the partial transcript when
//! the client disconnects mid-stream.

use crate::api::disconnect::DisconnectStream;
use crate::core::error::{AppError, Result};
use crate::core::relay::RelayStatus;
use crate::services::provider::ChatStreamChunk;
use crate::services::registry::ConversationSession;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Build the streaming `text/plain` response for one relay.
///
/// The response is held back until the first text fragment has arrived
/// (bounded by `first_chunk_timeout` when configured), so failures before
/// any output still surface as a proper HTTP status instead of an empty
/// 200 that dies. The user `prompt` is committed to the session history
/// at the same point, so a failed attempt leaves no unanswered user turn
/// behind and a retry does not send the prompt twice.
pub async fn relay_text_stream(
    upstream: reqwest::Response,
    session: Arc<ConversationSession>,
    prompt: String,
    first_chunk_timeout: Option<Duration>,
) -> Result<Response> {
    let status = RelayStatus::new();
    let mut chunks = Box::pin(text_chunk_stream(upstream, session.clone(), status.clone()));

    let first = match first_chunk_timeout {
        Some(limit) => match tokio::time::timeout(limit, chunks.next()).await {
            Ok(item) => item,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = limit.as_secs(),
                    "First chunk deadline exceeded"
                );
                return Err(AppError::FirstChunkTimeout {
                    timeout_secs: limit.as_secs(),
                });
            }
        },
        None => chunks.next().await,
    };

    if let Some(Err(e)) = &first {
        // No body bytes were sent yet, so a status line is still possible.
        return Err(AppError::UpstreamStream(e.to_string()));
    }

    session.push_user(prompt);

    let body_stream = futures::stream::iter(first).chain(chunks);
    let body = Body::from_stream(DisconnectStream {
        stream: Box::pin(body_stream),
        status,
    });

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap())
}

/// Decode the upstream SSE stream into a finite stream of text fragments.
///
/// The stream ends when the upstream signals completion (`[DONE]` or EOF)
/// and is not restartable. An upstream error mid-stream terminates the
/// body after whatever prefix was already relayed.
fn text_chunk_stream(
    upstream: reqwest::Response,
    session: Arc<ConversationSession>,
    status: RelayStatus,
) -> impl Stream<Item = std::io::Result<Bytes>> {
    async_stream::stream! {
        let mut transcript = TranscriptGuard::new(session, status);
        let mut decoder = SseDecoder::new();
        let mut bytes_stream = Box::pin(upstream.bytes_stream());

        loop {
            match bytes_stream.next().await {
                Some(Ok(bytes)) => {
                    let mut finished = false;
                    for payload in decoder.decode(&bytes) {
                        if payload == "[DONE]" {
                            finished = true;
                            break;
                        }
                        if let Some(text) = extract_text(&payload) {
                            if !text.is_empty() {
                                transcript.extend(&text);
                                yield Ok(Bytes::from(text));
                            }
                        }
                    }
                    if finished {
                        transcript.finish();
                        break;
                    }
                }
                Some(Err(e)) => {
                    transcript.fail();
                    yield Err(std::io::Error::new(std::io::ErrorKind::Other, e));
                    break;
                }
                None => {
                    transcript.finish();
                    break;
                }
            }
        }
    }
}

/// Extract the text delta from one SSE data payload, if any.
fn extract_text(payload: &str) -> Option<String> {
    match serde_json::from_str::<ChatStreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .find_map(|choice| choice.delta.content),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable stream chunk");
            None
        }
    }
}

/// Accumulates the streamed reply and appends it to the session history
/// exactly once, whether the relay finishes, fails, or is dropped by a
/// client disconnect.
struct TranscriptGuard {
    session: Arc<ConversationSession>,
    status: RelayStatus,
    transcript: String,
    flushed: bool,
}

impl TranscriptGuard {
    fn new(session: Arc<ConversationSession>, status: RelayStatus) -> Self {
        Self {
            session,
            status,
            transcript: String::new(),
            flushed: false,
        }
    }

    fn extend(&mut self, text: &str) {
        self.transcript.push_str(text);
    }

    /// Normal completion: record the reply and mark the relay finished.
    fn finish(&mut self) {
        self.flush();
        self.status.mark_completed();
    }

    /// Upstream failure mid-stream: record what was relayed so far.
    fn fail(&mut self) {
        self.status.mark_failed();
        if !self.transcript.is_empty() {
            tracing::error!(
                conversation_id = %self.session.id(),
                relayed_bytes = self.transcript.len(),
                "Upstream stream failed mid-relay, recording partial reply"
            );
        } else {
            tracing::error!(
                conversation_id = %self.session.id(),
                "Upstream stream failed mid-relay"
            );
        }
        self.flush();
    }

    fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;
        if !self.transcript.is_empty() {
            self.session
                .push_assistant(std::mem::take(&mut self.transcript));
        }
    }
}

impl Drop for TranscriptGuard {
    fn drop(&mut self) {
        if self.status.is_active() && !self.transcript.is_empty() {
            tracing::info!(
                conversation_id = %self.session.id(),
                relayed_bytes = self.transcript.len(),
                "Client disconnected mid-stream, recording partial reply"
            );
        }
        self.flush();
    }
}

/// Incremental SSE decoder.
///
/// Buffers partial events across network chunk boundaries and returns the
/// `data:` payloads of each complete event (events are delimited by a
/// blank line).
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    pub fn decode(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            for line in block.lines() {
                let line = line.trim_end_matches('\r');
                if let Some(data) = line.strip_prefix("data:") {
                    payloads.push(data.trim_start().to_string());
                }
            }
        }
        payloads
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_event() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.decode(b"data: {\"x\":1}\n\n");
        assert_eq!(payloads, vec!["{\"x\":1}"]);
    }

    #[test]
    fn test_decode_multiple_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.decode(b"data: one\n\ndata: two\n\ndata: [DONE]\n\n");
        assert_eq!(payloads, vec!["one", "two", "[DONE]"]);
    }

    #[test]
    fn test_decode_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"conte").is_empty());
        assert!(decoder.decode(b"nt\":\"hi\"}").is_empty());
        let payloads = decoder.decode(b"\n\n");
        assert_eq!(payloads, vec!["{\"content\":\"hi\"}"]);
    }

    #[test]
    fn test_decode_handles_crlf() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.decode(b"data: hello\r\n\n");
        assert_eq!(payloads, vec!["hello"]);
    }

    #[test]
    fn test_decode_ignores_non_data_lines() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.decode(b"event: ping\nid: 3\ndata: payload\n\n");
        assert_eq!(payloads, vec!["payload"]);
    }

    #[test]
    fn test_extract_text_from_chunk() {
        let payload = r#"{"id":"1","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(extract_text(payload), Some("Hello".to_string()));
    }

    #[test]
    fn test_extract_text_no_content() {
        assert_eq!(extract_text(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(extract_text(r#"{"choices":[]}"#), None);
        assert_eq!(extract_text("not json"), None);
    }

    #[test]
    fn test_transcript_guard_records_on_finish() {
        let session = test_session("abc");
        let status = RelayStatus::new();
        let mut guard = TranscriptGuard::new(session.clone(), status.clone());

        guard.extend("Hello ");
        guard.extend("world");
        guard.finish();

        let history = session.history_snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "assistant");
        assert_eq!(history[0].content, "Hello world");
        assert!(status.is_completed());
    }

    #[test]
    fn test_transcript_guard_records_partial_on_drop() {
        let session = test_session("abc");
        let status = RelayStatus::new();

        {
            let mut guard = TranscriptGuard::new(session.clone(), status.clone());
            guard.extend("partial reply");
            // Dropped without finish, as on client disconnect.
        }

        let history = session.history_snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "partial reply");
        assert!(status.is_active());
    }

    #[test]
    fn test_transcript_guard_fail_records_and_marks_failed() {
        let session = test_session("abc");
        let status = RelayStatus::new();
        let mut guard = TranscriptGuard::new(session.clone(), status.clone());

        guard.extend("half an ans");
        guard.fail();

        assert!(status.is_failed());
        assert!(!status.is_completed());
        let history = session.history_snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "half an ans");
    }

    #[test]
    fn test_transcript_guard_empty_drop_records_nothing() {
        let session = test_session("abc");
        drop(TranscriptGuard::new(session.clone(), RelayStatus::new()));
        assert_eq!(session.turn_count(), 0);
    }

    fn upstream_with_body(
        stream: impl Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
    ) -> reqwest::Response {
        reqwest::Response::from(
            http::Response::builder()
                .status(200)
                .body(reqwest::Body::wrap_stream(stream))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_relay_streams_body_and_records_exchange() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        let upstream = upstream_with_body(futures::stream::iter(vec![Ok(Bytes::from(sse))]));
        let session = test_session("abc");

        let response = relay_text_stream(upstream, session.clone(), "say hi".to_string(), None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Hi");

        let history = session.history_snapshot();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[0].content, "say hi");
        assert_eq!(history[1].role, "assistant");
        assert_eq!(history[1].content, "Hi");
    }

    #[tokio::test]
    async fn test_relay_first_chunk_deadline_leaves_history_untouched() {
        let upstream = upstream_with_body(futures::stream::pending());
        let session = test_session("abc");

        let err = relay_text_stream(
            upstream,
            session.clone(),
            "hello".to_string(),
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::FirstChunkTimeout { .. }));
        assert_eq!(session.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_relay_error_before_first_chunk_is_upstream_error() {
        let upstream = upstream_with_body(futures::stream::iter(vec![Err(
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        )]));
        let session = test_session("abc");

        let err = relay_text_stream(upstream, session.clone(), "hello".to_string(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UpstreamStream(_)));
        assert_eq!(session.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_error_marks_relay_failed() {
        let session = test_session("abc");
        let status = RelayStatus::new();
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";
        let upstream = upstream_with_body(futures::stream::iter(vec![
            Ok(Bytes::from(sse)),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        ]));

        let mut chunks = Box::pin(text_chunk_stream(upstream, session.clone(), status.clone()));

        assert_eq!(&chunks.next().await.unwrap().unwrap()[..], b"Hi");
        assert!(chunks.next().await.unwrap().is_err());
        assert!(chunks.next().await.is_none());

        // Failed, not disconnected; the partial reply is still recorded.
        assert!(status.is_failed());
        assert!(!status.is_active());
        let history = session.history_snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Hi");
    }

    // The registry is the only constructor of sessions.
    fn test_session(id: &str) -> Arc<ConversationSession> {
        use crate::core::config::SessionConfig;
        use crate::services::registry::SessionRegistry;
        use std::time::Duration;

        let registry = SessionRegistry::new(&SessionConfig {
            idle_timeout: Duration::from_secs(3600),
            max_entries: 16,
            sweep_interval: Duration::from_secs(60),
        });
        registry.get_or_create(Some(id))
    }
}
