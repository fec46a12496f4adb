//! Mock implementations for testing.
//!
//! [`MockTransport`] replays queued streaming responses, cut into whatever
//! chunk boundaries the test asks for, and records every request it sees.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::transport::{ByteStream, HttpRequest, HttpTransport, StreamingResponse, TransportError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builds an SSE body carrying `deltas` followed by `data: [DONE]`.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        let record = serde_json::json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": delta}, "finish_reason": null}]
        });
        body.push_str("data: ");
        body.push_str(&record.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// A canned streaming response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Body, delivered one element per poll.
    pub chunks: Vec<Bytes>,
    /// Error yielded after the last chunk.
    pub stream_error: Option<String>,
    /// Keep the body open after the last chunk instead of ending it.
    pub hang: bool,
}

impl MockResponse {
    /// Creates a 200 `text/event-stream` response delivered in one chunk.
    pub fn stream(body: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/event-stream".to_string());

        Self {
            status: 200,
            headers,
            chunks: vec![Bytes::from(body.into())],
            stream_error: None,
            hang: false,
        }
    }

    /// Creates a 200 response carrying the given deltas and `[DONE]`.
    pub fn deltas(deltas: &[&str]) -> Self {
        Self::stream(sse_body(deltas))
    }

    /// Creates an error response with a plain body.
    pub fn error(status: u16, body: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Self {
            status,
            headers,
            chunks: vec![Bytes::from(body.into())],
            stream_error: None,
            hang: false,
        }
    }

    /// Re-cuts the body into chunks of `size` bytes.
    ///
    /// Cuts ignore character and line boundaries.
    pub fn chunked(mut self, size: usize) -> Self {
        let body: Vec<u8> = self.chunks.iter().flat_map(|c| c.iter().copied()).collect();
        self.chunks = body
            .chunks(size.max(1))
            .map(Bytes::copy_from_slice)
            .collect();
        self
    }

    /// Fails the body with a transport error after the last chunk.
    pub fn with_stream_error(mut self, message: impl Into<String>) -> Self {
        self.stream_error = Some(message.into());
        self
    }

    /// Keeps the body open forever after the last chunk.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    fn into_streaming(self) -> StreamingResponse {
        let mut items: Vec<Result<Bytes, TransportError>> = self.chunks.into_iter().map(Ok).collect();
        if let Some(message) = self.stream_error {
            items.push(Err(TransportError::InvalidResponse { message }));
        }

        let body = futures::stream::iter(items);
        let stream: ByteStream = if self.hang {
            Box::pin(body.chain(futures::stream::pending()))
        } else {
            Box::pin(body)
        };

        StreamingResponse {
            status: self.status,
            headers: self.headers,
            stream,
        }
    }
}

enum MockOutcome {
    Respond(MockResponse),
    Feed(mpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
    Refuse(String),
}

/// Mock HTTP transport for testing.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn queue(&self, response: MockResponse) {
        lock(&self.outcomes).push_back(MockOutcome::Respond(response));
    }

    /// Queues a 200 response whose body is fed by the returned sender.
    ///
    /// The body ends when the sender is dropped.
    pub fn queue_feed(&self) -> mpsc::UnboundedSender<Result<Bytes, TransportError>> {
        let (tx, rx) = mpsc::unbounded();
        lock(&self.outcomes).push_back(MockOutcome::Feed(rx));
        tx
    }

    /// Queues a connection failure.
    pub fn queue_connection_error(&self, message: impl Into<String>) {
        lock(&self.outcomes).push_back(MockOutcome::Refuse(message.into()));
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Gets the last recorded request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        lock(&self.requests).last().cloned()
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError> {
        lock(&self.requests).push(request);

        match lock(&self.outcomes).pop_front() {
            Some(MockOutcome::Respond(response)) => Ok(response.into_streaming()),
            Some(MockOutcome::Feed(body)) => Ok(StreamingResponse {
                status: 200,
                headers: HashMap::new(),
                stream: Box::pin(body),
            }),
            Some(MockOutcome::Refuse(message)) => Err(TransportError::Connection { message }),
            None => Ok(MockResponse::error(500, "No mock response configured").into_streaming()),
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued", &lock(&self.outcomes).len())
            .field("requests", &lock(&self.requests).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_records_and_replays() {
        let transport = MockTransport::new();
        transport.queue(MockResponse::deltas(&["hi"]).chunked(3));

        let response = transport
            .send_streaming(HttpRequest::post("http://mock/v1/chat/completions"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let body: Vec<u8> = response
            .stream
            .map(|chunk| chunk.unwrap().to_vec())
            .concat()
            .await;
        assert_eq!(String::from_utf8(body).unwrap(), sse_body(&["hi"]));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(
            transport.last_request().unwrap().url,
            "http://mock/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_mock_transport_feed() {
        let transport = MockTransport::new();
        let feed = transport.queue_feed();

        let mut response = transport
            .send_streaming(HttpRequest::post("http://mock"))
            .await
            .unwrap();

        feed.unbounded_send(Ok(Bytes::from_static(b"data"))).unwrap();
        drop(feed);

        assert_eq!(response.stream.next().await.unwrap().unwrap(), "data");
        assert!(response.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_mock_transport_connection_error() {
        let transport = MockTransport::new();
        transport.queue_connection_error("refused");

        let result = transport.send_streaming(HttpRequest::post("http://mock")).await;
        assert!(matches!(result, Err(TransportError::Connection { .. })));
    }
}
