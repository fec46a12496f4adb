//! Streaming response handling and SSE decoding.
//!
//! A chat-completions body arrives as arbitrary byte chunks. Decoding runs in
//! three layers:
//!
//! 1. [`Utf8Decoder`] turns bytes into text, holding back a multi-byte
//!    character that is split across two chunks.
//! 2. [`LineDecoder`] splits text on `\n` and keeps the unterminated tail, so
//!    a record is never looked at before its newline has arrived.
//! 3. [`SseDecoder`] classifies each complete line, stops at `data: [DONE]`
//!    and extracts `choices[0].delta.content` from every JSON payload.
//!
//! [`DeltaStream`] drives the three over a transport byte stream and yields
//! the non-empty deltas in order.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use super::TransportError;
use crate::errors::{CouncilError, CouncilResult};
use crate::types::chat::ChatChunk;

/// Payload that marks normal end of stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Prefix of every line that carries a payload.
const DATA_PREFIX: &str = "data: ";

/// Boxed body stream as handed out by a transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Streaming HTTP response.
pub struct StreamingResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Byte stream.
    pub stream: ByteStream,
}

impl StreamingResponse {
    /// Returns true if the status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reads the whole body as text and turns it into an HTTP error.
    pub async fn into_http_error(self) -> CouncilError {
        let status = self.status;
        let mut body = Vec::new();
        let mut stream = self.stream;

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => body.extend_from_slice(&bytes),
                Err(e) => {
                    tracing::debug!(error = %e, "Error body truncated");
                    break;
                }
            }
        }

        CouncilError::Http {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Incremental UTF-8 decoder.
///
/// An incomplete sequence at the end of a chunk is kept until the next call.
/// Invalid bytes decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `pending + bytes` as forms complete characters.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(bytes);

        let mut out = String::with_capacity(buffer.len());
        let mut rest: &[u8] = &buffer;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&rest[..valid]).unwrap_or_default());

                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        None => {
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flushes a dangling incomplete sequence at end of input.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }

    /// Returns true if bytes are being held back.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Newline splitter that retains the trailing fragment.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: String,
    // Bytes of `buffer` already known to hold no `\n`.
    scanned: usize,
}

impl LineDecoder {
    /// Creates a new line decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text and returns every line completed by it, without `\n`.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].find('\n') {
            let end = from + offset;
            lines.push(self.buffer[start..end].to_string());
            start = end + 1;
            from = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Returns the unterminated tail at end of input, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Meaning of one complete SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Comment, keepalive, blank line or non-data field.
    Ignored,
    /// `data: [DONE]`.
    Done,
    /// Payload following `data: `.
    Payload(String),
}

/// Classifies one complete line.
pub fn classify_line(line: &str) -> SseLine {
    match line.trim().strip_prefix(DATA_PREFIX) {
        None => SseLine::Ignored,
        Some(payload) if payload.trim() == DONE_SENTINEL => SseLine::Done,
        Some(payload) => SseLine::Payload(payload.to_string()),
    }
}

/// Extracts the first choice's content delta from a JSON payload.
///
/// Returns `Ok(None)` for well-formed records without content.
pub fn extract_delta(payload: &str) -> CouncilResult<Option<String>> {
    let chunk: ChatChunk = serde_json::from_str(payload).map_err(|e| CouncilError::StreamParse {
        message: e.to_string(),
        payload: payload.to_string(),
    })?;

    Ok(chunk.delta_content().map(str::to_string))
}

/// Push-based decoder state machine.
///
/// Feed it body bytes in whatever pieces they arrive; it returns the deltas
/// completed by each piece. Once `[DONE]` has been seen it ignores all
/// further input.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    lines: LineDecoder,
    done: bool,
    skipped_records: usize,
}

impl SseDecoder {
    /// Creates a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk of body bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }

        let text = self.utf8.decode(bytes);
        let lines = self.lines.push(&text);
        self.process(lines)
    }

    /// Signals end of input and processes whatever is left.
    ///
    /// A final record without a trailing newline is still processed.
    pub fn finish(&mut self) -> Vec<String> {
        if self.done {
            return Vec::new();
        }

        let tail = self.utf8.finish();
        let mut lines = self.lines.push(&tail);
        lines.extend(self.lines.finish());

        let deltas = self.process(lines);
        self.done = true;
        deltas
    }

    /// Returns true once `[DONE]` or end of input has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of records skipped because their payload was not valid JSON.
    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }

    fn process(&mut self, lines: Vec<String>) -> Vec<String> {
        let mut deltas = Vec::new();

        for line in lines {
            match classify_line(&line) {
                SseLine::Ignored => {}
                SseLine::Done => {
                    tracing::debug!("Received stream sentinel");
                    self.done = true;
                    break;
                }
                SseLine::Payload(payload) => match extract_delta(&payload) {
                    Ok(Some(delta)) => deltas.push(delta),
                    Ok(None) => {}
                    Err(e) => {
                        self.skipped_records += 1;
                        tracing::warn!(error = %e, payload = %payload, "Skipping malformed SSE record");
                    }
                },
            }
        }

        deltas
    }
}

pin_project! {
    /// Ordered stream of report text deltas.
    ///
    /// Ends after `[DONE]` or when the body ends. Transport failures are
    /// yielded once as [`CouncilError::Network`], after which the stream ends.
    pub struct DeltaStream {
        #[pin]
        inner: ByteStream,
        decoder: SseDecoder,
        ready: VecDeque<String>,
        finished: bool,
        accumulated: String,
    }
}

impl DeltaStream {
    /// Wraps a body byte stream.
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            finished: false,
            accumulated: String::new(),
        }
    }

    /// Wraps any byte stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self::new(Box::pin(stream))
    }

    /// Starts decoding a response, refusing non-success statuses.
    ///
    /// On a non-2xx status the body is read as text and returned inside
    /// [`CouncilError::Http`]; no record is decoded.
    pub async fn from_response(response: StreamingResponse) -> CouncilResult<Self> {
        if !response.is_success() {
            return Err(response.into_http_error().await);
        }

        Ok(Self::new(response.stream))
    }

    /// Returns the concatenation of every delta yielded so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Consumes the stream and returns the full text.
    pub async fn collect_text(mut self) -> CouncilResult<String> {
        while let Some(delta) = self.next().await {
            delta?;
        }
        Ok(self.accumulated)
    }
}

impl Stream for DeltaStream {
    type Item = CouncilResult<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(delta) = this.ready.pop_front() {
                this.accumulated.push_str(&delta);
                return Poll::Ready(Some(Ok(delta)));
            }

            if *this.finished || this.decoder.is_done() {
                *this.finished = true;
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.ready.extend(this.decoder.feed(&bytes));
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(CouncilError::from(e))));
                }
                Poll::Ready(None) => {
                    // Marks the decoder done; the loop drains what it flushed.
                    this.ready.extend(this.decoder.finish());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Consumes a body stream, calling `on_chunk` for every delta in order.
///
/// Returns the full text once `[DONE]` or end of input is reached.
pub async fn decode_stream<S, F>(stream: S, mut on_chunk: F) -> CouncilResult<String>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    F: FnMut(&str),
{
    let mut deltas = DeltaStream::from_stream(stream);

    while let Some(delta) = deltas.next().await {
        on_chunk(&delta?);
    }

    Ok(deltas.accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    fn sample_body() -> String {
        let mut body = String::new();
        body.push_str(": keepalive\n\n");
        body.push_str("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
        body.push_str(&record("### 第一部分"));
        body.push_str(&record("：深度诊断 🚫\n"));
        body.push_str(&record("**关键**"));
        body.push_str("data: [DONE]\n\n");
        body
    }

    const SAMPLE_TEXT: &str = "### 第一部分：深度诊断 🚫\n**关键**";

    fn decode_in_pieces(body: &[u8], sizes: &[usize]) -> String {
        let mut decoder = SseDecoder::new();
        let mut out = String::new();
        let mut rest = body;
        let mut i = 0;

        while !rest.is_empty() {
            let size = sizes[i % sizes.len()].min(rest.len());
            let (piece, tail) = rest.split_at(size);
            out.extend(decoder.feed(piece));
            rest = tail;
            i += 1;
        }

        out.extend(decoder.finish());
        out
    }

    fn byte_stream(pieces: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, TransportError>> + Send {
        futures::stream::iter(pieces.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    #[test]
    fn test_utf8_decoder_holds_split_character() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "第".as_bytes();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&bytes[1..2]), "");
        assert_eq!(decoder.decode(&bytes[2..]), "第");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_utf8_decoder_finish_flushes_dangling_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_line_decoder_retains_fragment() {
        let mut lines = LineDecoder::new();

        assert!(lines.push("data: {\"cho").is_empty());
        assert_eq!(lines.push("ices\":[]}\ndata"), vec!["data: {\"choices\":[]}".to_string()]);
        assert_eq!(lines.finish(), Some("data".to_string()));
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_line_decoder_scans_each_byte_once() {
        let record = format!("data: {}", "x".repeat(64 * 1024));
        let mut lines = LineDecoder::new();

        for (i, c) in record.char_indices() {
            assert!(lines.push(c.encode_utf8(&mut [0; 4])).is_empty());
            assert_eq!(lines.scanned, i + 1);
        }

        assert_eq!(lines.push("\nda"), vec![record]);
        assert_eq!(lines.scanned, 2);
        assert_eq!(lines.push("ta: x\n\n"), vec!["data: x".to_string(), String::new()]);
        assert_eq!(lines.scanned, 0);
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line(": ping"), SseLine::Ignored);
        assert_eq!(classify_line(""), SseLine::Ignored);
        assert_eq!(classify_line("event: message"), SseLine::Ignored);
        assert_eq!(classify_line("data: [DONE]\r"), SseLine::Done);
        assert_eq!(classify_line("  data: {}  "), SseLine::Payload("{}".to_string()));
    }

    #[test]
    fn test_extract_delta() {
        assert_eq!(
            extract_delta(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap(),
            Some("hi".to_string())
        );
        assert_eq!(extract_delta(r#"{"choices":[]}"#).unwrap(), None);
        assert!(matches!(
            extract_delta("{malformed json"),
            Err(CouncilError::StreamParse { .. })
        ));
    }

    #[test]
    fn test_single_chunk_decode() {
        assert_eq!(decode_in_pieces(sample_body().as_bytes(), &[usize::MAX]), SAMPLE_TEXT);
    }

    #[test]
    fn test_every_two_way_split_matches_single_chunk() {
        let body = sample_body();
        let bytes = body.as_bytes();

        for split in 1..bytes.len() {
            let mut decoder = SseDecoder::new();
            let mut out = String::new();
            out.extend(decoder.feed(&bytes[..split]));
            out.extend(decoder.feed(&bytes[split..]));
            out.extend(decoder.finish());
            assert_eq!(out, SAMPLE_TEXT, "split at byte {}", split);
        }
    }

    #[test]
    fn test_irregular_chunk_sizes_match_single_chunk() {
        let body = sample_body();
        for sizes in [&[1usize][..], &[2, 3], &[7, 1, 5], &[13]] {
            assert_eq!(decode_in_pieces(body.as_bytes(), sizes), SAMPLE_TEXT);
        }
    }

    #[test]
    fn test_record_is_not_processed_before_newline() {
        let mut decoder = SseDecoder::new();
        let full = record("abc");
        let (head, tail) = full.split_at(full.len() - 2);

        assert!(decoder.feed(head.as_bytes()).is_empty());
        assert_eq!(decoder.feed(tail.as_bytes()), vec!["abc".to_string()]);
    }

    #[test]
    fn test_done_stops_without_emitting() {
        let mut decoder = SseDecoder::new();
        let body = format!("{}data: [DONE]\n{}", record("kept"), record("ignored"));

        assert_eq!(decoder.feed(body.as_bytes()), vec!["kept".to_string()]);
        assert!(decoder.is_done());
        assert!(decoder.feed(record("late").as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let mut decoder = SseDecoder::new();
        let body = format!("{}data: {{malformed json\n{}", record("a"), record("b"));

        assert_eq!(
            decoder.feed(body.as_bytes()),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(decoder.skipped_records(), 1);
    }

    #[test]
    fn test_final_record_without_newline_is_processed() {
        let mut decoder = SseDecoder::new();
        let body = r#"data: {"choices":[{"delta":{"content":"tail"}}]}"#;

        assert!(decoder.feed(body.as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec!["tail".to_string()]);
    }

    #[tokio::test]
    async fn test_delta_stream_yields_in_order() {
        let body = sample_body().into_bytes();
        let pieces: Vec<Vec<u8>> = body.chunks(5).map(|c| c.to_vec()).collect();

        let mut stream = DeltaStream::from_stream(byte_stream(pieces));
        let mut deltas = Vec::new();
        while let Some(delta) = stream.next().await {
            deltas.push(delta.unwrap());
        }

        assert_eq!(deltas, vec!["### 第一部分", "：深度诊断 🚫\n", "**关键**"]);
        assert_eq!(stream.accumulated(), SAMPLE_TEXT);
    }

    #[tokio::test]
    async fn test_delta_stream_ends_without_sentinel() {
        let body = format!("{}{}", record("第"), record("一部分"));
        let stream = DeltaStream::from_stream(byte_stream(vec![body.into_bytes()]));

        assert_eq!(stream.collect_text().await.unwrap(), "第一部分");
    }

    #[tokio::test]
    async fn test_delta_stream_surfaces_transport_error() {
        let pieces = vec![
            Ok(Bytes::from(record("partial"))),
            Err(TransportError::InvalidResponse {
                message: "connection reset".to_string(),
            }),
            Ok(Bytes::from(record("never"))),
        ];
        let mut stream = DeltaStream::from_stream(futures::stream::iter(pieces));

        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert!(matches!(
            stream.next().await,
            Some(Err(CouncilError::Network { .. }))
        ));
        assert!(stream.next().await.is_none());
        assert_eq!(stream.accumulated(), "partial");
    }

    #[tokio::test]
    async fn test_from_response_rejects_error_status() {
        let response = StreamingResponse {
            status: 401,
            headers: HashMap::new(),
            stream: Box::pin(byte_stream(vec![b"{\"error\":\"bad key\"}".to_vec()])),
        };

        match DeltaStream::from_response(response).await {
            Err(CouncilError::Http { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "{\"error\":\"bad key\"}");
            }
            other => panic!("Expected Http error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_decode_stream_callback_order() {
        let body = sample_body().into_bytes();
        let pieces: Vec<Vec<u8>> = body.iter().map(|b| vec![*b]).collect();
        let mut seen = Vec::new();

        let text = decode_stream(byte_stream(pieces), |chunk| seen.push(chunk.to_string()))
            .await
            .unwrap();

        assert_eq!(seen.concat(), text);
        assert_eq!(text, SAMPLE_TEXT);
    }
}
