//! The reasoning-stream reader.
//!
//! `GET /v1/system/runtime/reasoning-stream` is a long-lived server-sent-events
//! feed. Raw bytes are accumulated in [`RecordAssembler`]; frames are drained
//! only at blank-line boundaries, so a multi-byte UTF-8 sequence or a JSON
//! token split across chunk reads never corrupts a record. Each frame is an
//! `event:` line plus one-or-more `data:` lines (joined with `\n`).
//!
//! Frames whose data is not valid JSON are dropped and the stream continues;
//! an oversized buffer or invalid UTF-8 inside a complete frame terminates the
//! stream with [`ClientError::Stream`].
//!
//! There is no automatic reconnection and no idle timeout: the feed stays open
//! until the server closes it, the transport fails, or the caller aborts the
//! handle. Reconnecting is the caller's decision.

use futures_util::StreamExt;
use futures_util::future::{AbortHandle, Abortable, Aborted};
use tokio::sync::mpsc;

use lumen_types::RawStreamRecord;

use crate::{ApiClient, ClientError};

pub const REASONING_STREAM_PATH: &str = "/v1/system/runtime/reasoning-stream";

const MAX_STREAM_BUFFER_BYTES: usize = 1024 * 1024;

fn find_frame_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_block(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_frame_boundary(buffer)?;
    let block = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(block)
}

/// One reassembled SSE frame: the event name and its joined data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Parse a complete block into a frame.
///
/// Per the SSE grammar the last `event:` line before dispatch wins; `data:`
/// lines accumulate. Blocks without both fields (comments, heartbeats, bare
/// retry hints) yield `None`.
fn parse_frame(block: &str) -> Option<SseFrame> {
    let mut event: Option<&str> = None;
    let mut data = String::new();
    let mut found_data = false;

    for line in block.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(mut rest) = line.strip_prefix("event:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }
            event = Some(rest);
        } else if let Some(mut rest) = line.strip_prefix("data:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }
            if found_data {
                data.push('\n');
            }
            data.push_str(rest);
            found_data = true;
        }
    }

    match (event, found_data) {
        (Some(event), true) => Some(SseFrame {
            event: event.to_owned(),
            data,
        }),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FrameError {
    InvalidUtf8,
}

/// Stateful frame reassembly across arbitrary chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct RecordAssembler {
    buffer: Vec<u8>,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// The next complete frame, if one has fully arrived.
    ///
    /// Skips blocks that do not form a frame (empty blocks, comments).
    pub fn next_frame(&mut self) -> Result<Option<SseFrame>, FrameError> {
        while let Some(block) = drain_next_block(&mut self.buffer) {
            if block.is_empty() {
                continue;
            }
            let Ok(text) = std::str::from_utf8(&block) else {
                return Err(FrameError::InvalidUtf8);
            };
            if let Some(frame) = parse_frame(text) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl ApiClient {
    /// Open the reasoning stream and forward decoded records to `tx`.
    ///
    /// Fails with a connection-classified error if the initial response is
    /// not successful (the connect itself goes through the retry policy).
    /// Returns `Ok(())` when the server closes the stream or the receiver is
    /// dropped; the caller owns any reconnection decision.
    pub async fn stream_reasoning(
        &self,
        tx: mpsc::Sender<RawStreamRecord>,
    ) -> Result<(), ClientError> {
        let url = self.endpoint(REASONING_STREAM_PATH)?;
        let response = self
            .send(|| {
                self.request(reqwest::Method::GET, url.clone())
                    .header(reqwest::header::ACCEPT, "text/event-stream")
            })
            .await?;

        read_records(response, &tx).await
    }
}

async fn read_records(
    response: reqwest::Response,
    tx: &mpsc::Sender<RawStreamRecord>,
) -> Result<(), ClientError> {
    let mut stream = response.bytes_stream();
    let mut assembler = RecordAssembler::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        assembler.push(&chunk);

        if assembler.buffered_len() > MAX_STREAM_BUFFER_BYTES {
            return Err(ClientError::Stream(
                "frame buffer exceeded maximum size (1 MiB)".to_owned(),
            ));
        }

        loop {
            match assembler.next_frame() {
                Ok(Some(frame)) => match serde_json::from_str(&frame.data) {
                    Ok(payload) => {
                        let record = RawStreamRecord::new(frame.event, payload);
                        if tx.send(record).await.is_err() {
                            // Receiver dropped: the consumer is gone, so the
                            // connection is released without error.
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        tracing::debug!(
                            %e,
                            event = %frame.event,
                            "Dropping reasoning-stream record with malformed JSON payload"
                        );
                    }
                },
                Ok(None) => break,
                Err(FrameError::InvalidUtf8) => {
                    return Err(ClientError::Stream(
                        "received invalid UTF-8 on the reasoning stream".to_owned(),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// A handle to a spawned reasoning-stream task.
///
/// Dropping the handle does NOT stop the stream; call [`abort`] to cancel it
/// cooperatively. The read loop terminates at its next suspension point and
/// the connection is released without surfacing an error.
///
/// [`abort`]: ReasoningStreamHandle::abort
#[derive(Debug)]
pub struct ReasoningStreamHandle {
    abort_handle: AbortHandle,
    task: tokio::task::JoinHandle<()>,
}

impl ReasoningStreamHandle {
    pub fn abort(&self) {
        self.abort_handle.abort();
    }

    /// Wait for the stream task to wind down.
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}

/// Spawn the reasoning stream on the current runtime.
#[must_use]
pub fn spawn_reasoning_stream(
    client: ApiClient,
    tx: mpsc::Sender<RawStreamRecord>,
) -> ReasoningStreamHandle {
    let (abort_handle, abort_registration) = AbortHandle::new_pair();
    let task = tokio::spawn(async move {
        match Abortable::new(client.stream_reasoning(tx), abort_registration).await {
            Ok(Ok(())) => tracing::debug!("Reasoning stream closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Reasoning stream terminated"),
            Err(Aborted) => tracing::debug!("Reasoning stream aborted by caller"),
        }
    });
    ReasoningStreamHandle { abort_handle, task }
}

#[cfg(test)]
mod tests {
    use super::{RecordAssembler, SseFrame, drain_next_block, find_frame_boundary, parse_frame};

    mod boundary {
        use super::find_frame_boundary;

        #[test]
        fn finds_lf_boundary() {
            assert_eq!(find_frame_boundary(b"data: a\n\nrest"), Some((7, 2)));
        }

        #[test]
        fn finds_crlf_boundary() {
            assert_eq!(find_frame_boundary(b"data: a\r\n\r\nrest"), Some((7, 4)));
        }

        #[test]
        fn picks_earlier_of_mixed_boundaries() {
            assert_eq!(find_frame_boundary(b"a\n\nb\r\n\r\n"), Some((1, 2)));
            assert_eq!(find_frame_boundary(b"a\r\n\r\nb\n\n"), Some((1, 4)));
        }

        #[test]
        fn none_without_boundary() {
            assert_eq!(find_frame_boundary(b"data: incomplete\n"), None);
            assert_eq!(find_frame_boundary(b""), None);
        }
    }

    mod drain {
        use super::drain_next_block;

        #[test]
        fn drains_blocks_in_order() {
            let mut buffer = b"event: a\ndata: 1\n\nevent: b\ndata: 2\n\n".to_vec();
            assert_eq!(drain_next_block(&mut buffer), Some(b"event: a\ndata: 1".to_vec()));
            assert_eq!(drain_next_block(&mut buffer), Some(b"event: b\ndata: 2".to_vec()));
            assert_eq!(drain_next_block(&mut buffer), None);
        }

        #[test]
        fn leaves_incomplete_block_untouched() {
            let mut buffer = b"data: partial".to_vec();
            assert_eq!(drain_next_block(&mut buffer), None);
            assert_eq!(buffer, b"data: partial");
        }
    }

    mod frame {
        use super::{SseFrame, parse_frame};

        #[test]
        fn parses_event_and_data() {
            let frame = parse_frame("event: step_update\ndata: {\"a\":1}").unwrap();
            assert_eq!(
                frame,
                SseFrame {
                    event: "step_update".to_owned(),
                    data: "{\"a\":1}".to_owned(),
                }
            );
        }

        #[test]
        fn joins_multiline_data_with_newline() {
            let frame = parse_frame("event: e\ndata: line1\ndata: line2").unwrap();
            assert_eq!(frame.data, "line1\nline2");
        }

        #[test]
        fn tolerates_missing_space_and_crlf() {
            let frame = parse_frame("event:e\r\ndata:x\r").unwrap();
            assert_eq!(frame.event, "e");
            assert_eq!(frame.data, "x");
        }

        #[test]
        fn last_event_line_wins() {
            let frame = parse_frame("event: first\nevent: second\ndata: x").unwrap();
            assert_eq!(frame.event, "second");
        }

        #[test]
        fn block_without_event_is_not_a_frame() {
            assert_eq!(parse_frame("data: orphan"), None);
        }

        #[test]
        fn block_without_data_is_not_a_frame() {
            assert_eq!(parse_frame("event: ping\nid: 7"), None);
            assert_eq!(parse_frame(": comment"), None);
        }
    }

    mod assembler {
        use super::RecordAssembler;

        const WIRE: &[u8] = b"event: step_update\ndata: {\"a\":1}\n\n";

        /// Reassembly must be split-invariant: cutting the byte sequence at
        /// any position, including mid-token, yields exactly one frame.
        #[test]
        fn any_chunk_split_yields_exactly_one_frame() {
            for split in 0..=WIRE.len() {
                let mut assembler = RecordAssembler::new();
                assembler.push(&WIRE[..split]);
                let mut frames = Vec::new();
                while let Some(frame) = assembler.next_frame().unwrap() {
                    frames.push(frame);
                }
                assembler.push(&WIRE[split..]);
                while let Some(frame) = assembler.next_frame().unwrap() {
                    frames.push(frame);
                }

                assert_eq!(frames.len(), 1, "split at {split}");
                assert_eq!(frames[0].event, "step_update");
                let payload: serde_json::Value = serde_json::from_str(&frames[0].data).unwrap();
                assert_eq!(payload, serde_json::json!({"a": 1}));
            }
        }

        #[test]
        fn multibyte_characters_survive_mid_character_splits() {
            let wire = "event: conclusion\ndata: {\"note\":\"r\u{e9}sum\u{e9} \u{2713}\"}\n\n"
                .as_bytes();
            // Split inside the two-byte 'é' sequence.
            for split in 0..=wire.len() {
                let mut assembler = RecordAssembler::new();
                assembler.push(&wire[..split]);
                let first = assembler.next_frame().unwrap();
                assembler.push(&wire[split..]);
                let frame = match first {
                    Some(frame) => frame,
                    None => assembler.next_frame().unwrap().unwrap(),
                };
                assert!(frame.data.contains("r\u{e9}sum\u{e9}"), "split at {split}");
            }
        }

        #[test]
        fn one_byte_at_a_time_delivery() {
            let mut assembler = RecordAssembler::new();
            let mut frames = Vec::new();
            for byte in WIRE {
                assembler.push(std::slice::from_ref(byte));
                while let Some(frame) = assembler.next_frame().unwrap() {
                    frames.push(frame);
                }
            }
            assert_eq!(frames.len(), 1);
        }

        #[test]
        fn invalid_utf8_in_complete_block_is_an_error() {
            let mut assembler = RecordAssembler::new();
            assembler.push(b"event: e\ndata: \xff\xfe\n\n");
            assert!(assembler.next_frame().is_err());
        }

        #[test]
        fn skips_heartbeat_blocks_between_frames() {
            let mut assembler = RecordAssembler::new();
            assembler.push(b": keepalive\n\nevent: planning\ndata: {}\n\n");
            let frame = assembler.next_frame().unwrap().unwrap();
            assert_eq!(frame.event, "planning");
            assert!(assembler.next_frame().unwrap().is_none());
        }
    }
}
