//! Incremental decoder for `data: <json>` server-sent-event frames.
//!
//! A network read may end anywhere, including mid-frame or between the `\r` and `\n`
//! of a CRLF pair, so bytes are buffered until a blank line closes the frame. Frames
//! that are not valid UTF-8, not JSON, or carry an unknown `action_type` are logged
//! and skipped; they never end the stream.
//!
//! A pending frame may not grow past `max_frame_bytes`. Past that it is counted as
//! skipped and the rest of it is discarded up to its terminator.

use tracing::{debug, warn};

use crate::events::StreamEvent;

const FRAME_END: &[u8] = b"\n\n";

/// Largest unterminated frame kept in memory.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 20;

#[derive(Debug)]
pub struct SseDecoder {
    buf: Vec<u8>,
    skipped: usize,
    max_frame_bytes: usize,
    /// Inside an oversized frame; bytes are dropped until its terminator.
    discarding: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            skipped: 0,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            discarding: false,
        }
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Feeds one chunk and returns every event completed by it, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        // JSON never carries a raw CR, so dropping them turns CRLF framing into LF framing.
        self.buf.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        if self.discarding {
            match find(&self.buf, FRAME_END) {
                Some(pos) => {
                    self.buf.drain(..pos + FRAME_END.len());
                    self.discarding = false;
                }
                None => {
                    self.clear_keeping_newline();
                    return Vec::new();
                }
            }
        }

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = find(&self.buf[consumed..], FRAME_END) {
            match decode_frame(&self.buf[consumed..consumed + pos]) {
                Frame::Event(event) => events.push(event),
                Frame::Malformed => self.skipped += 1,
                Frame::Empty => {}
            }
            consumed += pos + FRAME_END.len();
        }
        self.buf.drain(..consumed);

        if self.buf.len() > self.max_frame_bytes {
            warn!(bytes = self.buf.len(), limit = self.max_frame_bytes, "dropping oversized frame");
            self.skipped += 1;
            self.discarding = true;
            self.clear_keeping_newline();
        }
        events
    }

    /// Empties the buffer but keeps a trailing `\n`, which may be half of a terminator.
    fn clear_keeping_newline(&mut self) {
        let half_terminator = self.buf.last() == Some(&b'\n');
        self.buf.clear();
        if half_terminator {
            self.buf.push(b'\n');
        }
    }

    /// Number of complete frames dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Ends the stream. A trailing frame without its blank-line terminator is dropped.
    pub fn finish(self) -> usize {
        if !is_blank(&self.buf) {
            debug!(bytes = self.buf.len(), "dropping unterminated trailing frame");
        }
        self.skipped
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

enum Frame {
    Event(StreamEvent),
    /// Comments, keep-alives and frames without a `data:` field.
    Empty,
    Malformed,
}

fn decode_frame(frame: &[u8]) -> Frame {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "skipping non UTF-8 frame");
            return Frame::Malformed;
        }
    };

    // Multiple `data:` lines in one frame are joined with newlines; comments and
    // other SSE fields (`event:`, `id:`, `retry:`) carry nothing we use.
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        return Frame::Empty;
    }

    let payload = data.join("\n");
    match serde_json::from_str::<StreamEvent>(&payload) {
        Ok(event) => Frame::Event(event),
        Err(e) => {
            warn!(error = %e, payload = %truncate(&payload, 120), "skipping malformed frame");
            Frame::Malformed
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const STREAM: &str = concat!(
        "data: {\"action_type\":\"llm_response\",\"message\":\"Hello\"}\n\n",
        ": keep-alive\n\n",
        "data: not json\n\n",
        "data: {\"action_type\":\"mystery\"}\n\n",
        "data: {\"action_type\":\"llm_response\",\"message\":\" world\"}\n\n",
    );

    fn messages(events: &[StreamEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::LlmResponse { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn skips_bad_frames_and_keeps_going() {
        let mut dec = SseDecoder::new();
        let events = dec.push(STREAM.as_bytes());
        assert_eq!(messages(&events), vec!["Hello", " world"]);
        assert_eq!(dec.skipped(), 2);
    }

    #[test]
    fn buffers_frames_split_across_reads() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: {\"action_type\":\"llm_").is_empty());
        assert!(dec.push(b"response\",\"message\":\"a\"}\n").is_empty());
        let events = dec.push(b"\ndata: {\"action_type\":\"llm_response\",\"message\":\"b\"}");
        assert_eq!(messages(&events), vec!["a"]);
        assert_eq!(messages(&dec.push(b"\n\n")), vec!["b"]);
    }

    #[test]
    fn handles_crlf_split_inside_terminator() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: {\"action_type\":\"screen_stock\",\"records\":[]}\r\n\r").is_empty());
        let events = dec.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action_type(), "screen_stock");
    }

    #[test]
    fn joins_multiline_data() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"data: {\"action_type\":\"llm_response\",\ndata: \"message\":\"x\"}\n\n");
        assert_eq!(messages(&events), vec!["x"]);
    }

    #[test]
    fn unterminated_tail_is_dropped() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: {\"action_type\":\"llm_response\",\"message\":\"late\"}").is_empty());
        assert_eq!(dec.finish(), 0);
    }

    #[test]
    fn oversized_frame_is_skipped_without_growing_the_buffer() {
        let mut dec = SseDecoder::new().with_max_frame_bytes(64);
        let filler = [b'x'; 100];

        assert!(dec.push(b"data: ").is_empty());
        for _ in 0..50 {
            assert!(dec.push(&filler).is_empty());
            assert!(dec.buf.len() <= 64);
        }
        assert_eq!(dec.skipped(), 1);

        // the oversized frame ends on a terminator split across reads
        assert!(dec.push(b"xx\n").is_empty());
        let events = dec.push(b"\ndata: {\"action_type\":\"llm_response\",\"message\":\"ok\"}\n\n");
        assert_eq!(messages(&events), vec!["ok"]);
        assert_eq!(dec.finish(), 1);
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_events(cuts in proptest::collection::vec(0usize..STREAM.len(), 0..12)) {
            let bytes = STREAM.as_bytes();
            let mut cuts = cuts;
            cuts.sort_unstable();
            cuts.dedup();

            let mut dec = SseDecoder::new();
            let mut events = Vec::new();
            let mut start = 0;
            for cut in cuts.into_iter().chain(std::iter::once(bytes.len())) {
                events.extend(dec.push(&bytes[start..cut]));
                start = cut;
            }
            prop_assert_eq!(messages(&events), vec!["Hello".to_string(), " world".to_string()]);
        }
    }
}
