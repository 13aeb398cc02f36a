//! Merges fragmented body deliveries into line-parseable frames.
//!
//! A chunked response may split an SSE record at any byte, or deliver many
//! records in one piece. The reassembler buffers fragments of the current
//! response and flushes the whole buffer as one frame when the response ends
//! or the buffer ends on a blank line (`\n\n`, or `\n\r\n` from CRLF servers),
//! which closes an SSE record.
//! Buffering is bounded: exceeding the bound is fatal for the response.

use bytes::{Bytes, BytesMut};
use eventsource_transport_traits::ResponseHead;
use tracing::{debug, trace, warn};

use crate::error::{EventSourceError, EventSourceResult};
use crate::pipeline::{FragmentReceiver, HeadReceiver};

const RECORD_BOUNDARIES: [&[u8]; 2] = [b"\n\n", b"\n\r\n"];

/// Reassembly stage sitting in front of `D`.
#[derive(Debug)]
pub struct ChunkReassembler<D> {
    downstream: D,
    max_frame_size: usize,
    buffer: BytesMut,
    head_seen: bool,
    overflowed: bool,
}

impl<D> ChunkReassembler<D> {
    /// Creates a reassembler that never buffers more than `max_frame_size` bytes.
    pub fn new(max_frame_size: usize, downstream: D) -> Self {
        Self {
            downstream,
            max_frame_size,
            buffer: BytesMut::new(),
            head_seen: false,
            overflowed: false,
        }
    }

    /// Number of bytes waiting for a boundary.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// The next stage.
    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    /// Forgets the current response; the next fragment needs a new head.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.head_seen = false;
        self.overflowed = false;
    }
}

impl<D: HeadReceiver> HeadReceiver for ChunkReassembler<D> {
    fn receive_head(&mut self, head: &ResponseHead) {
        if !self.buffer.is_empty() {
            debug!(
                "Discarding {} unflushed bytes from previous response",
                self.buffer.len()
            );
        }
        self.buffer.clear();
        self.head_seen = true;
        self.overflowed = false;
        self.downstream.receive_head(head);
    }
}

impl<D: FragmentReceiver> FragmentReceiver for ChunkReassembler<D> {
    fn receive_fragment(&mut self, bytes: Bytes, is_final: bool) -> EventSourceResult<()> {
        if !self.head_seen {
            return Err(EventSourceError::ProtocolError(
                "received body fragment without a response head".to_string(),
            ));
        }

        // The response is being torn down after an overflow; nothing more is kept.
        if self.overflowed {
            trace!("Dropping {} bytes after frame overflow", bytes.len());
            return Ok(());
        }

        let size = self.buffer.len().saturating_add(bytes.len());
        if size > self.max_frame_size {
            warn!(
                "Event stream frame exceeded {} bytes, abandoning response",
                self.max_frame_size
            );
            self.buffer.clear();
            self.overflowed = true;
            return Err(EventSourceError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        self.buffer.extend_from_slice(&bytes);

        let at_boundary = RECORD_BOUNDARIES
            .iter()
            .any(|boundary| self.buffer.ends_with(boundary));
        if is_final || at_boundary {
            let frame = self.buffer.split().freeze();
            trace!("Flushing {} byte frame (final: {})", frame.len(), is_final);
            self.downstream.receive_fragment(frame, is_final)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{StatusCode, Version};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Frames {
        heads: usize,
        frames: Vec<(Bytes, bool)>,
    }

    impl HeadReceiver for Frames {
        fn receive_head(&mut self, _head: &ResponseHead) {
            self.heads += 1;
        }
    }

    impl FragmentReceiver for Frames {
        fn receive_fragment(&mut self, bytes: Bytes, is_final: bool) -> EventSourceResult<()> {
            self.frames.push((bytes, is_final));
            Ok(())
        }
    }

    fn head() -> ResponseHead {
        ResponseHead::new(StatusCode::OK, Version::HTTP_11)
    }

    fn started(max: usize) -> ChunkReassembler<Frames> {
        let mut reassembler = ChunkReassembler::new(max, Frames::default());
        reassembler.receive_head(&head());
        reassembler
    }

    #[test]
    fn test_head_is_forwarded() {
        let reassembler = started(1024);
        assert_eq!(reassembler.downstream().heads, 1);
    }

    #[test]
    fn test_fragment_without_head_is_rejected() {
        let mut reassembler = ChunkReassembler::new(1024, Frames::default());
        let result = reassembler.receive_fragment(Bytes::from_static(b"data: x\n\n"), false);
        assert!(matches!(result, Err(EventSourceError::ProtocolError(_))));
        assert!(reassembler.downstream().frames.is_empty());
    }

    #[test]
    fn test_split_record_is_joined_at_boundary() {
        let mut reassembler = started(1024);
        reassembler
            .receive_fragment(Bytes::from_static(b"data: hel"), false)
            .unwrap();
        reassembler
            .receive_fragment(Bytes::from_static(b"lo\ndata: wor"), false)
            .unwrap();
        assert!(reassembler.downstream().frames.is_empty());
        assert_eq!(reassembler.buffered_len(), 21);

        reassembler
            .receive_fragment(Bytes::from_static(b"ld\n\n"), false)
            .unwrap();

        assert_eq!(
            reassembler.downstream().frames,
            vec![(Bytes::from_static(b"data: hello\ndata: world\n\n"), false)]
        );
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn test_boundary_flush_keeps_response_open() {
        let mut reassembler = started(1024);
        reassembler
            .receive_fragment(Bytes::from_static(b"data: a\n\n"), false)
            .unwrap();
        reassembler
            .receive_fragment(Bytes::from_static(b"data: b\n\n"), false)
            .unwrap();
        reassembler
            .receive_fragment(Bytes::from_static(b"data: c\n"), true)
            .unwrap();

        let frames: Vec<&[u8]> = reassembler
            .downstream()
            .frames
            .iter()
            .map(|(b, _)| b.as_ref())
            .collect();
        assert_eq!(
            frames,
            vec![&b"data: a\n\n"[..], &b"data: b\n\n"[..], &b"data: c\n"[..]]
        );
        assert!(reassembler.downstream().frames[2].1);
    }

    #[test]
    fn test_boundary_spanning_two_fragments() {
        let mut reassembler = started(1024);
        reassembler
            .receive_fragment(Bytes::from_static(b"data: a\n"), false)
            .unwrap();
        reassembler
            .receive_fragment(Bytes::from_static(b"\n"), false)
            .unwrap();
        assert_eq!(
            reassembler.downstream().frames,
            vec![(Bytes::from_static(b"data: a\n\n"), false)]
        );
    }

    #[test]
    fn test_crlf_boundary_flushes() {
        let mut reassembler = started(1024);
        reassembler
            .receive_fragment(Bytes::from_static(b"data: a\r\n\r\n"), false)
            .unwrap();
        assert_eq!(reassembler.downstream().frames.len(), 1);
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn test_final_fragment_flushes_partial_record() {
        let mut reassembler = started(1024);
        reassembler
            .receive_fragment(Bytes::from_static(b"data: tail"), true)
            .unwrap();
        assert_eq!(
            reassembler.downstream().frames,
            vec![(Bytes::from_static(b"data: tail"), true)]
        );
    }

    #[test]
    fn test_exact_bound_is_accepted() {
        let mut reassembler = started(8);
        reassembler
            .receive_fragment(Bytes::from_static(b"data: x\n"), false)
            .unwrap();
        assert_eq!(reassembler.buffered_len(), 8);
    }

    #[test]
    fn test_overflow_is_fatal_for_response() {
        let mut reassembler = started(16);
        reassembler
            .receive_fragment(Bytes::from_static(b"data: 0123456"), false)
            .unwrap();

        let err = reassembler
            .receive_fragment(Bytes::from_static(b"789\n\n"), false)
            .unwrap_err();
        assert_eq!(err, EventSourceError::FrameTooLarge { size: 18, max: 16 });
        assert_eq!(reassembler.buffered_len(), 0);

        // No partial output, and nothing accumulates afterwards.
        reassembler
            .receive_fragment(Bytes::from_static(b"data: y\n\n"), false)
            .unwrap();
        assert!(reassembler.downstream().frames.is_empty());
        assert_eq!(reassembler.buffered_len(), 0);

        // A new response starts clean.
        reassembler.receive_head(&head());
        reassembler
            .receive_fragment(Bytes::from_static(b"data: y\n\n"), false)
            .unwrap();
        assert_eq!(reassembler.downstream().frames.len(), 1);
    }

    #[test]
    fn test_new_head_discards_unflushed_bytes() {
        let mut reassembler = started(1024);
        reassembler
            .receive_fragment(Bytes::from_static(b"data: half"), false)
            .unwrap();
        reassembler.receive_head(&head());
        assert_eq!(reassembler.buffered_len(), 0);
        assert_eq!(reassembler.downstream().heads, 2);
    }
}
