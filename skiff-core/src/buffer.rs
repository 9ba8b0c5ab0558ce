//! Segmented read buffer for line-oriented protocols.
//!
//! Bytes arrive from the transport in arbitrary chunks. `ReadBuffer` keeps
//! those chunks as `Bytes` segments and hands out complete CRLF-terminated
//! lines and exact-length payloads without copying when the data sits in a
//! single segment.

use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

/// A segmented buffer optimized for line + payload extraction.
///
/// # Tradeoffs
///
/// - **Fast path**: a line or payload inside one segment is an O(1) slice
/// - **Slow path**: data spanning segments is copied into a contiguous buffer
#[derive(Debug, Default)]
pub struct ReadBuffer {
    segs: VecDeque<Bytes>,
    len: usize,
}

impl ReadBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segs: VecDeque::new(),
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn push(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.len += bytes.len();
        self.segs.push_back(bytes);
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.segs.clear();
        self.len = 0;
    }

    /// Byte at absolute offset `idx`, if buffered.
    fn byte_at(&self, mut idx: usize) -> Option<u8> {
        for seg in &self.segs {
            if idx < seg.len() {
                return Some(seg[idx]);
            }
            idx -= seg.len();
        }
        None
    }

    /// Offset of the first `\r\n`, counted from the front of the buffer.
    ///
    /// The terminator may straddle two segments.
    #[must_use]
    pub fn find_crlf(&self) -> Option<usize> {
        let mut offset = 0;
        let mut prev_cr = false;
        for seg in &self.segs {
            for (i, &b) in seg.iter().enumerate() {
                if prev_cr && b == b'\n' {
                    return Some(offset + i - 1);
                }
                prev_cr = b == b'\r';
            }
            offset += seg.len();
        }
        None
    }

    /// Check whether the bytes at `offset` are exactly `\r\n`.
    ///
    /// Returns `None` when fewer than two bytes are buffered past `offset`.
    #[must_use]
    pub fn has_crlf_at(&self, offset: usize) -> Option<bool> {
        let cr = self.byte_at(offset)?;
        let lf = self.byte_at(offset + 1)?;
        Some(cr == b'\r' && lf == b'\n')
    }

    /// Take one line, without its CRLF terminator.
    ///
    /// Returns `None` if no complete line is buffered yet.
    pub fn take_line(&mut self) -> Option<Bytes> {
        let end = self.find_crlf()?;
        let line = self.take_bytes(end)?;
        self.advance(2);
        Some(line)
    }

    /// Advance the queue by `n` bytes, dropping fully-consumed segments.
    ///
    /// # Panics
    ///
    /// Panics if `n > self.len`.
    pub fn advance(&mut self, mut n: usize) {
        assert!(n <= self.len);
        self.len -= n;

        while n > 0 {
            let Some(mut front) = self.segs.pop_front() else {
                break;
            };
            if n >= front.len() {
                n -= front.len();
                continue;
            }
            // partially consumed
            front.advance(n);
            self.segs.push_front(front);
            break;
        }
    }

    /// Take exactly `n` bytes from the front of the queue.
    ///
    /// If the first segment contains all `n` bytes, this is zero-copy.
    /// If the bytes span multiple segments, this copies into a contiguous buffer.
    pub fn take_bytes(&mut self, n: usize) -> Option<Bytes> {
        if n == 0 {
            return Some(Bytes::new());
        }
        if n > self.len {
            return None;
        }

        let front = self.segs.front_mut()?;
        if front.len() >= n {
            self.len -= n;
            let out = front.split_to(n);
            if front.is_empty() {
                self.segs.pop_front();
            }
            return Some(out);
        }

        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let Some(mut seg) = self.segs.pop_front() else {
                break;
            };
            let take = remaining.min(seg.len());
            out.extend_from_slice(&seg[..take]);
            remaining -= take;
            self.len -= take;
            if take < seg.len() {
                seg.advance(take);
                self.segs.push_front(seg);
            }
        }

        Some(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_of(parts: &[&'static [u8]]) -> ReadBuffer {
        let mut buf = ReadBuffer::new();
        for p in parts {
            buf.push(Bytes::from_static(p));
        }
        buf
    }

    #[test]
    fn test_take_line_single_segment() {
        let mut buf = buffer_of(&[b"PING\r\nPONG\r\n"]);
        assert_eq!(buf.take_line().as_deref(), Some(&b"PING"[..]));
        assert_eq!(buf.take_line().as_deref(), Some(&b"PONG"[..]));
        assert!(buf.take_line().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_crlf_split_across_segments() {
        let mut buf = buffer_of(&[b"+O", b"K\r", b"\nMSG"]);
        assert_eq!(buf.find_crlf(), Some(3));
        assert_eq!(buf.take_line().as_deref(), Some(&b"+OK"[..]));
        assert_eq!(buf.len(), 3);
        assert!(buf.take_line().is_none());
    }

    #[test]
    fn test_lone_cr_is_not_a_terminator() {
        let buf = buffer_of(&[b"a\rb\n"]);
        assert_eq!(buf.find_crlf(), None);
    }

    #[test]
    fn test_take_bytes_spanning_segments() {
        let mut buf = buffer_of(&[b"hel", b"lo", b"\r\n"]);
        assert_eq!(buf.take_bytes(5).as_deref(), Some(&b"hello"[..]));
        assert_eq!(buf.has_crlf_at(0), Some(true));
        assert!(buf.take_bytes(3).is_none());
    }

    #[test]
    fn test_has_crlf_at_needs_two_bytes() {
        let buf = buffer_of(&[b"abc\r"]);
        assert_eq!(buf.has_crlf_at(3), None);
        assert_eq!(buf.has_crlf_at(1), Some(false));
    }
}
