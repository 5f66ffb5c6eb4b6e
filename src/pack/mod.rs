//! The pack segment codec (`spec.md` 4.1): a flat, append-friendly
//! binary container that is walkable forward from its header and
//! backward from its terminator without an auxiliary index.
//!
//! Layout: a 6-byte header (4-byte LE total byte count, 2-byte LE
//! element count, saturating at `0xFFFF`), a run of elements (each an
//! encoding/payload pair immediately followed by a back-length
//! trailer), and a single `0xFF` terminator byte.

mod element;
mod varint;

pub use element::{parse_strict_integer, PackElement, PackValue};

use crate::error::{CoreError, CoreResult};
use element::{classify, decode_element, encode_element, Classified, TERMINATOR};
use varint::{backlen_byte_count, read_backlength_backward, write_backlength};

const HEADER_LEN: usize = 6;
const COUNT_SATURATED: u16 = 0xFFFF;

/// A single pack segment. Owns its backing buffer; every offset this
/// type hands out (`first`, `next`, `prev`, `seek`) is a byte offset
/// into that buffer, valid only until the next mutating call.
#[derive(Debug, Clone)]
pub struct Pack {
    buf: Vec<u8>,
}

impl Default for Pack {
    fn default() -> Self {
        Self::new()
    }
}

impl Pack {
    /// Create an empty segment: header plus a bare terminator.
    pub fn new() -> Self {
        let mut buf = vec![0u8; HEADER_LEN];
        buf.push(TERMINATOR);
        let mut pack = Pack { buf };
        pack.set_total_bytes(pack.buf.len() as u32);
        pack.set_raw_count(0);
        pack
    }

    /// Wrap an externally-sourced buffer (e.g. loaded from a snapshot)
    /// without validating it. Callers that cannot trust the source
    /// should call [`Pack::validate`] before using any other method.
    pub fn from_raw(buf: Vec<u8>) -> Self {
        Pack { buf }
    }

    /// The segment's own encoding of its total size, in bytes.
    pub fn total_bytes(&self) -> u32 {
        u32::from_le_bytes(self.buf[0..4].try_into().unwrap())
    }

    fn set_total_bytes(&mut self, v: u32) {
        self.buf[0..4].copy_from_slice(&v.to_le_bytes());
    }

    fn raw_count(&self) -> u16 {
        u16::from_le_bytes(self.buf[4..6].try_into().unwrap())
    }

    fn set_raw_count(&mut self, v: u16) {
        self.buf[4..6].copy_from_slice(&v.to_le_bytes());
    }

    /// The buffer's actual length, which must always equal
    /// [`Pack::total_bytes`] for a well-formed segment.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the raw buffer, e.g. to hand off to storage.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of elements. Falls back to a linear scan when the header
    /// field has saturated at `0xFFFF` (`spec.md` 3).
    pub fn len(&self) -> usize {
        let c = self.raw_count();
        if c != COUNT_SATURATED {
            c as usize
        } else {
            self.scan_count()
        }
    }

    /// True if the segment holds no elements.
    pub fn is_empty(&self) -> bool {
        self.buf.get(HEADER_LEN) == Some(&TERMINATOR)
    }

    fn scan_count(&self) -> usize {
        let mut n = 0;
        let mut cur = self.first();
        while let Some(off) = cur {
            n += 1;
            cur = self.next(off);
        }
        n
    }

    /// Re-scan the true element count and write it back into the
    /// header if it now fits, recovering from a prior saturation.
    /// Returns the true count either way.
    pub fn recount(&mut self) -> usize {
        let n = self.scan_count();
        if n < COUNT_SATURATED as usize {
            self.set_raw_count(n as u16);
        }
        n
    }

    /// Offset of the first element, or `None` if the segment is empty.
    pub fn first(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(HEADER_LEN)
        }
    }

    /// Offset of the last element, or `None` if the segment is empty.
    pub fn last(&self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let terminator = self.buf.len() - 1;
        let (s, k) = read_backlength_backward(&self.buf, terminator, HEADER_LEN).ok()?;
        Some(terminator - k - s as usize)
    }

    /// Offset of the element following `at`, or `None` if `at` is last.
    pub fn next(&self, at: usize) -> Option<usize> {
        let (_, s) = decode_element(&self.buf, at).ok()?;
        let k = backlen_byte_count(s as u32);
        let next_off = at + s + k;
        if self.buf.get(next_off) == Some(&TERMINATOR) {
            None
        } else {
            Some(next_off)
        }
    }

    /// Offset of the element preceding `at`, or `None` if `at` is first.
    pub fn prev(&self, at: usize) -> Option<usize> {
        if at <= HEADER_LEN {
            return None;
        }
        let (s, k) = read_backlength_backward(&self.buf, at, HEADER_LEN).ok()?;
        Some(at - k - s as usize)
    }

    /// Index-addressed lookup: non-negative indices count from the
    /// head, negative indices from the tail (`-1` is the last
    /// element), matching `spec.md` 4.1's `seek` semantics.
    pub fn seek(&self, index: i64) -> Option<usize> {
        if index >= 0 {
            let mut cur = self.first();
            for _ in 0..index {
                cur = cur.and_then(|o| self.next(o));
            }
            cur
        } else {
            let mut cur = self.last();
            for _ in 0..(-index - 1) {
                cur = cur.and_then(|o| self.prev(o));
            }
            cur
        }
    }

    /// Decode the element at `at`.
    pub fn get(&self, at: usize) -> CoreResult<PackElement<'_>> {
        decode_element(&self.buf, at).map(|(el, _)| el)
    }

    fn element_total_len(&self, at: usize) -> CoreResult<usize> {
        let (_, s) = decode_element(&self.buf, at)?;
        Ok(s + backlen_byte_count(s as u32))
    }

    fn build_encoded(value: PackValue<'_>) -> CoreResult<Vec<u8>> {
        let classified = classify(value);
        let mut encoded = Vec::new();
        encode_element(&classified, &mut encoded)?;
        let s = encoded.len();
        if s as u64 > u32::MAX as u64 {
            return Err(CoreError::CapacityExceeded);
        }
        write_backlength(&mut encoded, s as u32);
        Ok(encoded)
    }

    /// Replace `buf[range]` with `replacement`, growing or shrinking
    /// the backing buffer uniformly, and keep the header's total-byte
    /// field in sync. Rejects the edit outright (no partial mutation)
    /// if the resulting buffer would exceed the 2^32 - 1 byte cap.
    fn splice_region(&mut self, range: std::ops::Range<usize>, replacement: &[u8]) -> CoreResult<()> {
        let delta = replacement.len() as i64 - (range.end - range.start) as i64;
        let new_total = self.buf.len() as i64 + delta;
        if new_total < HEADER_LEN as i64 + 1 || new_total as u64 > u32::MAX as u64 {
            return Err(CoreError::CapacityExceeded);
        }
        self.buf.splice(range, replacement.iter().copied());
        self.set_total_bytes(self.buf.len() as u32);
        Ok(())
    }

    fn bump_count_insert(&mut self) {
        match self.raw_count() {
            COUNT_SATURATED => {}
            c if c == COUNT_SATURATED - 1 => self.set_raw_count(COUNT_SATURATED),
            c => self.set_raw_count(c + 1),
        }
    }

    fn bump_count_delete(&mut self, n: u16) {
        if self.raw_count() != COUNT_SATURATED {
            self.set_raw_count(self.raw_count().saturating_sub(n));
        }
    }

    fn insert_at(&mut self, pos: usize, value: PackValue<'_>) -> CoreResult<usize> {
        let encoded = Self::build_encoded(value)?;
        self.splice_region(pos..pos, &encoded)?;
        self.bump_count_insert();
        Ok(pos)
    }

    /// Insert `value` immediately before the element at `at`.
    pub fn insert_before(&mut self, at: usize, value: PackValue<'_>) -> CoreResult<usize> {
        self.insert_at(at, value)
    }

    /// Insert `value` immediately after the element at `at`.
    pub fn insert_after(&mut self, at: usize, value: PackValue<'_>) -> CoreResult<usize> {
        let pos = self.next(at).unwrap_or(self.buf.len() - 1);
        self.insert_at(pos, value)
    }

    /// Append `value` at the tail.
    pub fn append(&mut self, value: PackValue<'_>) -> CoreResult<usize> {
        let pos = self.buf.len() - 1;
        self.insert_at(pos, value)
    }

    /// Prepend `value` at the head.
    pub fn prepend(&mut self, value: PackValue<'_>) -> CoreResult<usize> {
        let pos = self.first().unwrap_or(HEADER_LEN);
        self.insert_at(pos, value)
    }

    /// Replace the element at `at` in place, growing or shrinking the
    /// segment as the new encoding requires.
    pub fn replace(&mut self, at: usize, value: PackValue<'_>) -> CoreResult<()> {
        let old_len = self.element_total_len(at)?;
        let encoded = Self::build_encoded(value)?;
        self.splice_region(at..at + old_len, &encoded)
    }

    /// Delete the element at `at`. Returns the offset of the element
    /// that now occupies its place, or `None` if it was the last one.
    pub fn delete(&mut self, at: usize) -> CoreResult<Option<usize>> {
        let old_len = self.element_total_len(at)?;
        self.splice_region(at..at + old_len, &[])?;
        self.bump_count_delete(1);
        if self.buf.get(at) == Some(&TERMINATOR) {
            Ok(None)
        } else {
            Ok(Some(at))
        }
    }

    /// Delete up to `count` elements starting at index `start_index`
    /// (`spec.md` 4.1 `seek` indexing). Returns the number actually
    /// removed, which may be less than `count` if the segment is
    /// shorter.
    pub fn delete_range(&mut self, start_index: i64, count: usize) -> CoreResult<usize> {
        let Some(start_off) = self.seek(start_index) else {
            return Ok(0);
        };
        let mut cur = Some(start_off);
        let mut end_off = start_off;
        let mut removed = 0usize;
        while removed < count {
            let Some(off) = cur else { break };
            end_off = off + self.element_total_len(off)?;
            cur = self.next(off);
            removed += 1;
        }
        if removed == 0 {
            return Ok(0);
        }
        self.splice_region(start_off..end_off, &[])?;
        self.bump_count_delete(removed as u16);
        Ok(removed)
    }

    /// Validate an externally-sourced buffer: header consistency, a
    /// forward walk that reaches exactly one terminator at the
    /// buffer's end, and (when unsaturated) an element count matching
    /// the header field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.buf.len() < HEADER_LEN + 1 {
            return Err(CoreError::MalformedEncoding);
        }
        if self.total_bytes() as usize != self.buf.len() {
            return Err(CoreError::MalformedEncoding);
        }
        let mut pos = HEADER_LEN;
        let mut n = 0u64;
        while self.buf.get(pos) != Some(&TERMINATOR) {
            let (_, s) = decode_element(&self.buf, pos)?;
            let k = backlen_byte_count(s as u32);
            let (back_s, back_k) = read_backlength_backward(&self.buf, pos + s + k, HEADER_LEN)?;
            if back_s as usize != s || back_k != k {
                return Err(CoreError::MalformedEncoding);
            }
            pos += s + k;
            n += 1;
        }
        if pos != self.buf.len() - 1 {
            return Err(CoreError::MalformedEncoding);
        }
        let declared = self.raw_count();
        if declared != COUNT_SATURATED && declared as u64 != n {
            return Err(CoreError::MalformedEncoding);
        }
        Ok(())
    }
}
