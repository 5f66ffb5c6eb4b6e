//! The quicklist: a doubly-linked chain of [`Pack`] segments
//! (`spec.md` 4.2).
//!
//! Nodes live in an arena (`Vec<Option<QuicklistNode>>`) and are
//! addressed by index rather than pointer, following the index-based
//! intrusive list design in the retrieval pack's `hkv-engine` memory
//! module. A [`Cursor`] names a live element as `(node index, element
//! offset within that node's pack)`; it is invalidated by any mutation
//! other than the one that produced it, the same lifetime discipline
//! as a bare `Pack` offset.

mod bookmark;
mod lzf;
mod node;

pub use bookmark::{BookmarkTable, MAX_BOOKMARKS};
pub use node::QuicklistNode;

use crate::error::{CoreError, CoreResult};
use crate::pack::{Pack, PackValue};

/// A single-byte-safety ceiling: an oversized element always gets its
/// own node rather than forcing every neighbor past `fill`.
const SAFETY_LIMIT_BYTES: usize = 8 * 1024;

fn fill_size_limit(fill: i32) -> Option<usize> {
    match fill {
        -1 => Some(4 * 1024),
        -2 => Some(8 * 1024),
        -3 => Some(16 * 1024),
        -4 => Some(32 * 1024),
        -5 => Some(64 * 1024),
        _ => None,
    }
}

/// A reference to a live element: the arena index of its node, and its
/// byte offset within that node's pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    node: usize,
    offset: usize,
}

/// The doubly-linked chain of pack segments.
pub struct Quicklist {
    arena: Vec<Option<QuicklistNode>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    count: usize,
    node_count: usize,
    fill: i32,
    compress_depth: u16,
    bookmarks: BookmarkTable,
}

impl Quicklist {
    /// Create an empty quicklist. `fill` follows the redis convention:
    /// positive values cap element count per node, `-1..=-5` cap node
    /// byte size at 4/8/16/32/64 KiB. `compress_depth` is the number
    /// of nodes kept uncompressed at each end; `0` disables
    /// compression entirely.
    pub fn new(fill: i32, compress_depth: u16) -> Self {
        Quicklist {
            arena: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            count: 0,
            node_count: 0,
            fill,
            compress_depth,
            bookmarks: BookmarkTable::new(),
        }
    }

    /// Total element count across every node.
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if the quicklist holds no elements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of nodes currently in the chain.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Supplemented accessor (not in the original distillation): the
    /// number of slots the arena occupies, including freed-but-not-yet
    /// reused ones. Useful for tests asserting the arena doesn't grow
    /// unboundedly under steady-state churn.
    pub fn count_raw_nodes(&self) -> usize {
        self.arena.len()
    }

    fn node(&self, idx: usize) -> &QuicklistNode {
        self.arena[idx].as_ref().expect("dangling node index")
    }

    fn node_mut(&mut self, idx: usize) -> &mut QuicklistNode {
        self.arena[idx].as_mut().expect("dangling node index")
    }

    fn alloc_node(&mut self, pack: Pack) -> usize {
        let node = QuicklistNode::new(pack);
        if let Some(idx) = self.free.pop() {
            self.arena[idx] = Some(node);
            idx
        } else {
            self.arena.push(Some(node));
            self.arena.len() - 1
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.arena[idx] = None;
        self.free.push(idx);
    }

    fn link_after(&mut self, existing: usize, new_idx: usize) {
        let next = self.node(existing).next;
        self.node_mut(new_idx).prev = Some(existing);
        self.node_mut(new_idx).next = next;
        self.node_mut(existing).next = Some(new_idx);
        match next {
            Some(n) => self.node_mut(n).prev = Some(new_idx),
            None => self.tail = Some(new_idx),
        }
    }

    fn link_before(&mut self, existing: usize, new_idx: usize) {
        let prev = self.node(existing).prev;
        self.node_mut(new_idx).next = Some(existing);
        self.node_mut(new_idx).prev = prev;
        self.node_mut(existing).prev = Some(new_idx);
        match prev {
            Some(p) => self.node_mut(p).next = Some(new_idx),
            None => self.head = Some(new_idx),
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let n = self.node(idx);
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        self.bookmarks.retarget_on_delete(idx, next.or(prev));
    }

    fn node_has_room(&self, idx: usize, extra_bytes: usize) -> bool {
        let node = self.node(idx);
        if self.fill > 0 {
            node.count() < self.fill as usize
        } else if let Some(limit) = fill_size_limit(self.fill) {
            node.stored_byte_len() + extra_bytes <= limit.min(SAFETY_LIMIT_BYTES.max(limit))
        } else {
            node.stored_byte_len() + extra_bytes <= SAFETY_LIMIT_BYTES
        }
    }

    fn new_node_with(&mut self, value: PackValue<'_>) -> CoreResult<usize> {
        let mut pack = Pack::new();
        pack.append(value)?;
        Ok(self.alloc_node(pack))
    }

    /// Prepend a value at the head of the chain.
    pub fn push_front(&mut self, value: PackValue<'_>) -> CoreResult<()> {
        let estimate = estimate_encoded_len(&value);
        match self.head {
            Some(head) if self.node_has_room(head, estimate) && !self.node(head).is_compressed() => {
                self.node_mut(head).pack_mut().prepend(value)?;
            }
            Some(head) => {
                let new_idx = self.new_node_with(value)?;
                self.link_before(head, new_idx);
                self.bookmarks.shift_after_insert(new_idx.min(head));
                self.node_count += 1;
            }
            None => {
                let new_idx = self.new_node_with(value)?;
                self.head = Some(new_idx);
                self.tail = Some(new_idx);
                self.node_count += 1;
            }
        }
        self.count += 1;
        self.apply_compression_policy();
        Ok(())
    }

    /// Append a value at the tail of the chain.
    pub fn push_back(&mut self, value: PackValue<'_>) -> CoreResult<()> {
        let estimate = estimate_encoded_len(&value);
        match self.tail {
            Some(tail) if self.node_has_room(tail, estimate) && !self.node(tail).is_compressed() => {
                self.node_mut(tail).pack_mut().append(value)?;
            }
            Some(tail) => {
                let new_idx = self.new_node_with(value)?;
                self.link_after(tail, new_idx);
                self.node_count += 1;
            }
            None => {
                let new_idx = self.new_node_with(value)?;
                self.head = Some(new_idx);
                self.tail = Some(new_idx);
                self.node_count += 1;
            }
        }
        self.count += 1;
        self.apply_compression_policy();
        Ok(())
    }

    /// Remove and return the head element's bytes.
    pub fn pop_front(&mut self) -> Option<Vec<u8>> {
        let head = self.head?;
        let (value, emptied) = {
            let node = self.node_mut(head);
            let pack = node.pack_mut();
            let at = pack.first()?;
            let value = pack.get(at).unwrap().to_vec();
            pack.delete(at).unwrap();
            (value, pack.is_empty())
        };
        self.count -= 1;
        if emptied {
            self.unlink(head);
            self.free_node(head);
            self.node_count -= 1;
        }
        self.apply_compression_policy();
        Some(value)
    }

    /// Remove and return the tail element's bytes.
    pub fn pop_back(&mut self) -> Option<Vec<u8>> {
        let tail = self.tail?;
        let (value, emptied) = {
            let node = self.node_mut(tail);
            let pack = node.pack_mut();
            let at = pack.last()?;
            let value = pack.get(at).unwrap().to_vec();
            pack.delete(at).unwrap();
            (value, pack.is_empty())
        };
        self.count -= 1;
        if emptied {
            self.unlink(tail);
            self.free_node(tail);
            self.node_count -= 1;
        }
        self.apply_compression_policy();
        Some(value)
    }

    /// Cursor at the first element, or `None` if empty. Takes `&mut
    /// self` because a compressed head node is decompressed in place
    /// before being read (`spec.md` 4.2's "iterators decompress on
    /// entry").
    pub fn front(&mut self) -> Option<Cursor> {
        let head = self.head?;
        let offset = self.node_mut(head).pack_mut().first()?;
        Some(Cursor { node: head, offset })
    }

    /// Cursor at the last element, or `None` if empty.
    pub fn back(&mut self) -> Option<Cursor> {
        let tail = self.tail?;
        let offset = self.node_mut(tail).pack_mut().last()?;
        Some(Cursor { node: tail, offset })
    }

    /// Cursor at the element following `cur`, walking across node
    /// boundaries, or `None` at the tail.
    pub fn next(&mut self, cur: Cursor) -> Option<Cursor> {
        if let Some(offset) = self.node_mut(cur.node).pack_mut().next(cur.offset) {
            return Some(Cursor { node: cur.node, offset });
        }
        let mut next_node = self.node(cur.node).next;
        while let Some(idx) = next_node {
            if let Some(offset) = self.node_mut(idx).pack_mut().first() {
                return Some(Cursor { node: idx, offset });
            }
            next_node = self.node(idx).next;
        }
        None
    }

    /// Cursor at the element preceding `cur`, walking across node
    /// boundaries, or `None` at the head.
    pub fn prev(&mut self, cur: Cursor) -> Option<Cursor> {
        if let Some(offset) = self.node_mut(cur.node).pack_mut().prev(cur.offset) {
            return Some(Cursor { node: cur.node, offset });
        }
        let mut prev_node = self.node(cur.node).prev;
        while let Some(idx) = prev_node {
            if let Some(offset) = self.node_mut(idx).pack_mut().last() {
                return Some(Cursor { node: idx, offset });
            }
            prev_node = self.node(idx).prev;
        }
        None
    }

    /// Read the element a cursor names.
    pub fn get(&mut self, cur: Cursor) -> CoreResult<Vec<u8>> {
        Ok(self.node_mut(cur.node).pack_mut().get(cur.offset)?.to_vec())
    }

    /// Node byte-length a decompress-on-entry walk can trust: forces
    /// `idx` raw first, since a still-compressed node reports `0`.
    fn node_len(&mut self, idx: usize) -> i64 {
        self.node_mut(idx).pack_mut();
        self.node(idx).count() as i64
    }

    /// Resolve a signed, list-wide index to a cursor, walking node by
    /// node (non-negative counts from the head, negative from the
    /// tail, `-1` is the last element), analogous to [`Pack::seek`]
    /// but spanning the whole chain.
    fn resolve_index(&mut self, index: i64) -> Option<Cursor> {
        if index >= 0 {
            let mut remaining = index;
            let mut node_idx = self.head?;
            loop {
                let len = self.node_len(node_idx);
                if remaining < len {
                    let offset = self.node_mut(node_idx).pack_mut().seek(remaining)?;
                    return Some(Cursor { node: node_idx, offset });
                }
                remaining -= len;
                node_idx = self.node(node_idx).next?;
            }
        } else {
            let mut remaining = -index - 1;
            let mut node_idx = self.tail?;
            loop {
                let len = self.node_len(node_idx);
                if remaining < len {
                    let offset = self.node_mut(node_idx).pack_mut().seek(-(remaining + 1))?;
                    return Some(Cursor { node: node_idx, offset });
                }
                remaining -= len;
                node_idx = self.node(node_idx).prev?;
            }
        }
    }

    /// Cursor at a signed list-wide index, for starting iteration
    /// mid-list.
    pub fn cursor_at_index(&mut self, index: i64) -> Option<Cursor> {
        self.resolve_index(index)
    }

    /// Read the element at a signed list-wide index.
    pub fn index(&mut self, index: i64) -> CoreResult<Vec<u8>> {
        let cur = self.resolve_index(index).ok_or(CoreError::NotFound)?;
        self.get(cur)
    }

    /// Replace the element at a signed list-wide index in place.
    pub fn replace_at_index(&mut self, index: i64, value: PackValue<'_>) -> CoreResult<()> {
        let cur = self.resolve_index(index).ok_or(CoreError::NotFound)?;
        self.node_mut(cur.node).pack_mut().replace(cur.offset, value)?;
        self.apply_compression_policy();
        Ok(())
    }

    /// Move the tail element to the head in one step.
    pub fn rotate(&mut self) -> CoreResult<()> {
        if let Some(value) = self.pop_back() {
            self.push_front(PackValue::ForceBytes(&value))?;
        }
        Ok(())
    }

    /// Delete up to `count` elements starting at a signed list-wide
    /// index, spanning node boundaries (unlike [`Pack::delete_range`],
    /// which only works within one segment). Returns the number
    /// actually removed.
    pub fn delete_range(&mut self, start_index: i64, count: usize) -> CoreResult<usize> {
        let len = self.count as i64;
        let abs_start = if start_index >= 0 { start_index } else { len + start_index };
        if abs_start < 0 || abs_start >= len {
            return Ok(0);
        }
        let mut removed = 0;
        while removed < count {
            let Some(cur) = self.resolve_index(abs_start) else { break };
            self.delete(cur)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Deep clone the entire chain, node for node. The clone gets a
    /// fresh, empty bookmark table: bookmarks name positions in *this*
    /// list's lifecycle, not the duplicate's.
    pub fn duplicate(&self) -> Quicklist {
        Quicklist {
            arena: self.arena.clone(),
            free: self.free.clone(),
            head: self.head,
            tail: self.tail,
            count: self.count,
            node_count: self.node_count,
            fill: self.fill,
            compress_depth: self.compress_depth,
            bookmarks: BookmarkTable::new(),
        }
    }

    /// Build a new quicklist by splitting an existing pack segment's
    /// elements into properly fill-policy-sized nodes.
    pub fn create_from_pack(fill: i32, compress_depth: u16, pack: &Pack) -> CoreResult<Quicklist> {
        let mut ql = Quicklist::new(fill, compress_depth);
        ql.append_pack(pack)?;
        Ok(ql)
    }

    /// Append an entire pack segment's elements at the tail, each
    /// placed per the usual fill/merge policy rather than wholesale as
    /// one oversized node.
    pub fn append_pack(&mut self, pack: &Pack) -> CoreResult<()> {
        let mut cur = pack.first();
        while let Some(off) = cur {
            let bytes = pack.get(off)?.to_vec();
            self.push_back(PackValue::ForceBytes(&bytes))?;
            cur = pack.next(off);
        }
        Ok(())
    }

    /// Insert `value` immediately before `cur`, splitting the node if
    /// it has no room.
    pub fn insert_before(&mut self, cur: Cursor, value: PackValue<'_>) -> CoreResult<()> {
        self.insert_at(cur, value, true)
    }

    /// Insert `value` immediately after `cur`, splitting the node if
    /// it has no room.
    pub fn insert_after(&mut self, cur: Cursor, value: PackValue<'_>) -> CoreResult<()> {
        self.insert_at(cur, value, false)
    }

    fn insert_at(&mut self, cur: Cursor, value: PackValue<'_>, before: bool) -> CoreResult<()> {
        let estimate = estimate_encoded_len(&value);
        if self.node_has_room(cur.node, estimate) && !self.node(cur.node).is_compressed() {
            let pack = self.node_mut(cur.node).pack_mut();
            if before {
                pack.insert_before(cur.offset, value)?;
            } else {
                pack.insert_after(cur.offset, value)?;
            }
            self.count += 1;
            self.apply_compression_policy();
            return Ok(());
        }
        self.split_and_insert(cur, value, before)
    }

    /// Split the node at `cur` into two, inserting `value` at the
    /// split point, and merge the resulting halves with a neighbor
    /// when they're small enough to fit (`spec.md` 4.2's merge
    /// policy).
    fn split_and_insert(&mut self, cur: Cursor, value: PackValue<'_>, before: bool) -> CoreResult<()> {
        let node_idx = cur.node;
        let mut tail_pack = Pack::new();
        {
            let pack = self.node_mut(node_idx).pack_mut();
            let mut cut = cur.offset;
            if !before {
                match pack.next(cut) {
                    Some(n) => cut = n,
                    None => cut = pack.byte_len() - 1, // nothing follows: cut is empty tail
                }
            }
            let mut moving = Vec::new();
            let mut walk = if pack.byte_len() - 1 == cut { None } else { Some(cut) };
            while let Some(off) = walk {
                moving.push(pack.get(off).unwrap().to_vec());
                walk = pack.next(off);
            }
            for bytes in &moving {
                tail_pack.append(PackValue::ForceBytes(bytes))?;
            }
            let removed = moving.len();
            if removed > 0 {
                pack.delete_range(pack.len() as i64 - removed as i64, removed)?;
            }
        }
        let moved_any = !tail_pack.is_empty();
        self.node_mut(node_idx).pack_mut().append(value)?;
        self.count += 1;

        if moved_any {
            let new_idx = self.alloc_node(tail_pack);
            self.link_after(node_idx, new_idx);
            self.node_count += 1;
            self.bookmarks.shift_after_insert(new_idx);
            self.apply_compression_policy();
            self.try_merge_neighbors(node_idx);
        }
        Ok(())
    }

    /// Delete the element at `cur`. Merges the node with a neighbor
    /// afterward if the result would still fit within `fill`.
    pub fn delete(&mut self, cur: Cursor) -> CoreResult<()> {
        let emptied = {
            let pack = self.node_mut(cur.node).pack_mut();
            pack.delete(cur.offset)?;
            pack.is_empty()
        };
        self.count -= 1;
        if emptied {
            self.unlink(cur.node);
            self.free_node(cur.node);
            self.node_count -= 1;
        } else {
            self.try_merge_neighbors(cur.node);
        }
        self.apply_compression_policy();
        Ok(())
    }

    /// Try to merge `idx` with its next neighbor if the combined node
    /// would still satisfy `fill`. A no-op if there's no next
    /// neighbor or the merge wouldn't fit.
    fn try_merge_neighbors(&mut self, idx: usize) {
        if !self.arena[idx].is_some() {
            return;
        }
        let Some(next) = self.node(idx).next else { return };
        if self.node(idx).is_compressed() || self.node(next).is_compressed() {
            return;
        }
        let combined_bytes = self.node(idx).stored_byte_len() + self.node(next).stored_byte_len();
        let combined_count = self.node(idx).count() + self.node(next).count();
        let fits = if self.fill > 0 {
            combined_count <= self.fill as usize
        } else if let Some(limit) = fill_size_limit(self.fill) {
            combined_bytes <= limit
        } else {
            combined_bytes <= SAFETY_LIMIT_BYTES
        };
        if !fits {
            return;
        }
        let elements: Vec<Vec<u8>> = {
            let mut out = Vec::new();
            let next_pack = self.node_mut(next).pack_mut();
            let mut cur = next_pack.first();
            while let Some(off) = cur {
                out.push(next_pack.get(off).unwrap().to_vec());
                cur = next_pack.next(off);
            }
            out
        };
        {
            let pack = self.node_mut(idx).pack_mut();
            for bytes in &elements {
                let _ = pack.append(PackValue::ForceBytes(bytes));
            }
        }
        self.unlink(next);
        self.free_node(next);
        self.node_count -= 1;
    }

    /// Re-derive which nodes should be compressed: everything except
    /// the `compress_depth` nodes closest to each end. A
    /// `compress_depth` of `0` disables compression.
    fn apply_compression_policy(&mut self) {
        if self.compress_depth == 0 {
            return;
        }
        let mut keep_raw = std::collections::HashSet::new();
        let mut cur = self.head;
        for _ in 0..self.compress_depth {
            match cur {
                Some(idx) => {
                    keep_raw.insert(idx);
                    cur = self.node(idx).next;
                }
                None => break,
            }
        }
        let mut cur = self.tail;
        for _ in 0..self.compress_depth {
            match cur {
                Some(idx) => {
                    keep_raw.insert(idx);
                    cur = self.node(idx).prev;
                }
                None => break,
            }
        }

        let indices: Vec<usize> = (0..self.arena.len()).filter(|i| self.arena[*i].is_some()).collect();
        for idx in indices {
            if keep_raw.contains(&idx) {
                if self.node(idx).is_compressed() {
                    self.node_mut(idx).decompress_in_place();
                }
            } else if !self.node(idx).is_compressed() {
                self.node_mut(idx).compress_in_place();
            }
        }
    }

    /// Access the bookmark table.
    pub fn bookmarks(&self) -> &BookmarkTable {
        &self.bookmarks
    }

    /// Mutably access the bookmark table.
    pub fn bookmarks_mut(&mut self) -> &mut BookmarkTable {
        &mut self.bookmarks
    }

    /// Look up a cursor by bookmark name.
    pub fn bookmark_cursor(&mut self, name: &str) -> CoreResult<Cursor> {
        let node = self.bookmarks.get(name).ok_or(CoreError::NotFound)?;
        let offset = self.node_mut(node).pack_mut().first().ok_or(CoreError::NotFound)?;
        Ok(Cursor { node, offset })
    }
}

fn estimate_encoded_len(value: &PackValue<'_>) -> usize {
    match value {
        PackValue::ForceBytes(b) => b.len() + 5,
        PackValue::Auto(b) => b.len() + 5,
        PackValue::Int(_) => 9,
    }
}
