//! Quicklist nodes, addressed by arena index rather than pointer.
//!
//! Grounded on the index-based intrusive list in the retrieval pack's
//! `hkv-engine` (`Node`/`ShardInner`, arena-of-nodes-with-integer-handles):
//! `prev`/`next` are `Option<usize>` slots into the owning `Quicklist`'s
//! `Vec<Option<QuicklistNode>>`, not raw pointers, so the whole
//! structure stays safe and trivially `Send`.

use super::lzf;
use crate::pack::Pack;

/// A node's payload: either a live, directly-editable pack segment, or
/// a compressed one that must be decompressed before any element
/// access (`spec.md` 4.2's "compress-or-raw" per-node state).
#[derive(Debug, Clone)]
pub enum NodePayload {
    /// Directly editable.
    Raw(Pack),
    /// LZF-compressed; `original_len` is the uncompressed size used to
    /// preallocate and sanity-check on decompression.
    Compressed { data: Vec<u8>, original_len: usize },
}

/// One segment of the quicklist's doubly-linked chain.
#[derive(Debug, Clone)]
pub struct QuicklistNode {
    pub(super) prev: Option<usize>,
    pub(super) next: Option<usize>,
    payload: NodePayload,
    /// Set when a node was mutated while compressed-in-place tracking
    /// had marked it as needing re-compression on the next quiescent
    /// pass (`spec.md` 4.2's compress-depth bookkeeping).
    pub(super) needs_recompression: bool,
}

impl QuicklistNode {
    pub(super) fn new(pack: Pack) -> Self {
        QuicklistNode {
            prev: None,
            next: None,
            payload: NodePayload::Raw(pack),
            needs_recompression: false,
        }
    }

    /// Number of elements in this node, without decompressing.
    pub fn count(&self) -> usize {
        match &self.payload {
            NodePayload::Raw(pack) => pack.len(),
            NodePayload::Compressed { .. } => 0,
        }
    }

    /// True if this node currently holds its compressed form.
    pub fn is_compressed(&self) -> bool {
        matches!(self.payload, NodePayload::Compressed { .. })
    }

    /// Byte size of the node as it's currently stored (compressed or
    /// not), used for the quicklist's `fill`-by-bytes accounting.
    pub fn stored_byte_len(&self) -> usize {
        match &self.payload {
            NodePayload::Raw(pack) => pack.byte_len(),
            NodePayload::Compressed { data, .. } => data.len(),
        }
    }

    /// Borrow the pack, decompressing in place first if needed.
    pub fn pack_mut(&mut self) -> &mut Pack {
        self.decompress_in_place();
        match &mut self.payload {
            NodePayload::Raw(pack) => pack,
            NodePayload::Compressed { .. } => unreachable!("just decompressed"),
        }
    }

    /// Decompress this node's payload in place if it is compressed.
    /// A no-op otherwise.
    pub fn decompress_in_place(&mut self) {
        if let NodePayload::Compressed { data, original_len } = &self.payload {
            let bytes = lzf::decompress(data, *original_len)
                .expect("compressed node payload is internally produced and must round-trip");
            self.payload = NodePayload::Raw(Pack::from_raw(bytes));
            self.needs_recompression = true;
        }
    }

    /// Minimum raw size before compression is even attempted.
    const MIN_COMPRESSIBLE_BYTES: usize = 48;
    /// Minimum bytes LZF must shave off for the result to be kept.
    const MIN_SHRINKAGE_BYTES: usize = 8;

    /// Compress this node's payload in place. A no-op if already
    /// compressed, if the node is too small to bother, or if LZF
    /// doesn't shrink it enough to be worth the decompression cost on
    /// the next read. Used for nodes that fall outside the
    /// compress-depth window (`spec.md` 4.2).
    pub fn compress_in_place(&mut self) {
        if let NodePayload::Raw(pack) = &self.payload {
            let raw = pack.as_bytes();
            if raw.len() >= Self::MIN_COMPRESSIBLE_BYTES {
                let compressed = lzf::compress(raw);
                if raw.len().saturating_sub(compressed.len()) >= Self::MIN_SHRINKAGE_BYTES {
                    self.payload = NodePayload::Compressed {
                        data: compressed,
                        original_len: raw.len(),
                    };
                }
            }
            // too small, or incompressible enough, stays raw.
        }
        self.needs_recompression = false;
    }
}
