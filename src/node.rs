//! The node codec.
//!
//! A [`Node`] is a byte buffer interpreted according to [`crate::layout`].
//! It has no tree logic, only position math and the binary search used to
//! route a key. Persisted nodes are exactly one page. Scratch nodes are two
//! pages and may exceed the page budget until they are split.
use std::{cmp::Ordering, fmt::Debug};

use zerocopy::FromBytes;

use crate::{
    fmt::{format_bytes, NoQuotes},
    layout::{
        entry_size, prefix_size, ptr_slots, read_u16, read_u64, write_u16, write_u64, Header,
        HEADER_SIZE, KIND_INTERNAL, KIND_LEAF, OFFSET_SIZE, PAGE_SIZE, PTR_SIZE, SCRATCH_SIZE,
    },
    PageId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Internal,
    Leaf,
}

impl NodeKind {
    pub fn to_raw(self) -> u16 {
        match self {
            NodeKind::Internal => KIND_INTERNAL,
            NodeKind::Leaf => KIND_LEAF,
        }
    }

    pub fn from_raw(raw: u16) -> Self {
        match raw {
            KIND_INTERNAL => NodeKind::Internal,
            KIND_LEAF => NodeKind::Leaf,
            _ => panic!("invalid node kind {}", raw),
        }
    }
}

/// A node, backed by an owned buffer or a borrowed page.
#[derive(Clone, PartialEq, Eq)]
pub struct Node<T = Vec<u8>>(T);

impl Node {
    /// A zeroed, page sized buffer without a valid header.
    pub fn page() -> Self {
        Node(vec![0; PAGE_SIZE])
    }

    /// A zeroed, double page sized buffer without a valid header.
    pub fn scratch() -> Self {
        Node(vec![0; SCRATCH_SIZE])
    }

    /// An empty leaf, the root of an empty tree.
    pub fn empty_leaf() -> Self {
        let mut node = Node::page();
        node.set_header(NodeKind::Leaf, 0);
        node
    }
}

impl<T: AsRef<[u8]>> Node<T> {
    pub fn new(data: T) -> Self {
        assert!(data.as_ref().len() >= HEADER_SIZE, "node shorter than header");
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Borrow the node.
    pub fn as_ref(&self) -> Node<&[u8]> {
        Node(self.0.as_ref())
    }

    fn header(&self) -> &Header {
        Header::ref_from_prefix(self.0.as_ref()).expect("buffer holds a header")
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from_raw(self.header().kind.get())
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == NodeKind::Leaf
    }

    /// Number of keys.
    pub fn count(&self) -> usize {
        self.header().count.get() as usize
    }

    fn ptr_slots(&self) -> usize {
        ptr_slots(self.kind().to_raw(), self.count())
    }

    /// Child pointer `idx`. Leaves have a reserved slot per key, always empty.
    pub fn ptr(&self, idx: usize) -> PageId {
        assert!(
            idx < self.ptr_slots(),
            "pointer index {} out of range for {:?} node with {} keys",
            idx,
            self.kind(),
            self.count()
        );
        PageId::from(read_u64(self.as_bytes(), HEADER_SIZE + PTR_SIZE * idx))
    }

    fn offset_pos(&self, idx: usize) -> usize {
        HEADER_SIZE + PTR_SIZE * self.ptr_slots() + OFFSET_SIZE * (idx - 1)
    }

    /// Position of entry `idx`, relative to the start of the entries.
    pub fn offset(&self, idx: usize) -> usize {
        assert!(idx < self.count(), "entry index {} out of range", idx);
        if idx == 0 {
            return 0;
        }
        read_u16(self.as_bytes(), self.offset_pos(idx)) as usize
    }

    /// Absolute position of entry `idx` in the buffer.
    pub fn kv_pos(&self, idx: usize) -> usize {
        prefix_size(self.kind().to_raw(), self.count()) + self.offset(idx)
    }

    pub fn key(&self, idx: usize) -> &[u8] {
        let pos = self.kv_pos(idx);
        let data = self.as_bytes();
        let key_len = read_u16(data, pos) as usize;
        &data[pos + 2..pos + 2 + key_len]
    }

    pub fn val(&self, idx: usize) -> &[u8] {
        let pos = self.kv_pos(idx);
        let data = self.as_bytes();
        let key_len = read_u16(data, pos) as usize;
        let val_len = read_u16(data, pos + 2 + key_len) as usize;
        &data[pos + 4 + key_len..pos + 4 + key_len + val_len]
    }

    /// End of entry `idx`, relative to the start of the entries.
    pub fn entry_end(&self, idx: usize) -> usize {
        let pos = self.kv_pos(idx);
        let data = self.as_bytes();
        let key_len = read_u16(data, pos) as usize;
        let val_len = read_u16(data, pos + 2 + key_len) as usize;
        self.offset(idx) + entry_size(key_len, val_len)
    }

    /// Total encoded size.
    pub fn nbytes(&self) -> usize {
        let count = self.count();
        let prefix = prefix_size(self.kind().to_raw(), count);
        if count == 0 {
            prefix
        } else {
            prefix + self.entry_end(count - 1)
        }
    }

    pub fn fits_page(&self) -> bool {
        self.nbytes() <= PAGE_SIZE
    }

    /// The page image to persist.
    pub fn page_bytes(&self) -> &[u8] {
        let nbytes = self.nbytes();
        assert!(
            nbytes <= PAGE_SIZE,
            "node of {} bytes exceeds the page size",
            nbytes
        );
        &self.as_bytes()[..PAGE_SIZE]
    }

    /// Binary search for `key`.
    ///
    /// Returns the index of the key and true on an exact match. Otherwise
    /// returns the index the key would be inserted at, which for an internal
    /// node is also the child to descend into.
    pub fn lookup(&self, key: &[u8]) -> (usize, bool) {
        let mut lo = 0;
        let mut hi = self.count();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key(mid).cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return (mid, true),
            }
        }
        (lo, false)
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.count()).map(move |i| self.key(i))
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Node<T> {
    /// Set kind and key count. Must happen before any entry is written, since
    /// the positions of all entries depend on both.
    pub fn set_header(&mut self, kind: NodeKind, count: usize) {
        let count = u16::try_from(count).expect("key count fits in u16");
        let header = Header::mut_from_prefix(self.0.as_mut()).expect("buffer holds a header");
        header.kind.set(kind.to_raw());
        header.count.set(count);
    }

    pub fn set_ptr(&mut self, idx: usize, ptr: PageId) {
        assert!(idx < self.ptr_slots(), "pointer index {} out of range", idx);
        write_u64(self.0.as_mut(), HEADER_SIZE + PTR_SIZE * idx, ptr.get());
    }

    pub fn set_offset(&mut self, idx: usize, offset: usize) {
        assert!(
            idx > 0 && idx < self.count(),
            "offset index {} out of range",
            idx
        );
        let offset = u16::try_from(offset).expect("offset fits in u16");
        let pos = self.offset_pos(idx);
        write_u16(self.0.as_mut(), pos, offset);
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.0.as_mut()
    }
}

impl<T: AsRef<[u8]>> Debug for Node<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.keys().map(format_bytes).collect::<Vec<_>>();
        let keys = keys.iter().map(|k| NoQuotes(k)).collect::<Vec<_>>();
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("count", &self.count())
            .field("nbytes", &self.nbytes())
            .field("keys", &keys)
            .finish()
    }
}
