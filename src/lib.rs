//! A copy on write B-tree over fixed size pages.
//!
//! Keys and values are byte strings. Each node of the tree is encoded into a
//! single page of [`PAGE_SIZE`] bytes, see [`layout`] for the exact format.
//! Pages live in an external [`PageStore`] that hands out opaque [`PageId`]s.
//!
//! # Node format
//!
//! A node is either a leaf, holding key/value entries, or an internal node,
//! holding `count` separator keys and `count + 1` child pointers. Separator
//! `i` is the smallest key reachable through child `i + 1`. Entries are
//! variable sized and located through an offset table, so a node can hold
//! anything from a few hundred tiny entries to a single maximal one.
//!
//! # Insertion
//!
//! Nodes are never modified in place. An insert walks from the root to the
//! leaf the key belongs in and builds a new version of every node on that
//! path:
//!
//! - the leaf gets the new entry (or the updated value) in a scratch buffer
//!   of two pages;
//! - if the result does not fit a page it is split by encoded size into two
//!   or, for very uneven entries, three nodes;
//! - the new nodes are allocated and the parent is rebuilt with one, two or
//!   three child pointers in place of the old one, which may in turn make
//!   the parent overflow.
//!
//! If the root itself splits, a new internal root is created above the
//! parts. This is the only way the tree grows in height, so all leaves stay
//! at the same depth.
//!
//! # Persistence
//!
//! The root id of the [`BTree`] handle switches to the new tree as soon as
//! its root page has been allocated, and only then are the replaced pages
//! freed. A failure before the switch leaves the old tree in place, a failure
//! while freeing leaks old pages but keeps the new tree readable. With a
//! transactional store such as [`RedbPageStore`] the whole insert becomes
//! visible atomically when the caller commits.
macro_rules! assert_lt {
    ($left:expr, $right:expr) => {
        assert!($left < $right, "{:?} < {:?}", $left, $right)
    };
}

mod fmt;
pub mod layout;
pub mod mutate;
pub mod node;
pub mod split;
mod store;
mod tree;

pub use layout::{MAX_KEY_SIZE, MAX_VAL_SIZE, PAGE_SIZE};
pub use node::{Node, NodeKind};
pub use split::{split2, split3, Split};
pub use store::{
    redb::{RedbPageStore, Snapshot, WriteBatch},
    MemStore, PageId, PageStore,
};
pub use tree::BTree;
