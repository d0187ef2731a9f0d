//! Splitting of oversized scratch nodes into page sized nodes.
//!
//! Entries vary in size, so the split point is chosen by encoded bytes, not
//! by key count.
use smallvec::{smallvec, SmallVec};
use tracing::trace;

use crate::{
    layout::{prefix_size, PAGE_SIZE},
    mutate::append_range,
    node::{Node, NodeKind},
};

/// Result of [`split3`].
///
/// `separators[i]` is the smallest key reachable through `nodes[i + 1]`.
#[derive(Debug)]
pub struct Split {
    pub nodes: SmallVec<[Node; 3]>,
    pub separators: SmallVec<[Vec<u8>; 2]>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Split `old` in two, returning `(left, separator, right)`.
///
/// The right node is guaranteed to fit in a page, the left one may not.
/// For a leaf the separator is the first key of the right node. For an
/// internal node the separator key moves up and is stored in neither half.
pub fn split2<T: AsRef<[u8]>>(old: &Node<T>) -> (Node, Vec<u8>, Node) {
    let kind = old.kind();
    let count = old.count();
    let promoted = usize::from(kind == NodeKind::Internal);
    assert!(
        count >= 2 + promoted,
        "cannot split {:?} node with {} keys",
        kind,
        count
    );
    let data_end = old.entry_end(count - 1);
    let left_bytes = |s: usize| prefix_size(kind.to_raw(), s) + old.offset(s);
    let right_bytes = |s: usize| {
        let first = s + promoted;
        prefix_size(kind.to_raw(), count - first) + data_end - old.offset(first)
    };
    let max = count - 1 - promoted;
    let mut s = count / 2;
    // a big entry left of the middle can overflow the left half even when the
    // right one fits, so shrink the left side first
    while s > 1 && left_bytes(s) > PAGE_SIZE {
        s -= 1;
    }
    while s < max && right_bytes(s) > PAGE_SIZE {
        s += 1;
    }
    trace!(
        "split {:?} node of {} keys at {}, right half {} bytes",
        kind,
        count,
        s,
        right_bytes(s)
    );

    let mut left = Node::scratch();
    left.set_header(kind, s);
    append_range(&mut left, old, 0, 0, s);

    let first = s + promoted;
    let mut right = Node::scratch();
    right.set_header(kind, count - first);
    append_range(&mut right, old, 0, first, count - first);
    assert!(
        right.fits_page(),
        "right half of split is {} bytes",
        right.nbytes()
    );

    (left, old.key(s).to_vec(), right)
}

/// Split `old` into one, two or three page sized nodes.
pub fn split3(old: Node) -> Split {
    if old.fits_page() {
        return Split {
            nodes: smallvec![old],
            separators: SmallVec::new(),
        };
    }
    let (left, sep, right) = split2(&old);
    if left.fits_page() {
        return Split {
            nodes: smallvec![left, right],
            separators: smallvec![sep],
        };
    }
    let (leftleft, sep0, middle) = split2(&left);
    assert!(
        leftleft.fits_page(),
        "three way split left {} bytes",
        leftleft.nbytes()
    );
    Split {
        nodes: smallvec![leftleft, middle, right],
        separators: smallvec![sep0, sep],
    }
}
