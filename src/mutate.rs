//! Builders that produce a new node from an existing one plus one change.
//!
//! The source node is never modified. Every entry written to the target gets
//! its offset derived from the entry before it, since the target's pointer
//! and offset arrays generally have a different size than the source's.
use crate::{
    layout::write_u16,
    node::{Node, NodeKind},
    PageId,
};

/// Write entry `idx` of `target`.
///
/// The header of `target` must already hold the final kind and count, and
/// entries `0..idx` must already be written. `ptr` is ignored for leaves.
pub fn append_entry<T: AsRef<[u8]> + AsMut<[u8]>>(
    target: &mut Node<T>,
    idx: usize,
    ptr: PageId,
    key: &[u8],
    val: &[u8],
) {
    if target.kind() == NodeKind::Internal {
        target.set_ptr(idx, ptr);
    }
    if idx > 0 {
        let offset = target.entry_end(idx - 1);
        target.set_offset(idx, offset);
    }
    let key_len = u16::try_from(key.len()).expect("key length fits in u16");
    let val_len = u16::try_from(val.len()).expect("value length fits in u16");
    let pos = target.kv_pos(idx);
    let buf = target.bytes_mut();
    let key_start = pos + 2;
    let val_start = key_start + key.len() + 2;
    write_u16(buf, pos, key_len);
    buf[key_start..key_start + key.len()].copy_from_slice(key);
    write_u16(buf, key_start + key.len(), val_len);
    buf[val_start..val_start + val.len()].copy_from_slice(val);
}

/// Copy `n` entries from `source[src..]` to `target[dst..]`.
///
/// For internal nodes this also copies the pointer that follows the last
/// copied entry, so the range `src..=src + n` of pointers is transferred.
pub fn append_range<T, U>(target: &mut Node<T>, source: &Node<U>, dst: usize, src: usize, n: usize)
where
    T: AsRef<[u8]> + AsMut<[u8]>,
    U: AsRef<[u8]>,
{
    let kind = source.kind();
    assert_eq!(target.kind(), kind, "append_range across node kinds");
    assert!(src + n <= source.count(), "source range out of bounds");
    assert!(dst + n <= target.count(), "target range out of bounds");
    for i in 0..n {
        let ptr = match kind {
            NodeKind::Internal => source.ptr(src + i),
            NodeKind::Leaf => PageId::EMPTY,
        };
        append_entry(target, dst + i, ptr, source.key(src + i), source.val(src + i));
    }
    if kind == NodeKind::Internal {
        target.set_ptr(dst + n, source.ptr(src + n));
    }
}

/// A copy of leaf `old` with `(key, val)` inserted at `idx`.
pub fn leaf_insert<T: AsRef<[u8]>>(old: &Node<T>, idx: usize, key: &[u8], val: &[u8]) -> Node {
    assert_eq!(old.kind(), NodeKind::Leaf);
    assert!(idx <= old.count());
    let mut new = Node::scratch();
    new.set_header(NodeKind::Leaf, old.count() + 1);
    append_range(&mut new, old, 0, 0, idx);
    append_entry(&mut new, idx, PageId::EMPTY, key, val);
    append_range(&mut new, old, idx + 1, idx, old.count() - idx);
    new
}

/// A copy of leaf `old` with entry `idx` replaced by `(key, val)`.
pub fn leaf_update<T: AsRef<[u8]>>(old: &Node<T>, idx: usize, key: &[u8], val: &[u8]) -> Node {
    assert_eq!(old.kind(), NodeKind::Leaf);
    assert!(idx < old.count());
    let mut new = Node::scratch();
    new.set_header(NodeKind::Leaf, old.count());
    append_range(&mut new, old, 0, 0, idx);
    append_entry(&mut new, idx, PageId::EMPTY, key, val);
    append_range(&mut new, old, idx + 1, idx + 1, old.count() - idx - 1);
    new
}

/// A copy of internal node `old` where child `idx` is replaced by `kids`.
///
/// `separators[i]` is the smallest key reachable through `kids[i + 1]`. The
/// key that followed the replaced child, if any, now follows the last kid.
fn replace_children<T: AsRef<[u8]>>(
    old: &Node<T>,
    idx: usize,
    kids: &[PageId],
    separators: &[&[u8]],
) -> Node {
    assert_eq!(old.kind(), NodeKind::Internal);
    assert!(idx <= old.count(), "child index {} out of range", idx);
    assert_eq!(kids.len(), separators.len() + 1);
    let count = old.count();
    let mut new = Node::scratch();
    new.set_header(NodeKind::Internal, count + separators.len());
    append_range(&mut new, old, 0, 0, idx);
    for (i, &kid) in kids.iter().enumerate() {
        match separators.get(i) {
            Some(sep) => append_entry(&mut new, idx + i, kid, sep, &[]),
            None if idx < count => append_entry(&mut new, idx + i, kid, old.key(idx), &[]),
            None => new.set_ptr(idx + i, kid),
        }
    }
    if idx < count {
        append_range(&mut new, old, idx + kids.len(), idx + 1, count - idx - 1);
    }
    new
}

pub fn replace_one_child<T: AsRef<[u8]>>(old: &Node<T>, idx: usize, ptr: PageId) -> Node {
    replace_children(old, idx, &[ptr], &[])
}

pub fn replace_two_children<T: AsRef<[u8]>>(
    old: &Node<T>,
    idx: usize,
    ptr0: PageId,
    key1: &[u8],
    ptr1: PageId,
) -> Node {
    replace_children(old, idx, &[ptr0, ptr1], &[key1])
}

pub fn replace_three_children<T: AsRef<[u8]>>(
    old: &Node<T>,
    idx: usize,
    ptr0: PageId,
    key1: &[u8],
    ptr1: PageId,
    key2: &[u8],
    ptr2: PageId,
) -> Node {
    replace_children(old, idx, &[ptr0, ptr1, ptr2], &[key1, key2])
}

/// Merge two adjacent leaves into one.
pub fn merge_leaves<T: AsRef<[u8]>, U: AsRef<[u8]>>(left: &Node<T>, right: &Node<U>) -> Node {
    assert_eq!(left.kind(), NodeKind::Leaf);
    assert_eq!(right.kind(), NodeKind::Leaf);
    let mut new = Node::scratch();
    new.set_header(NodeKind::Leaf, left.count() + right.count());
    append_range(&mut new, left, 0, 0, left.count());
    append_range(&mut new, right, left.count(), 0, right.count());
    assert!(new.fits_page(), "merged node exceeds the page size");
    new
}

/// Merge two adjacent internal nodes, pulling `separator` down between them.
pub fn merge_internal<T: AsRef<[u8]>, U: AsRef<[u8]>>(
    left: &Node<T>,
    separator: &[u8],
    right: &Node<U>,
) -> Node {
    assert_eq!(left.kind(), NodeKind::Internal);
    assert_eq!(right.kind(), NodeKind::Internal);
    let n = left.count();
    let mut new = Node::scratch();
    new.set_header(NodeKind::Internal, n + 1 + right.count());
    append_range(&mut new, left, 0, 0, n);
    append_entry(&mut new, n, left.ptr(n), separator, &[]);
    append_range(&mut new, right, n + 1, 0, right.count());
    assert!(new.fits_page(), "merged node exceeds the page size");
    new
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(entries: &[(&str, &str)]) -> Node {
        let mut node = Node::page();
        node.set_header(NodeKind::Leaf, entries.len());
        for (i, (k, v)) in entries.iter().enumerate() {
            append_entry(&mut node, i, PageId::EMPTY, k.as_bytes(), v.as_bytes());
        }
        node
    }

    /// An internal node with `keys.len() + 1` children numbered from 100.
    fn internal(keys: &[&str]) -> Node {
        let mut node = Node::page();
        node.set_header(NodeKind::Internal, keys.len());
        for (i, k) in keys.iter().enumerate() {
            append_entry(&mut node, i, PageId::from(100 + i as u64), k.as_bytes(), b"");
        }
        node.set_ptr(keys.len(), PageId::from(100 + keys.len() as u64));
        node
    }

    fn entries(node: &Node) -> Vec<(String, String)> {
        (0..node.count())
            .map(|i| {
                (
                    String::from_utf8_lossy(node.key(i)).into_owned(),
                    String::from_utf8_lossy(node.val(i)).into_owned(),
                )
            })
            .collect()
    }

    fn ptrs(node: &Node) -> Vec<u64> {
        (0..=node.count()).map(|i| node.ptr(i).get()).collect()
    }

    fn keys(node: &Node) -> Vec<String> {
        entries(node).into_iter().map(|(k, _)| k).collect()
    }

    fn owned(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn insert_front_middle_back() {
        let old = leaf(&[("b", "2"), ("d", "4")]);
        let new = leaf_insert(&old, 0, b"a", b"1");
        assert_eq!(entries(&new), owned(&[("a", "1"), ("b", "2"), ("d", "4")]));
        let new = leaf_insert(&old, 1, b"c", b"3");
        assert_eq!(entries(&new), owned(&[("b", "2"), ("c", "3"), ("d", "4")]));
        let new = leaf_insert(&old, 2, b"e", b"");
        assert_eq!(entries(&new), owned(&[("b", "2"), ("d", "4"), ("e", "")]));
        // copy on write
        assert_eq!(entries(&old), owned(&[("b", "2"), ("d", "4")]));
    }

    #[test]
    fn insert_into_empty_leaf() {
        let new = leaf_insert(&Node::empty_leaf(), 0, b"nishant", b"goodboy");
        assert_eq!(entries(&new), owned(&[("nishant", "goodboy")]));
    }

    #[test]
    fn update_changes_value_length() {
        let old = leaf(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let new = leaf_update(&old, 1, b"b", b"a much longer value");
        assert_eq!(
            entries(&new),
            owned(&[("a", "1"), ("b", "a much longer value"), ("c", "3")])
        );
        assert_eq!(new.nbytes(), old.nbytes() + "a much longer value".len() - 1);
        let new = leaf_update(&old, 2, b"c", b"");
        assert_eq!(entries(&new), owned(&[("a", "1"), ("b", "2"), ("c", "")]));
    }

    #[test]
    fn append_range_rederives_offsets() {
        // copying between nodes of different counts moves the entry region
        let old = leaf(&[("a", "1"), ("bb", "22"), ("ccc", "333")]);
        let mut new = Node::page();
        new.set_header(NodeKind::Leaf, 2);
        append_range(&mut new, &old, 0, 1, 2);
        assert_eq!(entries(&new), owned(&[("bb", "22"), ("ccc", "333")]));
        assert_eq!(new.offset(1), 8);
    }

    #[test]
    fn append_range_internal_copies_trailing_pointer() {
        let old = internal(&["m", "t"]);
        let mut new = Node::page();
        new.set_header(NodeKind::Internal, 1);
        append_range(&mut new, &old, 0, 1, 1);
        assert_eq!(keys(&new), vec!["t"]);
        assert_eq!(ptrs(&new), vec![101, 102]);
    }

    #[test]
    #[should_panic(expected = "across node kinds")]
    fn append_range_rejects_kind_mismatch() {
        let old = internal(&["m"]);
        let mut new = Node::page();
        new.set_header(NodeKind::Leaf, 1);
        append_range(&mut new, &old, 0, 0, 1);
    }

    #[test]
    fn replace_one() {
        let old = internal(&["m", "t"]);
        let new = replace_one_child(&old, 1, PageId::from(7));
        assert_eq!(keys(&new), vec!["m", "t"]);
        assert_eq!(ptrs(&new), vec![100, 7, 102]);
    }

    #[test]
    fn replace_two_in_the_middle() {
        let old = internal(&["m", "t"]);
        let new = replace_two_children(&old, 1, PageId::from(7), b"p", PageId::from(8));
        assert_eq!(keys(&new), vec!["m", "p", "t"]);
        assert_eq!(ptrs(&new), vec![100, 7, 8, 102]);
    }

    #[test]
    fn replace_two_first_and_last_child() {
        let old = internal(&["m", "t"]);
        let new = replace_two_children(&old, 0, PageId::from(7), b"f", PageId::from(8));
        assert_eq!(keys(&new), vec!["f", "m", "t"]);
        assert_eq!(ptrs(&new), vec![7, 8, 101, 102]);
        let new = replace_two_children(&old, 2, PageId::from(7), b"x", PageId::from(8));
        assert_eq!(keys(&new), vec!["m", "t", "x"]);
        assert_eq!(ptrs(&new), vec![100, 101, 7, 8]);
    }

    #[test]
    fn replace_three() {
        let old = internal(&["m", "t"]);
        let new = replace_three_children(
            &old,
            1,
            PageId::from(7),
            b"o",
            PageId::from(8),
            b"q",
            PageId::from(9),
        );
        assert_eq!(keys(&new), vec!["m", "o", "q", "t"]);
        assert_eq!(ptrs(&new), vec![100, 7, 8, 9, 102]);
        let new = replace_three_children(
            &old,
            2,
            PageId::from(7),
            b"u",
            PageId::from(8),
            b"w",
            PageId::from(9),
        );
        assert_eq!(keys(&new), vec!["m", "t", "u", "w"]);
        assert_eq!(ptrs(&new), vec![100, 101, 7, 8, 9]);
    }

    #[test]
    fn merge_leaves_concatenates() {
        let left = leaf(&[("a", "1"), ("b", "2")]);
        let right = leaf(&[("c", "3")]);
        let merged = merge_leaves(&left, &right);
        assert_eq!(entries(&merged), owned(&[("a", "1"), ("b", "2"), ("c", "3")]));
    }

    #[test]
    fn merge_internal_pulls_separator_down() {
        let left = internal(&["b"]);
        let right = internal(&["y"]);
        let merged = merge_internal(&left, b"m", &right);
        assert_eq!(keys(&merged), vec!["b", "m", "y"]);
        assert_eq!(ptrs(&merged), vec![100, 101, 100, 101]);
    }

    #[test]
    #[should_panic]
    fn merge_rejects_mixed_kinds() {
        merge_leaves(&leaf(&[("a", "1")]), &internal(&["m"]));
    }
}
