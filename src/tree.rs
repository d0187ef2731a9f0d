use anyhow::Result;
use genawaiter::sync::{Co, Gen};
use itertools::Itertools;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    fmt::format_bytes,
    layout::{MAX_KEY_SIZE, MAX_VAL_SIZE, PAGE_SIZE},
    mutate::{
        append_entry, leaf_insert, leaf_update, replace_one_child, replace_three_children,
        replace_two_children,
    },
    node::{Node, NodeKind},
    split::{split3, Split},
    PageId, PageStore,
};

/// A B-tree persisted in a [`PageStore`].
///
/// The handle owns nothing but the root page id and the store. Each insert
/// rebuilds the path from the root to the affected leaf into freshly
/// allocated pages. The root id only changes once the whole path has been
/// persisted, and replaced pages are freed after that.
#[derive(Debug)]
pub struct BTree<S> {
    root: PageId,
    store: S,
}

/// Result of asserting invariants for a subtree.
struct AssertInvariantsRes {
    /// distance to the leaves
    depth: usize,
    /// smallest and largest key, none for an empty root
    range: Option<(Vec<u8>, Vec<u8>)>,
}

enum Step {
    Descend(PageId),
    Done(Option<Vec<u8>>),
}

impl<S: PageStore> BTree<S> {
    /// An empty tree.
    pub fn new(store: S) -> Self {
        Self::open(PageId::EMPTY, store)
    }

    /// A tree rooted at `root`, which must be a page in `store` or empty.
    pub fn open(root: PageId, store: S) -> Self {
        Self { root, store }
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn node(&self, id: PageId) -> Result<Node> {
        Ok(Node::new(self.store.load(id)?))
    }

    /// Insert or update `key`.
    ///
    /// Keys must be 1 to 1000 bytes, values at most 3000 bytes. Invalid
    /// input is rejected before the store is touched.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        anyhow::ensure!(
            !key.is_empty() && key.len() <= MAX_KEY_SIZE,
            "key length {} not in 1..={}",
            key.len(),
            MAX_KEY_SIZE
        );
        anyhow::ensure!(
            val.len() <= MAX_VAL_SIZE,
            "value length {} exceeds {}",
            val.len(),
            MAX_VAL_SIZE
        );
        // pages replaced by this insert, freed once the new root is persisted
        let mut retired = Vec::new();
        let node = if self.root.is_empty() {
            Node::empty_leaf()
        } else {
            retired.push(self.root);
            self.node(self.root)?
        };
        let node = self.tree_insert(node, key, val, &mut retired)?;
        let split = split3(node);
        let root = if split.len() == 1 {
            self.store.allocate(split.nodes[0].page_bytes())?
        } else {
            let ids = self.allocate_all(&split)?;
            let mut root = Node::page();
            root.set_header(NodeKind::Internal, split.separators.len());
            for (i, sep) in split.separators.iter().enumerate() {
                append_entry(&mut root, i, ids[i], sep, &[]);
            }
            root.set_ptr(split.separators.len(), ids[ids.len() - 1]);
            debug!("root split into {} children", ids.len());
            self.store.allocate(root.page_bytes())?
        };
        // the new tree is complete, a failing free below only leaks old pages
        self.root = root;
        for id in retired {
            self.store.free(id)?;
        }
        Ok(())
    }

    fn allocate_all(&mut self, split: &Split) -> Result<SmallVec<[PageId; 3]>> {
        split
            .nodes
            .iter()
            .map(|node| self.store.allocate(node.page_bytes()))
            .collect()
    }

    /// Insert into the subtree rooted at `node`, returning its replacement.
    ///
    /// The result is a scratch node that may exceed the page size.
    fn tree_insert(
        &mut self,
        node: Node,
        key: &[u8],
        val: &[u8],
        retired: &mut Vec<PageId>,
    ) -> Result<Node> {
        let (idx, found) = node.lookup(key);
        match node.kind() {
            NodeKind::Leaf => Ok(if found {
                leaf_update(&node, idx, key, val)
            } else {
                leaf_insert(&node, idx, key, val)
            }),
            NodeKind::Internal => {
                // key idx is the smallest key of child idx + 1
                let child = if found { idx + 1 } else { idx };
                let kptr = node.ptr(child);
                let knode = self.node(kptr)?;
                let knode = self.tree_insert(knode, key, val, retired)?;
                let split = split3(knode);
                retired.push(kptr);
                let ids = self.allocate_all(&split)?;
                Ok(match ids.as_slice() {
                    [a] => replace_one_child(&node, child, *a),
                    [a, b] => replace_two_children(&node, child, *a, &split.separators[0], *b),
                    [a, b, c] => replace_three_children(
                        &node,
                        child,
                        *a,
                        &split.separators[0],
                        *b,
                        &split.separators[1],
                        *c,
                    ),
                    _ => unreachable!("split into {} nodes", ids.len()),
                })
            }
        }
    }

    /// Point lookup.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut id = self.root;
        if id.is_empty() {
            return Ok(None);
        }
        loop {
            let step = self.store.peek(id, |page| {
                let node = Node::new(page);
                let (idx, found) = node.lookup(key);
                match node.kind() {
                    NodeKind::Leaf => Step::Done(found.then(|| node.val(idx).to_vec())),
                    NodeKind::Internal => {
                        Step::Descend(node.ptr(if found { idx + 1 } else { idx }))
                    }
                }
            })?;
            match step {
                Step::Descend(child) => id = child,
                Step::Done(value) => return Ok(value),
            }
        }
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + '_ {
        Gen::new(|co| async move {
            if let Err(cause) = self.iter0(self.root, &co).await {
                co.yield_(Err(cause)).await;
            }
        })
        .into_iter()
    }

    async fn iter0(&self, id: PageId, co: &Co<Result<(Vec<u8>, Vec<u8>)>>) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        let node = self.node(id)?;
        match node.kind() {
            NodeKind::Leaf => {
                for i in 0..node.count() {
                    co.yield_(Ok((node.key(i).to_vec(), node.val(i).to_vec())))
                        .await;
                }
            }
            NodeKind::Internal => {
                for i in 0..=node.count() {
                    Box::pin(self.iter0(node.ptr(i), co)).await?;
                }
            }
        }
        Ok(())
    }

    /// Number of entries.
    pub fn count(&self) -> Result<u64> {
        if self.root.is_empty() {
            return Ok(0);
        }
        self.count0(self.root)
    }

    fn count0(&self, id: PageId) -> Result<u64> {
        let node = self.node(id)?;
        Ok(match node.kind() {
            NodeKind::Leaf => node.count() as u64,
            NodeKind::Internal => {
                let mut res = 0;
                for i in 0..=node.count() {
                    res += self.count0(node.ptr(i))?;
                }
                res
            }
        })
    }

    /// Number of levels, 0 for an empty tree.
    pub fn depth(&self) -> Result<usize> {
        let mut id = self.root;
        let mut depth = 0;
        while !id.is_empty() {
            depth += 1;
            id = self.store.peek(id, |page| {
                let node = Node::new(page);
                match node.kind() {
                    NodeKind::Leaf => PageId::EMPTY,
                    NodeKind::Internal => node.ptr(0),
                }
            })?;
        }
        Ok(depth)
    }

    /// Check the structural invariants of every page reachable from the root.
    ///
    /// Panics on a violation, fails only if a page can not be loaded.
    pub fn assert_invariants(&self) -> Result<()> {
        if !self.root.is_empty() {
            self.assert_invariants0(self.root, true)?;
        }
        Ok(())
    }

    fn assert_invariants0(&self, id: PageId, is_root: bool) -> Result<AssertInvariantsRes> {
        let page = self.store.load(id)?;
        assert_eq!(page.len(), PAGE_SIZE, "page {} has the wrong size", id);
        let node = Node::new(page);
        assert!(node.fits_page(), "page {} holds {} bytes", id, node.nbytes());
        assert!(is_root || node.count() > 0, "page {} is empty", id);
        assert!(
            node.keys().tuple_windows().all(|(a, b)| a < b),
            "keys of page {} are not strictly increasing",
            id
        );
        for i in 0..node.count() {
            let len = node.key(i).len();
            assert!(len > 0 && len <= MAX_KEY_SIZE, "key of {} bytes", len);
            match node.kind() {
                NodeKind::Leaf => assert!(node.val(i).len() <= MAX_VAL_SIZE),
                NodeKind::Internal => assert!(node.val(i).is_empty()),
            }
        }
        match node.kind() {
            NodeKind::Leaf => Ok(AssertInvariantsRes {
                depth: 0,
                range: (node.count() > 0).then(|| {
                    (
                        node.key(0).to_vec(),
                        node.key(node.count() - 1).to_vec(),
                    )
                }),
            }),
            NodeKind::Internal => {
                assert!(node.count() > 0, "internal page {} has no keys", id);
                let mut depth = None;
                let mut min = None;
                let mut max = None;
                for i in 0..=node.count() {
                    let res = self.assert_invariants0(node.ptr(i), false)?;
                    match depth {
                        None => depth = Some(res.depth),
                        Some(depth) => assert_eq!(depth, res.depth, "leaves at unequal depth"),
                    }
                    let (lo, hi) = res.range.expect("non root subtrees are not empty");
                    if i > 0 {
                        assert_eq!(
                            node.key(i - 1),
                            lo.as_slice(),
                            "separator is not the smallest key of its right subtree"
                        );
                    }
                    if i < node.count() {
                        assert_lt!(hi.as_slice(), node.key(i));
                    }
                    if i == 0 {
                        min = Some(lo);
                    }
                    max = Some(hi);
                }
                Ok(AssertInvariantsRes {
                    depth: depth.unwrap_or_default() + 1,
                    range: min.zip(max),
                })
            }
        }
    }

    pub fn dump(&self) -> Result<()> {
        if self.root.is_empty() {
            println!("Empty");
            return Ok(());
        }
        self.dump0("".into(), self.root)
    }

    fn dump0(&self, prefix: String, id: PageId) -> Result<()> {
        let node = self.node(id)?;
        match node.kind() {
            NodeKind::Leaf => {
                println!("{}leaf {} nbytes={}", prefix, id, node.nbytes());
                for i in 0..node.count() {
                    println!(
                        "{}  {} = {}",
                        prefix,
                        format_bytes(node.key(i)),
                        format_bytes(node.val(i))
                    );
                }
            }
            NodeKind::Internal => {
                println!("{}internal {} nbytes={}", prefix, id, node.nbytes());
                for i in 0..=node.count() {
                    if i > 0 {
                        println!("{}{}:", prefix, format_bytes(node.key(i - 1)));
                    }
                    self.dump0(format!("{}  ", prefix), node.ptr(i))?;
                }
            }
        }
        Ok(())
    }
}
