use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use std::fmt::{Debug, Display};
use tracing::trace;
pub mod redb;

/// The page store the tree is persisted in.
///
/// Implementations must hand back exactly the bytes that were allocated under
/// an id, and must not reuse an id while it is still referenced.
pub trait PageStore {
    /// Persist a new page and return its id. The id is never [`PageId::EMPTY`].
    fn allocate(&mut self, page: &[u8]) -> Result<PageId>;
    /// Read a page from the store.
    fn load(&self, id: PageId) -> Result<Vec<u8>>;
    /// Peek at a page in the store and project it into a value.
    fn peek<T>(&self, id: PageId, f: impl Fn(&[u8]) -> T) -> Result<T>;
    /// Release a page.
    fn free(&mut self, id: PageId) -> Result<()>;
}

impl<S: PageStore> PageStore for &mut S {
    fn allocate(&mut self, page: &[u8]) -> Result<PageId> {
        (**self).allocate(page)
    }

    fn load(&self, id: PageId) -> Result<Vec<u8>> {
        (**self).load(id)
    }

    fn peek<T>(&self, id: PageId, f: impl Fn(&[u8]) -> T) -> Result<T> {
        (**self).peek(id, f)
    }

    fn free(&mut self, id: PageId) -> Result<()> {
        (**self).free(id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemStore {
    pages: HashMap<PageId, Arc<[u8]>>,
    max_id: u64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live pages.
    pub fn size(&self) -> usize {
        self.pages.len()
    }

    pub fn max_id(&self) -> u64 {
        self.max_id
    }

    pub fn total_bytes(&self) -> usize {
        self.pages.values().map(|v| v.len()).sum()
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.pages.contains_key(&id)
    }
}

impl PageStore for MemStore {
    fn allocate(&mut self, page: &[u8]) -> Result<PageId> {
        self.max_id += 1;
        let id = PageId(self.max_id);
        assert!(!id.is_empty());
        trace!("allocate {}", id);
        self.pages.insert(id, page.into());
        Ok(id)
    }

    fn load(&self, id: PageId) -> Result<Vec<u8>> {
        self.peek(id, |data| data.to_vec())
    }

    fn peek<T>(&self, id: PageId, f: impl Fn(&[u8]) -> T) -> Result<T> {
        assert!(!id.is_empty());
        match self.pages.get(&id) {
            Some(data) => Ok(f(data)),
            None => Err(anyhow::anyhow!("page {} not found", id)),
        }
    }

    fn free(&mut self, id: PageId) -> Result<()> {
        assert!(!id.is_empty());
        trace!("free {}", id);
        match self.pages.remove(&id) {
            Some(_) => Ok(()),
            None => Err(anyhow::anyhow!("page {} not found", id)),
        }
    }
}

/// Opaque page handle handed out by a [`PageStore`].
///
/// Stored little endian in the pointer array of internal nodes. Id 0 is
/// reserved for "no page".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PageId(u64);

impl Debug for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

impl Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageId {
    fn from(id: u64) -> Self {
        PageId(id)
    }
}

impl PageId {
    pub const EMPTY: Self = PageId(0);

    pub fn is_empty(&self) -> bool {
        self == &Self::EMPTY
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}
