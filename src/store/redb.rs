use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use tracing::trace;

use super::{PageId, PageStore, Result};

/// A [`PageStore`] backed by a redb database.
///
/// Pages live in a single table keyed by page id. Mutations go through a
/// [`WriteBatch`], so allocations and frees only become visible once the batch
/// is committed. The tree root is recorded in the same transaction.
pub struct RedbPageStore {
    db: Database,
}

const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");
const PAGE_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("pages");

const NEXT_ID_KEY: &str = "next_id";
const ROOT_KEY: &str = "root";

impl RedbPageStore {
    /// Create a new instance of the RedbPageStore.
    pub fn new(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())?;
        Self::create_tables(&db)?;
        Ok(Self { db })
    }

    pub fn memory() -> Result<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::create_tables(&db)?;
        Ok(Self { db })
    }

    fn create_tables(db: &redb::Database) -> Result<()> {
        let txn = db.begin_write()?;
        txn.open_table(META_TABLE)?;
        txn.open_table(PAGE_TABLE)?;
        txn.commit()?;
        Ok(())
    }

    /// The root recorded by the last committed batch, or [`PageId::EMPTY`].
    pub fn root(&self) -> Result<PageId> {
        let txn = self.db.begin_read()?;
        let meta = txn.open_table(META_TABLE)?;
        let root = meta.get(ROOT_KEY)?.map(|v| v.value()).unwrap_or_default();
        Ok(PageId::from(root))
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let txn = self.db.begin_read()?;
        Ok(Snapshot {
            pages: txn.open_table(PAGE_TABLE)?,
        })
    }

    pub fn txn(&self) -> Result<WriteBatch> {
        Ok(WriteBatch(self.db.begin_write()?))
    }
}

/// A read-only view of the committed pages.
pub struct Snapshot {
    pages: redb::ReadOnlyTable<u64, &'static [u8]>,
}

impl PageStore for Snapshot {
    fn load(&self, id: PageId) -> Result<Vec<u8>> {
        self.peek(id, |x| x.to_vec())
    }

    fn peek<T>(&self, id: PageId, f: impl Fn(&[u8]) -> T) -> Result<T> {
        match self.pages.get(id.get())? {
            Some(value) => Ok(f(value.value())),
            None => Err(anyhow::anyhow!("page {} not found", id)),
        }
    }

    fn allocate(&mut self, _page: &[u8]) -> Result<PageId> {
        anyhow::bail!("Cannot allocate pages in a snapshot")
    }

    fn free(&mut self, _id: PageId) -> Result<()> {
        anyhow::bail!("Cannot free pages in a snapshot")
    }
}

/// A write transaction over the page table.
///
/// Dropping the batch without calling [`WriteBatch::commit`] discards every
/// allocation and free made through it.
pub struct WriteBatch(WriteTransaction);

impl WriteBatch {
    /// Record the tree root, to be published by [`WriteBatch::commit`].
    pub fn set_root(&mut self, root: PageId) -> Result<()> {
        let mut meta = self.0.open_table(META_TABLE)?;
        meta.insert(ROOT_KEY, root.get())?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.0.commit()?;
        Ok(())
    }
}

impl PageStore for WriteBatch {
    fn allocate(&mut self, page: &[u8]) -> Result<PageId> {
        let id = {
            let mut meta = self.0.open_table(META_TABLE)?;
            let current = meta
                .get(NEXT_ID_KEY)?
                .map(|v| v.value())
                .unwrap_or_default();
            let next = current + 1;
            meta.insert(NEXT_ID_KEY, next)?;
            PageId::from(next)
        };
        let mut pages = self.0.open_table(PAGE_TABLE)?;
        pages.insert(id.get(), page)?;
        trace!("allocate {}", id);
        Ok(id)
    }

    fn load(&self, id: PageId) -> Result<Vec<u8>> {
        self.peek(id, |x| x.to_vec())
    }

    fn peek<T>(&self, id: PageId, f: impl Fn(&[u8]) -> T) -> Result<T> {
        let pages = self.0.open_table(PAGE_TABLE)?;
        let res = match pages.get(id.get())? {
            Some(value) => Ok(f(value.value())),
            None => Err(anyhow::anyhow!("page {} not found", id)),
        };
        res
    }

    fn free(&mut self, id: PageId) -> Result<()> {
        let mut pages = self.0.open_table(PAGE_TABLE)?;
        let removed = pages.remove(id.get())?.is_some();
        anyhow::ensure!(removed, "page {} not found", id);
        trace!("free {}", id);
        Ok(())
    }
}
