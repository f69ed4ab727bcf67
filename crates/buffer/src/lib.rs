//! Fixed-capacity LRU page cache sitting between the table/index managers
//! and the paged-file substrate (spec §4.2).
//!
//! A `BufferPool` caches fixed-size pages from a backing [`PageStore`]. When
//! capacity is exceeded, the least-recently-used frame is evicted; if dirty,
//! its bytes are written back to the store first. Within one operation the
//! buffer returned by `get_mut` is stable until the next call that might
//! evict it — the caller owns it until then, matching spec's ordering
//! guarantee.


use common::DbResult;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Backing store a [`BufferPool`] loads pages from and writes them back to.
/// Implemented by `storage::PagedFile` for both table files and B+-tree
/// index files.
pub trait PageStore {
    fn page_size(&self) -> u64;
    fn num_pages(&self) -> u64;
    fn allocate_page(&mut self) -> DbResult<u64>;
    fn read_page(&mut self, id: u64) -> DbResult<Vec<u8>>;
    fn write_page(&mut self, id: u64, data: &[u8]) -> DbResult<()>;
}

struct Frame {
    data: Vec<u8>,
    dirty: bool,
}

/// Fixed-capacity frame cache with dirty tracking and write-back on
/// eviction/flush.
pub struct BufferPool<S: PageStore> {
    store: S,
    capacity: usize,
    cache: LruCache<u64, Frame>,
}

impl<S: PageStore> BufferPool<S> {
    pub fn new(store: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            capacity,
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.store.page_size()
    }

    pub fn num_pages(&self) -> u64 {
        self.store.num_pages()
    }

    /// Evict the least-recently-used frame, writing it back first if dirty.
    /// A no-op while the cache has free capacity.
    fn evict_if_full(&mut self) -> DbResult<()> {
        if self.cache.len() < self.capacity {
            return Ok(());
        }
        if let Some((evicted_id, frame)) = self.cache.pop_lru() {
            if frame.dirty {
                self.store.write_page(evicted_id, &frame.data)?;
            }
        }
        Ok(())
    }

    /// Fetch a page into the cache (loading and evicting as needed) and
    /// return a mutable handle to its bytes. Mirrors spec §4.2's
    /// `find(page_id, evict_cb)` contract, with write-back folded in.
    pub fn get_mut(&mut self, id: u64) -> DbResult<&mut Vec<u8>> {
        if !self.cache.contains(&id) {
            self.evict_if_full()?;
            let data = self.store.read_page(id)?;
            self.cache.put(id, Frame { data, dirty: false });
        } else {
            self.cache.promote(&id);
        }
        Ok(&mut self.cache.get_mut(&id).expect("just loaded").data)
    }

    /// Mark a cached page dirty so it is written back on eviction/flush.
    /// Must follow a `get_mut` for the same id.
    pub fn mark_dirty(&mut self, id: u64) {
        if let Some(frame) = self.cache.peek_mut(&id) {
            frame.dirty = true;
        }
    }

    /// Allocate a new zero-initialized page in the backing store and seat it
    /// in the cache, dirty (so it is durably written even if never fetched
    /// again before eviction).
    pub fn allocate_page(&mut self) -> DbResult<u64> {
        let id = self.store.allocate_page()?;
        self.evict_if_full()?;
        let data = vec![0u8; self.store.page_size() as usize];
        self.cache.put(id, Frame { data, dirty: true });
        Ok(id)
    }

    /// Write back every dirty frame (spec's `traverse_dirty`), used on
    /// close.
    pub fn flush(&mut self) -> DbResult<()> {
        let dirty_ids: Vec<u64> = self
            .cache
            .iter()
            .filter(|(_, frame)| frame.dirty)
            .map(|(id, _)| *id)
            .collect();
        for id in dirty_ids {
            let data = self.cache.peek(&id).expect("id came from this cache").data.clone();
            self.store.write_page(id, &data)?;
            if let Some(frame) = self.cache.peek_mut(&id) {
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Flush and return the underlying store, consuming the pool.
    pub fn into_store(mut self) -> DbResult<S> {
        self.flush()?;
        Ok(self.store)
    }
}
