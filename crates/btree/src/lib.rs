//! Disk-resident B+-tree index manager (spec §4.5): fixed 2 KiB nodes,
//! generic-comparator ordering over fixed-length keys paired with `Rid`
//! payloads, a singly-linked leaf chain for range scans, and a small LRU of
//! node frames sitting atop the paged-file substrate.
//!
//! Composite `(value, RID)` ordering lets duplicate values coexist: two
//! entries are only equal when both their key bytes and their `Rid` match.
//! Deletion erases the exact `(key, rid)` leaf entry without rebalancing —
//! the reference implementation's index manager never implemented merge or
//! redistribution either (`db_indexmanager.h` is a stub), and no invariant
//! in spec §8 requires a non-root occupancy floor.

mod node;

use std::cmp::Ordering;
use std::path::Path;

use buffer::BufferPool;
use common::{DbResult, Rid};
use storage::PagedFile;
use types::SqlType;

use node::{InternalNode, LeafNode, Node, NO_PAGE};

const DEFAULT_NODE_SIZE: u64 = 2048;
const DEFAULT_BUFFER_FRAMES: usize = 16;
/// Page 1 holds the tree's own metadata (`root_page_id`); page 0 is the
/// paged file's own header, and pages 2.. hold tree nodes.
const METADATA_PAGE: u64 = 1;

enum InsertResult {
    Done,
    Split { promote_key: Vec<u8>, new_page: u64 },
}

/// A B+-tree index over one field of one table, keyed by that field's
/// already-encoded fixed-length bytes.
pub struct BTreeIndex {
    file: BufferPool<PagedFile>,
    ty: SqlType,
    key_len: usize,
    node_size: u64,
    max_leaf_entries: usize,
    max_internal_keys: usize,
    root: u64,
}

impl BTreeIndex {
    /// Create a new, empty index file at `path` for a field of type `ty`
    /// whose encoded values are `key_len` bytes wide.
    pub fn create(path: &Path, ty: SqlType, key_len: usize) -> DbResult<Self> {
        Self::create_with_options(path, ty, key_len, DEFAULT_NODE_SIZE, DEFAULT_BUFFER_FRAMES)
    }

    pub fn create_with_options(
        path: &Path,
        ty: SqlType,
        key_len: usize,
        node_size: u64,
        buffer_frames: usize,
    ) -> DbResult<Self> {
        let mut raw = PagedFile::create(path, node_size)?;
        raw.allocate_page()?; // page 1: metadata
        let root = raw.allocate_page()?; // page 2: initial empty leaf root

        let mut index = Self {
            file: BufferPool::new(raw, buffer_frames),
            ty,
            key_len,
            node_size,
            max_leaf_entries: Node::max_leaf_entries(node_size, key_len),
            max_internal_keys: Node::max_internal_keys(node_size, key_len),
            root,
        };
        index.write_node(
            root,
            &Node::Leaf(LeafNode {
                next_leaf: NO_PAGE,
                entries: Vec::new(),
            }),
        )?;
        index.write_metadata()?;
        index.file.flush()?;
        Ok(index)
    }

    /// Re-open an existing index file, sizing its node buffer to
    /// `common::Config::btree_buffer_frames` frames.
    pub fn open(path: &Path, ty: SqlType, key_len: usize) -> DbResult<Self> {
        Self::open_with_options(path, ty, key_len, DEFAULT_BUFFER_FRAMES)
    }

    pub fn open_with_options(
        path: &Path,
        ty: SqlType,
        key_len: usize,
        buffer_frames: usize,
    ) -> DbResult<Self> {
        let mut raw = PagedFile::open(path)?;
        let node_size = raw.page_size();
        let meta = raw.read_page(METADATA_PAGE)?;
        let root = u64::from_be_bytes(meta[0..8].try_into().unwrap());
        Ok(Self {
            file: BufferPool::new(raw, buffer_frames),
            ty,
            key_len,
            node_size,
            max_leaf_entries: Node::max_leaf_entries(node_size, key_len),
            max_internal_keys: Node::max_internal_keys(node_size, key_len),
            root,
        })
    }

    pub fn remove_file(path: &Path) -> DbResult<()> {
        PagedFile::remove(path)
    }

    pub fn flush(&mut self) -> DbResult<()> {
        self.file.flush()
    }

    fn write_metadata(&mut self) -> DbResult<()> {
        let page_size = self.file.page_size() as usize;
        let mut buf = vec![0u8; page_size];
        buf[0..8].copy_from_slice(&self.root.to_be_bytes());
        let slot = self.file.get_mut(METADATA_PAGE)?;
        slot.copy_from_slice(&buf);
        self.file.mark_dirty(METADATA_PAGE);
        Ok(())
    }

    fn read_node(&mut self, page_id: u64) -> DbResult<Node> {
        let buf = self.file.get_mut(page_id)?.clone();
        Ok(Node::decode(&buf, self.key_len))
    }

    fn write_node(&mut self, page_id: u64, node: &Node) -> DbResult<()> {
        let encoded = node.encode(self.node_size);
        let slot = self.file.get_mut(page_id)?;
        slot.copy_from_slice(&encoded);
        self.file.mark_dirty(page_id);
        Ok(())
    }

    fn cmp_entry(&self, a_key: &[u8], a_rid: Rid, b_key: &[u8], b_rid: Rid) -> Ordering {
        types::compare(a_key, b_key, self.ty).then(a_rid.cmp(&b_rid))
    }

    /// Child index an internal node routes `key` to: the leftmost child
    /// whose subtree can contain `key`. Separator `keys[i]` is the minimum
    /// key of `children[i + 1]`, but a leaf split can leave entries equal to
    /// that minimum behind in `children[i]` too (a run of duplicate values
    /// straddling the split point) — so `key == keys[i]` still routes left,
    /// into `children[i]`. The leaf chain's forward links recover whatever
    /// actually lives in `children[i + 1]` once the scan walks past it.
    fn child_index(internal: &InternalNode, key: &[u8], ty: SqlType) -> usize {
        internal
            .keys
            .iter()
            .position(|k| types::compare(key, k, ty) != Ordering::Greater)
            .unwrap_or(internal.keys.len())
    }

    fn find_leaf_page(&mut self, key: &[u8]) -> DbResult<u64> {
        let mut page = self.root;
        loop {
            match self.read_node(page)? {
                Node::Leaf(_) => return Ok(page),
                Node::Internal(internal) => {
                    let idx = Self::child_index(&internal, key, self.ty);
                    page = internal.children[idx];
                }
            }
        }
    }

    /// `insert(key_bytes, rid)` — descend to the target leaf, insert in
    /// sorted `(value, RID)` order, splitting and propagating on overflow;
    /// a root split grows the tree's height by one (spec §4.5).
    pub fn insert(&mut self, key: &[u8], rid: Rid) -> DbResult<()> {
        if let InsertResult::Split { promote_key, new_page } =
            self.insert_into(self.root, key, rid)?
        {
            let new_root = self.file.allocate_page()?;
            self.write_node(
                new_root,
                &Node::Internal(InternalNode {
                    children: vec![self.root, new_page],
                    keys: vec![promote_key],
                }),
            )?;
            self.root = new_root;
            self.write_metadata()?;
        }
        Ok(())
    }

    fn insert_into(&mut self, page_id: u64, key: &[u8], rid: Rid) -> DbResult<InsertResult> {
        match self.read_node(page_id)? {
            Node::Leaf(mut leaf) => {
                let pos = leaf
                    .entries
                    .iter()
                    .position(|(k, r)| self.cmp_entry(key, rid, k, *r) == Ordering::Less)
                    .unwrap_or(leaf.entries.len());
                leaf.entries.insert(pos, (key.to_vec(), rid));

                if leaf.entries.len() <= self.max_leaf_entries {
                    self.write_node(page_id, &Node::Leaf(leaf))?;
                    Ok(InsertResult::Done)
                } else {
                    let mid = leaf.entries.len() / 2;
                    let right_entries = leaf.entries.split_off(mid);
                    let promote_key = right_entries[0].0.clone();
                    let new_page = self.file.allocate_page()?;
                    let right = LeafNode {
                        next_leaf: leaf.next_leaf,
                        entries: right_entries,
                    };
                    let left = LeafNode {
                        next_leaf: new_page,
                        entries: leaf.entries,
                    };
                    self.write_node(page_id, &Node::Leaf(left))?;
                    self.write_node(new_page, &Node::Leaf(right))?;
                    Ok(InsertResult::Split { promote_key, new_page })
                }
            }
            Node::Internal(mut internal) => {
                let child_idx = Self::child_index(&internal, key, self.ty);
                let child_page = internal.children[child_idx];
                match self.insert_into(child_page, key, rid)? {
                    InsertResult::Done => Ok(InsertResult::Done),
                    InsertResult::Split { promote_key, new_page } => {
                        internal.keys.insert(child_idx, promote_key);
                        internal.children.insert(child_idx + 1, new_page);

                        if internal.keys.len() <= self.max_internal_keys {
                            self.write_node(page_id, &Node::Internal(internal))?;
                            Ok(InsertResult::Done)
                        } else {
                            let mid = internal.keys.len() / 2;
                            let promote = internal.keys[mid].clone();
                            let right = InternalNode {
                                keys: internal.keys[mid + 1..].to_vec(),
                                children: internal.children[mid + 1..].to_vec(),
                            };
                            let left = InternalNode {
                                keys: internal.keys[..mid].to_vec(),
                                children: internal.children[..=mid].to_vec(),
                            };
                            let new_page = self.file.allocate_page()?;
                            self.write_node(page_id, &Node::Internal(left))?;
                            self.write_node(new_page, &Node::Internal(right))?;
                            Ok(InsertResult::Split {
                                promote_key: promote,
                                new_page,
                            })
                        }
                    }
                }
            }
        }
    }

    /// `remove(key_bytes, rid)` — locate the exact `(value, RID)` entry and
    /// erase it. A no-op if no such entry exists. No rebalancing: a node
    /// that falls below any occupancy floor is left as-is (see module
    /// docs).
    pub fn remove(&mut self, key: &[u8], rid: Rid) -> DbResult<()> {
        let page = self.find_leaf_page(key)?;
        let mut node = self.read_node(page)?;
        if let Node::Leaf(leaf) = &mut node {
            if let Some(pos) = leaf
                .entries
                .iter()
                .position(|(k, r)| k.as_slice() == key && *r == rid)
            {
                leaf.entries.remove(pos);
            }
        }
        self.write_node(page, &node)
    }

    /// `search_records(key)` — every RID whose key equals `key`, in
    /// ascending RID order. Empty tree or no match returns an empty vector.
    pub fn search(&mut self, key: &[u8]) -> DbResult<Vec<Rid>> {
        let mut page = self.find_leaf_page(key)?;
        let mut out = Vec::new();
        loop {
            let Node::Leaf(leaf) = self.read_node(page)? else {
                break;
            };
            for (k, r) in &leaf.entries {
                match types::compare(k, key, self.ty) {
                    Ordering::Equal => out.push(*r),
                    Ordering::Greater => return Ok(out),
                    Ordering::Less => {}
                }
            }
            if leaf.next_leaf == NO_PAGE {
                break;
            }
            page = leaf.next_leaf;
        }
        Ok(out)
    }

    /// `search_records(low, high)` — every RID whose key lies in the
    /// half-open range `[low, high)`, in ascending `(value, RID)` order.
    /// `low == high` returns an empty vector.
    pub fn range(&mut self, low: &[u8], high: &[u8]) -> DbResult<Vec<Rid>> {
        if types::compare(low, high, self.ty) != Ordering::Less {
            return Ok(Vec::new());
        }
        let mut page = self.find_leaf_page(low)?;
        let mut out = Vec::new();
        loop {
            let Node::Leaf(leaf) = self.read_node(page)? else {
                break;
            };
            for (k, r) in &leaf.entries {
                if types::compare(k, low, self.ty) != Ordering::Less
                    && types::compare(k, high, self.ty) == Ordering::Less
                {
                    out.push(*r);
                } else if types::compare(k, high, self.ty) != Ordering::Less {
                    return Ok(out);
                }
            }
            if leaf.next_leaf == NO_PAGE {
                break;
            }
            page = leaf.next_leaf;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(v: i32) -> Vec<u8> {
        let mut buf = vec![0u8; 5];
        types::encode(&types::Value::I32(v), SqlType::I32, 5, &mut buf).unwrap();
        buf
    }

    #[test]
    fn search_finds_inserted_values() {
        let dir = tempdir().unwrap();
        let mut idx = BTreeIndex::create(&dir.path().join("t.idx"), SqlType::I32, 5).unwrap();
        for i in 0..50 {
            idx.insert(&key(i), Rid::new(2, i as u64)).unwrap();
        }
        for i in 0..50 {
            let found = idx.search(&key(i)).unwrap();
            assert_eq!(found, vec![Rid::new(2, i as u64)]);
        }
        assert_eq!(idx.search(&key(999)).unwrap(), Vec::new());
    }

    #[test]
    fn duplicates_of_same_value_all_appear_in_rid_order() {
        let dir = tempdir().unwrap();
        let mut idx = BTreeIndex::create(&dir.path().join("t.idx"), SqlType::I32, 5).unwrap();
        idx.insert(&key(7), Rid::new(2, 3)).unwrap();
        idx.insert(&key(7), Rid::new(2, 1)).unwrap();
        idx.insert(&key(7), Rid::new(3, 0)).unwrap();
        let found = idx.search(&key(7)).unwrap();
        assert_eq!(found, vec![Rid::new(2, 1), Rid::new(2, 3), Rid::new(3, 0)]);
    }

    #[test]
    fn duplicates_straddling_a_leaf_split_are_all_found() {
        let dir = tempdir().unwrap();
        // 128-byte nodes hold 5 entries per leaf, so 30 duplicate values
        // force several splits within a single run of equal keys.
        let mut idx =
            BTreeIndex::create_with_options(&dir.path().join("t.idx"), SqlType::I32, 5, 128, 4)
                .unwrap();
        for i in 0..30 {
            idx.insert(&key(7), Rid::new(2, i as u64)).unwrap();
        }
        let found = idx.search(&key(7)).unwrap();
        let expected: Vec<Rid> = (0..30).map(|i| Rid::new(2, i as u64)).collect();
        assert_eq!(found, expected);

        let found_range = idx.range(&key(7), &key(8)).unwrap();
        assert_eq!(found_range, expected);
    }

    #[test]
    fn range_is_half_open_and_empty_when_bounds_equal() {
        let dir = tempdir().unwrap();
        let mut idx = BTreeIndex::create(&dir.path().join("t.idx"), SqlType::I32, 5).unwrap();
        for i in 0..20 {
            idx.insert(&key(i), Rid::new(2, i as u64)).unwrap();
        }
        let found = idx.range(&key(5), &key(10)).unwrap();
        assert_eq!(found.len(), 5);
        assert_eq!(idx.range(&key(5), &key(5)).unwrap(), Vec::new());
    }

    #[test]
    fn remove_erases_exact_entry_only() {
        let dir = tempdir().unwrap();
        let mut idx = BTreeIndex::create(&dir.path().join("t.idx"), SqlType::I32, 5).unwrap();
        idx.insert(&key(1), Rid::new(2, 0)).unwrap();
        idx.insert(&key(1), Rid::new(2, 1)).unwrap();
        idx.remove(&key(1), Rid::new(2, 0)).unwrap();
        assert_eq!(idx.search(&key(1)).unwrap(), vec![Rid::new(2, 1)]);
    }

    #[test]
    fn survives_close_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");
        {
            let mut idx = BTreeIndex::create(&path, SqlType::I32, 5).unwrap();
            for i in 0..30 {
                idx.insert(&key(i), Rid::new(2, i as u64)).unwrap();
            }
            idx.flush().unwrap();
        }
        let mut idx = BTreeIndex::open(&path, SqlType::I32, 5).unwrap();
        for i in 0..30 {
            assert_eq!(idx.search(&key(i)).unwrap(), vec![Rid::new(2, i as u64)]);
        }
    }

    #[test]
    fn empty_tree_search_and_range_are_empty() {
        let dir = tempdir().unwrap();
        let mut idx = BTreeIndex::create(&dir.path().join("t.idx"), SqlType::I32, 5).unwrap();
        assert_eq!(idx.search(&key(1)).unwrap(), Vec::new());
        assert_eq!(idx.range(&key(0), &key(100)).unwrap(), Vec::new());
    }

    #[test]
    fn many_inserts_force_multiple_levels_of_split() {
        let dir = tempdir().unwrap();
        let mut idx =
            BTreeIndex::create_with_options(&dir.path().join("t.idx"), SqlType::I32, 5, 128, 4)
                .unwrap();
        for i in 0..500 {
            idx.insert(&key(i), Rid::new(2, i as u64)).unwrap();
        }
        for i in 0..500 {
            assert_eq!(idx.search(&key(i)).unwrap(), vec![Rid::new(2, i as u64)]);
        }
        let found = idx.range(&key(100), &key(200)).unwrap();
        assert_eq!(found.len(), 100);
    }
}
