use std::path::Path;

use buffer::BufferPool;
use common::{DbError, DbResult, RecordWriteErrorKind, Rid};
use types::SqlType;

use crate::paged_file::PagedFile;

/// Default buffer pool capacity (in pages) for a table that doesn't specify
/// one explicitly. Mirrors `common::Config::buffer_pool_pages`'s default.
const DEFAULT_BUFFER_PAGES: usize = 64;

/// Page-level chain header every bitmap page and record page carries: its
/// own id and its neighbors in the chain. `0` stands for "no neighbor"
/// (page 0 is always the paged file's own header, so it can never be a
/// legitimate chain neighbor).
const CHAIN_HEADER_LEN: usize = 24;
const NO_PAGE: u64 = 0;

/// On-disk field descriptor: 256 bytes, `field_id:u64 | type:u64 | length:u64
/// | is_pk:u8 | not_null:u8 | name`.
const FIELD_DESC_LEN: usize = 256;
const FIELD_NAME_OFFSET: usize = 26;
const FIELD_NAME_LEN: usize = FIELD_DESC_LEN - FIELD_NAME_OFFSET;

/// Table descriptor page (page 1) fixed layout: a 512-byte name field
/// followed by six `u64` counters.
const TABLE_NAME_LEN: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub field_id: u64,
    pub ty: SqlType,
    /// On-disk length in bytes (null flag byte + payload).
    pub length: u64,
    pub is_pk: bool,
    /// `NOT NULL` constraint, checked on insert/update independently of the
    /// per-field null-flag byte every value still carries on disk.
    pub not_null: bool,
    pub name: String,
}

impl FieldDescriptor {
    fn encode(&self) -> DbResult<[u8; FIELD_DESC_LEN]> {
        let mut buf = [0u8; FIELD_DESC_LEN];
        buf[0..8].copy_from_slice(&self.field_id.to_be_bytes());
        buf[8..16].copy_from_slice(&self.ty.type_tag().to_be_bytes());
        buf[16..24].copy_from_slice(&self.length.to_be_bytes());
        buf[24] = self.is_pk as u8;
        buf[25] = self.not_null as u8;
        let name_bytes = self.name.as_bytes();
        if name_bytes.len() > FIELD_NAME_LEN {
            return Err(DbError::CreateTableFailed {
                kind: common::CreateTableErrorKind::FieldNameTooLong,
                cause: None,
            });
        }
        buf[FIELD_NAME_OFFSET..FIELD_NAME_OFFSET + name_bytes.len()].copy_from_slice(name_bytes);
        Ok(buf)
    }

    fn decode(buf: &[u8]) -> DbResult<Self> {
        let field_id = u64::from_be_bytes(buf[0..8].try_into().unwrap());
        let tag = u64::from_be_bytes(buf[8..16].try_into().unwrap());
        let length = u64::from_be_bytes(buf[16..24].try_into().unwrap());
        let is_pk = buf[24] != 0;
        let not_null = buf[25] != 0;
        let name_region = &buf[FIELD_NAME_OFFSET..FIELD_NAME_OFFSET + FIELD_NAME_LEN];
        let name_end = name_region
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FIELD_NAME_LEN);
        let name = String::from_utf8_lossy(&name_region[..name_end]).into_owned();
        let ty = SqlType::from_tag(tag).map_err(|_| DbError::CreateTableFailed {
            kind: common::CreateTableErrorKind::UnsupportedType,
            cause: None,
        })?;
        Ok(Self {
            field_id,
            ty,
            length,
            is_pk,
            not_null,
            name,
        })
    }
}

/// A table's record file: header pages describing its schema, a chain of
/// "has empty slot" bitmap pages, and a chain of fixed-length record pages.
/// Record identity (`Rid`) never changes across `update`, only across
/// `delete` followed by a later `insert` that happens to reuse the slot.
pub struct Table {
    file: BufferPool<PagedFile>,
    name: String,
    fields: Vec<FieldDescriptor>,
    record_length: u64,
    records_per_page: u64,
    bits_per_map_page: u64,
    last_map_page: u64,
    last_record_page: u64,
    first_record_page_id: u64,
    record_page_count: u64,
}

impl Table {
    /// Create a new table file with the given field list (the first
    /// `CREATE TABLE` write of its schema), using the default buffer pool
    /// capacity.
    pub fn create(path: &Path, name: &str, fields: Vec<FieldDescriptor>) -> DbResult<Self> {
        Self::create_with_buffer_pages(path, name, fields, DEFAULT_BUFFER_PAGES)
    }

    /// Create a new table file, sizing its buffer pool to `buffer_pages`
    /// frames (`common::Config::buffer_pool_pages`).
    pub fn create_with_buffer_pages(
        path: &Path,
        name: &str,
        fields: Vec<FieldDescriptor>,
        buffer_pages: usize,
    ) -> DbResult<Self> {
        if name.as_bytes().len() >= TABLE_NAME_LEN {
            return Err(DbError::CreateTableFailed {
                kind: common::CreateTableErrorKind::FieldNameTooLong,
                cause: None,
            });
        }
        let page_size = 4096u64;
        let mut raw = PagedFile::create(path, page_size)?;

        let record_length: u64 = fields.iter().map(|f| f.length).sum();
        let records_per_page = records_per_page(page_size, record_length);
        let bits_per_map_page = (page_size - CHAIN_HEADER_LEN as u64) * 8;

        // page 1: table descriptor
        raw.allocate_page()?;
        // page 2..: field descriptors, one per page for simplicity of fixed offsets
        for _ in 0..fields.len() {
            raw.allocate_page()?;
        }
        // first bitmap page
        let first_map_page = raw.allocate_page()?;

        let mut table = Self {
            file: BufferPool::new(raw, buffer_pages),
            name: name.to_string(),
            fields,
            record_length,
            records_per_page,
            bits_per_map_page,
            last_map_page: first_map_page,
            last_record_page: NO_PAGE,
            first_record_page_id: NO_PAGE,
            record_page_count: 0,
        };
        table.write_chain_header(first_map_page, NO_PAGE, NO_PAGE)?;
        table.write_table_descriptor()?;
        for (i, field) in table.fields.clone().iter().enumerate() {
            table.write_field_descriptor(2 + i as u64, field)?;
        }
        table.file.flush()?;
        Ok(table)
    }

    /// Re-open an existing table file, reconstructing its schema and free
    /// space bookkeeping from the header pages it wrote at creation time,
    /// using the default buffer pool capacity.
    pub fn open(path: &Path) -> DbResult<Self> {
        Self::open_with_buffer_pages(path, DEFAULT_BUFFER_PAGES)
    }

    /// Re-open an existing table file, sizing its buffer pool to
    /// `buffer_pages` frames.
    pub fn open_with_buffer_pages(path: &Path, buffer_pages: usize) -> DbResult<Self> {
        let mut raw = PagedFile::open(path)?;
        let page1 = raw.read_page(1)?;
        let name_end = page1[0..TABLE_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TABLE_NAME_LEN);
        let name = String::from_utf8_lossy(&page1[0..name_end]).into_owned();
        let mut off = TABLE_NAME_LEN;
        let field_count = read_u64(&page1, off);
        off += 8;
        let bits_per_map_page = read_u64(&page1, off);
        off += 8;
        let record_length = read_u64(&page1, off);
        off += 8;
        let records_per_page = read_u64(&page1, off);
        off += 8;
        let last_map_page = read_u64(&page1, off);
        off += 8;
        let last_record_page = read_u64(&page1, off);
        off += 8;
        let first_record_page_id = read_u64(&page1, off);
        off += 8;
        let record_page_count = read_u64(&page1, off);

        let mut fields = Vec::with_capacity(field_count as usize);
        for i in 0..field_count {
            let page = raw.read_page(2 + i)?;
            fields.push(FieldDescriptor::decode(&page)?);
        }

        Ok(Self {
            file: BufferPool::new(raw, buffer_pages),
            name,
            fields,
            record_length,
            records_per_page,
            bits_per_map_page,
            last_map_page,
            last_record_page,
            first_record_page_id,
            record_page_count,
        })
    }

    pub fn remove(path: &Path) -> DbResult<()> {
        PagedFile::remove(path)
    }

    /// Write back every dirty buffered page.
    pub fn flush(&mut self) -> DbResult<()> {
        self.file.flush()
    }

    fn read_page(&mut self, id: u64) -> DbResult<Vec<u8>> {
        Ok(self.file.get_mut(id)?.clone())
    }

    fn write_page(&mut self, id: u64, data: &[u8]) -> DbResult<()> {
        self.file.get_mut(id)?.copy_from_slice(data);
        self.file.mark_dirty(id);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn record_length(&self) -> u64 {
        self.record_length
    }

    fn write_table_descriptor(&mut self) -> DbResult<()> {
        let page_size = self.file.page_size() as usize;
        let mut buf = vec![0u8; page_size];
        let name_bytes = self.name.as_bytes();
        buf[0..name_bytes.len()].copy_from_slice(name_bytes);
        let mut off = TABLE_NAME_LEN;
        buf[off..off + 8].copy_from_slice(&(self.fields.len() as u64).to_be_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.bits_per_map_page.to_be_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.record_length.to_be_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.records_per_page.to_be_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.last_map_page.to_be_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.last_record_page.to_be_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.first_record_page_id.to_be_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.record_page_count.to_be_bytes());
        self.write_page(1, &buf)
    }

    fn write_field_descriptor(&mut self, page_id: u64, field: &FieldDescriptor) -> DbResult<()> {
        let page_size = self.file.page_size() as usize;
        let mut buf = vec![0u8; page_size];
        let encoded = field.encode()?;
        buf[0..FIELD_DESC_LEN].copy_from_slice(&encoded);
        self.write_page(page_id, &buf)
    }

    fn write_chain_header(&mut self, page_id: u64, next_id: u64, prev_id: u64) -> DbResult<()> {
        let mut buf = self.read_page(page_id)?;
        buf[0..8].copy_from_slice(&page_id.to_be_bytes());
        buf[8..16].copy_from_slice(&next_id.to_be_bytes());
        buf[16..24].copy_from_slice(&prev_id.to_be_bytes());
        self.write_page(page_id, &buf)
    }

    fn read_chain_header(&mut self, page_id: u64) -> DbResult<(u64, u64, u64)> {
        let buf = self.read_page(page_id)?;
        Ok((
            read_u64(&buf, 0),
            read_u64(&buf, 8),
            read_u64(&buf, 16),
        ))
    }

    /// The `n`-th page (0-based) in the record-page chain, walked from its
    /// head. Record pages are not necessarily contiguous ids, since bitmap
    /// pages can be allocated in between, so this must follow chain
    /// pointers rather than do arithmetic off `first_record_page_id`.
    fn nth_record_page(&mut self, n: u64) -> DbResult<u64> {
        let mut page = self.first_record_page()?;
        for _ in 0..n {
            let (_, next, _) = self.read_chain_header(page)?;
            page = next;
        }
        Ok(page)
    }

    /// The chain position (0-based) of `target` among record pages.
    fn record_page_index_of(&mut self, target: u64) -> DbResult<u64> {
        let mut page = self.first_record_page()?;
        let mut idx = 0u64;
        loop {
            if page == target {
                return Ok(idx);
            }
            let (_, next, _) = self.read_chain_header(page)?;
            page = next;
            idx += 1;
        }
    }

    /// Find a record page with a free slot, consulting each map page's "has
    /// empty slot" bit before reading the candidate page itself, and
    /// allocate a new record page (extending the bitmap chain if its
    /// current map page is full) when none is free.
    fn find_or_create_free_record_page(&mut self) -> DbResult<u64> {
        let mut map_page = self.first_map_page()?;
        let mut global_bit = 0u64;
        loop {
            let buf = self.read_page(map_page)?;
            let bits_here = self.bits_per_map_page;
            for bit in 0..bits_here {
                if global_bit >= self.record_page_count {
                    break;
                }
                if bit_is_set(&buf[CHAIN_HEADER_LEN..], bit) {
                    let record_page = self.nth_record_page(global_bit)?;
                    if self.find_free_slot(record_page)?.is_some() {
                        return Ok(record_page);
                    }
                }
                global_bit += 1;
            }
            let (_, next, _) = self.read_chain_header(map_page)?;
            if next == NO_PAGE || global_bit >= self.record_page_count {
                break;
            }
            map_page = next;
        }

        let record_page = self.file.allocate_page()?;
        if self.first_record_page_id == NO_PAGE {
            self.first_record_page_id = record_page;
        }
        self.write_chain_header(record_page, NO_PAGE, self.last_record_page)?;
        if self.last_record_page != NO_PAGE {
            self.set_next(self.last_record_page, record_page)?;
        }
        self.last_record_page = record_page;
        self.record_page_count += 1;
        self.set_map_bit(self.record_page_count - 1, true)?;
        self.write_table_descriptor()?;
        Ok(record_page)
    }

    fn set_next(&mut self, page_id: u64, next_id: u64) -> DbResult<()> {
        let (_, _, prev) = self.read_chain_header(page_id)?;
        self.write_chain_header(page_id, next_id, prev)?;
        Ok(())
    }

    fn first_map_page(&mut self) -> DbResult<u64> {
        let mut page = self.last_map_page;
        loop {
            let (_, _, prev) = self.read_chain_header(page)?;
            if prev == NO_PAGE {
                return Ok(page);
            }
            page = prev;
        }
    }

    /// Set the "has empty slot" bit for the `global_bit`-th record page
    /// (0-based, in allocation order), allocating a new map page if the
    /// chain's last map page has no bits left.
    fn set_map_bit(&mut self, global_bit: u64, value: bool) -> DbResult<()> {
        let mut map_page = self.first_map_page()?;
        let mut base = 0u64;
        loop {
            if global_bit < base + self.bits_per_map_page {
                let mut buf = self.read_page(map_page)?;
                set_bit(&mut buf[CHAIN_HEADER_LEN..], global_bit - base, value);
                return self.write_page(map_page, &buf);
            }
            let (_, next, _) = self.read_chain_header(map_page)?;
            if next == NO_PAGE {
                let new_map = self.file.allocate_page()?;
                self.write_chain_header(new_map, NO_PAGE, map_page)?;
                self.set_next(map_page, new_map)?;
                self.last_map_page = new_map;
                self.write_table_descriptor()?;
                map_page = new_map;
            } else {
                map_page = next;
            }
            base += self.bits_per_map_page;
        }
    }

    fn slot_bitmap_offset(&self) -> usize {
        CHAIN_HEADER_LEN
    }

    fn slot_bitmap_len(&self) -> usize {
        slot_bitmap_bytes(self.records_per_page) as usize
    }

    fn slots_start(&self) -> usize {
        self.slot_bitmap_offset() + self.slot_bitmap_len()
    }

    fn slot_offset(&self, slot_id: u64) -> usize {
        self.slots_start() + (slot_id * self.record_length) as usize
    }

    fn find_free_slot(&mut self, page_id: u64) -> DbResult<Option<u64>> {
        let buf = self.read_page(page_id)?;
        let bitmap = &buf[self.slot_bitmap_offset()..self.slot_bitmap_offset() + self.slot_bitmap_len()];
        for slot in 0..self.records_per_page {
            if !bit_is_set(bitmap, slot) {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// Insert an already-encoded record (the concatenation of each field's
    /// fixed-length slot) and return its stable `Rid`.
    pub fn insert(&mut self, encoded_record: &[u8]) -> DbResult<Rid> {
        if encoded_record.len() as u64 != self.record_length {
            return Err(DbError::InsertRecordFailed {
                kind: RecordWriteErrorKind::WrongTupleSize,
                cause: None,
            });
        }

        let mut page_id = if self.last_record_page == NO_PAGE {
            NO_PAGE
        } else {
            self.last_record_page
        };
        let mut slot = if page_id != NO_PAGE {
            self.find_free_slot(page_id)?
        } else {
            None
        };
        if slot.is_none() {
            page_id = self.find_or_create_free_record_page()?;
            slot = self.find_free_slot(page_id)?;
        }
        let slot = slot.ok_or_else(|| DbError::InsertRecordFailed {
            kind: RecordWriteErrorKind::WrongTupleSize,
            cause: None,
        })?;

        let mut buf = self.read_page(page_id)?;
        let offset = self.slot_offset(slot);
        buf[offset..offset + encoded_record.len()].copy_from_slice(encoded_record);
        set_bit(
            &mut buf[self.slot_bitmap_offset()..self.slot_bitmap_offset() + self.slot_bitmap_len()],
            slot,
            true,
        );
        let bitmap = &buf[self.slot_bitmap_offset()..self.slot_bitmap_offset() + self.slot_bitmap_len()];
        let page_now_full = (0..self.records_per_page).all(|s| bit_is_set(bitmap, s));
        self.write_page(page_id, &buf)?;
        if page_now_full {
            let idx = self.record_page_index_of(page_id)?;
            self.set_map_bit(idx, false)?;
        }

        Ok(Rid::new(page_id, slot))
    }

    /// Read back a record's raw bytes by `Rid`.
    pub fn get(&mut self, rid: Rid) -> DbResult<Vec<u8>> {
        let buf = self.read_page(rid.page_id)?;
        self.check_slot_occupied(&buf, rid.slot_id)?;
        let offset = self.slot_offset(rid.slot_id);
        Ok(buf[offset..offset + self.record_length as usize].to_vec())
    }

    /// Overwrite a record's bytes in place. `Rid` does not change.
    pub fn update(&mut self, rid: Rid, encoded_record: &[u8]) -> DbResult<()> {
        if encoded_record.len() as u64 != self.record_length {
            return Err(DbError::UpdateRecordFailed {
                kind: RecordWriteErrorKind::WrongTupleSize,
                cause: None,
            });
        }
        let mut buf = self.read_page(rid.page_id)?;
        self.check_slot_occupied(&buf, rid.slot_id)?;
        let offset = self.slot_offset(rid.slot_id);
        buf[offset..offset + encoded_record.len()].copy_from_slice(encoded_record);
        self.write_page(rid.page_id, &buf)
    }

    /// Clear a record's occupied bit. The slot becomes available to a
    /// future `insert`, but its previous `Rid` is never reused implicitly.
    /// The page-level "has empty slot" bit is re-set unconditionally: a page
    /// that just lost an occupant always has at least one free slot.
    pub fn delete(&mut self, rid: Rid) -> DbResult<()> {
        let mut buf = self.read_page(rid.page_id)?;
        self.check_slot_occupied(&buf, rid.slot_id)?;
        set_bit(
            &mut buf[self.slot_bitmap_offset()..self.slot_bitmap_offset() + self.slot_bitmap_len()],
            rid.slot_id,
            false,
        );
        self.write_page(rid.page_id, &buf)?;
        let idx = self.record_page_index_of(rid.page_id)?;
        self.set_map_bit(idx, true)
    }

    fn check_slot_occupied(&self, page: &[u8], slot_id: u64) -> DbResult<()> {
        let bitmap = &page[self.slot_bitmap_offset()..self.slot_bitmap_offset() + self.slot_bitmap_len()];
        if slot_id >= self.records_per_page || !bit_is_set(bitmap, slot_id) {
            return Err(DbError::OpenTableFailed { cause: None });
        }
        Ok(())
    }

    /// Iterate every occupied record in page/slot order.
    pub fn scan(&mut self) -> DbResult<Vec<(Rid, Vec<u8>)>> {
        let mut out = Vec::new();
        let mut page_id = self.first_record_page()?;
        while page_id != NO_PAGE {
            let buf = self.read_page(page_id)?;
            let bitmap = &buf[self.slot_bitmap_offset()..self.slot_bitmap_offset() + self.slot_bitmap_len()];
            for slot in 0..self.records_per_page {
                if bit_is_set(bitmap, slot) {
                    let offset = self.slot_offset(slot);
                    out.push((
                        Rid::new(page_id, slot),
                        buf[offset..offset + self.record_length as usize].to_vec(),
                    ));
                }
            }
            let (_, next, _) = self.read_chain_header(page_id)?;
            page_id = next;
        }
        Ok(out)
    }

    fn first_record_page(&mut self) -> DbResult<u64> {
        if self.last_record_page == NO_PAGE {
            return Ok(NO_PAGE);
        }
        let mut page = self.last_record_page;
        loop {
            let (_, _, prev) = self.read_chain_header(page)?;
            if prev == NO_PAGE {
                return Ok(page);
            }
            page = prev;
        }
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap())
}

fn bit_is_set(bitmap: &[u8], bit: u64) -> bool {
    let byte = (bit / 8) as usize;
    let shift = (bit % 8) as u8;
    byte < bitmap.len() && bitmap[byte] & (1 << shift) != 0
}

fn set_bit(bitmap: &mut [u8], bit: u64, value: bool) {
    let byte = (bit / 8) as usize;
    let shift = (bit % 8) as u8;
    if value {
        bitmap[byte] |= 1 << shift;
    } else {
        bitmap[byte] &= !(1 << shift);
    }
}

fn slot_bitmap_bytes(records_per_page: u64) -> u64 {
    records_per_page.div_ceil(8)
}

/// Largest number of fixed-length records (plus their slot bitmap) that fit
/// in one page alongside the 24-byte chain header.
fn records_per_page(page_size: u64, record_length: u64) -> u64 {
    let mut n = (page_size - CHAIN_HEADER_LEN as u64) / record_length.max(1);
    while n > 0 {
        let needed = CHAIN_HEADER_LEN as u64 + slot_bitmap_bytes(n) + n * record_length;
        if needed <= page_size {
            break;
        }
        n -= 1;
    }
    n
}
