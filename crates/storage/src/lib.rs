//! The paged-file substrate (spec §4.2) and the table-file layout built on
//! top of it (spec §4.3/§4.4): fixed-size pages, a self-describing page 0
//! header, and chained bitmap/record pages for fixed-length tuples.

pub mod paged_file;
pub mod table;

pub use paged_file::PagedFile;
pub use table::{FieldDescriptor, Table};
