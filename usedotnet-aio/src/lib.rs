// usedotnet-aio/src/lib.rs
//! Filesystem and archive IO used while installing.

pub mod checksum;
pub mod extract;
pub mod fs;
pub mod json_io;

pub use checksum::verify_sha512_async;
pub use extract::{extract_archive_async, ArchiveKind};
pub use fs::{
    atomic_write_file, copy_dir_recursive, copy_file, create_dir_all, list_directory_entries,
    remove_directory_recursive, DirEntryInfo,
};
pub use json_io::{read_json, write_json_atomic};
