//! # smb utils
//!
//! Conversions between core types and remotefs types

use std::path::Path;

use remotefs::fs::{FileType, Metadata};
use remotefs::File;

use crate::engine::{DirectoryEntry, EntryKind};

/// Convert `DirectoryEntry` listed in `parent` to `File`
pub fn entry_to_file(parent: &Path, entry: DirectoryEntry) -> File {
    File {
        path: parent.join(&entry.name),
        metadata: Metadata::default()
            .file_type(get_file_type(entry.kind))
            .modified(entry.modified)
            .size(entry.size),
    }
}

fn get_file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::File,
    }
}
