//! Filesystem helpers with operation + path error context.

use std::path::Path;

use crate::{Error, Result};

/// Read a UTF-8 file, attaching the operation and path to any IO error.
pub fn read_to_string_with_op(op: &'static str, path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::io_path(op, path, e))
}

/// Ensure a directory exists (synchronous), creating it recursively if needed.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}
