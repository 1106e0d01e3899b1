//! Location of the table cache.

use fmp_data::{Result, TableStore};
use std::path::PathBuf;

/// Get the default cache directory path.
///
/// Uses platform-specific cache directories:
/// - Linux: `~/.cache/fmp/`
/// - macOS: `~/Library/Caches/fmp/`
/// - Windows: `%LOCALAPPDATA%\fmp\`
pub(crate) fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fmp")
}

/// Get the default cache database path.
pub(crate) fn default_cache_path() -> PathBuf {
    default_cache_dir().join("fmp.db")
}

/// Open the cache, creating the directory if needed.
pub(crate) fn open_cache() -> Result<TableStore> {
    let path = default_cache_path();
    log::debug!("opening table cache at {}", path.display());
    TableStore::new(&path)
}
