//! Sparse Row Index: builder, on-disk codec, and the index data type.

pub mod builder;
pub mod codec;
pub mod types;

pub use builder::build;
pub use codec::{is_fresh, load, save};
pub use types::{Index, IndexError};

use std::path::Path;
use tracing::{info, instrument, warn};

/// Loads a cached index for `data_path`, rejecting it and rebuilding when
/// stale or absent. Mirrors spec.md's startup sequence: "Index Codec
/// attempts to load an index file; if absent or stale ... Index Builder
/// scans the data file and Index Codec persists the result."
#[instrument(skip(data_path, index_path), fields(data = %data_path.as_ref().display(), index = %index_path.as_ref().display()))]
pub fn load_or_build<P: AsRef<Path>, Q: AsRef<Path>>(
    data_path: P,
    index_path: Q,
    granularity: u64,
) -> Result<Index, IndexError> {
    let data_path = data_path.as_ref();
    let index_path = index_path.as_ref();

    let current_len = std::fs::metadata(data_path)
        .map_err(|source| IndexError::Io {
            path: data_path.to_path_buf(),
            source,
        })?
        .len();
    let current_mtime = std::fs::metadata(data_path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    if let Some(cached) = load(index_path)? {
        if is_fresh(&cached, current_len, current_mtime) {
            info!("using cached index");
            return Ok(cached);
        }
        warn!("cached index stale, rebuilding");
    }

    let built = build(data_path, granularity)?;
    save(index_path, &built)?;
    Ok(built)
}
