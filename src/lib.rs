//! Sparse-indexed viewport server for huge append-only delimited row files.
//!
//! Dependency order mirrors spec.md §2: the Index Builder and Codec
//! produce an [`index::Index`], the [`slicer::Slicer`] serves row windows
//! against it, the [`viewport`] module canonicalizes pixel viewports into
//! slice parameters, and the [`dispatcher`] wires request messages to
//! both. [`transport`] and [`config`] are the ambient glue the binary
//! needs to actually run as a server.

pub mod config;
pub mod dispatcher;
pub mod index;
pub mod slicer;
pub mod transport;
pub mod viewport;

use std::sync::Arc;

use tracing::instrument;

pub use config::Config;
pub use index::{Index, IndexError};
pub use slicer::{Slicer, SlicerError};

/// Number of fields per record. The reference schema (`City`, `Temperature`)
/// uses 2; spec.md §3 calls this a configured constant.
pub const N_COLS: u64 = 2;

/// Everything a running server needs, built once at startup and shared
/// read-only across every connection (spec.md §5).
pub struct AppState {
    pub slicer: Arc<Slicer>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Slicer(#[from] SlicerError),
}

impl AppState {
    /// Loads (or builds, if absent/stale) the index for `config.file_path`
    /// and opens the Slicer over it. Blocking, and meant to run to
    /// completion before the transport starts accepting clients
    /// (spec.md §5: "Index construction ... SHOULD occur before accepting
    /// client traffic").
    #[instrument(skip(config), fields(file = %config.file_path.display()))]
    pub fn bootstrap(config: &Config) -> Result<Self, StartupError> {
        let index = index::load_or_build(
            &config.file_path,
            &config.index_path,
            config.index_granularity,
        )?;
        let slicer = Slicer::open(&config.file_path, Arc::new(index), N_COLS)?;
        Ok(Self {
            slicer: Arc::new(slicer),
        })
    }
}
