#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chunk;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod identifier;
pub mod merge;
pub mod paginate;
pub mod partial;
pub mod table;
pub mod transport;

pub use chunk::{Batch, Batches, chunk};
pub use dispatch::{DispatchConfig, Outcome, dispatch};
pub use error::{EngineError, Result, TransportError};
pub use fetch::{BatchFetcher, Endpoint, EngineSettings};
pub use identifier::{Catalog, IdentifierSource, Symbol, resolve, validate};
pub use merge::{MergeOptions, Payload, SourceKey, merge};
pub use paginate::{PageRun, PageState, Paginator, Termination, paginate};
pub use partial::{PartialResult, Record};
pub use table::{CompositeKey, KeySpec, MergeReport, MergedTable, SourceFailure, records_to_frame};
pub use transport::{ApiVersion, Request, Transport};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
