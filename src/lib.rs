pub mod cli;
pub mod cmd;
pub mod engine;
pub mod error;
pub mod pool;
pub mod store;

pub use cmd::RestoreCommand;
pub use engine::{ExportSummary, Exporter};
pub use error::{ExportError, Result};
pub use pool::{ConnectionConfig, ConnectionPool};
pub use store::{KeySource, KeyType, KeyValue};
