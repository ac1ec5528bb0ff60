//! Optimization workers.
//!
//! - [`Worker`]: the capability the explorer drives
//! - [`CommandWorker`]: a worker running an external optimizer binary
//! - [`WorkerVariant`]: a worker plus its id, adjacency key and etag
//! - [`WorkerConfig`]: the configuration file and option-variant expansion

mod capability;
mod command;
mod config;
mod variant;

pub use capability::{BinVersion, Worker};
pub use command::CommandWorker;
pub use config::{ArgTemplate, FlagArg, WorkerConfig, WorkerDefinition};
pub use variant::{ConsId, WorkerEtag, WorkerVariant};
