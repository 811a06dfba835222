pub mod config;
pub mod error;
pub mod db;
pub mod graph;
pub mod store;
pub mod job;
pub mod persist;
pub mod dispatch;
pub mod relations;

pub use config::Config;
pub use error::{RelmapError, Result};
pub use dispatch::{DispatchReport, Dispatcher, JobHandler};
pub use graph::{resolve_accounts, EntityType, GraphStore, Vertex, VertexKey};
pub use job::RelationJob;
pub use persist::{FsPersister, ResultPersister};
pub use relations::RelationDumper;
