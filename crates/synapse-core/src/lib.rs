pub mod config;
pub mod error;
pub mod graph;
pub mod types;

pub use config::{SynapseConfig, TransportKind};
pub use error::{Result, SynapseError};
pub use graph::{GraphLink, GraphNode, KnowledgeGraph};
pub use types::*;
