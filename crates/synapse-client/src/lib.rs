//! Auxiliary backend clients: liveness monitoring and the knowledge graph.

pub mod error;
pub mod graph;
pub mod health;

pub use error::ClientError;
pub use graph::GraphClient;
pub use health::{HealthMonitor, HealthReport};
