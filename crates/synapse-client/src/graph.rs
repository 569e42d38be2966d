//! Knowledge graph fetcher.

use reqwest::Client;
use synapse_core::config::SynapseConfig;
use synapse_core::graph::KnowledgeGraph;

use crate::error::ClientError;

/// Fetches the `{nodes, links}` payload and normalises it for the renderer.
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: Client,
    url: String,
}

impl GraphClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn from_config(config: &SynapseConfig) -> Result<Self, ClientError> {
        Ok(Self::new(config.endpoint(&config.graph.path)?))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the graph, collapsing duplicate nodes and dropping dangling links.
    pub async fn fetch(&self) -> Result<KnowledgeGraph, ClientError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let mut graph: KnowledgeGraph = serde_json::from_str(&body)?;

        let dropped = graph.normalize();
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped graph links with unknown endpoints");
        }
        tracing::debug!(
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "Knowledge graph fetched"
        );
        Ok(graph)
    }
}
