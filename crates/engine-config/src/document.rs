use crate::{error::ConfigError, interpolate::interpolate, settings::EngineSettings, validation};
use model::{
    core::identifiers::ConnectionId,
    execution::{connection::FeedConnection, destination::DestinationEndpoint},
};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashMap, path::Path};
use tracing::info;

/// The whole feedsync configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedsyncConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub destinations: Vec<DestinationEndpoint>,
    #[serde(default)]
    pub connections: Vec<FeedConnection>,
}

impl FeedsyncConfig {
    /// Reads, interpolates and validates the document at `path`.
    pub fn load(path: &Path, vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&raw, vars)?;
        info!(
            path = %path.display(),
            connections = config.connections.len(),
            destinations = config.destinations.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn parse(raw: &str, vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut document: Value = serde_json::from_str(raw)?;
        interpolate(&mut document, vars)?;
        let config: FeedsyncConfig = serde_json::from_value(document)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn connection(&self, id: &ConnectionId) -> Result<&FeedConnection, ConfigError> {
        self.connections
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| ConfigError::UnknownConnection(id.to_string()))
    }

    pub fn destination(&self, id: &str) -> Result<&DestinationEndpoint, ConfigError> {
        self.destinations
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ConfigError::UnknownDestination(id.to_string()))
    }

    /// Chunk size for a connection, falling back to the engine default.
    pub fn chunk_size(&self, connection: &FeedConnection) -> usize {
        connection
            .chunk_size
            .unwrap_or(self.engine.default_chunk_size)
    }
}
