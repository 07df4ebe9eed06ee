//! Cluster configuration
//!
//! Describes the master, its slaves and the read threshold. Built once and
//! handed to the router; nothing here is global.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{RouterError, RouterResult};

/// Default number of reads served by the master before one goes to a slave
pub const DEFAULT_MAX_SUCCESSIVE_READS: u32 = 10;

/// Connection descriptor for one physical node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node address (e.g., "127.0.0.1:27017")
    pub address: String,

    /// Database name on that node
    pub database: String,

    pub username: Option<String>,

    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl NodeDescriptor {
    pub fn new(address: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Set credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Master/slave cluster configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Primary node, serves all writes
    pub master: NodeDescriptor,

    /// Secondary nodes in round-robin order (may be empty)
    pub slaves: Vec<NodeDescriptor>,

    /// Reads served by the master before one is diverted to a slave
    pub max_successive_reads: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            master: NodeDescriptor::new("127.0.0.1:27017", "docroute"),
            slaves: vec![],
            max_successive_reads: DEFAULT_MAX_SUCCESSIVE_READS,
        }
    }
}

impl ClusterConfig {
    /// Master-only configuration
    pub fn new(master: NodeDescriptor) -> Self {
        Self {
            master,
            ..Self::default()
        }
    }

    pub fn with_slaves(mut self, slaves: Vec<NodeDescriptor>) -> Self {
        self.slaves = slaves;
        self
    }

    pub fn with_max_successive_reads(mut self, max: u32) -> Self {
        self.max_successive_reads = max;
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = ClusterConfig::default();

        if let Ok(database) = std::env::var("DOCROUTE_DATABASE") {
            config.master.database = database;
        }

        if let Ok(master) = std::env::var("DOCROUTE_MASTER") {
            config.master.address = master.trim().to_string();
        }

        // Slaves share the master's database name
        if let Ok(slaves) = std::env::var("DOCROUTE_SLAVES") {
            config.slaves = slaves
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| NodeDescriptor::new(s, config.master.database.clone()))
                .collect();
        }

        if let Ok(max) = std::env::var("DOCROUTE_MAX_SUCCESSIVE_READS") {
            if let Ok(max) = max.trim().parse() {
                config.max_successive_reads = max;
            }
        }

        config
    }

    /// Reject configurations the router cannot serve
    pub fn validate(&self) -> RouterResult<()> {
        if self.master.address.is_empty() {
            return Err(RouterError::Configuration("master address is empty".to_string()));
        }

        let mut seen = HashSet::new();
        seen.insert(self.master.address.as_str());

        for node in std::iter::once(&self.master).chain(self.slaves.iter()) {
            if node.database.is_empty() {
                return Err(RouterError::Configuration(format!(
                    "node {} has no database name",
                    node.address
                )));
            }
        }

        for slave in &self.slaves {
            if slave.address.is_empty() {
                return Err(RouterError::Configuration("slave address is empty".to_string()));
            }
            if !seen.insert(slave.address.as_str()) {
                return Err(RouterError::Configuration(format!(
                    "duplicate node address: {}",
                    slave.address
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClusterConfig::default();
        assert_eq!(config.master.address, "127.0.0.1:27017");
        assert!(config.slaves.is_empty());
        assert_eq!(config.max_successive_reads, DEFAULT_MAX_SUCCESSIVE_READS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_slave_rejected() {
        let config = ClusterConfig::default().with_slaves(vec![
            NodeDescriptor::new("10.0.0.2:27017", "docroute"),
            NodeDescriptor::new("10.0.0.2:27017", "docroute"),
        ]);
        assert!(matches!(config.validate(), Err(RouterError::Configuration(_))));
    }

    #[test]
    fn test_slave_equal_to_master_rejected() {
        let config = ClusterConfig::default()
            .with_slaves(vec![NodeDescriptor::new("127.0.0.1:27017", "docroute")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_database_rejected() {
        let config = ClusterConfig::new(NodeDescriptor::new("127.0.0.1:27017", ""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_password_not_serialized() {
        let node = NodeDescriptor::new("127.0.0.1:27017", "app").with_credentials("app", "secret");
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"username\":\"app\""));
        assert!(!json.contains("secret"));
    }
}
