//! Node handles
//!
//! A handle wraps the connection to one physical node (the master or one
//! slave) for one collection. The connection is opened on first use and
//! cached for the handle's lifetime; a failed attempt is not cached, so the
//! next call tries again.

use std::fmt;
use std::sync::Arc;

use docroute_core::{NodeDescriptor, RouterResult};
use docroute_types::{FindOptions, Selector};
use tokio::sync::OnceCell;
use tracing::{info, trace, warn};

use crate::command::{Command, Reply};
use crate::connection::{Connection, ConnectionProvider, RawCursor};

/// Which side of the cluster a handle points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    /// Slave at the given position in the pool
    Slave(usize),
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Slave(index) => write!(f, "slave[{}]", index),
        }
    }
}

/// Handle to one node for one collection
pub struct NodeHandle {
    role: NodeRole,
    descriptor: NodeDescriptor,
    collection: String,
    provider: Arc<dyn ConnectionProvider>,
    connection: OnceCell<Arc<dyn Connection>>,
}

impl NodeHandle {
    /// Lazily connected master handle
    pub fn master(descriptor: NodeDescriptor, collection: &str, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self::lazy(NodeRole::Master, descriptor, collection, provider)
    }

    /// Lazily connected slave handle at `index` in the pool
    pub fn slave(
        index: usize,
        descriptor: NodeDescriptor,
        collection: &str,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Self {
        Self::lazy(NodeRole::Slave(index), descriptor, collection, provider)
    }

    fn lazy(
        role: NodeRole,
        descriptor: NodeDescriptor,
        collection: &str,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Self {
        Self {
            role,
            descriptor,
            collection: collection.to_string(),
            provider,
            connection: OnceCell::new(),
        }
    }

    /// Master handle connected up front; connection failures are returned as-is
    pub async fn new_master(
        descriptor: NodeDescriptor,
        collection: &str,
        provider: Arc<dyn ConnectionProvider>,
    ) -> RouterResult<Self> {
        let handle = Self::master(descriptor, collection, provider);
        handle.connection().await?;
        Ok(handle)
    }

    /// Slave handle connected up front; connection failures are returned as-is
    pub async fn new_slave(
        index: usize,
        descriptor: NodeDescriptor,
        collection: &str,
        provider: Arc<dyn ConnectionProvider>,
    ) -> RouterResult<Self> {
        let handle = Self::slave(index, descriptor, collection, provider);
        handle.connection().await?;
        Ok(handle)
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn address(&self) -> &str {
        &self.descriptor.address
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether the connection has been established
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// Cached connection, opened on first call
    pub async fn connection(&self) -> RouterResult<&Arc<dyn Connection>> {
        self.connection
            .get_or_try_init(|| async {
                match self.provider.connect(&self.descriptor, &self.collection).await {
                    Ok(connection) => {
                        info!(
                            role = %self.role,
                            address = %self.descriptor.address,
                            collection = %self.collection,
                            provider = self.provider.name(),
                            "Node connected"
                        );
                        Ok(connection)
                    }
                    Err(err) => {
                        warn!(
                            role = %self.role,
                            address = %self.descriptor.address,
                            error = %err,
                            "Node connection failed"
                        );
                        Err(err)
                    }
                }
            })
            .await
    }

    /// Forward a command to the node
    pub async fn execute(&self, command: Command) -> RouterResult<Reply> {
        let connection = self.connection().await?;
        trace!(role = %self.role, operation = %command.operation(), "Forwarding command");
        connection.execute(command).await
    }

    /// Forward a query to the node
    pub async fn find(&self, selector: Selector, options: FindOptions) -> RouterResult<Box<dyn RawCursor>> {
        let connection = self.connection().await?;
        trace!(role = %self.role, "Forwarding find");
        connection.find(selector, options).await
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("role", &self.role)
            .field("address", &self.descriptor.address)
            .field("collection", &self.collection)
            .field("connected", &self.is_connected())
            .finish()
    }
}
