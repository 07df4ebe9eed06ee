//! Docroute Router - master/slave operation routing
//!
//! Sends every operation on a collection to the right node of a master/slave
//! cluster while callers see a single collection.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   │
//!   ▼
//! ┌─────────────────────────┐
//! │       Collection        │  Classifies: write or read?
//! └───────┬────────┬────────┘
//!   write │        │ read
//!         │        ▼
//!         │  ┌──────────────┐
//!         │  │  directed()  │  Counter vs. max_successive_reads
//!         │  └──┬────────┬──┘
//!         ▼     ▼        ▼
//!      ┌──────────┐  ┌──────────┐
//!      │  Master  │  │SlavePool │  Round-robin over slaves
//!      └──────────┘  └──────────┘
//! ```
//!
//! Nodes are reached through a [`ConnectionProvider`]; this crate speaks no
//! wire protocol of its own. [`MemoryCluster`] is an in-process provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use docroute_router::{CollectionRegistry, MemoryCluster};
//!
//! let config = ClusterConfig::from_env();
//! let registry = CollectionRegistry::new(config.clone(), Arc::new(MemoryCluster::for_config(&config)))?;
//!
//! let people = registry.collection("people")?;
//! people.insert(vec![doc(json!({ "name": "alice" }))]).await?;
//! let count = people.count(Selector::new()).await?;
//! ```

mod collection;
mod command;
mod connection;
mod cursor;
mod memory;
mod node;
mod pool;
mod registry;
mod stats;

pub use collection::Collection;
pub use command::{Command, Reply};
pub use connection::{Connection, ConnectionProvider, RawCursor};
pub use cursor::ResultCursor;
pub use memory::{MemoryCluster, MemoryConnection, MemoryCursor};
pub use node::{NodeHandle, NodeRole};
pub use pool::SlavePool;
pub use registry::CollectionRegistry;
pub use stats::RoutingStats;
