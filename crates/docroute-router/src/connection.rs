//! Connection interface
//!
//! The router never speaks a wire protocol. A [`ConnectionProvider`] turns a
//! node descriptor into a [`Connection`] bound to one collection, and every
//! operation is forwarded to it verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use docroute_core::{NodeDescriptor, RouterResult};
use docroute_types::{Document, FindOptions, Selector};

use crate::command::{Command, Reply};

/// Opens connections to physical nodes
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Connect to `node` and bind the connection to `collection`
    async fn connect(&self, node: &NodeDescriptor, collection: &str) -> RouterResult<Arc<dyn Connection>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// A live connection to one node, scoped to one collection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Address of the node behind this connection
    fn address(&self) -> &str;

    /// Run any non-`find` operation
    async fn execute(&self, command: Command) -> RouterResult<Reply>;

    /// Open a cursor over the documents matching `selector`
    async fn find(&self, selector: Selector, options: FindOptions) -> RouterResult<Box<dyn RawCursor>>;
}

/// Driver-level cursor returned by [`Connection::find`]
#[async_trait]
pub trait RawCursor: Send {
    /// Fetch the next document, `None` once exhausted
    async fn next_document(&mut self) -> RouterResult<Option<Document>>;

    /// Release server-side resources; further reads yield nothing
    fn close(&mut self);
}
