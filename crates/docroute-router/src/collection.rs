//! Collection router
//!
//! One `Collection` per logical collection name. It owns the master handle,
//! the slave pool and the read counter, and presents a single operation
//! surface to callers.
//!
//! # Read Routing
//!
//! ```text
//! read arrives
//!      │
//!      ▼
//! pool empty or counter < max_successive_reads?
//!      │                         │
//!     Yes                        No
//!      │                         │
//!      ▼                         ▼
//! counter += 1             counter = 0
//! serve from master        serve from next slave (round-robin)
//! ```
//!
//! Writes skip the policy entirely and always go to the master. With a
//! threshold of `T`, one read in every `T + 1` lands on a slave; a threshold
//! of zero sends every read to the slaves when any are configured.
//!
//! The counter and the pool cursor advance together under one lock, so the
//! split is exact under concurrent callers. Nothing is retried: a failed call
//! on the chosen node is returned to the caller as-is.

use std::sync::Arc;

use docroute_core::{
    verify_vocabulary, ClusterConfig, Operation, OperationKind, RouterError, RouterResult,
};
use docroute_types::{Document, FindOptions, IndexSpec, Selector, UpdateOptions, Value};
use parking_lot::Mutex;
use tracing::debug;

use crate::command::{Command, Reply};
use crate::connection::ConnectionProvider;
use crate::cursor::ResultCursor;
use crate::node::{NodeHandle, NodeRole};
use crate::pool::SlavePool;
use crate::stats::{RoutingStats, StatsRecorder};

/// Router for one logical collection
#[derive(Debug)]
pub struct Collection {
    name: String,
    max_successive_reads: u64,
    master: NodeHandle,
    slaves: SlavePool,
    /// Reads served by the master since the last slave read
    reads: Mutex<u64>,
    stats: StatsRecorder,
}

impl Collection {
    /// Build a router; node connections are opened on first use
    pub fn new(name: &str, config: &ClusterConfig, provider: Arc<dyn ConnectionProvider>) -> RouterResult<Self> {
        verify_vocabulary()?;
        config.validate()?;

        if name.is_empty() {
            return Err(RouterError::Configuration("collection name is empty".to_string()));
        }

        let master = NodeHandle::master(config.master.clone(), name, provider.clone());
        let slaves = SlavePool::from_descriptors(&config.slaves, name, provider);

        debug!(
            collection = %name,
            master = %config.master.address,
            slaves = slaves.len(),
            max_successive_reads = config.max_successive_reads,
            "Collection router created"
        );

        Ok(Self {
            name: name.to_string(),
            max_successive_reads: u64::from(config.max_successive_reads),
            master,
            stats: StatsRecorder::new(slaves.len()),
            slaves,
            reads: Mutex::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn master(&self) -> &NodeHandle {
        &self.master
    }

    pub fn slaves(&self) -> &SlavePool {
        &self.slaves
    }

    pub fn max_successive_reads(&self) -> u64 {
        self.max_successive_reads
    }

    /// Current value of the read counter
    pub fn reads_since_slave(&self) -> u64 {
        *self.reads.lock()
    }

    pub fn stats(&self) -> RoutingStats {
        self.stats.snapshot()
    }

    /// Decide which node serves the next read
    ///
    /// Advances the read counter (and the pool cursor when a slave is picked)
    /// exactly as a routed read would.
    pub fn directed(&self) -> NodeRole {
        self.reader().role()
    }

    fn reader(&self) -> &NodeHandle {
        let mut reads = self.reads.lock();

        let slave = if !self.slaves.is_empty() && *reads >= self.max_successive_reads {
            self.slaves.next()
        } else {
            None
        };

        let node = match slave {
            Some(slave) => {
                *reads = 0;
                slave
            }
            None => {
                *reads = reads.saturating_add(1);
                &self.master
            }
        };

        debug!(collection = %self.name, target = %node.role(), counter = *reads, "Read directed");
        self.stats.record_read(node.role());
        node
    }

    fn target(&self, operation: Operation) -> &NodeHandle {
        match operation.kind() {
            OperationKind::Write => {
                self.stats.record_write();
                &self.master
            }
            OperationKind::Read => self.reader(),
        }
    }

    /// Route a command and forward it to the chosen node
    pub async fn dispatch(&self, command: Command) -> RouterResult<Reply> {
        let node = self.target(command.operation());
        node.execute(command).await
    }

    /// Dispatch by operation name with JSON-encoded arguments
    ///
    /// Unknown names fail with [`RouterError::Configuration`] before any node
    /// is contacted.
    pub async fn dispatch_named(&self, name: &str, args: Document) -> RouterResult<Reply> {
        let command = Command::from_args(name, args)?;
        self.dispatch(command).await
    }

    // ========== Writes ==========

    /// Insert documents, returning their identifiers
    pub async fn insert(&self, documents: Vec<Document>) -> RouterResult<Vec<Value>> {
        self.dispatch(Command::Insert { documents })
            .await?
            .into_ids(Operation::Insert)
    }

    /// Update matching documents, returning how many were touched
    pub async fn update(&self, selector: Selector, update: Document, options: UpdateOptions) -> RouterResult<u64> {
        self.dispatch(Command::Update { selector, update, options })
            .await?
            .into_affected(Operation::Update)
    }

    pub async fn remove(&self, selector: Selector) -> RouterResult<u64> {
        self.dispatch(Command::Remove { selector })
            .await?
            .into_affected(Operation::Remove)
    }

    /// Insert or replace by `_id`, returning the identifier
    pub async fn save(&self, document: Document) -> RouterResult<Value> {
        let ids = self
            .dispatch(Command::Save { document })
            .await?
            .into_ids(Operation::Save)?;
        ids.into_iter().next().ok_or_else(|| RouterError::UnexpectedReply {
            operation: Operation::Save.to_string(),
            reply: "no identifier".to_string(),
        })
    }

    pub async fn create_index(&self, spec: IndexSpec) -> RouterResult<()> {
        self.dispatch(Command::CreateIndex { spec })
            .await?
            .into_affected(Operation::CreateIndex)
            .map(|_| ())
    }

    pub async fn drop_index(&self, name: &str) -> RouterResult<()> {
        self.dispatch(Command::DropIndex { name: name.to_string() })
            .await?
            .into_affected(Operation::DropIndex)
            .map(|_| ())
    }

    pub async fn drop_indexes(&self) -> RouterResult<()> {
        self.dispatch(Command::DropIndexes)
            .await?
            .into_affected(Operation::DropIndexes)
            .map(|_| ())
    }

    /// Drop the collection, returning how many documents it held
    pub async fn drop(&self) -> RouterResult<u64> {
        self.dispatch(Command::Drop)
            .await?
            .into_affected(Operation::Drop)
    }

    pub async fn rename(&self, new_name: &str) -> RouterResult<()> {
        self.dispatch(Command::Rename { new_name: new_name.to_string() })
            .await?
            .into_affected(Operation::Rename)
            .map(|_| ())
    }

    // ========== Reads ==========

    /// Query the directed node and wrap the result in a cursor owned by the caller
    pub async fn find(&self, selector: Selector, options: FindOptions) -> RouterResult<ResultCursor> {
        let node = self.reader();
        let raw = node.find(selector.clone(), options.clone()).await?;
        Ok(ResultCursor::new(raw, node.role(), selector, options))
    }

    /// Query and hand each document to `visitor`
    ///
    /// The cursor is closed once the visitor is done, whether it finished,
    /// returned an error or panicked.
    pub async fn find_each<F>(&self, selector: Selector, options: FindOptions, mut visitor: F) -> RouterResult<()>
    where
        F: FnMut(Document) -> RouterResult<()>,
    {
        let mut cursor = self.find(selector, options).await?;

        let outcome = async {
            while let Some(document) = cursor.next().await? {
                visitor(document)?;
            }
            Ok::<(), RouterError>(())
        }
        .await;

        cursor.close();
        outcome
    }

    pub async fn find_one(&self, selector: Selector, options: FindOptions) -> RouterResult<Option<Document>> {
        self.dispatch(Command::FindOne { selector, options })
            .await?
            .into_document(Operation::FindOne)
    }

    pub async fn count(&self, selector: Selector) -> RouterResult<u64> {
        self.dispatch(Command::Count { selector })
            .await?
            .into_count(Operation::Count)
    }

    pub async fn distinct(&self, key: &str, selector: Selector) -> RouterResult<Vec<Value>> {
        self.dispatch(Command::Distinct { key: key.to_string(), selector })
            .await?
            .into_values(Operation::Distinct)
    }

    /// Per-value document counts for `key`
    pub async fn group(&self, key: &str, selector: Selector) -> RouterResult<Vec<Document>> {
        self.dispatch(Command::Group { key: key.to_string(), selector })
            .await?
            .into_documents(Operation::Group)
    }

    pub async fn map_reduce(&self, map: &str, reduce: &str, selector: Selector) -> RouterResult<Vec<Document>> {
        let command = Command::MapReduce {
            map: map.to_string(),
            reduce: reduce.to_string(),
            selector,
        };
        self.dispatch(command)
            .await?
            .into_documents(Operation::MapReduce)
    }

    pub async fn index_information(&self) -> RouterResult<Vec<Document>> {
        self.dispatch(Command::IndexInformation)
            .await?
            .into_documents(Operation::IndexInformation)
    }

    pub async fn options(&self) -> RouterResult<Option<Document>> {
        self.dispatch(Command::Options)
            .await?
            .into_document(Operation::Options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCluster;
    use docroute_core::NodeDescriptor;
    use docroute_types::doc;
    use futures::FutureExt;
    use serde_json::json;
    use std::panic::AssertUnwindSafe;

    const MASTER: &str = "master:27017";

    fn slave_address(index: usize) -> String {
        format!("slave{}:27017", index)
    }

    fn create_collection(slaves: usize, max_successive_reads: u32) -> (Collection, MemoryCluster) {
        let config = ClusterConfig::new(NodeDescriptor::new(MASTER, "app"))
            .with_slaves(
                (0..slaves)
                    .map(|i| NodeDescriptor::new(slave_address(i), "app"))
                    .collect(),
            )
            .with_max_successive_reads(max_successive_reads);
        let cluster = MemoryCluster::for_config(&config);
        let collection = Collection::new("people", &config, Arc::new(cluster.clone())).unwrap();
        (collection, cluster)
    }

    #[test]
    fn test_threshold_two_single_slave() {
        let (collection, _) = create_collection(1, 2);

        let mut observed = Vec::new();
        for _ in 0..6 {
            let target = collection.directed();
            observed.push((target, collection.reads_since_slave()));
        }

        assert_eq!(
            observed,
            vec![
                (NodeRole::Master, 1),
                (NodeRole::Master, 2),
                (NodeRole::Slave(0), 0),
                (NodeRole::Master, 1),
                (NodeRole::Master, 2),
                (NodeRole::Slave(0), 0),
            ]
        );
    }

    #[test]
    fn test_round_robin_continues_across_resets() {
        let (collection, _) = create_collection(2, 1);

        let targets: Vec<_> = (0..6).map(|_| collection.directed()).collect();
        assert_eq!(
            targets,
            vec![
                NodeRole::Master,
                NodeRole::Slave(0),
                NodeRole::Master,
                NodeRole::Slave(1),
                NodeRole::Master,
                NodeRole::Slave(0),
            ]
        );
    }

    #[test]
    fn test_empty_pool_always_master() {
        let (collection, _) = create_collection(0, 2);

        for expected in 1..=50 {
            assert_eq!(collection.directed(), NodeRole::Master);
            assert_eq!(collection.reads_since_slave(), expected);
        }
    }

    #[test]
    fn test_zero_threshold_sends_every_read_to_slaves() {
        let (collection, _) = create_collection(3, 0);

        let targets: Vec<_> = (0..6).map(|_| collection.directed()).collect();
        assert_eq!(
            targets,
            vec![
                NodeRole::Slave(0),
                NodeRole::Slave(1),
                NodeRole::Slave(2),
                NodeRole::Slave(0),
                NodeRole::Slave(1),
                NodeRole::Slave(2),
            ]
        );
        assert_eq!(collection.reads_since_slave(), 0);
    }

    #[test]
    fn test_slave_share_is_one_in_threshold_plus_one() {
        let (collection, _) = create_collection(2, 4);

        for _ in 0..100 {
            collection.directed();
        }

        let stats = collection.stats();
        assert_eq!(stats.total_slave_reads(), 20);
        assert_eq!(stats.master_reads, 80);
        assert_eq!(stats.slave_reads, vec![10, 10]);
    }

    #[tokio::test]
    async fn test_writes_do_not_touch_counter() {
        let (collection, cluster) = create_collection(1, 2);

        collection.count(Selector::new()).await.unwrap();
        collection.insert(vec![doc(json!({ "name": "alice" }))]).await.unwrap();
        collection.count(Selector::new()).await.unwrap();
        collection
            .update(
                doc(json!({ "name": "alice" })),
                doc(json!({ "$set": { "age": 30 } })),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(collection.reads_since_slave(), 2);

        // Third read goes to the slave despite the interleaved writes
        assert_eq!(collection.count(Selector::new()).await.unwrap(), 1);
        assert_eq!(cluster.calls(&slave_address(0)), vec![Operation::Count]);
        assert_eq!(cluster.writes(MASTER), 2);
    }

    #[tokio::test]
    async fn test_every_write_goes_to_master() {
        let (collection, cluster) = create_collection(2, 0);

        collection.insert(vec![doc(json!({ "_id": 1, "name": "alice" }))]).await.unwrap();
        collection.save(doc(json!({ "_id": 1, "name": "alicia" }))).await.unwrap();
        collection
            .update(doc(json!({ "_id": 1 })), doc(json!({ "name": "al" })), UpdateOptions::default())
            .await
            .unwrap();
        collection.create_index(IndexSpec::ascending("name")).await.unwrap();
        collection.drop_index("name_1").await.unwrap();
        collection.drop_indexes().await.unwrap();
        collection.remove(doc(json!({ "_id": 1 }))).await.unwrap();
        collection.rename("people_archive").await.unwrap();
        collection.drop().await.unwrap();

        assert_eq!(cluster.writes(MASTER), 9);
        assert!(cluster.calls(&slave_address(0)).is_empty());
        assert!(cluster.calls(&slave_address(1)).is_empty());
        assert_eq!(collection.stats().writes, 9);
        assert_eq!(collection.reads_since_slave(), 0);
    }

    #[tokio::test]
    async fn test_find_returns_open_cursor() {
        let (collection, cluster) = create_collection(1, 1);
        collection
            .insert(vec![doc(json!({ "n": 1 })), doc(json!({ "n": 2 }))])
            .await
            .unwrap();

        let cursor = collection.find(Selector::new(), FindOptions::default()).await.unwrap();
        assert_eq!(cursor.served_by(), NodeRole::Master);
        assert!(!cursor.is_closed());
        assert_eq!(cluster.open_cursors(MASTER), 1);

        let cursor = collection.find(Selector::new(), FindOptions::default()).await.unwrap();
        assert_eq!(cursor.served_by(), NodeRole::Slave(0));

        let documents = cursor.collect_all().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(cluster.open_cursors(&slave_address(0)), 0);
    }

    #[tokio::test]
    async fn test_find_each_visits_and_closes() {
        let (collection, cluster) = create_collection(0, 10);
        collection
            .insert(vec![doc(json!({ "n": 1 })), doc(json!({ "n": 2 })), doc(json!({ "n": 3 }))])
            .await
            .unwrap();

        let mut seen = Vec::new();
        collection
            .find_each(Selector::new(), FindOptions::default(), |document| {
                seen.push(document["n"].clone());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(cluster.open_cursors(MASTER), 0);
    }

    #[tokio::test]
    async fn test_find_each_closes_on_visitor_error() {
        let (collection, cluster) = create_collection(0, 10);
        collection
            .insert(vec![doc(json!({ "n": 1 })), doc(json!({ "n": 2 }))])
            .await
            .unwrap();

        let result = collection
            .find_each(Selector::new(), FindOptions::default(), |_| {
                Err(RouterError::operation("visit", "stop"))
            })
            .await;

        assert_eq!(result, Err(RouterError::operation("visit", "stop")));
        assert_eq!(cluster.open_cursors(MASTER), 0);
    }

    #[tokio::test]
    async fn test_find_each_closes_on_visitor_panic() {
        let (collection, cluster) = create_collection(0, 10);
        collection.insert(vec![doc(json!({ "n": 1 }))]).await.unwrap();

        let outcome = AssertUnwindSafe(collection.find_each(
            Selector::new(),
            FindOptions::default(),
            |_| -> RouterResult<()> { panic!("visitor failed") },
        ))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(cluster.open_cursors(MASTER), 0);
    }

    #[tokio::test]
    async fn test_slave_failure_is_not_retried_on_master() {
        let (collection, cluster) = create_collection(1, 0);
        cluster.set_reachable(&slave_address(0), false);

        let err = collection.count(Selector::new()).await.unwrap_err();
        assert_eq!(
            err,
            RouterError::connection(slave_address(0), "node unreachable")
        );
        assert!(cluster.calls(MASTER).is_empty());
        assert_eq!(cluster.connects(MASTER), 0);
    }

    #[tokio::test]
    async fn test_master_failure_propagates() {
        let (collection, cluster) = create_collection(1, 5);
        cluster.set_reachable(MASTER, false);

        let err = collection.insert(vec![doc(json!({ "n": 1 }))]).await.unwrap_err();
        assert!(err.is_connection());
        assert!(cluster.calls(&slave_address(0)).is_empty());
    }

    #[tokio::test]
    async fn test_operation_error_propagates_verbatim() {
        let (collection, _) = create_collection(0, 1);

        let err = collection.map_reduce("emit", "sum", Selector::new()).await.unwrap_err();
        assert_eq!(
            err,
            RouterError::operation("map_reduce", "map_reduce is not supported by the memory backend")
        );
    }

    #[tokio::test]
    async fn test_connections_opened_once() {
        let (collection, cluster) = create_collection(1, 1);
        assert!(!collection.master().is_connected());
        assert_eq!(cluster.connects(MASTER), 0);

        for _ in 0..6 {
            collection.count(Selector::new()).await.unwrap();
        }

        assert_eq!(cluster.connects(MASTER), 1);
        assert_eq!(cluster.connects(&slave_address(0)), 1);
        assert_eq!(cluster.reads(MASTER), 3);
        assert_eq!(cluster.reads(&slave_address(0)), 3);
    }

    #[tokio::test]
    async fn test_dispatch_named() {
        let (collection, _) = create_collection(0, 1);

        let reply = collection
            .dispatch_named("insert", doc(json!({ "documents": [{ "name": "alice" }] })))
            .await
            .unwrap();
        assert!(matches!(reply, Reply::Inserted(ids) if ids.len() == 1));

        let reply = collection
            .dispatch_named("count", doc(json!({ "selector": { "name": "alice" } })))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Count(1));
    }

    #[tokio::test]
    async fn test_dispatch_named_unknown_operation() {
        let (collection, cluster) = create_collection(1, 0);

        let err = collection.dispatch_named("explain", Document::new()).await.unwrap_err();
        assert!(matches!(err, RouterError::Configuration(_)));
        assert_eq!(collection.reads_since_slave(), 0);
        assert!(cluster.calls(MASTER).is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClusterConfig::new(NodeDescriptor::new("", "app"));
        let result = Collection::new("people", &config, Arc::new(MemoryCluster::new()));
        assert!(matches!(result, Err(RouterError::Configuration(_))));
    }
}
