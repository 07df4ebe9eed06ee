//! In-memory cluster backend
//!
//! Implements [`ConnectionProvider`] over process-local state. All nodes share
//! one document store, modelling an instantly replicated cluster, while each
//! node keeps its own call log, connection count and open-cursor count so
//! callers can see which node served what. Nodes can be marked unreachable
//! to exercise connection failures.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use docroute_core::{ClusterConfig, NodeDescriptor, Operation, RouterError, RouterResult};
use docroute_types::{
    matches, Document, FindOptions, IndexSpec, Selector, SortOrder, UpdateOptions, Value, ID_FIELD,
};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tracing::debug;

use crate::command::{Command, Reply};
use crate::connection::{Connection, ConnectionProvider, RawCursor};

/// Name of the implicit identifier index
const ID_INDEX: &str = "_id_";

#[derive(Debug, Default)]
struct CollectionData {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

type Store = RwLock<HashMap<String, CollectionData>>;

#[derive(Debug)]
struct MemoryNode {
    address: String,
    reachable: AtomicBool,
    connects: AtomicU64,
    open_cursors: AtomicUsize,
    calls: Mutex<Vec<Operation>>,
}

impl MemoryNode {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            reachable: AtomicBool::new(true),
            connects: AtomicU64::new(0),
            open_cursors: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn ensure_reachable(&self) -> RouterResult<()> {
        if self.reachable.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RouterError::connection(&self.address, "node unreachable"))
        }
    }
}

/// Process-local cluster of nodes sharing one store
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    nodes: Arc<RwLock<HashMap<String, Arc<MemoryNode>>>>,
    store: Arc<Store>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster with one node per configured master and slave address
    pub fn for_config(config: &ClusterConfig) -> Self {
        let cluster = Self::new();
        cluster.add_node(&config.master.address);
        for slave in &config.slaves {
            cluster.add_node(&slave.address);
        }
        cluster
    }

    /// Register a reachable node; existing nodes are left untouched
    pub fn add_node(&self, address: &str) {
        self.nodes
            .write()
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(MemoryNode::new(address)));
    }

    /// Mark a node reachable or unreachable
    pub fn set_reachable(&self, address: &str, reachable: bool) {
        if let Some(node) = self.node(address) {
            node.reachable.store(reachable, Ordering::Release);
            debug!(address = %address, reachable, "Memory node reachability changed");
        }
    }

    /// Operations served by a node, in arrival order
    pub fn calls(&self, address: &str) -> Vec<Operation> {
        self.node(address)
            .map(|node| node.calls.lock().clone())
            .unwrap_or_default()
    }

    /// Number of read operations served by a node
    pub fn reads(&self, address: &str) -> usize {
        self.calls(address).iter().filter(|op| op.is_read()).count()
    }

    /// Number of write operations served by a node
    pub fn writes(&self, address: &str) -> usize {
        self.calls(address).iter().filter(|op| op.is_write()).count()
    }

    /// Successful connections opened to a node
    pub fn connects(&self, address: &str) -> u64 {
        self.node(address)
            .map(|node| node.connects.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Cursors opened on a node and not yet closed
    pub fn open_cursors(&self, address: &str) -> usize {
        self.node(address)
            .map(|node| node.open_cursors.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn node(&self, address: &str) -> Option<Arc<MemoryNode>> {
        self.nodes.read().get(address).cloned()
    }
}

#[async_trait]
impl ConnectionProvider for MemoryCluster {
    async fn connect(&self, node: &NodeDescriptor, collection: &str) -> RouterResult<Arc<dyn Connection>> {
        let memory_node = self
            .node(&node.address)
            .ok_or_else(|| RouterError::connection(&node.address, "unknown node"))?;
        memory_node.ensure_reachable()?;
        memory_node.connects.fetch_add(1, Ordering::AcqRel);

        Ok(Arc::new(MemoryConnection {
            node: memory_node,
            store: self.store.clone(),
            collection: collection.to_string(),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Connection to one memory node for one collection
#[derive(Debug)]
pub struct MemoryConnection {
    node: Arc<MemoryNode>,
    store: Arc<Store>,
    collection: String,
}

impl MemoryConnection {
    fn begin(&self, operation: Operation) -> RouterResult<()> {
        self.node.ensure_reachable()?;
        self.node.calls.lock().push(operation);
        Ok(())
    }

    fn insert(&self, documents: Vec<Document>) -> RouterResult<Reply> {
        let mut store = self.store.write();
        let data = store.entry(self.collection.clone()).or_default();

        let mut prepared = Vec::with_capacity(documents.len());
        for mut document in documents {
            if !document.contains_key(ID_FIELD) {
                document.insert(ID_FIELD.to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
            check_unique(data, &prepared, &document, None, Operation::Insert)?;
            prepared.push(document);
        }

        let ids = prepared
            .iter()
            .map(|document| document.get(ID_FIELD).cloned().unwrap_or(Value::Null))
            .collect();
        data.documents.extend(prepared);
        Ok(Reply::Inserted(ids))
    }

    fn update(&self, selector: Selector, update: Document, options: UpdateOptions) -> RouterResult<Reply> {
        let mut store = self.store.write();
        let data = store.entry(self.collection.clone()).or_default();

        let positions: Vec<usize> = data
            .documents
            .iter()
            .enumerate()
            .filter(|(_, document)| matches(document, &selector))
            .map(|(position, _)| position)
            .take(if options.multi { usize::MAX } else { 1 })
            .collect();

        if positions.is_empty() {
            if !options.upsert {
                return Ok(Reply::Ack { affected: 0 });
            }
            let mut document = selector.clone();
            apply_update(&mut document, &update);
            if !document.contains_key(ID_FIELD) {
                document.insert(ID_FIELD.to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
            check_unique(data, &[], &document, None, Operation::Update)?;
            data.documents.push(document);
            return Ok(Reply::Ack { affected: 1 });
        }

        for &position in &positions {
            let mut document = data.documents[position].clone();
            apply_update(&mut document, &update);
            check_unique(data, &[], &document, Some(position), Operation::Update)?;
            data.documents[position] = document;
        }
        Ok(Reply::Ack { affected: positions.len() as u64 })
    }

    fn remove(&self, selector: Selector) -> Reply {
        let mut store = self.store.write();
        let affected = match store.get_mut(&self.collection) {
            Some(data) => {
                let before = data.documents.len();
                data.documents.retain(|document| !matches(document, &selector));
                (before - data.documents.len()) as u64
            }
            None => 0,
        };
        Reply::Ack { affected }
    }

    fn save(&self, document: Document) -> RouterResult<Reply> {
        let id = match document.get(ID_FIELD).cloned() {
            Some(id) => id,
            None => return self.insert(vec![document]),
        };

        let mut store = self.store.write();
        let data = store.entry(self.collection.clone()).or_default();
        let existing = data
            .documents
            .iter()
            .position(|stored| stored.get(ID_FIELD) == Some(&id));

        check_unique(data, &[], &document, existing, Operation::Save)?;
        match existing {
            Some(position) => data.documents[position] = document,
            None => data.documents.push(document),
        }
        Ok(Reply::Inserted(vec![id]))
    }

    fn create_index(&self, spec: IndexSpec) -> Reply {
        let mut store = self.store.write();
        let data = store.entry(self.collection.clone()).or_default();
        if !data.indexes.iter().any(|index| index.name == spec.name) {
            data.indexes.push(spec);
        }
        Reply::Ack { affected: 0 }
    }

    fn drop_index(&self, name: String) -> RouterResult<Reply> {
        let mut store = self.store.write();
        let data = store.entry(self.collection.clone()).or_default();
        let before = data.indexes.len();
        data.indexes.retain(|index| index.name != name);
        if data.indexes.len() == before {
            return Err(RouterError::operation(
                Operation::DropIndex.as_str(),
                format!("index not found: {}", name),
            ));
        }
        Ok(Reply::Ack { affected: 0 })
    }

    fn rename(&self, new_name: String) -> RouterResult<Reply> {
        let mut store = self.store.write();
        if store.contains_key(&new_name) {
            return Err(RouterError::operation(
                Operation::Rename.as_str(),
                format!("target collection exists: {}", new_name),
            ));
        }
        let data = store.remove(&self.collection).unwrap_or_default();
        store.insert(new_name, data);
        Ok(Reply::Ack { affected: 0 })
    }

    fn query(&self, selector: &Selector, options: &FindOptions) -> Vec<Document> {
        let store = self.store.read();
        let documents = store
            .get(&self.collection)
            .map(|data| {
                data.documents
                    .iter()
                    .filter(|document| matches(document, selector))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        apply_options(documents, options)
    }

    fn matching(&self, selector: &Selector) -> Vec<Document> {
        self.query(selector, &FindOptions::default())
    }

    fn index_information(&self) -> Vec<Document> {
        let store = self.store.read();
        let mut indexes = vec![IndexSpec::ascending(ID_FIELD).unique()];
        indexes[0].name = ID_INDEX.to_string();
        if let Some(data) = store.get(&self.collection) {
            indexes.extend(data.indexes.iter().cloned());
        }

        indexes
            .into_iter()
            .map(|index| {
                let keys: Document = index
                    .keys
                    .iter()
                    .map(|(field, order)| {
                        let direction = match order {
                            SortOrder::Ascending => 1,
                            SortOrder::Descending => -1,
                        };
                        (field.clone(), json!(direction))
                    })
                    .collect();
                docroute_types::doc(json!({
                    "name": index.name,
                    "key": keys,
                    "unique": index.unique,
                }))
            })
            .collect()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn address(&self) -> &str {
        &self.node.address
    }

    async fn execute(&self, command: Command) -> RouterResult<Reply> {
        let operation = command.operation();
        self.begin(operation)?;

        match command {
            Command::Insert { documents } => self.insert(documents),
            Command::Update { selector, update, options } => self.update(selector, update, options),
            Command::Remove { selector } => Ok(self.remove(selector)),
            Command::Save { document } => self.save(document),
            Command::CreateIndex { spec } => Ok(self.create_index(spec)),
            Command::DropIndex { name } => self.drop_index(name),
            Command::DropIndexes => {
                if let Some(data) = self.store.write().get_mut(&self.collection) {
                    data.indexes.clear();
                }
                Ok(Reply::Ack { affected: 0 })
            }
            Command::Drop => {
                let removed = self.store.write().remove(&self.collection);
                let affected = removed.map(|data| data.documents.len() as u64).unwrap_or(0);
                Ok(Reply::Ack { affected })
            }
            Command::Rename { new_name } => self.rename(new_name),
            Command::FindOne { selector, options } => {
                let options = FindOptions { limit: Some(1), ..options };
                Ok(Reply::Document(self.query(&selector, &options).into_iter().next()))
            }
            Command::Count { selector } => Ok(Reply::Count(self.matching(&selector).len() as u64)),
            Command::Distinct { key, selector } => {
                let mut values: Vec<Value> = Vec::new();
                for document in self.matching(&selector) {
                    if let Some(value) = document.get(&key) {
                        if !values.contains(value) {
                            values.push(value.clone());
                        }
                    }
                }
                Ok(Reply::Values(values))
            }
            Command::Group { key, selector } => {
                let mut groups: Vec<(Value, u64)> = Vec::new();
                for document in self.matching(&selector) {
                    let value = document.get(&key).cloned().unwrap_or(Value::Null);
                    match groups.iter_mut().find(|(existing, _)| *existing == value) {
                        Some((_, count)) => *count += 1,
                        None => groups.push((value, 1)),
                    }
                }
                let documents = groups
                    .into_iter()
                    .map(|(value, count)| {
                        let mut group = Document::new();
                        group.insert(key.clone(), value);
                        group.insert("count".to_string(), json!(count));
                        group
                    })
                    .collect();
                Ok(Reply::Documents(documents))
            }
            Command::MapReduce { .. } => Err(RouterError::operation(
                operation.as_str(),
                "map_reduce is not supported by the memory backend",
            )),
            Command::IndexInformation => Ok(Reply::Documents(self.index_information())),
            Command::Options => {
                let store = self.store.read();
                let count = store
                    .get(&self.collection)
                    .map(|data| data.documents.len())
                    .unwrap_or(0);
                Ok(Reply::Document(Some(docroute_types::doc(json!({
                    "name": self.collection,
                    "capped": false,
                    "count": count,
                })))))
            }
        }
    }

    async fn find(&self, selector: Selector, options: FindOptions) -> RouterResult<Box<dyn RawCursor>> {
        self.begin(Operation::Find)?;
        let documents = self.query(&selector, &options);
        self.node.open_cursors.fetch_add(1, Ordering::AcqRel);

        Ok(Box::new(MemoryCursor {
            node: self.node.clone(),
            documents: documents.into(),
            closed: false,
        }))
    }
}

/// Cursor over a snapshot of matching documents
#[derive(Debug)]
pub struct MemoryCursor {
    node: Arc<MemoryNode>,
    documents: VecDeque<Document>,
    closed: bool,
}

#[async_trait]
impl RawCursor for MemoryCursor {
    async fn next_document(&mut self) -> RouterResult<Option<Document>> {
        if self.closed {
            return Ok(None);
        }
        self.node.ensure_reachable()?;
        Ok(self.documents.pop_front())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.documents.clear();
            self.node.open_cursors.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.close();
    }
}

/// `$set` updates individual fields; any other update replaces the document
fn apply_update(document: &mut Document, update: &Document) {
    match update.get("$set") {
        Some(Value::Object(fields)) => {
            for (field, value) in fields {
                document.insert(field.clone(), value.clone());
            }
        }
        _ => {
            let id = document.get(ID_FIELD).cloned();
            *document = update.clone();
            if let Some(id) = id {
                document.insert(ID_FIELD.to_string(), id);
            }
        }
    }
}

/// Reject `document` if it collides on `_id` or a unique index
fn check_unique(
    data: &CollectionData,
    pending: &[Document],
    document: &Document,
    replacing: Option<usize>,
    operation: Operation,
) -> RouterResult<()> {
    let mut unique_fields: Vec<&str> = vec![ID_FIELD];
    for index in data.indexes.iter().filter(|index| index.unique) {
        unique_fields.extend(index.keys.iter().map(|(field, _)| field.as_str()));
    }

    let others = data
        .documents
        .iter()
        .enumerate()
        .filter(|(position, _)| Some(*position) != replacing)
        .map(|(_, other)| other)
        .chain(pending.iter());

    for other in others {
        for field in &unique_fields {
            if let Some(value) = document.get(*field) {
                if other.get(*field) == Some(value) {
                    return Err(RouterError::operation(
                        operation.as_str(),
                        format!("duplicate key on {}: {}", field, value),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
        (None, None) => CmpOrdering::Equal,
    }
}

fn apply_options(mut documents: Vec<Document>, options: &FindOptions) -> Vec<Document> {
    if !options.sort.is_empty() {
        documents.sort_by(|a, b| {
            options
                .sort
                .iter()
                .map(|(field, order)| {
                    let ordering = compare_values(a.get(field), b.get(field));
                    match order {
                        SortOrder::Ascending => ordering,
                        SortOrder::Descending => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != CmpOrdering::Equal)
                .unwrap_or(CmpOrdering::Equal)
        });
    }

    let documents = documents
        .into_iter()
        .skip(options.skip.unwrap_or(0))
        .take(options.limit.unwrap_or(usize::MAX));

    if options.fields.is_empty() {
        return documents.collect();
    }

    documents
        .map(|document| {
            document
                .into_iter()
                .filter(|(field, _)| field == ID_FIELD || options.fields.contains(field))
                .collect()
        })
        .collect()
}
