//! Commands forwarded to a node and the replies they produce
//!
//! `find` is not a command: it yields a cursor instead of a reply and has its
//! own entry point on [`Connection`](crate::connection::Connection).

use docroute_core::{Operation, RouterError, RouterResult};
use docroute_types::{Document, FindOptions, IndexSpec, Selector, UpdateOptions, Value};
use serde::{Deserialize, Serialize};

/// An operation together with its arguments
///
/// Serialized with the operation name under `op`, so a command can be built
/// from a name plus a JSON argument document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Insert {
        documents: Vec<Document>,
    },
    Update {
        #[serde(default)]
        selector: Selector,
        update: Document,
        #[serde(default)]
        options: UpdateOptions,
    },
    Remove {
        #[serde(default)]
        selector: Selector,
    },
    Save {
        document: Document,
    },
    CreateIndex {
        spec: IndexSpec,
    },
    DropIndex {
        name: String,
    },
    DropIndexes,
    Drop,
    Rename {
        new_name: String,
    },
    FindOne {
        #[serde(default)]
        selector: Selector,
        #[serde(default)]
        options: FindOptions,
    },
    Count {
        #[serde(default)]
        selector: Selector,
    },
    Distinct {
        key: String,
        #[serde(default)]
        selector: Selector,
    },
    /// Count matching documents per distinct value of `key`
    Group {
        key: String,
        #[serde(default)]
        selector: Selector,
    },
    MapReduce {
        map: String,
        reduce: String,
        #[serde(default)]
        selector: Selector,
    },
    IndexInformation,
    Options,
}

impl Command {
    /// Build a command from an operation name and its arguments
    ///
    /// Names outside the vocabulary fail with `Configuration`; arguments
    /// that do not fit the operation fail with `Operation`.
    pub fn from_args(name: &str, mut args: Document) -> RouterResult<Self> {
        let operation: Operation = name.parse()?;
        if operation == Operation::Find {
            return Err(RouterError::Configuration(
                "find yields a cursor and cannot be dispatched as a command".to_string(),
            ));
        }

        args.insert("op".to_string(), Value::String(operation.as_str().to_string()));
        serde_json::from_value(Value::Object(args))
            .map_err(|err| RouterError::operation(name, format!("invalid arguments: {}", err)))
    }

    /// Operation this command performs
    pub fn operation(&self) -> Operation {
        match self {
            Command::Insert { .. } => Operation::Insert,
            Command::Update { .. } => Operation::Update,
            Command::Remove { .. } => Operation::Remove,
            Command::Save { .. } => Operation::Save,
            Command::CreateIndex { .. } => Operation::CreateIndex,
            Command::DropIndex { .. } => Operation::DropIndex,
            Command::DropIndexes => Operation::DropIndexes,
            Command::Drop => Operation::Drop,
            Command::Rename { .. } => Operation::Rename,
            Command::FindOne { .. } => Operation::FindOne,
            Command::Count { .. } => Operation::Count,
            Command::Distinct { .. } => Operation::Distinct,
            Command::Group { .. } => Operation::Group,
            Command::MapReduce { .. } => Operation::MapReduce,
            Command::IndexInformation => Operation::IndexInformation,
            Command::Options => Operation::Options,
        }
    }
}

/// What a node returns for a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// Acknowledged write with the number of documents it touched
    Ack { affected: u64 },
    /// Identifiers of inserted or saved documents
    Inserted(Vec<Value>),
    Count(u64),
    Document(Option<Document>),
    Values(Vec<Value>),
    Documents(Vec<Document>),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Reply::Ack { .. } => "ack",
            Reply::Inserted(_) => "inserted",
            Reply::Count(_) => "count",
            Reply::Document(_) => "document",
            Reply::Values(_) => "values",
            Reply::Documents(_) => "documents",
        }
    }

    fn unexpected(self, operation: Operation) -> RouterError {
        RouterError::UnexpectedReply {
            operation: operation.to_string(),
            reply: self.kind().to_string(),
        }
    }

    pub fn into_affected(self, operation: Operation) -> RouterResult<u64> {
        match self {
            Reply::Ack { affected } => Ok(affected),
            other => Err(other.unexpected(operation)),
        }
    }

    pub fn into_ids(self, operation: Operation) -> RouterResult<Vec<Value>> {
        match self {
            Reply::Inserted(ids) => Ok(ids),
            other => Err(other.unexpected(operation)),
        }
    }

    pub fn into_count(self, operation: Operation) -> RouterResult<u64> {
        match self {
            Reply::Count(count) => Ok(count),
            other => Err(other.unexpected(operation)),
        }
    }

    pub fn into_document(self, operation: Operation) -> RouterResult<Option<Document>> {
        match self {
            Reply::Document(document) => Ok(document),
            other => Err(other.unexpected(operation)),
        }
    }

    pub fn into_values(self, operation: Operation) -> RouterResult<Vec<Value>> {
        match self {
            Reply::Values(values) => Ok(values),
            other => Err(other.unexpected(operation)),
        }
    }

    pub fn into_documents(self, operation: Operation) -> RouterResult<Vec<Document>> {
        match self {
            Reply::Documents(documents) => Ok(documents),
            other => Err(other.unexpected(operation)),
        }
    }
}
