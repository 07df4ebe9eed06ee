//! Operation vocabulary
//!
//! Every operation a collection supports is either a write (always served by
//! the master) or a read (subject to read routing). The two sets are fixed at
//! build time and must stay disjoint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RouterError, RouterResult};

/// Whether an operation mutates the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Read,
    Write,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Write => write!(f, "write"),
        }
    }
}

/// Supported collection operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    // Writes
    Insert,
    Update,
    Remove,
    Save,
    CreateIndex,
    DropIndex,
    DropIndexes,
    Drop,
    Rename,
    // Reads
    Find,
    FindOne,
    Count,
    Distinct,
    Group,
    MapReduce,
    IndexInformation,
    Options,
}

/// Mutating operations
pub const WRITE_OPERATIONS: &[Operation] = &[
    Operation::Insert,
    Operation::Update,
    Operation::Remove,
    Operation::Save,
    Operation::CreateIndex,
    Operation::DropIndex,
    Operation::DropIndexes,
    Operation::Drop,
    Operation::Rename,
];

/// Non-mutating operations
pub const READ_OPERATIONS: &[Operation] = &[
    Operation::Find,
    Operation::FindOne,
    Operation::Count,
    Operation::Distinct,
    Operation::Group,
    Operation::MapReduce,
    Operation::IndexInformation,
    Operation::Options,
];

impl Operation {
    /// Every operation in the vocabulary
    pub const ALL: &'static [Operation] = &[
        Operation::Insert,
        Operation::Update,
        Operation::Remove,
        Operation::Save,
        Operation::CreateIndex,
        Operation::DropIndex,
        Operation::DropIndexes,
        Operation::Drop,
        Operation::Rename,
        Operation::Find,
        Operation::FindOne,
        Operation::Count,
        Operation::Distinct,
        Operation::Group,
        Operation::MapReduce,
        Operation::IndexInformation,
        Operation::Options,
    ];

    /// Classify the operation using the write/read sets
    pub fn kind(self) -> OperationKind {
        if WRITE_OPERATIONS.contains(&self) {
            OperationKind::Write
        } else {
            OperationKind::Read
        }
    }

    pub fn is_write(self) -> bool {
        self.kind() == OperationKind::Write
    }

    pub fn is_read(self) -> bool {
        self.kind() == OperationKind::Read
    }

    /// Wire name of the operation
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Remove => "remove",
            Operation::Save => "save",
            Operation::CreateIndex => "create_index",
            Operation::DropIndex => "drop_index",
            Operation::DropIndexes => "drop_indexes",
            Operation::Drop => "drop",
            Operation::Rename => "rename",
            Operation::Find => "find",
            Operation::FindOne => "find_one",
            Operation::Count => "count",
            Operation::Distinct => "distinct",
            Operation::Group => "group",
            Operation::MapReduce => "map_reduce",
            Operation::IndexInformation => "index_information",
            Operation::Options => "options",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = RouterError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == name)
            .ok_or_else(|| RouterError::Configuration(format!("unclassified operation: {}", name)))
    }
}

/// Classify an operation by name
///
/// Names outside the vocabulary are a configuration error, never a default.
pub fn classify(name: &str) -> RouterResult<OperationKind> {
    name.parse::<Operation>().map(Operation::kind)
}

/// Check that the read and write sets are disjoint and cover the vocabulary
pub fn verify_vocabulary() -> RouterResult<()> {
    verify_sets(WRITE_OPERATIONS, READ_OPERATIONS)
}

fn verify_sets(writes: &[Operation], reads: &[Operation]) -> RouterResult<()> {
    if let Some(op) = writes.iter().find(|op| reads.contains(op)) {
        return Err(RouterError::Configuration(format!(
            "operation {} is classified as both read and write",
            op
        )));
    }

    if let Some(op) = Operation::ALL
        .iter()
        .find(|op| !writes.contains(op) && !reads.contains(op))
    {
        return Err(RouterError::Configuration(format!(
            "operation {} is neither read nor write",
            op
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_is_consistent() {
        assert!(verify_vocabulary().is_ok());
        assert_eq!(
            WRITE_OPERATIONS.len() + READ_OPERATIONS.len(),
            Operation::ALL.len()
        );
    }

    #[test]
    fn test_overlapping_sets_rejected() {
        let result = verify_sets(
            &[Operation::Insert, Operation::Count],
            &[Operation::Count],
        );
        assert!(matches!(result, Err(RouterError::Configuration(_))));
    }

    #[test]
    fn test_incomplete_sets_rejected() {
        let result = verify_sets(WRITE_OPERATIONS, &[Operation::Find]);
        assert!(matches!(result, Err(RouterError::Configuration(_))));
    }

    #[test]
    fn test_classify_by_name() {
        assert_eq!(classify("insert").unwrap(), OperationKind::Write);
        assert_eq!(classify("save").unwrap(), OperationKind::Write);
        assert_eq!(classify("find_one").unwrap(), OperationKind::Read);
        assert_eq!(classify("distinct").unwrap(), OperationKind::Read);
    }

    #[test]
    fn test_unknown_name_is_configuration_error() {
        let err = classify("explain").unwrap_err();
        assert!(matches!(err, RouterError::Configuration(_)));
    }
}
