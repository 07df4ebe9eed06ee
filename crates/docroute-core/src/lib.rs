//! Docroute Core - shared definitions for master/slave routing
//!
//! This crate provides the pieces every other docroute crate agrees on:
//! the operation vocabulary and its read/write split, the error taxonomy,
//! and the cluster configuration.

pub mod config;
pub mod error;
pub mod operation;

pub use config::{ClusterConfig, NodeDescriptor, DEFAULT_MAX_SUCCESSIVE_READS};
pub use error::{RouterError, RouterResult};
pub use operation::{
    classify, verify_vocabulary, Operation, OperationKind, READ_OPERATIONS, WRITE_OPERATIONS,
};
