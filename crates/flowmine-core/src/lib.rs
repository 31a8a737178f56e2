//! # flowmine-core
//!
//! Core types for the flowmine automation layer.
//!
//! flowmine watches the commands you run, mines the subsequences you keep
//! repeating into scored patterns, turns those patterns into workflow
//! chains and runs the chains with checkpoints and rollback.
//!
//! ## Core Paradigm
//!
//! - Executions are write-once, sequences are append-then-seal
//! - Patterns are keyed by a hash of their command sequence, so they merge
//! - Commands are classified into a typed [`Operation`] once, at ingestion
//! - Every store is one JSON document, rewritten atomically

pub mod config;
mod chain;
mod error;
pub mod fail_open;
mod operation;
pub mod persist;
mod types;

pub use chain::*;
pub use config::FlowConfig;
pub use error::{FlowError, Result};
pub use operation::{Operation, OperationKind};
pub use types::*;
