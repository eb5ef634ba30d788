//! Construction-time errors.
//!
//! Everything raised while building, cloning or compiling an operator graph is a
//! [`GraphError`] and is fatal to application startup. Processing-time failures
//! (user functions, serdes) travel as `anyhow::Error` instead.

use thiserror::Error;

use crate::types::{OpId, StreamId};

#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("stream `{0}` is already registered")]
    DuplicateStream(StreamId),

    #[error("stream `{0}` is not registered")]
    UnknownStream(StreamId),

    #[error("operator {0} does not exist in this graph")]
    UnknownOperator(OpId),

    #[error("malformed wiring at {op}: {reason}")]
    Malformed { op: String, reason: String },

    #[error("operator graph contains a cycle through {0}")]
    Cycle(String),

    #[error("{0} is not reachable from any input stream")]
    Unreachable(String),

    #[error("cannot clone {op}: {reason}")]
    CloneFailure { op: String, reason: String },

    #[error("task {0} is already initialised")]
    AlreadyInitialized(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GraphError {
    pub(crate) fn malformed(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            op: op.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required config `{0}`")]
    Missing(String),

    #[error("invalid value `{value}` for config `{key}`: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("no {kind} registered under `{name}`")]
    UnknownFactory { kind: &'static str, name: String },
}
