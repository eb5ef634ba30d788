//! Declarative operator graph.
//!
//! An application builds one [`OperatorSpecGraph`]; every task receives its own
//! structural copy via [`OperatorSpecGraph::try_clone`] and compiles it into a
//! [`runtime::OperatorImplGraph`](crate::runtime::OperatorImplGraph).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::codec::KvSerde;
use crate::error::GraphError;
use crate::functions::{
    FilterFn, FlatMapFn, FoldFn, InitFn, JoinFn, KeyFn, MapFn, PaneFn, SinkFn, UserFn,
};
use crate::types::{OpId, StreamId, Value};

mod graph;
mod join;
mod operator;
mod window;

pub use graph::*;
pub use join::*;
pub use operator::*;
pub use window::*;

#[cfg(test)]
#[path = "tests/spec_tests.rs"]
mod tests;
