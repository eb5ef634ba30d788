//! Task lifecycle and the contracts a task consumes from its host.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;

use crate::config::{Config, TASK_CLASS};
use crate::error::{ConfigError, GraphError};
use crate::runtime::OperatorImplGraph;
use crate::spec::OperatorSpecGraph;
use crate::time::{Clock, SystemClock};
use crate::types::{EventTime, IncomingMessageEnvelope, OutgoingMessageEnvelope, StreamPartition};

mod context;
mod coordinator;
mod factory;
mod stream_task;

pub use context::*;
pub use coordinator::*;
pub use factory::*;
pub use stream_task::*;

#[cfg(test)]
#[path = "tests/task_tests.rs"]
mod tests;
