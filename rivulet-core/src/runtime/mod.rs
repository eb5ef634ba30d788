//! Per-task executable operator graph.
//!
//! [`OperatorImplGraph::compile`] turns one task's copy of the spec graph into
//! [`OperatorImpl`] nodes holding that task's window and join state. Messages enter
//! through the input operator of their stream and propagate depth-first, in
//! downstream registration order, before the call returns.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{CLOSED_PANE_RETENTION_MS, Config, window_width_key};
use crate::error::GraphError;
use crate::functions::{
    FilterFn, FlatMapFn, FoldFn, GroupKey, InitFn, JoinFn, KeyFn, MapFn, PaneFn, SinkFn, UserFn,
};
use crate::partitioner::{HashPartitioner, Partitioner};
use crate::spec::{
    AccumulationMode, FiringType, JoinSide, OperatorLogic, OperatorSpec, OperatorSpecGraph,
    OperatorType, Trigger, WindowKey, WindowPane, WindowSpec, WindowType,
};
use crate::task::{MessageCollector, TaskContext, TaskCoordinator};
use crate::time::{Clock, EVENT_TIME_MAX, EVENT_TIME_MIN, TimerService, duration_ms};
use crate::types::{
    EventTime, IncomingMessageEnvelope, MessageEnvelope, OpId, OutgoingMessageEnvelope, StreamId,
    Value,
};

mod graph;
mod join;
mod operator;
mod trigger;
mod window;

pub use graph::*;
pub use operator::*;
pub use window::*;

pub(crate) use join::*;
pub(crate) use trigger::*;

