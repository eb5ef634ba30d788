//! # Rivulet Core
//!
//! Operator graph model and per-task runtime for the rivulet stream processor.
//!
//! - [`types`] : envelopes, stream identities and the type-erased [`Value`](types::Value).
//! - [`spec`] : the declarative [`OperatorSpecGraph`](spec::OperatorSpecGraph) built by an
//!   application, cloned once per task.
//! - [`runtime`] : the [`OperatorImplGraph`](runtime::OperatorImplGraph) compiled from a spec
//!   graph: propagation, windowing, triggers and partial joins.
//! - [`task`] : task lifecycle, output collector and coordinator contracts, task registry.
//! - [`codec`], [`config`], [`partitioner`], [`time`] : stream-boundary serdes, flat
//!   configuration, key partitioning and clocks.

pub mod codec;
pub mod config;
pub mod error;
pub mod functions;
pub mod partitioner;
pub mod runtime;
pub mod spec;
pub mod task;
pub mod time;
pub mod types;
