//! # Rivulet API
//!
//! Typed builder for rivulet applications and a local runner to execute them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use rivulet_api::{InMemorySystem, LocalApplicationRunner, StreamApplication, Windows};
//! use rivulet_api::runner::ApplicationRunner;
//! use rivulet_core::codec::KvSerde;
//! use rivulet_core::config::Config;
//! use rivulet_core::spec::WindowPane;
//!
//! let system = InMemorySystem::new();
//! system.create_stream("page-views", 1);
//! system.send("page-views", "m1".to_string(), "/home".to_string(), Some(0)).unwrap();
//!
//! let app = StreamApplication::new("page-view-counter");
//! let views = app
//!     .open_input::<String>("page-views", KvSerde::bincode::<String, String>())
//!     .unwrap();
//! let counts = app
//!     .open_output::<WindowPane<String, u64>>(
//!         "page-view-counts",
//!         KvSerde::bincode::<String, WindowPane<String, u64>>(),
//!     )
//!     .unwrap();
//! views
//!     .window(Windows::keyed_tumbling(
//!         |page: &String| page.clone(),
//!         Duration::from_secs(10),
//!         || 0u64,
//!         |_: &String, count: u64| count + 1,
//!     ))
//!     .send_to(&counts);
//!
//! LocalApplicationRunner::new(Config::new(), system.clone()).run(&app).unwrap();
//! ```
//!
//! - [`application`] : [`StreamApplication`] owns the spec graph under construction.
//! - [`stream`] : [`MessageStream`] and its fluent operators.
//! - [`windows`] : [`Windows`] constructors and the [`Window`] definition.
//! - [`runner`] : [`ApplicationRunner`](runner::ApplicationRunner), the runner registry,
//!   [`InMemorySystem`] and [`LocalApplicationRunner`].

pub mod application;
pub mod runner;
pub mod stream;
pub mod windows;

pub use application::{OutputStream, StreamApplication};
pub use runner::{
    ApplicationStatus, InMemorySystem, LocalApplicationRunner, RunSummary, RunnerRegistry,
};
pub use stream::MessageStream;
pub use windows::{Window, Windows};

pub use rivulet_core;
