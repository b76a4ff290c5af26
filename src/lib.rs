//! domflock - a bounded flock of headless browsers for DOM-level auditing
//!
//! This library schedules asynchronous jobs across a fixed pool of
//! controllable browser workers so that a security-auditing framework can
//! observe DOM behavior, AJAX traffic, and event-driven inputs that static
//! HTTP inspection cannot reach.
//!
//! # High-Level API
//!
//! The [`cluster`] module provides the public facade:
//!
//! ```ignore
//! use std::sync::Arc;
//! use domflock::cluster::{BrowserCluster, ClusterConfig};
//! use domflock::job::{ExploreOptions, Resource};
//!
//! let cluster = BrowserCluster::new(ClusterConfig::default(), launcher);
//!
//! cluster.explore(Resource::new("https://target.example/"),
//!                 ExploreOptions::default(),
//!                 |result| println!("{}", result.payload))?;
//!
//! cluster.wait().await?;
//! cluster.shutdown().await;
//! ```
//!
//! Browser drivers are supplied by the embedding framework through the
//! [`browser::Browser`] and [`browser::BrowserLauncher`] traits.

pub mod browser;
pub mod cluster;
pub mod job;
pub mod logging;

/// Version of the domflock library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
