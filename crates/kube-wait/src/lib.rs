//! Kubernetes Condition Waiter
//!
//! Blocks until a set of Kubernetes resources satisfies a caller-supplied
//! condition, bounded by a timeout. Combines an initial list with a watch that
//! resumes from the list's resourceVersion, so an already-true condition is
//! never missed and no change between snapshot and feed is lost.
//!
//! # Example
//!
//! ```no_run
//! use kube_wait::{ResourceWaiter, Selector, conditions};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let waiter = ResourceWaiter::from_client(client);
//!
//! // Wait up to two minutes for every pod labelled app=web to run
//! waiter
//!     .wait_pod(
//!         Some("default"),
//!         &Selector::new().labels("app=web"),
//!         conditions::pod_in_phase("Running"),
//!         Duration::from_secs(120),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Type resolution**: group/version/kind to plural resource via discovery
//! - **List-then-watch**: snapshot precondition, then per-event checks
//! - **Deadline**: one timeout covers list and watch; subscriptions are always released
//! - **Test doubles**: in-memory collaborators behind the `test-util` feature

pub mod client;
pub mod conditions;
pub mod discovery;
pub mod error;
pub mod kubeconfig;
pub mod metadata;
pub mod models;
#[path = "trait.rs"]
pub mod source;
pub mod validation;
pub mod waiter;
pub mod watcher;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeEventSource;
pub use discovery::{DiscoverySnapshot, KubeDiscovery};
pub use error::WaitError;
pub use models::*;
pub use source::{EventSource, EventStream, TypeDiscovery};
pub use waiter::ResourceWaiter;
pub use watcher::{ObjectStore, WaitSession, watch_until};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockDiscovery, MockEventSource};
