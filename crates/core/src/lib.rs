//! Coordination core: per-project actors that hold agent, task, lease,
//! election, messaging, and safety-gate state, fronted by a registry that
//! creates and idles them out.
//!
//! Each project is a single `tokio::select!` loop (see [`project::Project`])
//! that owns all of its state; every mutation and read passes through its
//! request channel so ordering between an operation and the events it
//! produces is never in question.

pub mod agents;
pub mod election;
pub mod event_log;
pub mod leases;
pub mod messaging;
pub mod project;
pub mod registry;
pub mod request;
pub mod safety;
pub mod tasks;

pub use project::{Project, ProjectHandle};
pub use registry::ProjectRegistry;
pub use request::{Outcome, Request};
