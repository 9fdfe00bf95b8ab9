//! meshctl-lib: Core types and logic for meshctl
//!
//! This crate runs a local event integration setup:
//! - `Component`: sources, transformations, targets, and the broker, with
//!   typed capability views
//! - `FilterSet`: exact attribute filters scoping routes
//! - `Orchestrator`: adapter containers with readiness probing and batch start
//! - `Reconciler`: triggers kept consistent between the manifest and the
//!   broker configuration
//! - `Platform`: the create, delete, start, stop, and status workflows

pub mod broker;
pub mod component;
pub mod consts;
pub mod context;
pub mod filter;
pub mod lock;
pub mod manifest;
pub mod runtime;
pub mod util;
pub mod workflow;
