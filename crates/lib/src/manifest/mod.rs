//! Declarative manifest of component records.
//!
//! The manifest is the source of truth for what a local setup contains. It is
//! a multi-document YAML file of Kubernetes-style records, each identified by
//! `(kind, name)`. The core only reads and writes whole records; the
//! specification payload of each record is interpreted by its component.

mod store;
mod types;

pub use store::ManifestError;
pub use types::*;
