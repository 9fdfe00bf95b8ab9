//! Integration building blocks and their capabilities.
//!
//! Every manifest record except generic documents is a [`Component`]. Its
//! [`Role`] is resolved from the record kind once, at construction, and fixes
//! which capability views the component hands out:
//!
//! | Role           | Producer | Consumer | Runnable |
//! |----------------|----------|----------|----------|
//! | Source         | yes      |          | yes      |
//! | Transformation | yes      | yes      | yes      |
//! | Target         |          | yes      | yes      |
//! | Broker         |          | yes      | yes      |
//! | Trigger        |          |          |          |
//!
//! Asking for a capability the role lacks yields a [`CapabilityError`].

mod capability;
mod types;

pub(crate) use capability::endpoint_url;
pub use capability::{Consumer, Producer, ProducerMut, Runnable};
pub use types::{Capabilities, CapabilityError, Component, Role};
