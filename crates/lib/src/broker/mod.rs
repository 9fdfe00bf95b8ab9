//! Broker routing: triggers, the broker configuration file, and the
//! reconciler keeping both consistent with the manifest.
//!
//! Triggers live twice: as `Trigger` records in the manifest, and projected
//! into the broker configuration file that the broker adapter reads. The
//! [`Reconciler`] is the only writer of either, and every transaction writes
//! both before it returns.

mod config;
mod reconcile;
mod trigger;

pub use config::{BrokerConfig, ConfigTrigger};
pub use reconcile::{BrokerError, Reconciler, SupersedeOutcome};
pub use trigger::{TRIGGER_KIND, Trigger, TriggerTarget};
