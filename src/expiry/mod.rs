//! TTL backstop: every proposal eventually confirms, errors, or is purged
//! with a notification.

pub mod monitor;
pub mod notifier;

pub use monitor::{ExpiringStore, ExpiryMonitor, run_expiry_check, spawn_expiry_monitor};
pub use notifier::{ChannelNotifier, ExpiredProposal, ExpiryNotifier, TracingNotifier};
