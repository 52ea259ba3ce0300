//! # Netmend
//!
//! Async console automation and configuration self-healing for network
//! devices.
//!
//! Netmend talks to device consoles over telnet, drives their interactive
//! dialogs (boot wizards, pagination, confirmations, configuration modes),
//! and restores a device to a known-good configuration: capture the running
//! configuration, wipe and reload, capture again, diff against the baseline
//! and replay exactly what is missing.
//!
//! ## Features
//!
//! - Async telnet transport with minimal option handling
//! - Prompt tracking with tail-of-buffer pattern search
//! - Table-driven wizard scripts with bounded retries
//! - Canonical configuration form, categorized drift reports
//! - Indentation-driven block replay
//! - Per-device reconciliation cycles run concurrently
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netmend::{DeviceDescriptor, ReconcileConfig, Reconciler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netmend::Error> {
//!     let mut config = ReconcileConfig::default();
//!     config
//!         .devices
//!         .push(DeviceDescriptor::new("IOU1", "192.168.1.10", 5021));
//!
//!     let reconciler = Reconciler::telnet(config);
//!     for outcome in reconciler.run_all().await {
//!         println!("{}", outcome);
//!     }
//!     Ok(())
//! }
//! ```

pub mod apply;
pub mod capture;
pub mod channel;
pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod normalize;
pub mod platform;
pub mod reconcile;
pub mod transport;

// Re-export main types for convenience
pub use apply::apply_missing_config;
pub use capture::{ArtifactStore, CaptureKind, capture_running_config};
pub use channel::{Session, SessionState};
pub use config::{DeviceDescriptor, DeviceProfile, ReconcileConfig, TimingProfile};
pub use diff::{Category, CategoryRules, MissingBlocksReport, compare_configs};
pub use driver::{InteractiveBuilder, InteractiveEvent, InteractiveResult, WizardScript};
pub use error::{Error, Result};
pub use normalize::{CanonicalConfig, ConfigBlock, ConfigFile};
pub use reconcile::{Connector, ReconcileOutcome, ReconcileState, Reconciler, TelnetConnector};
pub use transport::{TelnetConfig, Transport};
