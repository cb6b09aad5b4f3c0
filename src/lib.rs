//! Resident: an always-on service that survives reboots and upgrades.
//!
//! A user toggles the service on or off. While on, it runs in the host's
//! privileged foreground mode with a visible notification, and the enabled
//! flag is kept in durable storage so the service comes back after a reboot
//! or an in-place package upgrade.
//!
//! # Architecture
//!
//! - **Lifecycle** ([`lifecycle`]): host callbacks (start, stop, restart,
//!   boot completed, package replaced)
//! - **Dispatcher** ([`dispatcher`]): maps each trigger to a start or stop
//!   command, consulting the enabled flag for boot and package replacement
//! - **Service** ([`service`]): a single worker that applies commands in
//!   order to the foreground state machine
//! - **Settings** ([`settings`]): the durable enabled flag
//! - **Foreground** ([`foreground`]): the platform privileged-execution API
//! - **Host** ([`host`]): JSON envelopes and the stdio bridge

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod foreground;
pub mod host;
pub mod lifecycle;
pub mod service;
pub mod settings;

pub use config::ServiceConfig;
pub use dispatcher::{Dispatcher, TriggerCause};
pub use error::{Result, ServiceError};
pub use lifecycle::{LifecycleEntry, ResidentService};
pub use service::{Command, ServiceMode, Transition};
pub use settings::Settings;
