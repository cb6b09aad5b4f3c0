//! Privileged foreground execution as seen by the service core.
//!
//! The host OS keeps a service alive while it runs in foreground mode with a
//! visible notification. [`ForegroundPlatform`] is the seam the state machine
//! drives; the concrete implementation lives with the host environment.
//! Headless builds use the logging stub from [`create_platform`].

use crate::error::Result;
use serde::{Deserialize, Serialize};

mod stub;

pub use stub::HeadlessForegroundPlatform;

/// The visible notification shown while the service is in foreground mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundIndicator {
    /// Platform notification identifier.
    pub notification_id: u32,
    /// Title text.
    pub title: String,
    /// Screen reopened when the notification is tapped.
    pub tap_target: String,
    /// Icon resource reference.
    pub icon: String,
}

/// Outbound privileged-execution API.
pub trait ForegroundPlatform: Send + Sync + 'static {
    /// Enter foreground mode and show `indicator`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ServiceError::ForegroundAcquisition`] when the
    /// platform refuses privileged execution.
    fn acquire_foreground(&self, indicator: &ForegroundIndicator) -> Result<()>;

    /// Leave foreground mode and clear the indicator.
    fn release_foreground(&self);

    /// Ask the host to tear the service down.
    fn stop_self(&self);
}

impl<P: ForegroundPlatform + ?Sized> ForegroundPlatform for Box<P> {
    fn acquire_foreground(&self, indicator: &ForegroundIndicator) -> Result<()> {
        (**self).acquire_foreground(indicator)
    }

    fn release_foreground(&self) {
        (**self).release_foreground();
    }

    fn stop_self(&self) {
        (**self).stop_self();
    }
}

/// Create the platform implementation for this build.
///
/// Only the headless stub ships with the crate; native shells supply their own.
pub fn create_platform() -> Box<dyn ForegroundPlatform> {
    Box::new(HeadlessForegroundPlatform::default())
}
