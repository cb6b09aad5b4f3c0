//! Logging foreground platform for headless hosts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{ForegroundIndicator, ForegroundPlatform};
use crate::error::Result;

/// Stub platform that never refuses foreground mode.
///
/// There is no notification shade to draw into, so the indicator is only
/// logged and remembered. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct HeadlessForegroundPlatform {
    shown: Arc<Mutex<Option<ForegroundIndicator>>>,
    stop_requests: Arc<AtomicUsize>,
}

impl HeadlessForegroundPlatform {
    /// The indicator currently shown, if any.
    #[must_use]
    pub fn indicator(&self) -> Option<ForegroundIndicator> {
        match self.shown.lock() {
            Ok(shown) => shown.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of `stop_self` calls received.
    #[must_use]
    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::SeqCst)
    }

    fn set_shown(&self, indicator: Option<ForegroundIndicator>) {
        match self.shown.lock() {
            Ok(mut shown) => *shown = indicator,
            Err(poisoned) => *poisoned.into_inner() = indicator,
        }
    }
}

impl ForegroundPlatform for HeadlessForegroundPlatform {
    fn acquire_foreground(&self, indicator: &ForegroundIndicator) -> Result<()> {
        tracing::info!(
            notification_id = indicator.notification_id,
            title = %indicator.title,
            tap_target = %indicator.tap_target,
            "foreground acquired"
        );
        self.set_shown(Some(indicator.clone()));
        Ok(())
    }

    fn release_foreground(&self) {
        tracing::info!("foreground released");
        self.set_shown(None);
    }

    fn stop_self(&self) {
        tracing::info!("stop-self requested");
        self.stop_requests.fetch_add(1, Ordering::SeqCst);
    }
}
