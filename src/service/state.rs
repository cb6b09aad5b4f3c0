//! Foreground state machine.
//!
//! Applies [`Command`]s one at a time. Each real transition performs its
//! platform side effect first, then commits the enabled flag, then fires the
//! matching hook event. Commands that would not change the mode are no-ops.

use crate::error::Result;
use crate::foreground::{ForegroundIndicator, ForegroundPlatform};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Execution mode of the running service instance. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceMode {
    #[default]
    Background,
    Foreground,
}

impl ServiceMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Foreground => "foreground",
        }
    }
}

impl std::fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical command consumed by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Enter foreground mode.
    Start,
    /// Leave foreground mode and stop the service.
    Stop,
}

impl Command {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Outcome of applying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The mode changed to the carried value.
    Entered(ServiceMode),
    /// Idempotent no-op; the machine was already in the carried mode.
    Unchanged(ServiceMode),
}

impl Transition {
    #[must_use]
    pub fn mode(self) -> ServiceMode {
        match self {
            Self::Entered(mode) | Self::Unchanged(mode) => mode,
        }
    }

    #[must_use]
    pub fn changed(self) -> bool {
        matches!(self, Self::Entered(_))
    }
}

/// Hook notifications fired after a committed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent {
    EnteredForeground,
    EnteredBackground,
    /// The service asked the host to tear it down after leaving foreground.
    StopSelfRequested,
}

impl ServiceEvent {
    /// Wire name used by the host bridge.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnteredForeground => "service.entered_foreground",
            Self::EnteredBackground => "service.entered_background",
            Self::StopSelfRequested => "service.stop_self",
        }
    }
}

pub struct ForegroundStateMachine<P: ForegroundPlatform> {
    mode: ServiceMode,
    platform: P,
    settings: Settings,
    indicator: ForegroundIndicator,
    event_tx: broadcast::Sender<ServiceEvent>,
}

impl<P: ForegroundPlatform> ForegroundStateMachine<P> {
    /// Create a machine in [`ServiceMode::Background`].
    #[must_use]
    pub fn new(
        platform: P,
        settings: Settings,
        indicator: ForegroundIndicator,
        event_tx: broadcast::Sender<ServiceEvent>,
    ) -> Self {
        Self {
            mode: ServiceMode::Background,
            platform,
            settings,
            indicator,
            event_tx,
        }
    }

    #[must_use]
    pub fn mode(&self) -> ServiceMode {
        self.mode
    }

    /// Apply one command to completion.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ServiceError::ForegroundAcquisition`] or
    /// [`crate::ServiceError::FlagPersistence`]; the mode is left as it was
    /// before the attempt, except when a failed stop cannot restore the
    /// indicator.
    pub fn apply(&mut self, command: Command) -> Result<Transition> {
        match command {
            Command::Start => self.enter_foreground(),
            Command::Stop => self.exit_foreground(),
        }
    }

    fn enter_foreground(&mut self) -> Result<Transition> {
        if self.mode == ServiceMode::Foreground {
            tracing::debug!("start ignored; already in foreground");
            return Ok(Transition::Unchanged(ServiceMode::Foreground));
        }

        self.platform.acquire_foreground(&self.indicator)?;

        if let Err(e) = self.settings.set_service_enabled(true) {
            // Background must not keep an indicator.
            self.platform.release_foreground();
            return Err(e);
        }

        self.mode = ServiceMode::Foreground;
        tracing::info!("service entered foreground");
        self.notify(ServiceEvent::EnteredForeground);
        Ok(Transition::Entered(ServiceMode::Foreground))
    }

    /// Leave foreground mode.
    ///
    /// If the flag write fails the indicator is restored and the machine
    /// stays in foreground. If the platform then refuses to restore it, the
    /// machine records background and reports the refusal; the flag still
    /// reads enabled, so the next boot brings the service back.
    fn exit_foreground(&mut self) -> Result<Transition> {
        if self.mode == ServiceMode::Background {
            tracing::debug!("stop ignored; already in background");
            return Ok(Transition::Unchanged(ServiceMode::Background));
        }

        self.platform.release_foreground();

        if let Err(e) = self.settings.set_service_enabled(false) {
            if let Err(reacquire) = self.platform.acquire_foreground(&self.indicator) {
                tracing::error!(
                    persist_error = %e,
                    error = %reacquire,
                    "cannot restore foreground after failed stop; service is now in background"
                );
                self.mode = ServiceMode::Background;
                return Err(reacquire);
            }
            return Err(e);
        }

        self.mode = ServiceMode::Background;
        tracing::info!("service entered background");
        self.notify(ServiceEvent::EnteredBackground);

        self.platform.stop_self();
        self.notify(ServiceEvent::StopSelfRequested);
        Ok(Transition::Entered(ServiceMode::Background))
    }

    fn notify(&self, event: ServiceEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::ServiceError;
    use crate::settings::{FlagStore, MemoryFlagStore};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingPlatform {
        shown: Arc<Mutex<Option<ForegroundIndicator>>>,
        refuse: Arc<AtomicBool>,
        stops: Arc<AtomicUsize>,
    }

    impl ForegroundPlatform for RecordingPlatform {
        fn acquire_foreground(&self, indicator: &ForegroundIndicator) -> Result<()> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(ServiceError::ForegroundAcquisition("denied".to_owned()));
            }
            *self.shown.lock().unwrap() = Some(indicator.clone());
            Ok(())
        }

        fn release_foreground(&self) {
            *self.shown.lock().unwrap() = None;
        }

        fn stop_self(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryFlagStore,
        fail_writes: AtomicBool,
    }

    impl FlagStore for FlakyStore {
        fn get_flag(&self, key: &str) -> bool {
            self.inner.get_flag(key)
        }

        fn set_flag(&self, key: &str, value: bool) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ServiceError::FlagPersistence("disk full".to_owned()));
            }
            self.inner.set_flag(key, value)
        }
    }

    struct Fixture {
        machine: ForegroundStateMachine<RecordingPlatform>,
        platform: RecordingPlatform,
        store: Arc<FlakyStore>,
        settings: Settings,
        events: broadcast::Receiver<ServiceEvent>,
    }

    fn fixture() -> Fixture {
        let platform = RecordingPlatform::default();
        let store = Arc::new(FlakyStore::default());
        let settings = Settings::new(store.clone());
        let (event_tx, events) = broadcast::channel(16);
        let machine = ForegroundStateMachine::new(
            platform.clone(),
            settings.clone(),
            crate::config::NotificationConfig::default().indicator(),
            event_tx,
        );
        Fixture {
            machine,
            platform,
            store,
            settings,
            events,
        }
    }

    fn drain(events: &mut broadcast::Receiver<ServiceEvent>) -> Vec<ServiceEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn starts_in_background() {
        let f = fixture();
        assert_eq!(f.machine.mode(), ServiceMode::Background);
        assert!(!f.settings.is_service_enabled());
    }

    #[test]
    fn start_enters_foreground_and_sets_flag() {
        let mut f = fixture();
        let t = f.machine.apply(Command::Start).expect("start");

        assert_eq!(t, Transition::Entered(ServiceMode::Foreground));
        assert!(f.settings.is_service_enabled());
        assert!(f.platform.shown.lock().unwrap().is_some());
        assert_eq!(drain(&mut f.events), vec![ServiceEvent::EnteredForeground]);
    }

    #[test]
    fn duplicate_start_is_noop() {
        let mut f = fixture();
        f.machine.apply(Command::Start).expect("start");
        drain(&mut f.events);

        let t = f.machine.apply(Command::Start).expect("second start");
        assert_eq!(t, Transition::Unchanged(ServiceMode::Foreground));
        assert!(drain(&mut f.events).is_empty());
    }

    #[test]
    fn stop_returns_to_background_and_requests_stop_self() {
        let mut f = fixture();
        f.machine.apply(Command::Start).expect("start");
        drain(&mut f.events);

        let t = f.machine.apply(Command::Stop).expect("stop");
        assert_eq!(t, Transition::Entered(ServiceMode::Background));
        assert!(!f.settings.is_service_enabled());
        assert!(f.platform.shown.lock().unwrap().is_none());
        assert_eq!(f.platform.stops.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&mut f.events),
            vec![
                ServiceEvent::EnteredBackground,
                ServiceEvent::StopSelfRequested
            ]
        );
    }

    #[test]
    fn stop_in_background_is_noop() {
        let mut f = fixture();
        let t = f.machine.apply(Command::Stop).expect("stop");
        assert_eq!(t, Transition::Unchanged(ServiceMode::Background));
        assert_eq!(f.platform.stops.load(Ordering::SeqCst), 0);
        assert!(drain(&mut f.events).is_empty());
    }

    #[test]
    fn enabled_flag_tracks_mode_over_mixed_sequence() {
        let mut f = fixture();
        let sequence = [
            Command::Stop,
            Command::Start,
            Command::Start,
            Command::Stop,
            Command::Stop,
            Command::Start,
            Command::Stop,
            Command::Start,
        ];
        for command in sequence {
            f.machine.apply(command).expect("apply");
            assert_eq!(
                f.settings.is_service_enabled(),
                f.machine.mode() == ServiceMode::Foreground,
                "flag diverged from mode after {command:?}"
            );
        }
        assert_eq!(f.machine.mode(), ServiceMode::Foreground);
    }

    #[test]
    fn refused_acquisition_stays_in_background() {
        let mut f = fixture();
        f.platform.refuse.store(true, Ordering::SeqCst);

        let err = f.machine.apply(Command::Start).unwrap_err();
        assert!(matches!(err, ServiceError::ForegroundAcquisition(_)));
        assert_eq!(f.machine.mode(), ServiceMode::Background);
        assert!(!f.settings.is_service_enabled());
        assert!(f.platform.shown.lock().unwrap().is_none());
        assert!(drain(&mut f.events).is_empty());
    }

    #[test]
    fn failed_flag_write_on_start_releases_foreground() {
        let mut f = fixture();
        f.store.fail_writes.store(true, Ordering::SeqCst);

        let err = f.machine.apply(Command::Start).unwrap_err();
        assert!(matches!(err, ServiceError::FlagPersistence(_)));
        assert_eq!(f.machine.mode(), ServiceMode::Background);
        assert!(f.platform.shown.lock().unwrap().is_none());
        assert!(drain(&mut f.events).is_empty());

        // A retry after the store recovers succeeds.
        f.store.fail_writes.store(false, Ordering::SeqCst);
        f.machine.apply(Command::Start).expect("retry");
        assert!(f.settings.is_service_enabled());
    }

    #[test]
    fn failed_flag_write_on_stop_keeps_indicator() {
        let mut f = fixture();
        f.machine.apply(Command::Start).expect("start");
        drain(&mut f.events);
        f.store.fail_writes.store(true, Ordering::SeqCst);

        let err = f.machine.apply(Command::Stop).unwrap_err();
        assert!(matches!(err, ServiceError::FlagPersistence(_)));
        assert_eq!(f.machine.mode(), ServiceMode::Foreground);
        assert!(f.settings.is_service_enabled());
        assert!(f.platform.shown.lock().unwrap().is_some());
        assert_eq!(f.platform.stops.load(Ordering::SeqCst), 0);
        assert!(drain(&mut f.events).is_empty());
    }

    #[test]
    fn failed_stop_with_refused_restore_records_background() {
        let mut f = fixture();
        f.machine.apply(Command::Start).expect("start");
        f.store.fail_writes.store(true, Ordering::SeqCst);
        f.platform.refuse.store(true, Ordering::SeqCst);

        let err = f.machine.apply(Command::Stop).unwrap_err();
        assert!(matches!(err, ServiceError::ForegroundAcquisition(_)));
        assert_eq!(f.machine.mode(), ServiceMode::Background);
        assert!(f.platform.shown.lock().unwrap().is_none());
        assert_eq!(f.platform.stops.load(Ordering::SeqCst), 0);
    }
}
