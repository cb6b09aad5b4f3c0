//! Host-facing lifecycle entry points.
//!
//! The host environment calls one method per OS event. Each call dispatches
//! the event and queues the resulting command, if any, without waiting for it
//! to run. The returned [`PendingCommand`] can be awaited for the outcome.

use crate::config::ServiceConfig;
use crate::dispatcher::{Dispatcher, TriggerCause};
use crate::error::Result;
use crate::foreground::ForegroundPlatform;
use crate::service::{PendingCommand, ServiceClient, service_channel};
use crate::settings::Settings;

/// Broadcast capacity for service hook events.
const EVENT_CAPACITY: usize = 32;

/// OS lifecycle callbacks delivered to the resident service.
pub trait LifecycleEntry {
    /// User asked the service to run.
    fn on_start(&self) -> Result<Option<PendingCommand>>;

    /// User asked the service to stop.
    fn on_stop(&self) -> Result<Option<PendingCommand>>;

    /// The host relaunched the service process with no payload.
    fn on_restart(&self) -> Result<Option<PendingCommand>>;

    /// The device finished booting.
    fn on_boot_completed(&self) -> Result<Option<PendingCommand>>;

    /// The application package was replaced in place.
    fn on_package_replaced(&self) -> Result<Option<PendingCommand>>;

    /// Raw trigger payload as delivered by the host; `None` is a restart.
    fn on_trigger(&self, action: Option<&str>) -> Result<Option<PendingCommand>>;
}

/// The resident service as the host sees it.
#[derive(Clone)]
pub struct ResidentService {
    dispatcher: Dispatcher,
    settings: Settings,
    client: ServiceClient,
}

impl ResidentService {
    #[must_use]
    pub fn new(settings: Settings, client: ServiceClient) -> Self {
        Self {
            dispatcher: Dispatcher::new(settings.clone()),
            settings,
            client,
        }
    }

    /// Build the state machine, spawn its worker on the current runtime and
    /// return the service with the worker's join handle.
    pub fn spawn<P: ForegroundPlatform>(
        platform: P,
        settings: Settings,
        config: &ServiceConfig,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (client, worker) = service_channel(
            platform,
            settings.clone(),
            config.notification.indicator(),
            EVENT_CAPACITY,
        );
        let handle = tokio::spawn(worker.run());
        (Self::new(settings, client), handle)
    }

    #[must_use]
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn submit(&self, cause: TriggerCause) -> Result<Option<PendingCommand>> {
        match self.dispatcher.dispatch(cause) {
            Some(command) => self.client.enqueue(command).map(Some),
            None => Ok(None),
        }
    }

    fn on_system_event(&self, cause: TriggerCause) -> Result<Option<PendingCommand>> {
        if !self.settings.is_service_enabled() {
            tracing::info!(?cause, "service disabled; not restoring");
            return Ok(None);
        }
        tracing::info!(?cause, "service enabled; restoring");
        self.submit(cause)
    }
}

impl LifecycleEntry for ResidentService {
    fn on_start(&self) -> Result<Option<PendingCommand>> {
        self.submit(TriggerCause::ExplicitStart)
    }

    fn on_stop(&self) -> Result<Option<PendingCommand>> {
        self.submit(TriggerCause::ExplicitStop)
    }

    fn on_restart(&self) -> Result<Option<PendingCommand>> {
        tracing::info!("service restarted by host");
        self.submit(TriggerCause::ProcessRestartedByHost)
    }

    fn on_boot_completed(&self) -> Result<Option<PendingCommand>> {
        self.on_system_event(TriggerCause::BootCompleted)
    }

    fn on_package_replaced(&self) -> Result<Option<PendingCommand>> {
        self.on_system_event(TriggerCause::PackageReplaced)
    }

    fn on_trigger(&self, action: Option<&str>) -> Result<Option<PendingCommand>> {
        let cause = TriggerCause::from_action(action)?;
        match cause {
            TriggerCause::ExplicitStart => self.on_start(),
            TriggerCause::ExplicitStop => self.on_stop(),
            TriggerCause::ProcessRestartedByHost => self.on_restart(),
            TriggerCause::BootCompleted => self.on_boot_completed(),
            TriggerCause::PackageReplaced => self.on_package_replaced(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::ServiceError;
    use crate::foreground::HeadlessForegroundPlatform;
    use crate::service::{Command, ServiceMode, Transition};

    fn spawn(enabled: bool) -> (ResidentService, HeadlessForegroundPlatform) {
        let platform = HeadlessForegroundPlatform::default();
        let settings = Settings::in_memory();
        settings.set_service_enabled(enabled).expect("seed flag");
        let (service, _handle) =
            ResidentService::spawn(platform.clone(), settings, &ServiceConfig::default());
        (service, platform)
    }

    #[tokio::test]
    async fn start_then_stop_round_trips_flag() {
        let (service, platform) = spawn(false);

        let pending = service.on_start().expect("start").expect("command");
        assert_eq!(pending.command(), Command::Start);
        pending.wait().await.expect("apply start");
        assert!(service.settings().is_service_enabled());
        assert!(platform.indicator().is_some());

        let pending = service.on_stop().expect("stop").expect("command");
        pending.wait().await.expect("apply stop");
        assert!(!service.settings().is_service_enabled());
        assert!(platform.indicator().is_none());
        assert_eq!(platform.stop_requests(), 1);
    }

    #[tokio::test]
    async fn boot_with_flag_restores_foreground() {
        let (service, platform) = spawn(true);

        let t = service
            .on_boot_completed()
            .expect("boot")
            .expect("command")
            .wait()
            .await
            .expect("apply");
        assert_eq!(t, Transition::Entered(ServiceMode::Foreground));
        assert_eq!(service.client().mode(), ServiceMode::Foreground);
        assert!(platform.indicator().is_some());
    }

    #[tokio::test]
    async fn package_replaced_without_flag_does_nothing() {
        let (service, platform) = spawn(false);

        assert!(service.on_package_replaced().expect("replaced").is_none());
        assert_eq!(service.client().mode(), ServiceMode::Background);
        assert!(platform.indicator().is_none());
    }

    #[tokio::test]
    async fn raw_trigger_routes_by_action() {
        let (service, _platform) = spawn(false);

        assert!(
            service
                .on_trigger(Some("system.boot_completed"))
                .expect("boot")
                .is_none()
        );

        let t = service
            .on_trigger(None)
            .expect("restart")
            .expect("command")
            .wait()
            .await
            .expect("apply");
        assert_eq!(t, Transition::Entered(ServiceMode::Foreground));
    }

    #[tokio::test]
    async fn raw_trigger_rejects_unknown_action() {
        let (service, _platform) = spawn(true);

        let err = service.on_trigger(Some("service.pause")).unwrap_err();
        assert!(matches!(err, ServiceError::UnrecognizedTrigger(_)));
        assert_eq!(service.client().mode(), ServiceMode::Background);
    }
}
