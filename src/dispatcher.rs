//! Translation of inbound triggers into state machine commands.

use crate::error::{Result, ServiceError};
use crate::service::Command;
use crate::settings::Settings;

/// Why a trigger reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCause {
    /// The user asked for the service to run.
    ExplicitStart,
    /// The user asked for the service to stop.
    ExplicitStop,
    /// The host relaunched the process without a payload.
    ProcessRestartedByHost,
    /// The device finished booting.
    BootCompleted,
    /// The application package was upgraded in place.
    PackageReplaced,
}

impl TriggerCause {
    /// Wire action for this cause. A host restart carries no action.
    #[must_use]
    pub fn action(self) -> Option<&'static str> {
        match self {
            Self::ExplicitStart => Some("service.start"),
            Self::ExplicitStop => Some("service.stop"),
            Self::ProcessRestartedByHost => None,
            Self::BootCompleted => Some("system.boot_completed"),
            Self::PackageReplaced => Some("system.package_replaced"),
        }
    }

    /// Parse a trigger payload.
    ///
    /// An absent action is a host restart. Any present action outside the
    /// known set, including the empty string, is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnrecognizedTrigger`] for unknown actions.
    pub fn from_action(action: Option<&str>) -> Result<Self> {
        match action {
            None => Ok(Self::ProcessRestartedByHost),
            Some("service.start") => Ok(Self::ExplicitStart),
            Some("service.stop") => Ok(Self::ExplicitStop),
            Some("system.boot_completed") => Ok(Self::BootCompleted),
            Some("system.package_replaced") => Ok(Self::PackageReplaced),
            Some(other) => Err(ServiceError::UnrecognizedTrigger(format!(
                "action {other:?} not supported"
            ))),
        }
    }
}

/// Maps trigger causes to commands.
///
/// Holds the flag store handle for the boot and package-replaced paths;
/// never writes it.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    settings: Settings,
}

impl Dispatcher {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Decide which command, if any, a trigger produces.
    ///
    /// A host restart always re-enters foreground regardless of the flag,
    /// matching the host's sticky restart contract. Boot and package
    /// replacement only start the service if the user left it enabled.
    #[must_use]
    pub fn dispatch(&self, cause: TriggerCause) -> Option<Command> {
        let command = match cause {
            TriggerCause::ExplicitStart | TriggerCause::ProcessRestartedByHost => {
                Some(Command::Start)
            }
            TriggerCause::ExplicitStop => Some(Command::Stop),
            TriggerCause::BootCompleted | TriggerCause::PackageReplaced => self
                .settings
                .is_service_enabled()
                .then_some(Command::Start),
        };

        tracing::debug!(
            ?cause,
            command = command.map(Command::as_str),
            "trigger dispatched"
        );
        command
    }

    /// Parse a raw trigger payload and dispatch it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnrecognizedTrigger`] for unknown actions.
    pub fn dispatch_action(&self, action: Option<&str>) -> Result<Option<Command>> {
        let cause = TriggerCause::from_action(action).inspect_err(|e| {
            tracing::error!(error = %e, "rejecting trigger");
        })?;
        Ok(self.dispatch(cause))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn dispatcher(enabled: bool) -> Dispatcher {
        let settings = Settings::in_memory();
        settings.set_service_enabled(enabled).expect("seed flag");
        Dispatcher::new(settings)
    }

    #[test]
    fn explicit_triggers_ignore_flag() {
        for enabled in [false, true] {
            let d = dispatcher(enabled);
            assert_eq!(d.dispatch(TriggerCause::ExplicitStart), Some(Command::Start));
            assert_eq!(d.dispatch(TriggerCause::ExplicitStop), Some(Command::Stop));
        }
    }

    #[test]
    fn host_restart_starts_even_when_disabled() {
        let d = dispatcher(false);
        assert_eq!(
            d.dispatch(TriggerCause::ProcessRestartedByHost),
            Some(Command::Start)
        );
        assert_eq!(d.dispatch_action(None).expect("restart"), Some(Command::Start));
    }

    #[test]
    fn boot_and_package_replaced_follow_flag() {
        let on = dispatcher(true);
        assert_eq!(on.dispatch(TriggerCause::BootCompleted), Some(Command::Start));
        assert_eq!(on.dispatch(TriggerCause::PackageReplaced), Some(Command::Start));

        let off = dispatcher(false);
        assert_eq!(off.dispatch(TriggerCause::BootCompleted), None);
        assert_eq!(off.dispatch(TriggerCause::PackageReplaced), None);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let d = dispatcher(true);
        let err = d.dispatch_action(Some("service.restart")).unwrap_err();
        assert!(matches!(err, ServiceError::UnrecognizedTrigger(_)));
    }

    #[test]
    fn empty_action_is_not_a_restart() {
        let err = TriggerCause::from_action(Some("")).unwrap_err();
        assert!(matches!(err, ServiceError::UnrecognizedTrigger(_)));
    }

    #[test]
    fn action_names_parse_back() {
        for cause in [
            TriggerCause::ExplicitStart,
            TriggerCause::ExplicitStop,
            TriggerCause::ProcessRestartedByHost,
            TriggerCause::BootCompleted,
            TriggerCause::PackageReplaced,
        ] {
            assert_eq!(TriggerCause::from_action(cause.action()).expect("parse"), cause);
        }
    }
}
