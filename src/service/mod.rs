//! The resident service core: state machine and the queue that feeds it.

pub mod channel;
pub mod state;

pub use channel::{PendingCommand, ServiceClient, ServiceWorker, service_channel};
pub use state::{Command, ForegroundStateMachine, ServiceEvent, ServiceMode, Transition};
