pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod invoke;
pub mod models;
pub mod provision;
pub mod session;

pub use config::{Settings, SettingsHandle};
pub use dispatch::{HeartbeatDispatcher, Readiness};
pub use error::{ConfigError, InvocationError, ProvisioningError};
pub use host::HostEvent;
pub use invoke::ProcessInvoker;
pub use models::{ActivityEvent, ActivityKind, HelperInvocation, InvocationOutcome};
pub use provision::{CliProvisioner, ProvisioningState};
pub use session::{Lifecycle, Session, SessionNotice};
