pub mod constants;
pub mod event;
pub mod invocation;

pub use event::{ActivityEvent, ActivityKind};
pub use invocation::{HelperInvocation, InvocationOutcome};
