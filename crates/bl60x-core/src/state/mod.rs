//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{HandlerContext, handle_transition};
pub use machine::{AssetOutcome, BranchFlags, SessionState, StateMachineContext};
