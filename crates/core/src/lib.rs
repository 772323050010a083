//! Auth-mode control for socialmarket: decides which credentials a request
//! runs under, when to re-prompt, and what to tell the user when the backend
//! says no.

pub mod mode;
pub mod session;

pub use mode::{transition, AuthController, AuthEvent, Effect, Prompt, Transition};
pub use session::{Outcome, Session};
