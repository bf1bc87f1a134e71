//! Command handlers for the different command kinds

mod relogin;
mod set_output;
mod status;

pub use relogin::handle_force_relogin;
pub use set_output::handle_set_output;
pub use status::handle_get_status;

use powerlink_shared::state_machine::RetryBudget;
use std::time::Duration;

use super::control::OutputClient;
use crate::session::{Authenticator, SessionStore};

/// Context passed to command handlers
pub struct HandlerContext<'a> {
    pub authenticator: &'a Authenticator,
    pub client: &'a OutputClient,
    pub session: &'a SessionStore,
    pub budget: RetryBudget,
    pub backoff: Duration,
    pub skip_duplicates: bool,
}
