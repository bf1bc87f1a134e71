//! Forced re-login command handler

use super::HandlerContext;
use crate::command::CommandOutcome;
use crate::error::ServiceError;
use tracing::{info, warn};

/// Handle FORCE_RELOGIN
///
/// The current token is dropped before logging in, so a failed login leaves
/// the service unauthenticated and the next output command logs in again.
pub async fn handle_force_relogin(
    ctx: &HandlerContext<'_>,
) -> Result<CommandOutcome, ServiceError> {
    info!("Forcing re-login");
    ctx.session.invalidate().await;

    match ctx.authenticator.authenticate(ctx.session).await {
        Ok(()) => Ok(CommandOutcome::Relogged),
        Err(failure) => {
            warn!("Forced re-login failed: {}", failure);
            Err(failure.into())
        }
    }
}
