//! Status request command handler

use super::HandlerContext;
use crate::command::CommandOutcome;
use crate::error::ServiceError;
use tracing::debug;

/// Handle GET_STATUS
///
/// Runs in queue order, so the snapshot reflects every command submitted
/// before it.
pub async fn handle_get_status(ctx: &HandlerContext<'_>) -> Result<CommandOutcome, ServiceError> {
    let status = ctx.session.snapshot().await;
    debug!(
        "status: authenticated={} total={} successful={} failed={}",
        status.authenticated,
        status.stats.total_requests,
        status.stats.successful_requests,
        status.stats.failed_requests
    );
    Ok(CommandOutcome::Status(status))
}
