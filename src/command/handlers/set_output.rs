//! Output power command handler
//!
//! Drives one SET_OUTPUT command through the retry state machine. Only
//! transient failures consume the retry budget; a session expiry triggers a
//! fresh login followed by a resend of the same value.

use super::HandlerContext;
use crate::command::control::ControlResponse;
use crate::command::CommandOutcome;
use crate::error::ServiceError;
use powerlink_shared::state_machine::{
    CommandPhase, PhaseEvent, RetryStateMachine, TransitionResult,
};
use powerlink_shared::{OutputPower, RequestOutcome};
use tracing::{debug, error, info, warn};

/// Handle SET_OUTPUT
pub async fn handle_set_output(
    ctx: &HandlerContext<'_>,
    output: OutputPower,
) -> Result<CommandOutcome, ServiceError> {
    if ctx.skip_duplicates && ctx.session.last_confirmed().await == Some(output) {
        info!("Output already confirmed at {}, skipping", output);
        ctx.session.record_skipped().await;
        return Ok(CommandOutcome::Skipped(output));
    }

    let mut fsm = RetryStateMachine::new(ctx.budget);
    let mut last_error: Option<ServiceError> = None;
    let mut event = PhaseEvent::Dequeued {
        authenticated: ctx.session.is_authenticated().await,
    };

    loop {
        match fsm.process_event(event) {
            TransitionResult::Success(phase) => debug!("SET_OUTPUT {} -> {:?}", output, phase),
            TransitionResult::Invalid { from, event } => {
                error!("Invalid transition from {:?} on {:?}", from, event);
                ctx.session.record_failure().await;
                return Err(ServiceError::Internal(format!(
                    "invalid transition from {:?} on {:?}",
                    from, event
                )));
            }
        }

        event = match fsm.phase() {
            CommandPhase::Authenticating => {
                match ctx.authenticator.authenticate(ctx.session).await {
                    Ok(()) => PhaseEvent::LoginSucceeded,
                    Err(failure) => {
                        let outcome = failure.outcome();
                        last_error = Some(failure.into());
                        PhaseEvent::LoginFailed(outcome)
                    }
                }
            }
            CommandPhase::Sending => {
                let response = send_once(ctx, output).await;
                if response.outcome == RequestOutcome::SessionExpired {
                    ctx.session.invalidate().await;
                }
                if !response.outcome.is_completed() {
                    last_error = Some(response.to_error());
                }
                PhaseEvent::Sent(response.outcome)
            }
            CommandPhase::AwaitingRetry => {
                warn!(
                    "Retry {}/{} for {} in {:?}",
                    fsm.retries_used(),
                    ctx.budget.max_retries,
                    output,
                    ctx.backoff
                );
                tokio::time::sleep(ctx.backoff).await;
                PhaseEvent::BackoffElapsed
            }
            CommandPhase::Done => {
                return if fsm.last_outcome() == Some(RequestOutcome::Success) {
                    ctx.session.record_success(Some(output)).await;
                    Ok(CommandOutcome::Applied(output))
                } else {
                    ctx.session.record_success(None).await;
                    Ok(CommandOutcome::DeviceOffline(output))
                };
            }
            CommandPhase::Failed => {
                ctx.session.record_failure().await;
                let err = last_error
                    .unwrap_or_else(|| ServiceError::Internal("command failed without a cause".into()));
                error!(
                    "Failed to set output {} after {} retries: {}",
                    output,
                    fsm.retries_used(),
                    err
                );
                return Err(err);
            }
            CommandPhase::Idle => {
                ctx.session.record_failure().await;
                return Err(ServiceError::Internal("command never left idle".into()));
            }
        };
    }
}

/// One control request with the current token
async fn send_once(ctx: &HandlerContext<'_>, output: OutputPower) -> ControlResponse {
    match ctx.session.token().await {
        Some(token) => {
            ctx.session.record_attempt().await;
            ctx.client.set_output(&token, output).await
        }
        None => ControlResponse {
            outcome: RequestOutcome::SessionExpired,
            detail: "no session token".into(),
        },
    }
}
