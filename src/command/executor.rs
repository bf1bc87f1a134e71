//! Command executor - dispatches dequeued commands to their handlers

use super::control::OutputClient;
use super::handlers::{self, HandlerContext};
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::session::{AuthFailure, Authenticator, ServiceStatus, SessionStore};
use crate::transport::HttpTransport;
use powerlink_shared::state_machine::RetryBudget;
use powerlink_shared::{now_ms, Command, OutputPower};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of a successfully executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Server confirmed the new output power
    Applied(OutputPower),
    /// Request accepted but the inverter is offline, nothing changed
    DeviceOffline(OutputPower),
    /// Value already confirmed, no request sent
    Skipped(OutputPower),
    /// Fresh session established
    Relogged,
    /// Status snapshot taken in queue order
    Status(ServiceStatus),
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Applied(p) => write!(f, "output set to {}", p),
            CommandOutcome::DeviceOffline(p) => write!(f, "device offline, {} not applied", p),
            CommandOutcome::Skipped(p) => write!(f, "output already at {}", p),
            CommandOutcome::Relogged => f.write_str("logged in"),
            CommandOutcome::Status(s) => write!(f, "authenticated={}", s.authenticated),
        }
    }
}

/// Executes commands taken off the queue, one at a time
pub struct CommandExecutor {
    authenticator: Authenticator,
    client: OutputClient,
    session: Arc<SessionStore>,
    budget: RetryBudget,
    backoff: Duration,
    skip_duplicates: bool,
}

impl CommandExecutor {
    pub fn new(
        config: &ServiceConfig,
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            authenticator: Authenticator::new(config, transport.clone()),
            client: OutputClient::new(config, transport),
            session,
            budget: RetryBudget {
                max_retries: config.max_retry_count,
                max_session_recoveries: config.max_session_recoveries,
            },
            backoff: config.retry_backoff(),
            skip_duplicates: config.skip_duplicates,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Log in ahead of the first command
    pub async fn login(&self) -> Result<(), AuthFailure> {
        self.authenticator.authenticate(&self.session).await
    }

    /// Execute one command to completion
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, ServiceError> {
        let start_time = now_ms();
        info!("Executing command: {}", command.name());

        let ctx = HandlerContext {
            authenticator: &self.authenticator,
            client: &self.client,
            session: &self.session,
            budget: self.budget,
            backoff: self.backoff,
            skip_duplicates: self.skip_duplicates,
        };

        let result = match command {
            Command::SetOutput(output) => handlers::handle_set_output(&ctx, output).await,
            Command::ForceRelogin => handlers::handle_force_relogin(&ctx).await,
            Command::GetStatus => handlers::handle_get_status(&ctx).await,
        };

        let elapsed = now_ms().saturating_sub(start_time);
        match &result {
            Ok(outcome) => info!("  {} completed in {}ms: {}", command.name(), elapsed, outcome),
            Err(e) => warn!("  {} failed in {}ms: {}", command.name(), elapsed, e),
        }
        result
    }
}
