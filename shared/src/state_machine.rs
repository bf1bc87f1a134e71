//! Command Retry State Machine
//!
//! Drives a single output command from dequeue to completion:
//!
//! ```text
//! Idle -> Authenticating -> Sending -> Done            (success, device offline)
//!                              |  -> Authenticating    (session expired)
//!                              |  -> AwaitingRetry     (transient error, budget left)
//!                              |  -> Failed            (permanent error, budget spent)
//! AwaitingRetry -> Sending
//! ```
//!
//! Only transient errors consume the retry budget. Session recovery is
//! unlimited unless a cap is configured.

use crate::RequestOutcome;

/// Phase of a command in the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    /// Dequeued, nothing attempted yet
    Idle,
    /// Logging in before the next send
    Authenticating,
    /// Signed request in flight
    Sending,
    /// Waiting out the backoff after a transient error
    AwaitingRetry,
    /// Completed without error
    Done,
    /// Completed with an error
    Failed,
}

impl CommandPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandPhase::Done | CommandPhase::Failed)
    }
}

/// Events fed into the state machine by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Command taken off the queue
    Dequeued { authenticated: bool },
    /// Login produced a session token
    LoginSucceeded,
    /// Login failed with the given classification
    LoginFailed(RequestOutcome),
    /// Control request finished with the given classification
    Sent(RequestOutcome),
    /// Backoff delay has passed
    BackoffElapsed,
}

/// Result of feeding an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Moved to a new phase
    Success(CommandPhase),
    /// Event not valid in the current phase, phase unchanged
    Invalid {
        from: CommandPhase,
        event: PhaseEvent,
    },
}

/// Retry limits applied to one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// Transient failures tolerated before giving up
    pub max_retries: u8,
    /// Session-expiry recoveries tolerated, `None` for unlimited
    pub max_session_recoveries: Option<u32>,
}

/// Per-command retry/recovery state machine
#[derive(Debug)]
pub struct RetryStateMachine {
    phase: CommandPhase,
    budget: RetryBudget,
    retries_used: u8,
    session_recoveries: u32,
    last_outcome: Option<RequestOutcome>,
}

impl RetryStateMachine {
    pub fn new(budget: RetryBudget) -> Self {
        Self {
            phase: CommandPhase::Idle,
            budget,
            retries_used: 0,
            session_recoveries: 0,
            last_outcome: None,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> CommandPhase {
        self.phase
    }

    /// Transient retries consumed so far
    pub fn retries_used(&self) -> u8 {
        self.retries_used
    }

    /// Session-expiry recoveries performed so far
    pub fn session_recoveries(&self) -> u32 {
        self.session_recoveries
    }

    /// Classification of the most recent login or send
    pub fn last_outcome(&self) -> Option<RequestOutcome> {
        self.last_outcome
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: PhaseEvent) -> TransitionResult {
        match self.next_phase(event) {
            Some(phase) => {
                self.phase = phase;
                TransitionResult::Success(phase)
            }
            None => TransitionResult::Invalid {
                from: self.phase,
                event,
            },
        }
    }

    fn next_phase(&mut self, event: PhaseEvent) -> Option<CommandPhase> {
        use CommandPhase::*;
        use PhaseEvent::*;

        match (self.phase, event) {
            (Idle, Dequeued { authenticated: true }) => Some(Sending),
            (Idle, Dequeued { authenticated: false }) => Some(Authenticating),

            (Authenticating, LoginSucceeded) => Some(Sending),
            (Authenticating, LoginFailed(outcome)) => {
                self.last_outcome = Some(outcome);
                Some(Failed)
            }

            (Sending, Sent(outcome)) => {
                self.last_outcome = Some(outcome);
                Some(self.after_send(outcome))
            }

            (AwaitingRetry, BackoffElapsed) => Some(Sending),

            _ => None,
        }
    }

    fn after_send(&mut self, outcome: RequestOutcome) -> CommandPhase {
        match outcome {
            RequestOutcome::Success | RequestOutcome::DeviceOffline => CommandPhase::Done,
            RequestOutcome::SessionExpired => {
                if let Some(cap) = self.budget.max_session_recoveries {
                    if self.session_recoveries >= cap {
                        return CommandPhase::Failed;
                    }
                }
                self.session_recoveries += 1;
                CommandPhase::Authenticating
            }
            RequestOutcome::TransientError => {
                self.retries_used = self.retries_used.saturating_add(1);
                if self.retries_used > self.budget.max_retries {
                    CommandPhase::Failed
                } else {
                    CommandPhase::AwaitingRetry
                }
            }
            RequestOutcome::PermanentError => CommandPhase::Failed,
        }
    }
}
