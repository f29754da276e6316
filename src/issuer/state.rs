//! Issuance lifecycle
//!
//! ```text
//! Pending --submit--> Submitted --poll(created)--> Approved --poll(signed)--> Signed
//! ```
//!
//! Any non-terminal state may move to `Failed`. `Signed` and `Failed` are
//! terminal, and no state is ever revisited.

use std::fmt;

use tracing::{info, warn};

use crate::{Error, Result};

/// Where a single issuance run currently is
#[derive(Clone, PartialEq, Eq)]
pub enum IssuanceState {
    /// Key and request not yet submitted
    Pending,
    /// Request object created in the cluster
    Submitted,
    /// Request observed and approval recorded
    Approved,
    /// Authority returned a certificate
    Signed {
        /// PEM certificate chain
        certificate: Vec<u8>,
    },
    /// Run aborted
    Failed {
        /// Rendered cause
        reason: String,
    },
}

impl IssuanceState {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Submitted => "Submitted",
            Self::Approved => "Approved",
            Self::Signed { .. } => "Signed",
            Self::Failed { .. } => "Failed",
        }
    }

    /// Whether no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Signed { .. } | Self::Failed { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Submitted => 1,
            Self::Approved => 2,
            Self::Signed { .. } => 3,
            Self::Failed { .. } => 4,
        }
    }
}

impl fmt::Debug for IssuanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed { certificate } => f
                .debug_struct("Signed")
                .field("certificate_bytes", &certificate.len())
                .finish(),
            Self::Failed { reason } => f.debug_struct("Failed").field("reason", reason).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// State of one issuance run plus every state it has passed through
#[derive(Clone, Debug)]
pub struct Issuance {
    request_name: String,
    history: Vec<IssuanceState>,
}

impl Issuance {
    /// Start a run for `request_name` in `Pending`
    pub fn new(request_name: impl Into<String>) -> Self {
        Self {
            request_name: request_name.into(),
            history: vec![IssuanceState::Pending],
        }
    }

    /// Current state
    pub fn state(&self) -> &IssuanceState {
        // history is seeded with Pending and never shrinks
        &self.history[self.history.len() - 1]
    }

    /// Every state entered so far, oldest first
    pub fn history(&self) -> &[IssuanceState] {
        &self.history
    }

    /// Move forward to `next`.
    ///
    /// Fails with [`Error::InvalidTransition`] when the current state is
    /// terminal or `next` is not strictly later in the lifecycle.
    pub fn advance(&mut self, next: IssuanceState) -> Result<()> {
        let current = self.state();
        if current.is_terminal() || next.rank() <= current.rank() {
            return Err(Error::InvalidTransition(format!(
                "{}: {} -> {}",
                self.request_name,
                current.name(),
                next.name()
            )));
        }

        info!(
            csr = %self.request_name,
            from = current.name(),
            to = next.name(),
            "issuance state changed"
        );
        self.history.push(next);
        Ok(())
    }

    /// Record `err` as the cause of failure.
    ///
    /// A run that already reached a terminal state keeps it; errors raised
    /// after signing (storing the bundle, cleanup) do not rewrite history.
    pub fn fail(&mut self, err: &Error) {
        if self.state().is_terminal() {
            return;
        }
        warn!(
            csr = %self.request_name,
            from = self.state().name(),
            error = %err,
            "issuance failed"
        );
        self.history.push(IssuanceState::Failed {
            reason: err.to_string(),
        });
    }
}
