//! Bulk session state.
//!
//! ## State Transitions
//!
//! ```text
//! Init -> MetadataSent       (column metadata written)
//! MetadataSent -> Streaming  (first row written)
//! Streaming -> Streaming     (further rows)
//! MetadataSent -> Completed  (finish with zero rows)
//! Streaming -> Completed     (finish)
//! Init -> Completed          (finish with no rows and no declared columns)
//! any non-terminal -> Failed (encode, transport or server error, abort)
//! ```
//!
//! `Completed` and `Failed` are terminal. Every operation on a terminal
//! session fails immediately with [`Error::InvalidState`].

use std::fmt;

use crate::error::{Error, Result};

/// Where a bulk session is in its exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent on the bulk-load stream yet.
    #[default]
    Init,
    /// Column metadata written, no rows yet.
    MetadataSent,
    /// At least one row written.
    Streaming,
    /// The server acknowledged the transfer.
    Completed,
    /// The transfer failed or was aborted. The session cannot be reused.
    Failed,
}

impl SessionState {
    /// Check if no further operations are allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if rows have started flowing.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Check whether moving to `next` is legal.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Init, MetadataSent | Completed) => true,
            (MetadataSent, Streaming | Completed) => true,
            (Streaming, Streaming | Completed) => true,
            _ => false,
        }
    }

    /// Move to `next`, or fail without changing state.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState(format!("cannot go from {self} to {next}")));
        }
        tracing::trace!(from = %self, to = %next, "bulk session transition");
        *self = next;
        Ok(())
    }

    /// Fail unless another operation may run.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::InvalidState(format!("session is {self}")));
        }
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::MetadataSent => "metadata sent",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}
