//! Tagged phase and step outcomes.
//!
//! Assertion failures and recovered panics end up in the same shape: a status
//! plus a bounded message and the full text as trace.

use std::any::Any;

use crate::enums::Status;
use crate::model::StatusDetails;

/// Upper bound, in characters, of a reported failure message.
pub const MAX_MESSAGE_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed {
        message: String,
        trace: Option<String>,
    },
    Broken {
        message: String,
        trace: Option<String>,
    },
    Skipped {
        message: Option<String>,
    },
}

impl Outcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Outcome::Failed {
            message: message.into(),
            trace: None,
        }
    }

    pub fn broken(message: impl Into<String>) -> Self {
        Outcome::Broken {
            message: message.into(),
            trace: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Outcome::Skipped {
            message: Some(message.into()),
        }
    }

    /// Converts a caught panic payload into a broken outcome.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let text = panic_message(payload);
        Outcome::Broken {
            message: truncate_message(&text),
            trace: Some(text),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Outcome::Passed => Status::Passed,
            Outcome::Failed { .. } => Status::Failed,
            Outcome::Broken { .. } => Status::Broken,
            Outcome::Skipped { .. } => Status::Skipped,
        }
    }

    pub fn details(&self) -> Option<StatusDetails> {
        match self {
            Outcome::Passed => None,
            Outcome::Failed { message, trace } | Outcome::Broken { message, trace } => {
                StatusDetails::with_message(Some(message.clone()), trace.clone())
            }
            Outcome::Skipped { message } => StatusDetails::with_message(message.clone(), None),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. } | Outcome::Broken { .. })
    }

    /// Keeps whichever of the two outcomes is worse; ties keep `self`.
    pub fn merge(self, other: Outcome) -> Outcome {
        let merged = self.status().record(other.status());
        if merged != self.status() {
            other
        } else {
            self
        }
    }
}

/// Unwinding payload for a failure that has already been recorded.
///
/// Raised with [`std::panic::resume_unwind`], so the panic hook stays quiet,
/// and caught at the next step or phase boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt;

/// Stops the current scope after its failure has been recorded.
pub fn halt() -> ! {
    std::panic::resume_unwind(Box::new(Halt))
}

pub fn is_halt(payload: &(dyn Any + Send)) -> bool {
    payload.is::<Halt>()
}

/// Extracts the text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// First line of `text`, capped at [`MAX_MESSAGE_LEN`] characters.
pub fn truncate_message(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= MAX_MESSAGE_LEN {
        return first_line.to_string();
    }
    let mut cut: String = first_line.chars().take(MAX_MESSAGE_LEN - 3).collect();
    cut.push_str("...");
    cut
}
