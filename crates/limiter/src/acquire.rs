//! Outcome of an admission attempt.

use std::fmt;

use crate::storage::{Script, StoreError};

/// Tri-state result shared by every limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Acquire {
    /// A permit was granted.
    Success,
    /// The limit is reached, no permit was granted.
    Failure,
    /// The store could not decide. Neither a grant nor a proven denial.
    Exception,
}

impl Acquire {
    /// Maps a script reply to an outcome, logging anything that is not a decision.
    pub(crate) fn from_reply(script: Script, identity: &str, reply: Result<Option<i64>, StoreError>) -> Self {
        match reply {
            Ok(Some(0)) => {
                log::debug!("{} denied '{identity}'", script.name());
                Acquire::Failure
            }
            Ok(Some(_)) => Acquire::Success,
            Ok(None) => {
                log::error!("{} returned no value for '{identity}'", script.name());
                Acquire::Exception
            }
            Err(e) => {
                log::error!("{} failed for '{identity}': {e}", script.name());
                Acquire::Exception
            }
        }
    }

    /// Whether a permit was granted.
    pub fn is_success(self) -> bool {
        self == Acquire::Success
    }
}

impl AsRef<str> for Acquire {
    fn as_ref(&self) -> &str {
        match self {
            Acquire::Success => "SUCCESS",
            Acquire::Failure => "FAILURE",
            Acquire::Exception => "EXCEPTION",
        }
    }
}

impl fmt::Display for Acquire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}
