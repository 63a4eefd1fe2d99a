//! Session identifiers.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::Error;

/// Opaque session token of the form `w<worker>-<32 hex digits>`.
///
/// The worker tag names the process that owns the session, so a front
/// router can forward every request for it to the same place. The hex part
/// is a random UUIDv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    worker: u16,
    token: Uuid,
}

impl SessionId {
    /// Mint a fresh ID owned by `worker`.
    pub fn generate(worker: u16) -> Self {
        Self {
            worker,
            token: Uuid::new_v4(),
        }
    }

    /// Index of the worker that created this session.
    pub fn worker(&self) -> u16 {
        self.worker
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}-{}", self.worker, self.token.simple())
    }
}

impl FromStr for SessionId {
    type Err = Error;

    /// Anything that does not parse is reported as an unknown session.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let not_found = || Error::NotFound(s.to_string());

        let (worker, token) = s
            .strip_prefix('w')
            .and_then(|rest| rest.split_once('-'))
            .ok_or_else(not_found)?;

        if worker.is_empty() || !worker.bytes().all(|b| b.is_ascii_digit()) {
            return Err(not_found());
        }
        if token.len() != 32 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(not_found());
        }

        Ok(Self {
            worker: worker.parse().map_err(|_| not_found())?,
            token: Uuid::try_parse(token).map_err(|_| not_found())?,
        })
    }
}
