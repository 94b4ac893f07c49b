//! Shared types for the lottery client.
//!
//! These types form the data model used across all modules: the bet
//! records read from the agency file, the set of identity numbers this
//! agency has submitted, poll outcomes, and the domain error enum.

use std::collections::HashSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Bet record
// ---------------------------------------------------------------------------

/// A single lottery bet as read from the agency's data file.
///
/// Immutable once constructed; the record source validates fields
/// before building one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetRecord {
    /// Agency (client) number that placed the bet.
    pub agency_id: u32,
    /// Bet number chosen by the holder.
    pub bet_id: u32,
    pub name: String,
    pub surname: String,
    /// Holder's identity document number; matched against server winners.
    pub personal_id: u64,
    /// `YYYY-MM-DD`, kept verbatim as read.
    pub birth_date: String,
}

impl BetRecord {
    pub fn new(
        agency_id: u32,
        bet_id: u32,
        name: impl Into<String>,
        surname: impl Into<String>,
        personal_id: u64,
        birth_date: impl Into<String>,
    ) -> Self {
        Self {
            agency_id,
            bet_id,
            name: name.into(),
            surname: surname.into(),
            personal_id,
            birth_date: birth_date.into(),
        }
    }
}

impl fmt::Display for BetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bet #{} by {} {} (dni {})",
            self.bet_id, self.name, self.surname, self.personal_id
        )
    }
}

// ---------------------------------------------------------------------------
// Known identity set
// ---------------------------------------------------------------------------

/// Identity numbers submitted by this agency across all batches.
///
/// Grows during the submission phase; only read while polling.
#[derive(Debug, Clone, Default)]
pub struct KnownIdentitySet {
    ids: HashSet<u64>,
}

impl KnownIdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, personal_id: u64) {
        self.ids.insert(personal_id);
    }

    pub fn contains(&self, personal_id: u64) -> bool {
        self.ids.contains(&personal_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Size of the intersection between `winners` and the known ids.
    /// Duplicate entries in `winners` count once.
    pub fn count_matches(&self, winners: &[u64]) -> usize {
        winners
            .iter()
            .filter(|id| self.ids.contains(*id))
            .collect::<HashSet<_>>()
            .len()
    }
}

impl Extend<u64> for KnownIdentitySet {
    fn extend<T: IntoIterator<Item = u64>>(&mut self, iter: T) {
        self.ids.extend(iter);
    }
}

// ---------------------------------------------------------------------------
// Poll outcome and run report
// ---------------------------------------------------------------------------

/// Result of one poll attempt, after matching against the known ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Results are out; this many of our holders won.
    Success(usize),
    /// The draw has not happened yet.
    Wait,
    /// The server refused the request; carries the full response line.
    Error(String),
}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Polling finished with this many winners.
    Winners(usize),
    /// Stopped by the shutdown signal before completion.
    Aborted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Winners(n) => write!(f, "{n} winner(s)"),
            RunOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Summary of one client run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub batches_sent: usize,
    pub bets_sent: usize,
    pub poll_attempts: usize,
    pub outcome: RunOutcome,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batches={} bets={} polls={} outcome={}",
            self.batches_sent, self.bets_sent, self.poll_attempts, self.outcome
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection error ({address}): {source}")]
    Connection {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error during {action}: {source}")]
    Transport {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The shutdown signal fired while an operation was pending.
    #[error("Operation stopped by caller")]
    Stopped,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Record source unavailable ({path}): {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No results after {attempts} poll attempts")]
    PollDeadlineExceeded { attempts: usize },
}

impl ClientError {
    /// Whether this error is the shutdown signal rather than a failure.
    pub fn is_stopped(&self) -> bool {
        matches!(self, ClientError::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
