//! Lottery wire protocol.
//!
//! Builds the client's request frames and classifies the server's
//! replies. Frames here never carry the line delimiter; the transport
//! appends it on send and strips it on receive.
//!
//! ```text
//! client → server   [CLIENT 1] Bets -> [AgencyID:1,ID:7574,...][AgencyID:1,...]
//! client → server   [CLIENT 1] Awaiting results
//! server → client   OK:ID:30904465,22333444 | WAIT | ERROR:<reason>
//! ```

use crate::types::{BetRecord, ClientError, KnownIdentitySet, PollOutcome};

const OK_PREFIX: &str = "OK";
const WAIT_PREFIX: &str = "WAIT";
const ERROR_PREFIX: &str = "ERROR";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Render one bet in its bracketed wire form.
pub fn encode_bet(bet: &BetRecord) -> String {
    format!(
        "[AgencyID:{},ID:{},Name:{},Surname:{},PersonalID:{},BirthDate:{}]",
        bet.agency_id, bet.bet_id, bet.name, bet.surname, bet.personal_id, bet.birth_date
    )
}

/// Build the submission frame for a batch of bets.
///
/// Records are concatenated in order with no separator.
pub fn encode_batch(client_id: u32, bets: &[BetRecord]) -> String {
    let mut frame = format!("[CLIENT {client_id}] Bets -> ");
    for bet in bets {
        frame.push_str(&encode_bet(bet));
    }
    frame
}

/// Build the poll frame asking whether results are ready.
pub fn awaiting_results(client_id: u32) -> String {
    format!("[CLIENT {client_id}] Awaiting results")
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// A server reply to a poll request, classified by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerResponse {
    /// `OK...:...:<id>,<id>,...` with the parsed winner identity numbers.
    Winners(Vec<u64>),
    Wait,
    /// `ERROR...`, carrying the full line.
    Error(String),
    /// Any other content.
    Unrecognized(String),
}

impl ServerResponse {
    /// Classify a delimiter-stripped response line.
    ///
    /// A winner list that does not parse is a protocol violation for the
    /// whole reply; there is no partial parse.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        if text.starts_with(OK_PREFIX) {
            // Only the third field carries ids; later fields are ignored.
            let list = text.split(':').nth(2).ok_or_else(|| {
                ClientError::ProtocolViolation(format!("OK response without winner list: {text:?}"))
            })?;
            return parse_winner_list(list).map(ServerResponse::Winners);
        }
        if text.starts_with(ERROR_PREFIX) {
            return Ok(ServerResponse::Error(text.to_string()));
        }
        if text.starts_with(WAIT_PREFIX) {
            return Ok(ServerResponse::Wait);
        }
        Ok(ServerResponse::Unrecognized(text.to_string()))
    }

    /// Resolve this reply against the ids we submitted.
    ///
    /// `Unrecognized` replies are rejected as protocol violations.
    pub fn into_outcome(self, known: &KnownIdentitySet) -> Result<PollOutcome, ClientError> {
        match self {
            ServerResponse::Winners(ids) => Ok(PollOutcome::Success(known.count_matches(&ids))),
            ServerResponse::Wait => Ok(PollOutcome::Wait),
            ServerResponse::Error(text) => Ok(PollOutcome::Error(text)),
            ServerResponse::Unrecognized(text) => Err(ClientError::ProtocolViolation(format!(
                "unrecognized response: {text:?}"
            ))),
        }
    }
}

/// Parse a comma-separated list of identity numbers. Empty means no winners.
fn parse_winner_list(list: &str) -> Result<Vec<u64>, ClientError> {
    if list.is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|entry| {
            entry.parse::<u64>().map_err(|e| {
                ClientError::ProtocolViolation(format!("invalid winner id {entry:?}: {e}"))
            })
        })
        .collect()
}

/// Check the server's acknowledgement of a submitted batch.
///
/// Only an explicit `ERROR` reply is a failure; the body of a positive
/// ack is informational.
pub fn check_submission_ack(reply: &str) -> Result<(), ClientError> {
    if reply.starts_with(ERROR_PREFIX) {
        return Err(ClientError::ServerError(reply.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
