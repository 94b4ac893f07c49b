//! Client loop controller.
//!
//! Runs the two strictly sequential phases of an agency client:
//!
//! 1. **Submission**: pull up to `batch_size` bets from the record source,
//!    send them as one frame on a fresh connection, pause, repeat until the
//!    source is exhausted.
//! 2. **Polling**: ask the server for results on a fresh connection per
//!    attempt until it answers with the winner list or an error.
//!
//! Every pause and every network call races the shutdown token; once it
//! fires the loop unwinds, closing whatever session is open, and sends
//! nothing further.

use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::net::{Connector, Session};
use crate::protocol::{self, ServerResponse};
use crate::source::{CsvBetSource, RecordSource};
use crate::types::{BetRecord, ClientError, KnownIdentitySet, PollOutcome, RunOutcome, RunReport};

/// Runtime settings for one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Agency number, sent in every frame header.
    pub id: u32,
    /// Pause between batches and between poll attempts.
    pub loop_period: Duration,
    /// Give up polling after this long. `None` polls until stopped.
    pub loop_lapse: Option<Duration>,
    pub batch_size: usize,
    /// Read one reply line after each batch before closing the session.
    pub await_submission_ack: bool,
}

/// Agency client: submits bets, then polls for winners.
pub struct Client<C> {
    config: ClientConfig,
    connector: C,
    cancel: CancellationToken,
    known_ids: KnownIdentitySet,
}

impl<C: Connector> Client<C> {
    pub fn new(config: ClientConfig, connector: C, cancel: CancellationToken) -> Self {
        Self {
            config,
            connector,
            cancel,
            known_ids: KnownIdentitySet::new(),
        }
    }

    /// Identity numbers read from the source so far.
    pub fn known_ids(&self) -> &KnownIdentitySet {
        &self.known_ids
    }

    /// Run both phases to completion.
    ///
    /// A shutdown before completion is not an error: the report comes back
    /// with [`RunOutcome::Aborted`]. The `loop_finished` status is logged
    /// exactly once whichever way the run ends.
    pub async fn run<R>(&mut self, source: &mut R) -> Result<RunReport, ClientError>
    where
        R: RecordSource + ?Sized,
    {
        let mut report = RunReport {
            batches_sent: 0,
            bets_sent: 0,
            poll_attempts: 0,
            outcome: RunOutcome::Aborted,
        };
        let client_id = self.config.id;

        match self.run_phases(source, &mut report).await {
            Ok(winners) => {
                report.outcome = RunOutcome::Winners(winners);
                info!(
                    action = "loop_finished",
                    result = "success",
                    client_id,
                    batches = report.batches_sent,
                    bets = report.bets_sent,
                    winners
                );
                Ok(report)
            }
            Err(ClientError::Stopped) => {
                warn!(
                    action = "loop_finished",
                    result = "aborted",
                    client_id,
                    batches = report.batches_sent
                );
                Ok(report)
            }
            Err(e) => {
                error!(action = "loop_finished", result = "fail", client_id, error = %e);
                Err(e)
            }
        }
    }

    /// Run against the agency's CSV file at `path`.
    ///
    /// A file that cannot be opened ends the run before any I/O, and is
    /// reported as `loop_finished` like any other failure.
    pub async fn run_file(&mut self, path: impl AsRef<Path>) -> Result<RunReport, ClientError> {
        let client_id = self.config.id;
        match CsvBetSource::open(path, client_id) {
            Ok(mut source) => self.run(&mut source).await,
            Err(e) => {
                error!(action = "open_file", result = "fail", client_id, error = %e);
                error!(action = "loop_finished", result = "fail", client_id, error = %e);
                Err(e)
            }
        }
    }

    async fn run_phases<R>(
        &mut self,
        source: &mut R,
        report: &mut RunReport,
    ) -> Result<usize, ClientError>
    where
        R: RecordSource + ?Sized,
    {
        self.submit_bets(source, report).await?;
        self.poll_results(report).await
    }

    // -- Submission phase ------------------------------------------------

    async fn submit_bets<R>(
        &mut self,
        source: &mut R,
        report: &mut RunReport,
    ) -> Result<(), ClientError>
    where
        R: RecordSource + ?Sized,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Stopped);
            }

            let (bets, exhausted) = self.read_chunk(source)?;
            if bets.is_empty() {
                break;
            }

            self.send_batch(&bets).await?;
            report.batches_sent += 1;
            report.bets_sent += bets.len();

            if exhausted {
                break;
            }
            self.wait_or_stop().await?;
        }

        info!(
            action = "submit_bets",
            result = "success",
            client_id = self.config.id,
            batches = report.batches_sent,
            bets = report.bets_sent
        );
        Ok(())
    }

    /// Read up to `batch_size` bets. The flag is set once the source ran dry.
    fn read_chunk<R>(&mut self, source: &mut R) -> Result<(Vec<BetRecord>, bool), ClientError>
    where
        R: RecordSource + ?Sized,
    {
        let mut bets = Vec::with_capacity(self.config.batch_size);
        while bets.len() < self.config.batch_size {
            match source.next_bet() {
                Ok(Some(bet)) => {
                    self.known_ids.insert(bet.personal_id);
                    bets.push(bet);
                }
                Ok(None) => return Ok((bets, true)),
                Err(e) => {
                    error!(
                        action = "read_bet",
                        result = "fail",
                        client_id = self.config.id,
                        error = %e
                    );
                    return Err(e);
                }
            }
        }
        Ok((bets, false))
    }

    async fn send_batch(&self, bets: &[BetRecord]) -> Result<(), ClientError> {
        let frame = protocol::encode_batch(self.config.id, bets);

        let sent = match self.exchange(&frame, self.config.await_submission_ack).await {
            Ok(Some(ack)) => protocol::check_submission_ack(&ack).map(|()| {
                debug!(
                    action = "receive_ack",
                    result = "success",
                    client_id = self.config.id,
                    message = %ack
                );
            }),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                log_bets(bets, "success");
                info!(
                    action = "send_batch",
                    result = "success",
                    client_id = self.config.id,
                    bets = bets.len()
                );
                Ok(())
            }
            Err(ClientError::Stopped) => Err(ClientError::Stopped),
            Err(e) => {
                log_bets(bets, "fail");
                error!(
                    action = "send_batch",
                    result = "fail",
                    client_id = self.config.id,
                    error = %e
                );
                Err(e)
            }
        }
    }

    // -- Polling phase ---------------------------------------------------

    async fn poll_results(&mut self, report: &mut RunReport) -> Result<usize, ClientError> {
        let client_id = self.config.id;
        let request = protocol::awaiting_results(client_id);
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Stopped);
            }

            report.poll_attempts += 1;
            let reply = self.exchange(&request, true).await?.unwrap_or_default();

            match self.interpret(&reply)? {
                PollOutcome::Success(winners) => {
                    info!(
                        action = "consulta_ganadores",
                        result = "success",
                        client_id,
                        cant_ganadores = winners
                    );
                    return Ok(winners);
                }
                PollOutcome::Wait => {
                    info!(action = "consulta_ganadores", result = "wait", client_id);
                }
                PollOutcome::Error(message) => {
                    error!(
                        action = "consulta_ganadores",
                        result = "fail",
                        client_id,
                        message = %message
                    );
                    return Err(ClientError::ServerError(message));
                }
            }

            if let Some(lapse) = self.config.loop_lapse {
                if started.elapsed() >= lapse {
                    error!(
                        action = "consulta_ganadores",
                        result = "timeout",
                        client_id,
                        attempts = report.poll_attempts
                    );
                    return Err(ClientError::PollDeadlineExceeded {
                        attempts: report.poll_attempts,
                    });
                }
            }

            self.wait_or_stop().await?;
        }
    }

    fn interpret(&self, reply: &str) -> Result<PollOutcome, ClientError> {
        let client_id = self.config.id;
        let response = ServerResponse::parse(reply).map_err(|e| {
            error!(action = "convert_winner", result = "fail", client_id, error = %e);
            e
        })?;
        if let ServerResponse::Unrecognized(text) = &response {
            error!(
                action = "consulta_ganadores",
                result = "unrecognized",
                client_id,
                message = %text
            );
        }
        response.into_outcome(&self.known_ids)
    }

    // -- Shared plumbing -------------------------------------------------

    /// One request on a fresh session. The session is closed before this
    /// returns, on success and on failure alike.
    async fn exchange(
        &self,
        frame: &str,
        expect_reply: bool,
    ) -> Result<Option<String>, ClientError> {
        let client_id = self.config.id;
        let mut session = Session::open(&self.connector, &self.cancel, client_id).await?;

        let outcome = converse(&mut session, frame, expect_reply, client_id).await;
        let closed = session.close().await;

        let reply = outcome?;
        closed?;
        Ok(reply)
    }

    /// Sleep for the loop period unless the shutdown token fires first.
    async fn wait_or_stop(&self) -> Result<(), ClientError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Stopped),
            _ = tokio::time::sleep(self.config.loop_period) => Ok(()),
        }
    }
}

async fn converse<S>(
    session: &mut Session<S>,
    frame: &str,
    expect_reply: bool,
    client_id: u32,
) -> Result<Option<String>, ClientError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    if let Err(e) = session.send(frame).await {
        log_io_failure("send_message", client_id, &e);
        return Err(e);
    }
    debug!(action = "send_message", result = "success", client_id, bytes = frame.len() + 1);

    if !expect_reply {
        return Ok(None);
    }

    match session.receive().await {
        Ok(reply) => {
            info!(action = "receive_message", result = "success", client_id, message = %reply);
            Ok(Some(reply))
        }
        Err(e) => {
            log_io_failure("receive_message", client_id, &e);
            Err(e)
        }
    }
}

fn log_io_failure(action: &str, client_id: u32, err: &ClientError) {
    if !err.is_stopped() {
        error!(action, result = "fail", client_id, error = %err);
    }
}

fn log_bets(bets: &[BetRecord], result: &str) {
    for bet in bets {
        info!(
            action = "apuesta_enviada",
            result,
            dni = bet.personal_id,
            numero = bet.bet_id
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
