//! The access session loop.
//!
//! One cycle: wait for a card, read its pass with key A, publish a check
//! request, wait for the verdict, then act on it.
//!
//! ```text
//! AwaitingCard ──► Authenticating ──► AwaitingVerdict ──► Actuating ──► Idle
//!                        │ no pass / unreadable
//!                        └──────────────────────────────────────────► Idle
//! ```
//!
//! A card without a usable pass never reaches the authority. A verdict
//! timeout is acted on like a denial but reported as its own outcome.

use std::time::Duration;

use tapgate_core::{CardPass, CardUid, KeyMaterial, PassBlock};
use tapgate_hardware::{Buzzer, CardReader, DisplaySink};
use tapgate_network::{PubSubClient, PubSubTransport, VerdictChannel, VerdictError};
use tapgate_protocol::{ActionMessage, CheckRequest, LockOpen, Topics, Verdict};
use tapgate_rfid::{BlockStore, CardPassCodec, CardTransceiver, PassError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::SessionError;
use crate::feedback::{Feedback, Notice};
use crate::state_machine::{SessionState, SessionStateMachine, StateTransition};

/// Result of one access cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Granted,
    CheckedOut,
    Denied,
    /// No verdict in time; acted on as a denial.
    TimedOut,
    /// Card carried no pass. The authority was not contacted.
    NoPass,
    /// Card could not be authenticated or read. The authority was not
    /// contacted.
    CardUnreadable(String),
    /// The verdict feed delivered something unusable.
    VerdictUnusable(String),
    /// The check request could not be sent.
    RequestFailed(String),
    /// The reader could not be reached.
    ReaderFault(String),
    /// Shutdown was requested mid-cycle.
    Cancelled,
}

/// Values the loop needs from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub key_a: KeyMaterial,
    pub pass_block: PassBlock,
    pub scanner_ip: String,
    pub verdict_timeout: Duration,
    pub post_verdict_delay: Duration,
    pub reader_retry_delay: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            key_a: config.key_a,
            pass_block: config.pass_block,
            scanner_ip: config.scanner_ip.clone(),
            verdict_timeout: config.verdict_timeout,
            post_verdict_delay: config.post_verdict_delay,
            reader_retry_delay: config.card_poll_timeout,
        }
    }
}

pub struct AccessSessionController<R, D, B, T> {
    store: BlockStore<R>,
    feedback: Feedback<D, B>,
    verdicts: VerdictChannel<T>,
    client: PubSubClient<T>,
    topics: Topics,
    settings: SessionSettings,
    machine: SessionStateMachine,
}

impl<R, D, B, T> AccessSessionController<R, D, B, T>
where
    R: CardReader,
    D: DisplaySink,
    B: Buzzer,
    T: PubSubTransport,
{
    /// Build the controller and subscribe its verdict channel.
    ///
    /// # Errors
    /// Returns the transport error if the verdict feed cannot be subscribed.
    pub async fn attach(
        config: &Config,
        reader: R,
        feedback: Feedback<D, B>,
        client: PubSubClient<T>,
    ) -> Result<Self, SessionError> {
        let topics = config.topics();
        let verdicts =
            VerdictChannel::attach(client.clone(), topics.check_card(), &topics.action()).await?;
        let transceiver = CardTransceiver::new(reader, config.card_poll_timeout);

        Ok(Self {
            store: BlockStore::over(transceiver),
            feedback,
            verdicts,
            client,
            topics,
            settings: SessionSettings::from(config),
            machine: SessionStateMachine::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.machine.current_state()
    }

    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.machine.last_transitions(count)
    }

    pub fn feedback(&self) -> &Feedback<D, B> {
        &self.feedback
    }

    /// Run cycles until `cancel` fires.
    ///
    /// # Errors
    /// Only an internal state machine violation ends the loop early.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), SessionError> {
        info!(
            pass_block = self.settings.pass_block.index(),
            scanner_ip = %self.settings.scanner_ip,
            "Access session loop started"
        );
        while !cancel.is_cancelled() {
            let outcome = self.run_cycle(&cancel).await?;
            debug!(?outcome, "Cycle finished");
        }
        info!("Access session loop stopped");
        Ok(())
    }

    /// Run a single access cycle.
    ///
    /// # Errors
    /// Only an internal state machine violation is an error.
    pub async fn run_cycle(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, SessionError> {
        self.machine.transition_to(SessionState::AwaitingCard)?;
        self.feedback.notify(Notice::ScanPrompt).await;

        let polled = tokio::select! {
            _ = cancel.cancelled() => None,
            polled = self.store.transceiver_mut().wait_for_card() => Some(polled),
        };
        let uid = match polled {
            None => {
                self.machine.transition_to(SessionState::Idle)?;
                return Ok(CycleOutcome::Cancelled);
            }
            Some(Err(e)) => {
                error!(error = %e, "Card reader unavailable");
                self.machine.transition_to(SessionState::Idle)?;
                self.pause(self.settings.reader_retry_delay, cancel).await;
                return Ok(CycleOutcome::ReaderFault(e.to_string()));
            }
            Some(Ok(uid)) => uid,
        };

        self.machine.transition_to(SessionState::Authenticating)?;
        let pass = match self.read_pass(&uid).await {
            Ok(pass) => pass,
            Err(e) => {
                let (outcome, delay) = match &e {
                    PassError::Protocol(failure) if failure.is_reader_fault() => {
                        error!(uid = %uid, error = %e, "Card reader lost while reading pass");
                        (
                            CycleOutcome::ReaderFault(e.to_string()),
                            self.settings.reader_retry_delay,
                        )
                    }
                    _ if e.is_no_pass() => {
                        info!(uid = %uid, reason = %e, "Card carries no pass");
                        (CycleOutcome::NoPass, self.settings.post_verdict_delay)
                    }
                    _ => {
                        warn!(uid = %uid, error = %e, "Card pass unreadable");
                        (
                            CycleOutcome::CardUnreadable(e.to_string()),
                            self.settings.post_verdict_delay,
                        )
                    }
                };
                self.feedback.notify(Notice::TryAgain).await;
                self.machine.transition_to(SessionState::Idle)?;
                self.pause(delay, cancel).await;
                return Ok(outcome);
            }
        };

        self.feedback.notify(Notice::Loading).await;
        self.machine.transition_to(SessionState::AwaitingVerdict)?;
        let request = CheckRequest::new(&uid, &pass, self.settings.scanner_ip.as_str());
        let awaited = tokio::select! {
            _ = cancel.cancelled() => None,
            verdict = self.verdicts.request_and_wait(&request, self.settings.verdict_timeout) => Some(verdict),
        };

        let outcome = match awaited {
            None => {
                self.machine.transition_to(SessionState::Idle)?;
                return Ok(CycleOutcome::Cancelled);
            }
            Some(Ok(verdict)) => {
                self.machine.transition_to(SessionState::Actuating)?;
                self.act_on(&request, verdict).await
            }
            Some(Err(VerdictError::Timeout { timeout_ms })) => {
                self.machine.transition_to(SessionState::Actuating)?;
                info!(uid = %uid, timeout_ms, outcome = "timeout", "Treating missing verdict as denied");
                self.feedback.notify(Notice::NoAccess).await;
                CycleOutcome::TimedOut
            }
            Some(Err(VerdictError::Malformed(e))) => {
                self.machine.transition_to(SessionState::Actuating)?;
                self.feedback.notify(Notice::TryAgain).await;
                CycleOutcome::VerdictUnusable(e.to_string())
            }
            Some(Err(e)) => {
                warn!(uid = %uid, error = %e, "Check request failed");
                self.feedback.notify(Notice::TryAgain).await;
                self.machine.transition_to(SessionState::Idle)?;
                self.pause(self.settings.post_verdict_delay, cancel).await;
                return Ok(CycleOutcome::RequestFailed(e.to_string()));
            }
        };

        self.pause(self.settings.post_verdict_delay, cancel).await;
        self.machine.transition_to(SessionState::Idle)?;
        Ok(outcome)
    }

    async fn read_pass(&mut self, uid: &CardUid) -> Result<CardPass, PassError> {
        CardPassCodec::new(&mut self.store)
            .read_pass(uid, self.settings.pass_block, &self.settings.key_a)
            .await
    }

    async fn act_on(&mut self, request: &CheckRequest, verdict: ActionMessage) -> CycleOutcome {
        match verdict.action {
            Verdict::Granted => {
                let door_ip = verdict
                    .door_ip
                    .as_deref()
                    .unwrap_or(&self.settings.scanner_ip);
                info!(uid = %request.uid, door_ip, user = ?verdict.user, outcome = "granted", "Access granted");
                self.open_door(door_ip, request).await;
                self.feedback.notify(Notice::OpeningDoor).await;
                CycleOutcome::Granted
            }
            Verdict::CheckedOut => {
                info!(uid = %request.uid, user = ?verdict.user, outcome = "checked_out", "Checked out");
                self.feedback.notify(Notice::CheckingOut).await;
                CycleOutcome::CheckedOut
            }
            Verdict::Denied => {
                info!(uid = %request.uid, outcome = "denied", "Access denied");
                self.feedback.notify(Notice::NoAccess).await;
                CycleOutcome::Denied
            }
        }
    }

    async fn open_door(&self, door_ip: &str, request: &CheckRequest) {
        let trigger = LockOpen::new(door_ip).with_request_id(request.request_id);
        let published = match trigger.to_payload() {
            Ok(payload) => self.client.publish(&self.topics.lock_open(), payload).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = published {
            error!(door_ip, error = %e, "Lock release could not be published");
        }
    }

    async fn pause(&self, delay: Duration, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

impl<R, D, B, T> std::fmt::Debug for AccessSessionController<R, D, B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSessionController")
            .field("state", &self.machine.current_state())
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}
