//! Scripted stand-in for the remote authorization service.
//!
//! Answers check requests from a fixed table of passes and grants every card
//! registered through the `scanner.setcardpass` feed. Used by the emulator
//! binary and by end-to-end tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tapgate_network::{
    HISTORY_LIMIT, InboundMessage, MessageHandler, PubSubClient, PubSubTransport, QoS,
    TransportError,
};
use tapgate_protocol::{ActionMessage, CardRegistration, CheckRequest, Topics, UserRef, Verdict};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How to answer one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Verdict(Verdict),
    /// Never answer, so the scanner times out.
    Silent,
}

/// Answer table.
#[derive(Debug, Clone)]
pub struct AuthorityScript {
    replies: HashMap<String, Reply>,
    fallback: Reply,
    door_ip: Option<String>,
    echo_request_id: bool,
}

impl Default for AuthorityScript {
    fn default() -> Self {
        Self {
            replies: HashMap::new(),
            fallback: Reply::Verdict(Verdict::Denied),
            door_ip: None,
            echo_request_id: true,
        }
    }
}

impl AuthorityScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, pass: impl Into<String>, reply: Reply) -> Self {
        self.replies.insert(pass.into(), reply);
        self
    }

    pub fn grant(self, pass: impl Into<String>) -> Self {
        self.reply(pass, Reply::Verdict(Verdict::Granted))
    }

    pub fn check_out(self, pass: impl Into<String>) -> Self {
        self.reply(pass, Reply::Verdict(Verdict::CheckedOut))
    }

    /// Reply used for unknown passes (default: denied).
    pub fn otherwise(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    /// Door named in grants; the scanner opens its own door when unset.
    pub fn door_ip(mut self, door_ip: impl Into<String>) -> Self {
        self.door_ip = Some(door_ip.into());
        self
    }

    /// Answer without echoing the request id, as older services do.
    pub fn without_request_ids(mut self) -> Self {
        self.echo_request_id = false;
        self
    }

    fn answer(&self, request: &CheckRequest) -> Option<ActionMessage> {
        let reply = self.replies.get(&request.pass).unwrap_or(&self.fallback);
        let Reply::Verdict(verdict) = reply else {
            return None;
        };

        let mut message = ActionMessage::new(*verdict);
        if self.echo_request_id {
            message = message.with_request_id(request.request_id);
        }
        if *verdict == Verdict::Granted
            && let Some(door_ip) = &self.door_ip
        {
            message = message.with_door_ip(door_ip.clone());
        }
        if *verdict != Verdict::Denied {
            message = message.with_user(UserRef::Name(format!("holder-of-{}", request.uid)));
        }
        Some(message)
    }
}

#[derive(Debug)]
enum Event {
    Check(CheckRequest),
    Registration(CardRegistration),
}

#[derive(Debug, Default)]
struct Ledger {
    inbox: VecDeque<Event>,
    requests: VecDeque<CheckRequest>,
    registrations: VecDeque<CardRegistration>,
}

/// Append to a ledger log, dropping the oldest entry past [`HISTORY_LIMIT`].
fn remember<E>(log: &mut VecDeque<E>, entry: E) {
    if log.len() == HISTORY_LIMIT {
        log.pop_front();
    }
    log.push_back(entry);
}

type SharedLedger = Arc<Mutex<Ledger>>;

fn lock(ledger: &SharedLedger) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inbox {
    ledger: SharedLedger,
    registrations_topic: String,
}

impl MessageHandler for Inbox {
    fn on_message(&self, message: &InboundMessage) {
        let event = if message.topic == self.registrations_topic {
            CardRegistration::parse(&message.payload).map(Event::Registration)
        } else {
            CheckRequest::parse(&message.payload).map(Event::Check)
        };
        match event {
            Ok(event) => lock(&self.ledger).inbox.push_back(event),
            Err(e) => warn!(topic = %message.topic, error = %e, "Authority ignored payload"),
        }
    }
}

/// Running authority task.
#[derive(Debug)]
pub struct ScriptedAuthority {
    ledger: SharedLedger,
    task: JoinHandle<()>,
}

impl ScriptedAuthority {
    /// Subscribe on `client` (already connected) and answer until `cancel`
    /// fires. The authority polls its own transport every `interval`.
    ///
    /// # Errors
    /// Returns the transport error if a subscription fails.
    pub async fn spawn<T: PubSubTransport>(
        client: PubSubClient<T>,
        topics: &Topics,
        script: AuthorityScript,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, TransportError> {
        let ledger = SharedLedger::default();
        let inbox = Arc::new(Inbox {
            ledger: Arc::clone(&ledger),
            registrations_topic: topics.set_card_pass(),
        });
        client
            .subscribe(&topics.check_card(), QoS::AtLeastOnce, inbox.clone())
            .await?;
        client
            .subscribe(&topics.set_card_pass(), QoS::AtLeastOnce, inbox)
            .await?;

        let task = tokio::spawn(Self::serve(
            client,
            topics.action(),
            script,
            Arc::clone(&ledger),
            interval,
            cancel,
        ));
        Ok(Self { ledger, task })
    }

    async fn serve<T: PubSubTransport>(
        client: PubSubClient<T>,
        action_topic: String,
        mut script: AuthorityScript,
        ledger: SharedLedger,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = client.pump_once().await {
                warn!(error = %e, "Authority poll failed");
                continue;
            }

            let events: Vec<Event> = lock(&ledger).inbox.drain(..).collect();
            for event in events {
                match event {
                    Event::Registration(registration) => {
                        info!(uid = %registration.uid, user = %registration.user, "Card registered");
                        script = script.grant(registration.pass.clone());
                        remember(&mut lock(&ledger).registrations, registration);
                    }
                    Event::Check(request) => {
                        let answer = script.answer(&request);
                        remember(&mut lock(&ledger).requests, request);
                        let Some(answer) = answer else {
                            debug!("Authority staying silent");
                            continue;
                        };
                        match answer.to_payload() {
                            Ok(payload) => {
                                if let Err(e) = client.publish(&action_topic, payload).await {
                                    warn!(error = %e, "Authority could not publish verdict");
                                }
                            }
                            Err(e) => warn!(error = %e, "Authority could not encode verdict"),
                        }
                    }
                }
            }
        }
        if let Err(e) = client.disconnect().await {
            warn!(error = %e, "Authority disconnect failed");
        }
    }

    /// The most recent check requests, oldest first.
    pub fn requests(&self) -> Vec<CheckRequest> {
        lock(&self.ledger).requests.iter().cloned().collect()
    }

    /// The most recent registrations, oldest first.
    pub fn registrations(&self) -> Vec<CardRegistration> {
        lock(&self.ledger).registrations.iter().cloned().collect()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Authority task ended abnormally");
        }
    }
}
