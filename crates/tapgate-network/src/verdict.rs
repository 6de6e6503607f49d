//! Single-outstanding-request correlation between a check request and its
//! verdict.
//!
//! ```text
//!   request_and_wait ──publish──► checkcard feed
//!         │ (AwaitingVerdict)
//!         ▼
//!   oneshot receiver ◄── VerdictHandler ◄── pump ◄── action feed
//! ```
//!
//! The pending slot is the only shared state. `request_and_wait` fills it,
//! and either the handler (on a matching verdict) or the waiter itself
//! (on timeout or drop) empties it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tapgate_protocol::{ActionMessage, CheckRequest, ProtocolError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::PubSubClient;
use crate::error::{TransportError, VerdictError};
use crate::router::MessageHandler;
use crate::transport::{InboundMessage, PubSubTransport, QoS};

/// Observable correlation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    AwaitingVerdict,
}

type Delivery = Result<ActionMessage, ProtocolError>;

#[derive(Debug)]
struct Pending {
    request_id: Uuid,
    tx: oneshot::Sender<Delivery>,
}

type Slot = Arc<Mutex<Option<Pending>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Pending>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes check requests and waits for the matching verdict.
pub struct VerdictChannel<T> {
    client: PubSubClient<T>,
    request_topic: String,
    pending: Slot,
}

impl<T: PubSubTransport> VerdictChannel<T> {
    /// Subscribe to `verdict_topic` and return a channel that publishes its
    /// requests on `request_topic`.
    pub async fn attach(
        client: PubSubClient<T>,
        request_topic: impl Into<String>,
        verdict_topic: &str,
    ) -> Result<Self, TransportError> {
        let pending: Slot = Arc::new(Mutex::new(None));
        let handler = VerdictHandler {
            pending: Arc::clone(&pending),
        };
        client
            .subscribe(verdict_topic, QoS::AtLeastOnce, Arc::new(handler))
            .await?;

        Ok(Self {
            client,
            request_topic: request_topic.into(),
            pending,
        })
    }

    pub fn state(&self) -> ChannelState {
        if lock(&self.pending).is_some() {
            ChannelState::AwaitingVerdict
        } else {
            ChannelState::Idle
        }
    }

    /// Publish `request` and wait up to `timeout` for its verdict.
    ///
    /// A timeout only abandons the local wait; the published request stays
    /// published.
    ///
    /// # Errors
    ///
    /// - `RequestOutstanding` if another call is still waiting
    /// - `Transport` if the request could not be published
    /// - `Timeout` if no matching verdict arrived in time
    /// - `Malformed` if the verdict feed carried something unparseable
    pub async fn request_and_wait(
        &self,
        request: &CheckRequest,
        timeout: Duration,
    ) -> Result<ActionMessage, VerdictError> {
        let rx = {
            let mut slot = lock(&self.pending);
            if slot.is_some() {
                return Err(VerdictError::RequestOutstanding);
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(Pending {
                request_id: request.request_id,
                tx,
            });
            rx
        };
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id: request.request_id,
        };

        let payload = request.to_payload().map_err(TransportError::from)?;
        self.client.publish(&self.request_topic, payload).await?;
        debug!(request_id = %request.request_id, uid = %request.uid, "Check request published");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(verdict))) => {
                info!(
                    request_id = %request.request_id,
                    verdict = %verdict.action,
                    "Verdict received"
                );
                Ok(verdict)
            }
            Ok(Ok(Err(e))) => {
                warn!(request_id = %request.request_id, error = %e, outcome = "malformed", "Unusable verdict");
                Err(VerdictError::Malformed(e))
            }
            Ok(Err(_)) => Err(VerdictError::Closed),
            Err(_) => {
                warn!(
                    request_id = %request.request_id,
                    timeout_ms = timeout.as_millis() as u64,
                    outcome = "timeout",
                    "No verdict before timeout"
                );
                Err(VerdictError::timeout(timeout))
            }
        }
    }
}

impl<T> std::fmt::Debug for VerdictChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerdictChannel")
            .field("request_topic", &self.request_topic)
            .field("pending", &lock(&self.pending).as_ref().map(|p| p.request_id))
            .finish()
    }
}

/// Clears the slot when the waiter finishes, times out, or is dropped.
struct PendingGuard<'a> {
    pending: &'a Slot,
    request_id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.pending);
        if slot.as_ref().is_some_and(|p| p.request_id == self.request_id) {
            *slot = None;
        }
    }
}

/// Arrival side, run by the pump for every message on the verdict feed.
struct VerdictHandler {
    pending: Slot,
}

impl MessageHandler for VerdictHandler {
    fn on_message(&self, message: &InboundMessage) {
        let parsed = ActionMessage::parse(&message.payload);
        let mut slot = lock(&self.pending);

        let Some(outstanding) = slot.as_ref() else {
            warn!(topic = %message.topic, "Verdict arrived with no request outstanding, discarded");
            return;
        };

        // Read from the raw payload so a broken reply to another request
        // is discarded too.
        if let Some(echoed) = ActionMessage::echoed_request_id(&message.payload)
            && echoed != outstanding.request_id
        {
            warn!(
                expected = %outstanding.request_id,
                received = %echoed,
                "Stale verdict discarded"
            );
            return;
        }

        if let Some(pending) = slot.take() {
            // Receiver gone means the waiter already gave up.
            let _ = pending.tx.send(parsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::LocalBroker;
    use crate::pump::MessagePump;
    use bytes::Bytes;
    use tapgate_core::{CardPass, CardUid};
    use tapgate_protocol::Verdict;
    use tokio_util::sync::CancellationToken;

    const CHECK: &str = "acme/feeds/scanner.checkcard";
    const ACTION: &str = "acme/feeds/scanner.action";

    async fn setup() -> (LocalBroker, Arc<VerdictChannel<crate::LocalTransport>>, MessagePump) {
        let broker = LocalBroker::new();
        let client = PubSubClient::new(broker.transport("scanner"));
        client.connect().await.unwrap();
        let channel = VerdictChannel::attach(client.clone(), CHECK, ACTION)
            .await
            .unwrap();
        let pump = MessagePump::spawn(client, Duration::from_millis(10), CancellationToken::new());
        (broker, Arc::new(channel), pump)
    }

    fn request() -> CheckRequest {
        CheckRequest::new(
            &CardUid::new(vec![1, 2, 3, 4]).unwrap(),
            &CardPass::new("secret").unwrap(),
            "10.0.0.9",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_verdict_delivered() {
        let (broker, channel, pump) = setup().await;
        let request = request();
        let id = request.request_id;

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request_and_wait(&request, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(channel.state(), ChannelState::AwaitingVerdict);
        assert_eq!(broker.published_on(CHECK).len(), 1);

        let verdict = ActionMessage::new(Verdict::Granted).with_request_id(id);
        broker.inject(ACTION, verdict.to_payload().unwrap());

        let received = waiter.await.unwrap().unwrap();
        assert_eq!(received.action, Verdict::Granted);
        assert_eq!(channel.state(), ChannelState::Idle);
        pump.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_rejected_while_waiting() {
        let (_broker, channel, pump) = setup().await;

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request_and_wait(&request(), Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = channel
            .request_and_wait(&request(), Duration::from_secs(5))
            .await;
        assert_eq!(second, Err(VerdictError::RequestOutstanding));

        assert!(waiter.await.unwrap().unwrap_err().is_timeout());
        pump.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resets_to_idle() {
        let (broker, channel, pump) = setup().await;

        let result = channel
            .request_and_wait(&request(), Duration::from_secs(5))
            .await;
        assert_eq!(result, Err(VerdictError::Timeout { timeout_ms: 5000 }));
        assert_eq!(channel.state(), ChannelState::Idle);

        // The next request is accepted immediately.
        let next = request();
        let id = next.request_id;
        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request_and_wait(&next, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.inject(
            ACTION,
            ActionMessage::new(Verdict::Denied)
                .with_request_id(id)
                .to_payload()
                .unwrap(),
        );
        assert_eq!(waiter.await.unwrap().unwrap().action, Verdict::Denied);
        pump.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_verdict_discarded() {
        let (broker, channel, pump) = setup().await;
        let request = request();
        let id = request.request_id;

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request_and_wait(&request, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stale = ActionMessage::new(Verdict::Granted).with_request_id(Uuid::new_v4());
        broker.inject(ACTION, stale.to_payload().unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.state(), ChannelState::AwaitingVerdict);

        let fresh = ActionMessage::new(Verdict::CheckedOut).with_request_id(id);
        broker.inject(ACTION, fresh.to_payload().unwrap());
        assert_eq!(waiter.await.unwrap().unwrap().action, Verdict::CheckedOut);
        pump.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_verdict_for_other_request_discarded() {
        let (broker, channel, pump) = setup().await;
        let request = request();
        let id = request.request_id;

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request_and_wait(&request, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let foreign = format!(r#"{{"action":7,"request_id":"{}"}}"#, Uuid::new_v4());
        broker.inject(ACTION, Bytes::from(foreign));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.state(), ChannelState::AwaitingVerdict);

        let own = ActionMessage::new(Verdict::Granted).with_request_id(id);
        broker.inject(ACTION, own.to_payload().unwrap());
        assert_eq!(waiter.await.unwrap().unwrap().action, Verdict::Granted);
        pump.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_verdict_for_own_request_reported() {
        let (broker, channel, pump) = setup().await;
        let request = request();
        let id = request.request_id;

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request_and_wait(&request, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.inject(ACTION, Bytes::from(format!(r#"{{"action":7,"request_id":"{id}"}}"#)));

        assert!(matches!(
            waiter.await.unwrap(),
            Err(VerdictError::Malformed(ProtocolError::UnknownAction(7)))
        ));
        pump.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_verdict_without_id_matches_outstanding() {
        let (broker, channel, pump) = setup().await;

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request_and_wait(&request(), Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.inject(ACTION, Bytes::from_static(b"1"));

        assert_eq!(waiter.await.unwrap().unwrap().action, Verdict::Granted);
        pump.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_verdict_discarded() {
        let (broker, channel, pump) = setup().await;

        broker.inject(ACTION, Bytes::from_static(b"1"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.state(), ChannelState::Idle);

        // The discarded verdict does not satisfy a later request.
        let result = channel
            .request_and_wait(&request(), Duration::from_millis(500))
            .await;
        assert!(result.unwrap_err().is_timeout());
        pump.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_verdict_reported() {
        let (broker, channel, pump) = setup().await;

        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.request_and_wait(&request(), Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.inject(ACTION, Bytes::from_static(b"7"));

        assert!(matches!(
            waiter.await.unwrap(),
            Err(VerdictError::Malformed(ProtocolError::UnknownAction(7)))
        ));
        assert_eq!(channel.state(), ChannelState::Idle);
        pump.shutdown().await;
    }

    #[tokio::test]
    async fn test_publish_failure_clears_pending() {
        let broker = LocalBroker::new();
        let client = PubSubClient::new(broker.transport("scanner"));
        client.connect().await.unwrap();
        let channel = VerdictChannel::attach(client.clone(), CHECK, ACTION)
            .await
            .unwrap();
        client.disconnect().await.unwrap();

        let result = channel
            .request_and_wait(&request(), Duration::from_secs(1))
            .await;
        assert_eq!(
            result,
            Err(VerdictError::Transport(TransportError::NotConnected))
        );
        assert_eq!(channel.state(), ChannelState::Idle);
    }
}
