//! Background task servicing the transport.
//!
//! Inbound verdicts are only observed while the pump runs, so it is spawned
//! next to the session loop and keeps ticking during every blocking wait the
//! loop performs.

use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::PubSubClient;
use crate::error::Result;
use crate::transport::PubSubTransport;

/// How the pump task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpTermination {
    /// Stopped through its cancellation token.
    Stopped,
    /// The task was aborted.
    Cancelled,
    /// The task panicked.
    Panic,
}

/// Handle to a running pump task.
#[derive(Debug)]
pub struct MessagePump {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MessagePump {
    /// Spawn the pump. It stops when `cancel` (or the returned handle) is
    /// cancelled and disconnects the transport on the way out.
    pub fn spawn<T: PubSubTransport>(
        client: PubSubClient<T>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(Self::run(client, interval, cancel.clone()));
        Self { cancel, task }
    }

    async fn run<T: PubSubTransport>(
        client: PubSubClient<T>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval_ms = interval.as_millis() as u64, "Message pump started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = client.pump_once().await {
                        warn!(error = %e, "Transport poll failed");
                    }
                }
            }
        }

        if let Err(e) = client.disconnect().await {
            warn!(error = %e, "Disconnect during shutdown failed");
        }
        info!("Message pump stopped");
    }

    /// Request the pump to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the pump and wait for it to finish.
    pub async fn shutdown(self) -> PumpTermination {
        self.cancel.cancel();
        let termination = Self::classify(self.task.await);
        if termination == PumpTermination::Panic {
            error!("Message pump panicked");
        }
        termination
    }

    fn classify(result: std::result::Result<(), JoinError>) -> PumpTermination {
        match result {
            Ok(()) => PumpTermination::Stopped,
            Err(e) if e.is_cancelled() => PumpTermination::Cancelled,
            Err(_) => PumpTermination::Panic,
        }
    }
}

/// Drain the transport until it reports nothing new.
///
/// Used by one-shot commands that publish and exit without a pump.
pub async fn drain<T: PubSubTransport>(client: &PubSubClient<T>) -> Result<usize> {
    let mut total = 0;
    loop {
        let drained = client.pump_once().await?;
        if drained == 0 {
            return Ok(total);
        }
        total += drained;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::LocalBroker;
    use crate::transport::{InboundMessage, QoS};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_pump_delivers_and_stops() {
        let broker = LocalBroker::new();
        let client = PubSubClient::new(broker.transport("scanner"));
        client.connect().await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        client
            .subscribe(
                "acme/feeds/#",
                QoS::AtMostOnce,
                Arc::new(move |_: &InboundMessage| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        let pump = MessagePump::spawn(
            client.clone(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        broker.inject("acme/feeds/scanner.action", Bytes::from_static(b"0"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(pump.shutdown().await, PumpTermination::Stopped);
        assert!(!client.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_survives_poll_errors() {
        let broker = LocalBroker::new();
        // Never connected: every poll fails.
        let client = PubSubClient::new(broker.transport("offline"));
        let pump = MessagePump::spawn(client, Duration::from_millis(10), CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pump.is_finished());
        assert_eq!(pump.shutdown().await, PumpTermination::Stopped);
    }

    #[tokio::test]
    async fn test_drain_counts_messages() {
        let broker = LocalBroker::new();
        let client = PubSubClient::new(broker.transport("c"));
        client.connect().await.unwrap();
        client
            .subscribe("t", QoS::AtMostOnce, Arc::new(|_: &InboundMessage| {}))
            .await
            .unwrap();
        broker.inject("t", Bytes::from_static(b"a"));
        broker.inject("t", Bytes::from_static(b"b"));

        assert_eq!(drain(&client).await.unwrap(), 2);
    }
}
