//! Door-lock endpoint.
//!
//! Listens on the `lock.open` feed and releases the lock when a trigger names
//! this door. The lock stays released while the door tone sounds, then
//! engages again. Changes of the door contact are reported on `lock.status`.

use std::time::Duration;

use tapgate_hardware::{Buzzer, DoorSensor, LockActuator, Tone};
use tapgate_network::{InboundMessage, MessageHandler, PubSubClient, PubSubTransport, QoS};
use tapgate_protocol::{DoorState, DoorStatus, LockOpen, Topics};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::SessionError;

/// Door contact polling interval.
pub const DEFAULT_SENSOR_POLL_MS: u64 = 200;

pub struct DoorLock<L, S, B, T> {
    lock: L,
    sensor: S,
    buzzer: B,
    client: PubSubClient<T>,
    topics: Topics,
    door_ip: String,
    sensor_interval: Duration,
    triggers: mpsc::UnboundedReceiver<LockOpen>,
    last_open: Option<bool>,
}

struct TriggerForwarder {
    tx: mpsc::UnboundedSender<LockOpen>,
}

impl MessageHandler for TriggerForwarder {
    fn on_message(&self, message: &InboundMessage) {
        match LockOpen::parse(&message.payload) {
            Ok(trigger) => {
                // A closed receiver means the endpoint is shutting down.
                let _ = self.tx.send(trigger);
            }
            Err(e) => warn!(topic = %message.topic, error = %e, "Ignoring malformed lock trigger"),
        }
    }
}

impl<L, S, B, T> DoorLock<L, S, B, T>
where
    L: LockActuator,
    S: DoorSensor,
    B: Buzzer,
    T: PubSubTransport,
{
    /// Subscribe to `lock.open` and build the endpoint. The door answers to
    /// the configured scanner ip.
    ///
    /// # Errors
    /// Returns the transport error if the subscription fails.
    pub async fn attach(
        config: &Config,
        lock: L,
        sensor: S,
        buzzer: B,
        client: PubSubClient<T>,
    ) -> Result<Self, SessionError> {
        let topics = config.topics();
        let (tx, triggers) = mpsc::unbounded_channel();
        client
            .subscribe(
                &topics.lock_open(),
                QoS::AtLeastOnce,
                std::sync::Arc::new(TriggerForwarder { tx }),
            )
            .await?;

        Ok(Self {
            lock,
            sensor,
            buzzer,
            client,
            topics,
            door_ip: config.scanner_ip.clone(),
            sensor_interval: Duration::from_millis(DEFAULT_SENSOR_POLL_MS),
            triggers,
            last_open: None,
        })
    }

    pub fn with_sensor_interval(mut self, interval: Duration) -> Self {
        self.sensor_interval = interval;
        self
    }

    pub fn door_ip(&self) -> &str {
        &self.door_ip
    }

    /// Serve triggers and watch the door contact until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(door_ip = %self.door_ip, "Door endpoint started");
        let mut ticker = tokio::time::interval(self.sensor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                trigger = self.triggers.recv() => match trigger {
                    Some(trigger) => self.handle_trigger(trigger).await,
                    None => break,
                },
                _ = ticker.tick() => self.check_contact().await,
            }
        }

        if let Err(e) = self.lock.set_released(false).await {
            error!(error = %e, "Could not engage lock on shutdown");
        }
        info!(door_ip = %self.door_ip, "Door endpoint stopped");
    }

    async fn handle_trigger(&mut self, trigger: LockOpen) {
        if !trigger.is_for(&self.door_ip) {
            debug!(target_door = %trigger.door_ip, "Trigger for another door");
            return;
        }
        info!(door_ip = %self.door_ip, request_id = ?trigger.request_id, "Releasing lock");
        self.open_cycle().await;
    }

    /// Release, hold for the door tone, engage.
    pub async fn open_cycle(&mut self) {
        if let Err(e) = self.lock.set_released(true).await {
            error!(error = %e, "Lock release failed");
            return;
        }
        if let Err(e) = self.buzzer.play(Tone::DoorOpen).await {
            warn!(error = %e, "Door tone failed");
            tokio::time::sleep(Tone::DoorOpen.duration()).await;
        }
        if let Err(e) = self.lock.set_released(false).await {
            error!(error = %e, "Lock engage failed");
        }
    }

    async fn check_contact(&mut self) {
        let open = match self.sensor.is_open().await {
            Ok(open) => open,
            Err(e) => {
                warn!(error = %e, "Door contact unreadable");
                return;
            }
        };
        let previous = self.last_open.replace(open);
        if previous.is_none() || previous == Some(open) {
            return;
        }

        let status = DoorStatus::new(self.door_ip.clone(), DoorState::from(open));
        info!(door_ip = %self.door_ip, status = ?status.status, "Door contact changed");
        let published = match status.to_payload() {
            Ok(payload) => self.client.publish(&self.topics.lock_status(), payload).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = published {
            warn!(error = %e, "Door status could not be published");
        }
    }
}

impl<L, S, B, T> std::fmt::Debug for DoorLock<L, S, B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoorLock")
            .field("door_ip", &self.door_ip)
            .field("last_open", &self.last_open)
            .finish_non_exhaustive()
    }
}
