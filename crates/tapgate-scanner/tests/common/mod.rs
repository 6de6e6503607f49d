//! Shared fixtures for the endpoint integration tests.
//!
//! Every test runs one installation on an in-process broker: the endpoint
//! under test, its message pump, and a scripted authority on its own client.

#![allow(dead_code)]

use std::time::Duration;

use tapgate_core::{AccessBits, CardBlock, CardPass, CardUid, KeyMaterial, PassBlock};
use tapgate_hardware::mock::{
    MockCardReader, MockCardReaderHandle, RecordingBuzzer, SimulatedCard, VirtualDisplay,
};
use tapgate_network::{LocalBroker, LocalTransport, MessagePump, PubSubClient};
use tapgate_scanner::{AccessSessionController, AuthorityScript, Config, Feedback, ScriptedAuthority};
use tokio_util::sync::CancellationToken;

pub const ACCOUNT: &str = "acme";
pub const SCANNER_IP: &str = "10.0.0.9";
pub const KEY_A: &str = "DevKey";
pub const KEY_B: &str = "AdmKey";
pub const PASS_BLOCK: u8 = 16;

pub type Controller =
    AccessSessionController<MockCardReader, VirtualDisplay, RecordingBuzzer, LocalTransport>;

pub fn config() -> Config {
    config_with(&[])
}

/// Test configuration with short delays, plus `extra` overrides.
pub fn config_with(extra: &[(&str, &str)]) -> Config {
    let mut pairs: Vec<(String, String)> = [
        ("AIO_USER", ACCOUNT),
        ("CARD_KEY_A", KEY_A),
        ("CARD_KEY_B", KEY_B),
        ("SCANNER_IP", SCANNER_IP),
        ("VERDICT_TIMEOUT_SECS", "2"),
        ("CARD_POLL_TIMEOUT_MS", "50"),
        ("POST_VERDICT_DELAY_MS", "100"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (key, value) in extra {
        pairs.retain(|(k, _)| k != key);
        pairs.push((key.to_string(), value.to_string()));
    }
    Config::from_lookup(|key| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

pub fn uid() -> CardUid {
    CardUid::new(vec![0x04, 0xAB, 0xCD, 0xEF]).unwrap()
}

pub fn key_a() -> KeyMaterial {
    KeyMaterial::from_text(KEY_A).unwrap()
}

pub fn key_b() -> KeyMaterial {
    KeyMaterial::from_text(KEY_B).unwrap()
}

/// A card whose pass sector carries the configured keys and `block`.
pub fn card_with_block(block: CardBlock) -> SimulatedCard {
    let pass_block = PassBlock::new(PASS_BLOCK).unwrap();
    SimulatedCard::blank(uid())
        .with_trailer(pass_block.sector(), &key_a(), &AccessBits::default(), &key_b())
        .with_block(PASS_BLOCK, block)
}

pub fn provisioned_card(pass: &str) -> SimulatedCard {
    card_with_block(CardPass::new(pass).unwrap().to_block())
}

pub struct Installation {
    pub broker: LocalBroker,
    pub config: Config,
    pub cancel: CancellationToken,
    pub authority: ScriptedAuthority,
}

impl Installation {
    pub async fn start(config: Config, script: AuthorityScript) -> Self {
        let broker = LocalBroker::new();
        let cancel = CancellationToken::new();
        let client = PubSubClient::new(broker.transport("authority"));
        client.connect().await.unwrap();
        let authority = ScriptedAuthority::spawn(
            client,
            &config.topics(),
            script,
            Duration::from_millis(10),
            cancel.clone(),
        )
        .await
        .unwrap();
        Self {
            broker,
            config,
            cancel,
            authority,
        }
    }

    /// A connected client with a running pump.
    pub async fn endpoint_client(&self, name: &str) -> (PubSubClient<LocalTransport>, MessagePump) {
        let client = PubSubClient::new(self.broker.transport(name));
        client.connect().await.unwrap();
        let pump = MessagePump::spawn(client.clone(), self.config.pump_interval, self.cancel.clone());
        (client, pump)
    }

    pub fn published_on(&self, topic: &str) -> Vec<tapgate_network::InboundMessage> {
        self.broker.published_on(topic)
    }
}

pub struct Scanner {
    pub controller: Controller,
    pub reader: MockCardReaderHandle,
    pub display: VirtualDisplay,
    pub buzzer: RecordingBuzzer,
    pub pump: MessagePump,
}

pub async fn scanner(installation: &Installation) -> Scanner {
    let (reader, handle) = MockCardReader::new();
    let display = VirtualDisplay::default();
    let buzzer = RecordingBuzzer::new();
    let (client, pump) = installation.endpoint_client("scanner").await;
    let controller = AccessSessionController::attach(
        &installation.config,
        reader,
        Feedback::new(display.clone(), buzzer.clone()),
        client,
    )
    .await
    .unwrap();
    Scanner {
        controller,
        reader: handle,
        display,
        buzzer,
        pump,
    }
}

/// Whether `display` ever showed exactly these two lines.
pub fn showed(display: &VirtualDisplay, line1: &str, line2: &str) -> bool {
    display
        .history()
        .iter()
        .any(|screen| screen.len() == 2 && screen[0] == line1 && screen[1] == line2)
}
