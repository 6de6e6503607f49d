//! One tapgate installation in a single process: an in-memory broker, a
//! scripted authority on its own client, and mock hardware for whichever
//! endpoint the subcommand runs.

use std::time::Duration;

use anyhow::{Context, Result};
use tapgate_core::{CardPass, CardUid, KeyMaterial};
use tapgate_hardware::mock::{SimulatedCard, VirtualDisplay};
use tapgate_hardware::DisplaySink;
use tapgate_network::{LocalBroker, LocalTransport, MessagePump, PubSubClient, PumpTermination};
use tapgate_scanner::{AuthorityScript, Config, ScriptedAuthority};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const AUTHORITY_POLL: Duration = Duration::from_millis(20);

pub struct Emulator {
    pub broker: LocalBroker,
    pub config: Config,
    pub cancel: CancellationToken,
    authority: ScriptedAuthority,
    pumps: Vec<(String, MessagePump)>,
}

impl Emulator {
    pub async fn start(
        config: Config,
        script: AuthorityScript,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let broker = LocalBroker::new();
        let client = PubSubClient::new(broker.transport("authority"));
        client
            .connect()
            .await
            .context("connecting the authority client")?;
        let authority = ScriptedAuthority::spawn(
            client,
            &config.topics(),
            script,
            AUTHORITY_POLL,
            cancel.clone(),
        )
        .await
        .context("subscribing the authority")?;

        info!(account = %config.account, scanner_ip = %config.scanner_ip, "Emulated installation up");
        Ok(Self {
            broker,
            config,
            cancel,
            authority,
            pumps: Vec::new(),
        })
    }

    /// Connected client for an endpoint, with its pump running.
    pub async fn endpoint(&mut self, name: &str) -> Result<PubSubClient<LocalTransport>> {
        let client = PubSubClient::new(self.broker.transport(name));
        client
            .connect()
            .await
            .with_context(|| format!("connecting the {name} client"))?;
        let pump = MessagePump::spawn(client.clone(), self.config.pump_interval, self.cancel.clone());
        self.pumps.push((name.to_string(), pump));
        Ok(client)
    }

    /// A card carrying the configured keys with `pass` in the pass block.
    pub fn provisioned_card(&self, uid: CardUid, pass: &CardPass) -> SimulatedCard {
        let key_b = self
            .config
            .key_b
            .unwrap_or_else(KeyMaterial::factory_default);
        SimulatedCard::blank(uid)
            .with_trailer(
                self.config.pass_block.sector(),
                &self.config.key_a,
                &self.config.access_bits,
                &key_b,
            )
            .with_block(self.config.pass_block.index(), pass.to_block())
    }

    /// Stop every task and disconnect every client.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, pump) in self.pumps {
            match pump.shutdown().await {
                PumpTermination::Panic => warn!(endpoint = %name, "Pump panicked"),
                termination => info!(endpoint = %name, ?termination, "Pump stopped"),
            }
        }
        let requests = self.authority.requests().len();
        let registrations = self.authority.registrations().len();
        self.authority.join().await;
        info!(requests, registrations, "Emulated installation down");
    }
}

/// LCD that also writes every screen to the log.
#[derive(Debug, Clone, Default)]
pub struct ConsoleDisplay {
    inner: VirtualDisplay,
}

impl DisplaySink for ConsoleDisplay {
    async fn show(&mut self, line1: &str, line2: &str) -> tapgate_hardware::Result<()> {
        self.inner.show(line1, line2).await?;
        info!(target: "lcd", "[{line1:<16}] [{line2:<16}]");
        Ok(())
    }

    async fn clear(&mut self) -> tapgate_hardware::Result<()> {
        self.inner.clear().await
    }
}
