//! tapgate - NFC access endpoint emulator
//!
//! Runs one endpoint of a tapgate installation (scanner, provisioning
//! station, door) against mock hardware, an in-memory broker and a scripted
//! authorization service. Configuration comes from the environment or a
//! `.env` file.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tapgate_core::{CardPass, CardUid, codec};
use tapgate_hardware::mock::{MockCardReader, MockDoorSensor, MockLock, RecordingBuzzer, SimulatedCard};
use tapgate_protocol::LockOpen;
use tapgate_scanner::{
    AccessSessionController, AuthorityScript, CardProvisioner, Config, DoorLock, Feedback,
    ProvisionPlan,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod emulator;

use emulator::{ConsoleDisplay, Emulator};

/// tapgate - NFC access endpoint emulator
#[derive(Parser, Debug)]
#[command(name = "tapgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// UID of the simulated card, in hex
    #[arg(long, global = true, default_value = "04abcdef", value_parser = parse_uid)]
    uid: CardUid,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the access session loop
    Scan {
        /// Pass on the simulated card; no card is presented when absent
        #[arg(long, value_parser = parse_pass)]
        pass: Option<CardPass>,

        /// Passes the authority grants
        #[arg(long = "grant", value_parser = parse_pass)]
        grants: Vec<CardPass>,

        /// Passes the authority checks out
        #[arg(long = "check-out", value_parser = parse_pass)]
        check_outs: Vec<CardPass>,

        /// Door named in grants (defaults to this scanner)
        #[arg(long)]
        door_ip: Option<String>,

        /// Number of cycles to run (0 = until Ctrl-C)
        #[arg(short = 'n', long, default_value = "1")]
        cycles: u32,
    },

    /// Provision a simulated card
    Provision {
        /// Pass to write
        #[arg(long, value_parser = parse_pass)]
        pass: CardPass,

        /// User the card is registered to
        #[arg(long)]
        user: String,

        /// Rotate the pass sector's trailer away from factory keys first
        #[arg(long)]
        rotate: bool,
    },

    /// Show the uid and pass of a simulated card
    CardInfo {
        /// Pass already on the card
        #[arg(long, value_parser = parse_pass)]
        pass: CardPass,
    },

    /// Run the door lock endpoint
    Door {
        /// Publish one lock trigger for this door after start-up
        #[arg(long)]
        trigger: bool,

        /// Stop after this many seconds (0 = until Ctrl-C)
        #[arg(long, default_value = "0")]
        seconds: u64,
    },
}

fn parse_uid(text: &str) -> Result<CardUid, String> {
    codec::hex_to_bytes(text)
        .and_then(CardUid::new)
        .map_err(|e| e.to_string())
}

fn parse_pass(text: &str) -> Result<CardPass, String> {
    CardPass::new(text).map_err(|e| e.to_string())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration from the environment")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
        }
        on_signal.cancel();
    });

    match cli.command {
        Commands::Scan {
            pass,
            grants,
            check_outs,
            door_ip,
            cycles,
        } => {
            let mut script = AuthorityScript::new();
            for pass in grants {
                script = script.grant(pass.as_str());
            }
            for pass in check_outs {
                script = script.check_out(pass.as_str());
            }
            if let Some(door_ip) = door_ip {
                script = script.door_ip(door_ip);
            }
            scan(config, script, cli.uid, pass, cycles, cancel).await
        }
        Commands::Provision { pass, user, rotate } => {
            provision(config, cli.uid, pass, user, rotate, cancel).await
        }
        Commands::CardInfo { pass } => card_info(config, cli.uid, pass, cancel).await,
        Commands::Door { trigger, seconds } => door(config, trigger, seconds, cancel).await,
    }
}

async fn scan(
    config: Config,
    script: AuthorityScript,
    uid: CardUid,
    pass: Option<CardPass>,
    cycles: u32,
    cancel: CancellationToken,
) -> Result<()> {
    let mut emulator = Emulator::start(config, script, cancel.clone()).await?;
    let (reader, handle) = MockCardReader::new();
    if let Some(pass) = &pass {
        handle.present_card(emulator.provisioned_card(uid, pass));
    }

    let client = emulator.endpoint("scanner").await?;
    let feedback = Feedback::new(ConsoleDisplay::default(), RecordingBuzzer::new());
    let mut controller = AccessSessionController::attach(&emulator.config, reader, feedback, client)
        .await
        .context("attaching the scanner")?;

    let result = if cycles == 0 {
        controller.run(cancel.clone()).await
    } else {
        let mut result = Ok(());
        for cycle in 1..=cycles {
            if cancel.is_cancelled() {
                break;
            }
            match controller.run_cycle(&cancel).await {
                Ok(outcome) => info!(cycle, ?outcome, "Cycle finished"),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        result
    };

    emulator.shutdown().await;
    result.context("access session failed")
}

async fn provision(
    config: Config,
    uid: CardUid,
    pass: CardPass,
    user: String,
    rotate: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let mut emulator = Emulator::start(config, AuthorityScript::new(), cancel.clone()).await?;
    let (reader, handle) = MockCardReader::new();
    handle.present_card(SimulatedCard::blank(uid));

    let client = emulator.endpoint("provisioner").await?;
    let feedback = Feedback::new(ConsoleDisplay::default(), RecordingBuzzer::new());
    let mut provisioner = CardProvisioner::new(&emulator.config, reader, feedback, client)
        .context("provisioning needs an admin key")?;

    let mut plan = ProvisionPlan::new(pass, user);
    if rotate {
        plan = plan.rotating_factory_trailer();
    }
    let result = provisioner.provision(&plan, &cancel).await;

    // Give the authority a moment to take the registration.
    tokio::time::sleep(emulator.config.pump_interval * 4).await;
    emulator.shutdown().await;

    let report = result.context("provisioning failed")?;
    println!("{}\n{}", report.uid.to_comma_list(), report.pass);
    if report.trailer.is_some() {
        info!(uid = %report.uid, "Pass sector now uses the configured keys");
    }
    Ok(())
}

async fn card_info(
    config: Config,
    uid: CardUid,
    pass: CardPass,
    cancel: CancellationToken,
) -> Result<()> {
    if config.key_b.is_none() {
        bail!("card info needs CARD_KEY_B");
    }
    let mut emulator = Emulator::start(config, AuthorityScript::new(), cancel.clone()).await?;
    let (reader, handle) = MockCardReader::new();
    handle.present_card(emulator.provisioned_card(uid, &pass));

    let client = emulator.endpoint("provisioner").await?;
    let feedback = Feedback::new(ConsoleDisplay::default(), RecordingBuzzer::new());
    let mut provisioner = CardProvisioner::new(&emulator.config, reader, feedback, client)?;
    let result = provisioner.inspect_card(&cancel).await;
    emulator.shutdown().await;

    println!("{}", result.context("card info unavailable")?);
    Ok(())
}

async fn door(config: Config, trigger: bool, seconds: u64, cancel: CancellationToken) -> Result<()> {
    let mut emulator = Emulator::start(config, AuthorityScript::new(), cancel.clone()).await?;
    let lock = MockLock::new();
    let client = emulator.endpoint("door").await?;
    let mut door = DoorLock::attach(
        &emulator.config,
        lock.clone(),
        MockDoorSensor::new(),
        RecordingBuzzer::new(),
        client,
    )
    .await
    .context("attaching the door")?;

    if trigger {
        let payload = LockOpen::new(door.door_ip()).to_payload()?;
        emulator
            .broker
            .inject(&emulator.config.topics().lock_open(), payload);
    }

    let stopper = async {
        if seconds > 0 {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            cancel.cancel();
        }
    };
    tokio::join!(door.run(cancel.clone()), stopper);

    if lock.is_released() {
        warn!("Lock left released");
    }
    info!(transitions = lock.transitions().len(), "Door endpoint stopped");
    emulator.shutdown().await;
    Ok(())
}
