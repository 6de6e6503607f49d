//! Endpoint configuration loaded from environment variables.
//!
//! Keys are never logged: `KeyMaterial`'s `Debug` is redacted, so deriving
//! `Debug` here is safe.

use std::time::Duration;

use tapgate_core::constants::{
    DEFAULT_CARD_POLL_TIMEOUT_MS, DEFAULT_PASS_BLOCK, DEFAULT_POST_VERDICT_DELAY_MS,
    DEFAULT_PUMP_INTERVAL_MS, DEFAULT_VERDICT_TIMEOUT_MS, MAX_PUMP_INTERVAL_MS,
};
use tapgate_core::{AccessBits, Error, KeyMaterial, PassBlock, Result};
use tapgate_protocol::Topics;

pub const ENV_ACCOUNT: &str = "AIO_USER";
pub const ENV_KEY_A: &str = "CARD_KEY_A";
pub const ENV_KEY_B: &str = "CARD_KEY_B";
pub const ENV_PASS_BLOCK: &str = "CARD_PASS_BLOCK";
pub const ENV_ACCESS_BITS: &str = "CARD_BITS";
pub const ENV_SCANNER_IP: &str = "SCANNER_IP";
pub const ENV_VERDICT_TIMEOUT: &str = "VERDICT_TIMEOUT_SECS";
pub const ENV_PUMP_INTERVAL: &str = "PUMP_INTERVAL_MS";
pub const ENV_CARD_POLL_TIMEOUT: &str = "CARD_POLL_TIMEOUT_MS";
pub const ENV_POST_VERDICT_DELAY: &str = "POST_VERDICT_DELAY_MS";

const DEFAULT_SCANNER_IP: &str = "0.0.0.0";

#[derive(Debug, Clone)]
pub struct Config {
    /// Topic namespace (`<account>/feeds/...`).
    pub account: String,

    /// Key A, used for every pass read.
    pub key_a: KeyMaterial,

    /// Admin key B. Only provisioning and card info need it.
    pub key_b: Option<KeyMaterial>,

    pub pass_block: PassBlock,

    /// Access bits written into rotated trailers.
    pub access_bits: AccessBits,

    /// Identity sent with check requests and matched by the door endpoint.
    pub scanner_ip: String,

    pub verdict_timeout: Duration,
    pub pump_interval: Duration,
    pub card_poll_timeout: Duration,
    pub post_verdict_delay: Duration,
}

impl Config {
    /// Load from the process environment.
    ///
    /// # Errors
    /// `Error::MissingConfig` for an absent required key, `Error::Config` for
    /// an unparseable or out-of-range value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source.
    ///
    /// # Errors
    /// Same as [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| Error::MissingConfig(key.to_string()));

        let account = required(ENV_ACCOUNT)?.trim().to_string();
        let key_a = parse_key(ENV_KEY_A, &required(ENV_KEY_A)?)?;
        let key_b = get(ENV_KEY_B)
            .map(|value| parse_key(ENV_KEY_B, &value))
            .transpose()?;

        let pass_block = PassBlock::new(parse_number(
            ENV_PASS_BLOCK,
            get(ENV_PASS_BLOCK),
            DEFAULT_PASS_BLOCK,
        )?)
        .map_err(|e| Error::Config(format!("{ENV_PASS_BLOCK}: {e}")))?;

        let access_bits = match get(ENV_ACCESS_BITS) {
            Some(list) => AccessBits::from_decimal_list(&list)
                .map_err(|e| Error::Config(format!("{ENV_ACCESS_BITS}: {e}")))?,
            None => AccessBits::default(),
        };

        let pump_interval_ms = parse_number(
            ENV_PUMP_INTERVAL,
            get(ENV_PUMP_INTERVAL),
            DEFAULT_PUMP_INTERVAL_MS,
        )?;
        if pump_interval_ms == 0 || pump_interval_ms >= MAX_PUMP_INTERVAL_MS {
            return Err(Error::Config(format!(
                "{ENV_PUMP_INTERVAL} must be between 1 and {} ms, got {pump_interval_ms}",
                MAX_PUMP_INTERVAL_MS - 1
            )));
        }

        Ok(Self {
            account,
            key_a,
            key_b,
            pass_block,
            access_bits,
            scanner_ip: get(ENV_SCANNER_IP).unwrap_or_else(|| DEFAULT_SCANNER_IP.to_string()),
            verdict_timeout: Duration::from_secs(parse_number(
                ENV_VERDICT_TIMEOUT,
                get(ENV_VERDICT_TIMEOUT),
                DEFAULT_VERDICT_TIMEOUT_MS / 1000,
            )?),
            pump_interval: Duration::from_millis(pump_interval_ms),
            card_poll_timeout: Duration::from_millis(parse_number(
                ENV_CARD_POLL_TIMEOUT,
                get(ENV_CARD_POLL_TIMEOUT),
                DEFAULT_CARD_POLL_TIMEOUT_MS,
            )?),
            post_verdict_delay: Duration::from_millis(parse_number(
                ENV_POST_VERDICT_DELAY,
                get(ENV_POST_VERDICT_DELAY),
                DEFAULT_POST_VERDICT_DELAY_MS,
            )?),
        })
    }

    pub fn topics(&self) -> Topics {
        Topics::new(&self.account)
    }

    /// # Errors
    /// `Error::MissingConfig` when no admin key B is configured.
    pub fn require_key_b(&self) -> Result<KeyMaterial> {
        self.key_b
            .ok_or_else(|| Error::MissingConfig(ENV_KEY_B.to_string()))
    }
}

/// Keys are text (zero padded to six bytes) or six decimal bytes.
fn parse_key(name: &str, value: &str) -> Result<KeyMaterial> {
    let parsed = if value.contains(',') {
        KeyMaterial::from_decimal_list(value)
    } else {
        KeyMaterial::from_text(value)
    };
    parsed.map_err(|e| Error::Config(format!("{name}: {e}")))
}

fn parse_number<N>(name: &str, value: Option<String>, default: N) -> Result<N>
where
    N: std::str::FromStr,
    N::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}: {e}"))),
        None => Ok(default),
    }
}
