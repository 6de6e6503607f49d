//! Provisioning station: write passes onto cards and show what a card holds.
//!
//! Provisioning runs these steps in order and stops at the first failure:
//!
//! 1. optionally rotate the pass sector's trailer to the configured keys
//! 2. write the pass with key B
//! 3. read it back with key A and compare
//! 4. publish a registration on the `scanner.setcardpass` feed

use std::fmt;

use tapgate_core::{AccessBits, CardPass, CardUid, KeyMaterial, PassBlock, SectorTrailer};
use tapgate_hardware::{Buzzer, CardReader, DisplaySink};
use tapgate_network::{PubSubClient, PubSubTransport, TransportError};
use tapgate_protocol::{CardRegistration, Topics};
use tapgate_rfid::{BlockStore, CardPassCodec, CardTransceiver, ProtocolFailure, TrailerManager};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{InspectError, ProvisionError};
use crate::feedback::{Feedback, Notice};

/// What to write onto the next card.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub pass: CardPass,
    /// Owner reported in the registration.
    pub user: String,
    /// Current key B of the pass sector when its trailer should be rotated
    /// (the factory key for blank cards). `None` writes into a sector that
    /// already carries the configured keys.
    pub rotate_from: Option<KeyMaterial>,
}

impl ProvisionPlan {
    pub fn new(pass: CardPass, user: impl Into<String>) -> Self {
        Self {
            pass,
            user: user.into(),
            rotate_from: None,
        }
    }

    /// Rotate a factory-fresh trailer.
    pub fn rotating_factory_trailer(mut self) -> Self {
        self.rotate_from = Some(KeyMaterial::factory_default());
        self
    }

    pub fn rotating_from(mut self, old_key_b: KeyMaterial) -> Self {
        self.rotate_from = Some(old_key_b);
        self
    }
}

/// A successfully provisioned card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub uid: CardUid,
    pub pass: CardPass,
    pub trailer: Option<SectorTrailer>,
}

/// What card info reveals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    pub uid: CardUid,
    pub pass: CardPass,
}

impl fmt::Display for CardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.uid.to_comma_list(), self.pass)
    }
}

pub struct CardProvisioner<R, D, B, T> {
    store: BlockStore<R>,
    feedback: Feedback<D, B>,
    client: PubSubClient<T>,
    topics: Topics,
    pass_block: PassBlock,
    key_a: KeyMaterial,
    key_b: KeyMaterial,
    access_bits: AccessBits,
}

impl<R, D, B, T> CardProvisioner<R, D, B, T>
where
    R: CardReader,
    D: DisplaySink,
    B: Buzzer,
    T: PubSubTransport,
{
    /// # Errors
    /// `Error::MissingConfig` if no admin key B is configured.
    pub fn new(
        config: &Config,
        reader: R,
        feedback: Feedback<D, B>,
        client: PubSubClient<T>,
    ) -> tapgate_core::Result<Self> {
        Ok(Self {
            store: BlockStore::over(CardTransceiver::new(reader, config.card_poll_timeout)),
            feedback,
            client,
            topics: config.topics(),
            pass_block: config.pass_block,
            key_a: config.key_a,
            key_b: config.require_key_b()?,
            access_bits: config.access_bits,
        })
    }

    pub fn feedback(&self) -> &Feedback<D, B> {
        &self.feedback
    }

    /// Wait for a card and provision it according to `plan`.
    ///
    /// # Errors
    /// See [`ProvisionError`]. Failure feedback has been given when this
    /// returns an error.
    pub async fn provision(
        &mut self,
        plan: &ProvisionPlan,
        cancel: &CancellationToken,
    ) -> Result<ProvisionReport, ProvisionError> {
        self.feedback.notify(Notice::ScanPrompt).await;
        let result = match self.acquire(cancel).await {
            Ok(uid) => {
                self.feedback.notify(Notice::Loading).await;
                self.provision_card(&uid, plan).await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(report) => {
                info!(uid = %report.uid, block = self.pass_block.index(), "Card provisioned");
                self.feedback.notify(Notice::Provisioned).await;
            }
            Err(e) => {
                warn!(error = %e, "Provisioning failed");
                self.feedback.notify(Notice::TryAgain).await;
            }
        }
        result
    }

    async fn acquire(&mut self, cancel: &CancellationToken) -> Result<CardUid, ProvisionError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ProvisionError::NoCard),
            polled = self.store.transceiver_mut().wait_for_card() => {
                polled.map_err(|e| ProvisionError::Reader(ProtocolFailure::from(e)))
            }
        }
    }

    async fn provision_card(
        &mut self,
        uid: &CardUid,
        plan: &ProvisionPlan,
    ) -> Result<ProvisionReport, ProvisionError> {
        let trailer = match &plan.rotate_from {
            Some(old_key_b) => Some(
                TrailerManager::new(&mut self.store)
                    .write_trailer(
                        uid,
                        self.pass_block.sector(),
                        old_key_b,
                        &self.key_a,
                        &self.key_b,
                        &self.access_bits,
                    )
                    .await
                    .map_err(ProvisionError::Trailer)?,
            ),
            None => None,
        };

        let mut codec = CardPassCodec::new(&mut self.store);
        codec
            .write_pass(uid, self.pass_block, &self.key_b, &plan.pass)
            .await
            .map_err(ProvisionError::WritePass)?;
        let read_back = codec
            .read_pass(uid, self.pass_block, &self.key_a)
            .await
            .map_err(ProvisionError::ReadBack)?;
        if read_back != plan.pass {
            return Err(ProvisionError::Mismatch);
        }

        let registration = CardRegistration::new(uid, &plan.pass, plan.user.as_str());
        let payload = registration.to_payload().map_err(TransportError::from)?;
        self.client
            .publish(&self.topics.set_card_pass(), payload)
            .await?;

        Ok(ProvisionReport {
            uid: uid.clone(),
            pass: plan.pass.clone(),
            trailer,
        })
    }

    /// Wait for a card and show its uid and pass, read with the admin key B.
    ///
    /// # Errors
    /// See [`InspectError`].
    pub async fn inspect_card(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CardInfo, InspectError> {
        self.feedback.notify(Notice::ScanPrompt).await;
        let uid = tokio::select! {
            _ = cancel.cancelled() => return Err(InspectError::NoCard),
            polled = self.store.transceiver_mut().wait_for_card() => {
                polled.map_err(|e| InspectError::Reader(ProtocolFailure::from(e)))?
            }
        };

        let read = CardPassCodec::new(&mut self.store)
            .read_pass_with(&uid, self.pass_block, tapgate_core::KeySlot::B, &self.key_b)
            .await;
        match read {
            Ok(pass) => {
                let info = CardInfo { uid, pass };
                self.feedback
                    .show_text(&info.uid.to_comma_list(), info.pass.as_str())
                    .await;
                info!(uid = %info.uid, "Card info read");
                Ok(info)
            }
            Err(e) => {
                warn!(uid = %uid, error = %e, "Card info unavailable");
                self.feedback.notify(Notice::TryAgain).await;
                Err(e.into())
            }
        }
    }
}

impl<R, D, B, T> fmt::Debug for CardProvisioner<R, D, B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardProvisioner")
            .field("pass_block", &self.pass_block)
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}
