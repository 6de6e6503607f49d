//! Sector authentication.
//!
//! The reader forgets an authentication as soon as it runs a block command
//! or selects a target, so authentication is never cached here: every call
//! re-selects the card and authenticates from scratch.

use tapgate_core::{CardUid, KeyMaterial, KeySlot};
use tapgate_hardware::CardReader;
use tracing::{debug, error};

use crate::error::ProtocolFailure;
use crate::transceiver::CardTransceiver;

/// Result of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The sector is open for exactly one block command.
    Authenticated,
    /// The card refused the key.
    Rejected,
    /// No card answered the re-selection.
    CardAbsent,
    /// A different card is now in the field.
    CardChanged,
    /// The reader could not be reached.
    ReaderFault(String),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Convert a non-authenticated outcome into the matching failure.
    pub fn into_result(self, block: u8, slot: KeySlot) -> Result<(), ProtocolFailure> {
        match self {
            Self::Authenticated => Ok(()),
            Self::Rejected => Err(ProtocolFailure::AuthenticationRejected { block, slot }),
            Self::CardAbsent => Err(ProtocolFailure::CardAbsent),
            Self::CardChanged => Err(ProtocolFailure::CardChanged),
            Self::ReaderFault(message) => Err(ProtocolFailure::ReaderUnavailable { message }),
        }
    }
}

/// Performs the select-then-authenticate handshake for one block.
#[derive(Debug)]
pub struct SectorAuthenticator<R> {
    transceiver: CardTransceiver<R>,
}

impl<R: CardReader> SectorAuthenticator<R> {
    pub fn new(transceiver: CardTransceiver<R>) -> Self {
        Self { transceiver }
    }

    /// Re-select `uid` and authenticate `block` with `key` in `slot`.
    ///
    /// Never retries; waiting for a card to come back is the session loop's
    /// job.
    pub async fn authenticate(
        &mut self,
        uid: &CardUid,
        block: u8,
        key: &KeyMaterial,
        slot: KeySlot,
    ) -> AuthOutcome {
        let selected = match self.transceiver.poll().await {
            Ok(selected) => selected,
            Err(e) => {
                error!(block, error = %e, "Reader fault during card re-selection");
                return AuthOutcome::ReaderFault(e.to_string());
            }
        };

        match selected {
            None => {
                debug!(uid = %uid, block, "Card left the field before authentication");
                return AuthOutcome::CardAbsent;
            }
            Some(current) if current != *uid => {
                debug!(expected = %uid, found = %current, "Different card in field");
                return AuthOutcome::CardChanged;
            }
            Some(_) => {}
        }

        match self
            .transceiver
            .reader_mut()
            .authenticate_block(uid, block, slot, key)
            .await
        {
            Ok(true) => {
                debug!(block, slot = %slot, "Sector authenticated");
                AuthOutcome::Authenticated
            }
            Ok(false) => {
                debug!(block, slot = %slot, "Authentication rejected");
                AuthOutcome::Rejected
            }
            Err(e) => {
                error!(block, slot = %slot, error = %e, "Reader fault during authentication");
                AuthOutcome::ReaderFault(e.to_string())
            }
        }
    }

    pub fn transceiver(&self) -> &CardTransceiver<R> {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut CardTransceiver<R> {
        &mut self.transceiver
    }

    pub fn into_inner(self) -> CardTransceiver<R> {
        self.transceiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tapgate_core::{AccessBits, Sector};
    use tapgate_hardware::mock::{MockCardReader, MockCardReaderHandle, SimulatedCard};

    fn uid() -> CardUid {
        CardUid::new(vec![1, 2, 3, 4]).unwrap()
    }

    fn key_a() -> KeyMaterial {
        KeyMaterial::from_text("ReadKy").unwrap()
    }

    fn setup() -> (SectorAuthenticator<MockCardReader>, MockCardReaderHandle) {
        let (reader, handle) = MockCardReader::new();
        handle.present_card(SimulatedCard::blank(uid()).with_trailer(
            Sector::new(5).unwrap(),
            &key_a(),
            &AccessBits::default(),
            &KeyMaterial::from_text("WriteK").unwrap(),
        ));
        let transceiver = CardTransceiver::new(reader, Duration::from_millis(10));
        (SectorAuthenticator::new(transceiver), handle)
    }

    #[tokio::test]
    async fn test_authenticate_reselects_each_time() {
        let (mut auth, handle) = setup();

        for _ in 0..3 {
            let outcome = auth.authenticate(&uid(), 16, &key_a(), KeySlot::A).await;
            assert!(outcome.is_authenticated());
        }
        assert_eq!(handle.selections(), 3);
        assert_eq!(handle.auth_attempts().len(), 3);
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let (mut auth, _handle) = setup();
        let wrong = KeyMaterial::factory_default();

        let outcome = auth.authenticate(&uid(), 16, &wrong, KeySlot::A).await;
        assert_eq!(outcome, AuthOutcome::Rejected);
        assert_eq!(
            outcome.into_result(16, KeySlot::A),
            Err(ProtocolFailure::AuthenticationRejected {
                block: 16,
                slot: KeySlot::A
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_card() {
        let (mut auth, handle) = setup();
        handle.remove_card();

        let outcome = auth.authenticate(&uid(), 16, &key_a(), KeySlot::A).await;
        assert_eq!(outcome, AuthOutcome::CardAbsent);
        assert!(handle.auth_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_swapped_card() {
        let (mut auth, handle) = setup();
        handle.present_card(SimulatedCard::blank(CardUid::new(vec![9, 9, 9, 9]).unwrap()));

        let outcome = auth.authenticate(&uid(), 16, &key_a(), KeySlot::A).await;
        assert_eq!(outcome, AuthOutcome::CardChanged);
    }

    #[tokio::test]
    async fn test_reader_fault_is_outcome_not_panic() {
        let (mut auth, handle) = setup();
        handle.set_offline(true);

        let outcome = auth.authenticate(&uid(), 16, &key_a(), KeySlot::A).await;
        assert!(matches!(outcome, AuthOutcome::ReaderFault(_)));
        assert!(
            outcome
                .into_result(16, KeySlot::A)
                .unwrap_err()
                .is_reader_fault()
        );
    }
}
