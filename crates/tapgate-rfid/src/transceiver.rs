//! Card presence polling.

use std::time::Duration;

use tapgate_core::CardUid;
use tapgate_hardware::{CardReader, HardwareError};
use tracing::{debug, trace};

/// Polls the reader for a card, one bounded attempt at a time.
///
/// Every attempt is bounded by `poll_timeout` and followed by a cooperative
/// yield, so a message pump sharing the runtime keeps being scheduled while
/// the field is empty.
#[derive(Debug)]
pub struct CardTransceiver<R> {
    reader: R,
    poll_timeout: Duration,
}

impl<R: CardReader> CardTransceiver<R> {
    pub fn new(reader: R, poll_timeout: Duration) -> Self {
        Self {
            reader,
            poll_timeout,
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Single selection attempt.
    ///
    /// # Errors
    ///
    /// Returns the reader's error if it cannot be reached.
    pub async fn poll(&mut self) -> Result<Option<CardUid>, HardwareError> {
        let detected = self.reader.read_passive_target(self.poll_timeout).await?;
        Ok(detected.map(|card| card.uid))
    }

    /// Poll until a card is selected.
    ///
    /// Cancel-safe: dropping the future between attempts loses nothing.
    ///
    /// # Errors
    ///
    /// Returns the reader's error if it cannot be reached.
    pub async fn wait_for_card(&mut self) -> Result<CardUid, HardwareError> {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            if let Some(uid) = self.poll().await? {
                debug!(uid = %uid, attempts, "Card selected");
                return Ok(uid);
            }
            trace!(attempts, "No card in field");
            tokio::task::yield_now().await;
        }
    }

    /// Poll at most `max_attempts` times.
    ///
    /// # Errors
    ///
    /// Returns the reader's error if it cannot be reached.
    pub async fn try_acquire(&mut self, max_attempts: u32) -> Result<Option<CardUid>, HardwareError> {
        for _ in 0..max_attempts {
            if let Some(uid) = self.poll().await? {
                return Ok(Some(uid));
            }
            tokio::task::yield_now().await;
        }
        Ok(None)
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
