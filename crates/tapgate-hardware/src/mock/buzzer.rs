//! Recording buzzer.

use std::sync::{Arc, Mutex, PoisonError};

use crate::{Result, traits::Buzzer, types::Tone};

/// Buzzer that remembers every tone it played.
///
/// Playing a tone takes the tone's real duration on the tokio clock, so tests
/// running with a paused clock see the same timing as the hardware.
#[derive(Debug, Clone, Default)]
pub struct RecordingBuzzer {
    played: Arc<Mutex<Vec<Tone>>>,
}

impl RecordingBuzzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tones played so far, oldest first.
    pub fn played(&self) -> Vec<Tone> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Buzzer for RecordingBuzzer {
    async fn play(&mut self, tone: Tone) -> Result<()> {
        tracing::trace!(
            frequency_hz = tone.frequency_hz(),
            duration_ms = tone.duration().as_millis() as u64,
            "Buzzer on"
        );
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tone);
        tokio::time::sleep(tone.duration()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_play_takes_tone_duration() {
        let buzzer = RecordingBuzzer::new();
        let mut output = buzzer.clone();

        let start = tokio::time::Instant::now();
        output.play(Tone::Failure).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));

        output.play(Tone::Success).await.unwrap();
        assert_eq!(buzzer.played(), vec![Tone::Failure, Tone::Success]);
    }
}
