//! User-facing feedback: two display lines and an optional tone per event.

use tapgate_hardware::{Buzzer, DisplaySink, Tone};
use tracing::warn;

/// Everything the endpoint can tell the person at the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notice {
    /// Waiting for a card.
    ScanPrompt,
    /// Card read, verdict pending.
    Loading,
    /// Denied or timed out.
    NoAccess,
    /// Granted.
    OpeningDoor,
    /// Checked out.
    CheckingOut,
    /// No pass on the card, unreadable card, or unusable verdict.
    TryAgain,
    /// Card provisioned.
    Provisioned,
}

impl Notice {
    pub fn lines(&self) -> (&'static str, &'static str) {
        match self {
            Notice::ScanPrompt => ("Scan Your", "Access Card"),
            Notice::Loading => ("Loading...", "Please wait"),
            Notice::NoAccess => ("ERROR", "No access!"),
            Notice::OpeningDoor => ("Opening Door...", "Please wait"),
            Notice::CheckingOut => ("Checking out...", "Please wait"),
            Notice::TryAgain => ("ERROR", "Try again"),
            Notice::Provisioned => ("Card written", "Remove card"),
        }
    }

    pub fn tone(&self) -> Option<Tone> {
        match self {
            Notice::OpeningDoor | Notice::CheckingOut | Notice::Provisioned => Some(Tone::Success),
            Notice::NoAccess | Notice::TryAgain => Some(Tone::Failure),
            Notice::ScanPrompt | Notice::Loading => None,
        }
    }
}

/// Drives the display and buzzer.
///
/// Peripheral failures are logged and swallowed so a broken buzzer never
/// aborts an access cycle.
#[derive(Debug)]
pub struct Feedback<D, B> {
    display: D,
    buzzer: B,
}

impl<D: DisplaySink, B: Buzzer> Feedback<D, B> {
    pub fn new(display: D, buzzer: B) -> Self {
        Self { display, buzzer }
    }

    pub async fn notify(&mut self, notice: Notice) {
        let (line1, line2) = notice.lines();
        if let Err(e) = self.display.show(line1, line2).await {
            warn!(error = %e, ?notice, "Display update failed");
        }
        if let Some(tone) = notice.tone() {
            self.tone(tone).await;
        }
    }

    /// Show free text, e.g. card info.
    pub async fn show_text(&mut self, line1: &str, line2: &str) {
        if let Err(e) = self.display.show(line1, line2).await {
            warn!(error = %e, "Display update failed");
        }
    }

    pub async fn tone(&mut self, tone: Tone) {
        if let Err(e) = self.buzzer.play(tone).await {
            warn!(error = %e, ?tone, "Buzzer failed");
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn buzzer(&self) -> &B {
        &self.buzzer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tapgate_hardware::mock::{RecordingBuzzer, VirtualDisplay};

    #[rstest]
    #[case(Notice::NoAccess, "ERROR", "No access!", Some(Tone::Failure))]
    #[case(Notice::OpeningDoor, "Opening Door...", "Please wait", Some(Tone::Success))]
    #[case(Notice::Loading, "Loading...", "Please wait", None)]
    #[tokio::test(start_paused = true)]
    async fn test_notify_shows_and_sounds(
        #[case] notice: Notice,
        #[case] line1: &str,
        #[case] line2: &str,
        #[case] tone: Option<Tone>,
    ) {
        let display = VirtualDisplay::default();
        let buzzer = RecordingBuzzer::new();
        let mut feedback = Feedback::new(display.clone(), buzzer.clone());

        feedback.notify(notice).await;

        assert_eq!(display.line(0).unwrap().trim_end(), line1);
        assert_eq!(display.line(1).unwrap().trim_end(), line2);
        assert_eq!(buzzer.played(), tone.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_lines_fit_display() {
        for notice in [
            Notice::ScanPrompt,
            Notice::Loading,
            Notice::NoAccess,
            Notice::OpeningDoor,
            Notice::CheckingOut,
            Notice::TryAgain,
            Notice::Provisioned,
        ] {
            let (line1, line2) = notice.lines();
            assert!(line1.len() <= 16 && line2.len() <= 16, "{notice:?}");
        }
    }
}
