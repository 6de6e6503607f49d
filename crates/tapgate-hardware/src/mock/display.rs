//! Virtual character LCD.
//!
//! Simulates the 2-line × 16-column display mounted next to the reader. The
//! display keeps every screen it has shown so tests can assert on the
//! feedback sequence of a whole session.
//!
//! # Character Encoding - ASCII Only
//!
//! HD44780-style controllers only render the ASCII range, so any other
//! character is replaced with `?` before it reaches the buffer.
//!
//! # Examples
//!
//! ```
//! use tapgate_hardware::mock::VirtualDisplay;
//!
//! let mut display = VirtualDisplay::new(2, 16);
//! display.set_line(0, "Scan your card").unwrap();
//!
//! assert_eq!(display.line(0).unwrap(), "Scan your card  ");
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{HardwareError, Result, traits::DisplaySink};

/// Number of display lines.
pub const DEFAULT_LINES: usize = 2;

/// Characters per line.
pub const DEFAULT_COLUMNS: usize = 16;

/// Text alignment options for display lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Text starts at column 0, padded with spaces on the right.
    Left,
    /// Text centered with equal padding on both sides (extra space on right if odd).
    Center,
    /// Text ends at the last column, padded with spaces on the left.
    Right,
}

#[derive(Debug)]
struct DisplayState {
    buffer: Vec<String>,
    history: Vec<Vec<String>>,
}

/// Virtual LCD display.
///
/// Clones share the same buffer, so a test can keep one clone for inspection
/// and hand the other to the code under test.
#[derive(Debug, Clone)]
pub struct VirtualDisplay {
    lines: usize,
    columns: usize,
    state: Arc<Mutex<DisplayState>>,
}

impl VirtualDisplay {
    /// Create a blank display with the given dimensions.
    pub fn new(lines: usize, columns: usize) -> Self {
        let lines = lines.max(1);
        Self {
            lines,
            columns,
            state: Arc::new(Mutex::new(DisplayState {
                buffer: vec![" ".repeat(columns); lines],
                history: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set text on a specific line with left alignment.
    ///
    /// # Errors
    ///
    /// Returns an error if the line index is out of bounds.
    pub fn set_line(&mut self, line: usize, text: &str) -> Result<()> {
        self.set_line_aligned(line, text, Alignment::Left)
    }

    /// Set text on a specific line with custom alignment.
    ///
    /// # Errors
    ///
    /// Returns an error if the line index is out of bounds.
    pub fn set_line_aligned(&mut self, line: usize, text: &str, align: Alignment) -> Result<()> {
        if line >= self.lines {
            return Err(HardwareError::invalid_data(format!(
                "display line {line} out of range (max {})",
                self.lines - 1
            )));
        }

        let rendered = align_text(&sanitize(text), self.columns, align);
        self.lock().buffer[line] = rendered;
        Ok(())
    }

    /// Get one line, padded to the column width.
    ///
    /// # Errors
    ///
    /// Returns an error if the line index is out of bounds.
    pub fn line(&self, line: usize) -> Result<String> {
        self.lock()
            .buffer
            .get(line)
            .cloned()
            .ok_or_else(|| HardwareError::invalid_data(format!("display line {line} out of range")))
    }

    /// Current screen with trailing padding removed.
    pub fn text(&self) -> Vec<String> {
        self.lock()
            .buffer
            .iter()
            .map(|line| line.trim_end().to_string())
            .collect()
    }

    /// Every screen shown through [`DisplaySink::show`], oldest first, with
    /// trailing padding removed.
    pub fn history(&self) -> Vec<Vec<String>> {
        self.lock().history.clone()
    }

    /// Returns `true` if every line is blank.
    pub fn is_blank(&self) -> bool {
        self.lock().buffer.iter().all(|line| line.trim().is_empty())
    }

    fn blank(&mut self) {
        let columns = self.columns;
        for line in self.lock().buffer.iter_mut() {
            *line = " ".repeat(columns);
        }
    }
}

impl Default for VirtualDisplay {
    fn default() -> Self {
        Self::new(DEFAULT_LINES, DEFAULT_COLUMNS)
    }
}

impl DisplaySink for VirtualDisplay {
    async fn show(&mut self, line1: &str, line2: &str) -> Result<()> {
        self.blank();
        self.set_line(0, line1)?;
        if self.lines > 1 {
            self.set_line(1, line2)?;
        }
        let screen = self.text();
        self.lock().history.push(screen);
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.blank();
        Ok(())
    }
}

fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

/// Truncate text to a maximum number of characters.
///
/// ```
/// use tapgate_hardware::mock::display::truncate_text;
///
/// assert_eq!(truncate_text("Welcome back", 7), "Welcome");
/// assert_eq!(truncate_text("Short", 10), "Short");
/// ```
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Align text within a fixed width, padding with spaces.
///
/// Text longer than `width` is truncated first.
///
/// ```
/// use tapgate_hardware::mock::display::{Alignment, align_text};
///
/// assert_eq!(align_text("Hi", 6, Alignment::Left), "Hi    ");
/// assert_eq!(align_text("Hi", 6, Alignment::Center), "  Hi  ");
/// assert_eq!(align_text("Hi", 6, Alignment::Right), "    Hi");
/// ```
pub fn align_text(text: &str, width: usize, alignment: Alignment) -> String {
    let text = truncate_text(text, width);
    let padding = width - text.chars().count();

    match alignment {
        Alignment::Left => format!("{text}{}", " ".repeat(padding)),
        Alignment::Right => format!("{}{text}", " ".repeat(padding)),
        Alignment::Center => {
            let left = padding / 2;
            let right = padding - left;
            format!("{}{text}{}", " ".repeat(left), " ".repeat(right))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_display_is_blank() {
        let display = VirtualDisplay::default();
        assert!(display.is_blank());
        assert_eq!(display.line(0).unwrap().len(), DEFAULT_COLUMNS);
    }

    #[test]
    fn test_set_line_truncates() {
        let mut display = VirtualDisplay::new(2, 16);
        display.set_line(1, "This is far too long").unwrap();
        assert_eq!(display.line(1).unwrap(), "This is far too ");
    }

    #[test]
    fn test_set_line_out_of_range() {
        let mut display = VirtualDisplay::new(2, 16);
        assert!(display.set_line(2, "x").is_err());
        assert!(display.line(5).is_err());
    }

    #[test]
    fn test_non_ascii_replaced() {
        let mut display = VirtualDisplay::new(1, 8);
        display.set_line(0, "Café\n").unwrap();
        assert_eq!(display.text(), vec!["Caf?"]);
    }

    #[rstest]
    #[case(Alignment::Left, "ab   ")]
    #[case(Alignment::Center, " ab  ")]
    #[case(Alignment::Right, "   ab")]
    fn test_align_text(#[case] alignment: Alignment, #[case] expected: &str) {
        assert_eq!(align_text("ab", 5, alignment), expected);
    }

    #[tokio::test]
    async fn test_show_records_history_on_shared_clone() {
        let inspector = VirtualDisplay::default();
        let mut display = inspector.clone();

        display.show("Access granted", "").await.unwrap();
        display.show("Access denied", "Try again").await.unwrap();
        display.clear().await.unwrap();

        assert!(inspector.is_blank());
        assert_eq!(
            inspector.history(),
            vec![
                vec!["Access granted".to_string(), String::new()],
                vec!["Access denied".to_string(), "Try again".to_string()],
            ]
        );
    }
}
