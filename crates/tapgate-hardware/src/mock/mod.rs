//! Mock device implementations for testing and development.
//!
//! This module provides simulated device implementations that can be controlled
//! programmatically without requiring physical hardware.

pub mod buzzer;
pub mod display;
pub mod door;
pub mod reader;

// Re-export commonly used types
pub use buzzer::RecordingBuzzer;
pub use display::{Alignment, VirtualDisplay};
pub use door::{MockDoorSensor, MockLock};
pub use reader::{AuthAttempt, BlockWrite, MockCardReader, MockCardReaderHandle, SimulatedCard};
