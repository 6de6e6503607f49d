//! Hardware device abstraction layer for the tapgate access endpoint.
//!
//! This crate provides trait-based abstractions for the peripherals of a
//! scanner or door endpoint: the contactless card reader, the character
//! display, the buzzer, the lock actuator and the door contact. Mock
//! implementations live in [`mock`] so the whole access flow can run without
//! physical hardware.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All I/O operations are asynchronous using native `async fn`
//!   in traits (Rust 1.90 + Edition 2024 RPITIT).
//! - **Generic, not dynamic**: traits are used as type parameters; none of
//!   them are object-safe.
//! - **Thread-safe**: All traits require `Send + Sync` for use with Tokio.
//! - **Faults vs. outcomes**: a wrong key or an absent card is an ordinary
//!   return value; only device failures surface as [`HardwareError`].
//!
//! # Card Readers
//!
//! The [`CardReader`] trait speaks the MIFARE Classic block command set:
//!
//! ```no_run
//! use std::time::Duration;
//! use tapgate_core::{KeyMaterial, KeySlot};
//! use tapgate_hardware::traits::CardReader;
//! use tapgate_hardware::error::Result;
//!
//! async fn dump_block<R: CardReader>(reader: &mut R, key: &KeyMaterial) -> Result<Option<[u8; 16]>> {
//!     let Some(card) = reader.read_passive_target(Duration::from_millis(500)).await? else {
//!         return Ok(None);
//!     };
//!     if !reader.authenticate_block(&card.uid, 16, KeySlot::A, key).await? {
//!         return Ok(None);
//!     }
//!     reader.read_block(16).await.map(Some)
//! }
//! ```
//!
//! # Feedback Devices
//!
//! [`DisplaySink`] and [`Buzzer`] give the user local feedback;
//! [`LockActuator`] and [`DoorSensor`] drive the door side.
//!
//! [`CardReader`]: traits::CardReader
//! [`DisplaySink`]: traits::DisplaySink
//! [`Buzzer`]: traits::Buzzer
//! [`LockActuator`]: traits::LockActuator
//! [`DoorSensor`]: traits::DoorSensor

pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{HardwareError, Result};
pub use traits::{Buzzer, CardReader, DetectedCard, DisplaySink, DoorSensor, LockActuator};
pub use types::{ReaderInfo, Tone};
