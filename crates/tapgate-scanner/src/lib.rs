//! Endpoint logic of a tapgate installation.
//!
//! - [`AccessSessionController`]: the scanner's read/check/act loop
//! - [`CardProvisioner`]: provisioning station and card info
//! - [`DoorLock`]: the lock endpoint driven by `lock.open`
//! - [`Config`]: environment-based configuration shared by all three
//! - [`ScriptedAuthority`]: in-process authorization service for the
//!   emulator and tests

pub mod authority;
pub mod config;
pub mod controller;
pub mod door;
pub mod error;
pub mod feedback;
pub mod provisioning;
pub mod state_machine;

pub use authority::{AuthorityScript, Reply, ScriptedAuthority};
pub use config::Config;
pub use controller::{AccessSessionController, CycleOutcome, SessionSettings};
pub use door::DoorLock;
pub use error::{InspectError, ProvisionError, SessionError};
pub use feedback::{Feedback, Notice};
pub use provisioning::{CardInfo, CardProvisioner, ProvisionPlan, ProvisionReport};
pub use state_machine::{SessionState, SessionStateMachine, StateTransition};
