//! Mock lock actuator and door contact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    HardwareError, Result,
    traits::{DoorSensor, LockActuator},
};

#[derive(Debug, Default)]
struct LockState {
    released: bool,
    transitions: Vec<bool>,
    jammed: bool,
}

/// Lock actuator that records every state change.
#[derive(Debug, Clone, Default)]
pub struct MockLock {
    state: Arc<Mutex<LockState>>,
}

impl MockLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Every value passed to `set_released`, oldest first.
    pub fn transitions(&self) -> Vec<bool> {
        self.lock().transitions.clone()
    }

    /// Make every further `set_released` call fail.
    pub fn set_jammed(&self, jammed: bool) {
        self.lock().jammed = jammed;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LockActuator for MockLock {
    async fn set_released(&mut self, released: bool) -> Result<()> {
        let mut state = self.lock();
        if state.jammed {
            return Err(HardwareError::communication("lock output not responding"));
        }
        state.released = released;
        state.transitions.push(released);
        Ok(())
    }
}

/// Door contact whose position is set by the test.
#[derive(Debug, Clone, Default)]
pub struct MockDoorSensor {
    open: Arc<AtomicBool>,
}

impl MockDoorSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

impl DoorSensor for MockDoorSensor {
    async fn is_open(&self) -> Result<bool> {
        Ok(self.open.load(Ordering::SeqCst))
    }
}
