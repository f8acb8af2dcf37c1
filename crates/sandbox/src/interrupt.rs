//! Sources the sandbox polls between commands to pause or stop a run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    /// The user asked the run to end.
    Idle,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Paused,
            2 => Self::Idle,
            _ => Self::Running,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Paused => 1,
            Self::Idle => 2,
        }
    }
}

pub trait InterruptSource: std::fmt::Debug + Send {
    fn poll(&mut self) -> RunState;
}

/// Always running.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverInterrupt;

impl InterruptSource for NeverInterrupt {
    fn poll(&mut self) -> RunState {
        RunState::Running
    }
}

/// Interrupt flag shared with another thread through [`InterruptHandle`]s.
#[derive(Debug, Default, Clone)]
pub struct AtomicInterrupt {
    state: Arc<AtomicU8>,
}

impl AtomicInterrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> InterruptHandle {
        InterruptHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl InterruptSource for AtomicInterrupt {
    fn poll(&mut self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }
}

#[derive(Debug, Clone)]
pub struct InterruptHandle {
    state: Arc<AtomicU8>,
}

impl InterruptHandle {
    pub fn set(&self, state: RunState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn pause(&self) {
        self.set(RunState::Paused);
    }

    pub fn resume(&self) {
        self.set(RunState::Running);
    }

    pub fn stop(&self) {
        self.set(RunState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_state() {
        let mut source = AtomicInterrupt::new();
        let handle = source.handle();
        assert_eq!(source.poll(), RunState::Running);
        handle.pause();
        assert_eq!(source.poll(), RunState::Paused);
        handle.stop();
        assert_eq!(source.poll(), RunState::Idle);
        handle.resume();
        assert_eq!(source.poll(), RunState::Running);
    }
}
