/*!
    Node identity and pause control.
*/

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

static MUXER_COUNT: AtomicU64 = AtomicU64::new(0);

/**
    Returns the next process-wide muxer number, starting at 1.
*/
pub(crate) fn next_muxer_id() -> u64 {
    MUXER_COUNT.fetch_add(1, Ordering::Relaxed) + 1
}

/**
    Name, label and description of a node, used in logs and events.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeMetadata {
    pub name: String,
    pub label: String,
    pub description: String,
}

impl NodeMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /**
        Fill in whichever fields are still empty.
    */
    pub fn extend(
        mut self,
        name: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        if self.name.is_empty() {
            self.name = name.into();
        }
        if self.label.is_empty() {
            self.label = label.into();
        }
        if self.description.is_empty() {
            self.description = description.into();
        }
        self
    }
}

#[derive(Debug, Default)]
struct PauseState {
    paused: bool,
    closed: bool,
}

/**
    Blocks callers while paused. Closing the gate releases everyone for good.
*/
#[derive(Debug, Default)]
pub(crate) struct PauseGate {
    state: Mutex<PauseState>,
    resumed: Condvar,
}

impl PauseGate {
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.paused = true;
        }
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.resumed.notify_all();
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.paused = false;
        self.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.paused {
            self.resumed.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = next_muxer_id();
        let b = next_muxer_id();
        assert!(b > a);
    }

    #[test]
    fn extend_keeps_caller_fields() {
        let metadata = NodeMetadata::new("custom").extend("muxer_1", "Muxer #1", "Muxes to out.mp4");
        assert_eq!(metadata.name, "custom");
        assert_eq!(metadata.label, "Muxer #1");
        assert_eq!(metadata.description, "Muxes to out.mp4");
    }

    #[test]
    fn gate_blocks_until_resumed() {
        let gate = PauseGate::default();
        gate.pause();
        let passed = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                gate.wait();
                passed.store(true, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(30));
            assert!(!passed.load(Ordering::SeqCst));
            gate.resume();
        });
        assert!(passed.load(Ordering::SeqCst));
    }

    #[test]
    fn closed_gate_never_pauses() {
        let gate = PauseGate::default();
        gate.pause();
        gate.close();
        gate.pause();
        assert!(!gate.is_paused());
        gate.wait();
    }
}
