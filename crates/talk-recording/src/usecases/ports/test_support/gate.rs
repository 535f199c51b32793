//! One-shot barrier that holds a mocked acquisition step open.

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl Gate {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        self.state.lock().unwrap().open = true;
        self.cv.notify_all();
    }

    /// Blocks until the gate is opened. Gives up after ten seconds so a
    /// broken test cannot hang the suite.
    pub fn pass(&self) {
        let mut state = self.state.lock().unwrap();
        state.waiting += 1;
        self.cv.notify_all();
        let (mut state, _) = self
            .cv
            .wait_timeout_while(state, Duration::from_secs(10), |s| !s.open)
            .unwrap();
        state.waiting -= 1;
    }

    pub fn has_waiter(&self) -> bool {
        self.state.lock().unwrap().waiting > 0
    }
}
