//! Heartbeat scheduling.
//!
//! A self-rearming timer thread marks a "heartbeat due" condition that the
//! event loop consumes once per tick. The two sides share exactly one
//! atomic flag: the timer thread is the sole setter, the loop the sole
//! clearer, so no locking is needed. Ticks that fire while a heartbeat is
//! already pending coalesce into the single flag; heartbeats are never
//! queued.
//!
//! The timer thread runs minimal logic only: arm the flag and wake the
//! poll. Encoding and sending happen on the loop thread when it consumes
//! the flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mio::Waker;

use crate::trace::{debug, warn};

/// The pending-heartbeat flag: IDLE (false) or DUE (true).
#[derive(Debug, Default)]
pub struct HeartbeatState {
    pending: AtomicBool,
}

impl HeartbeatState {
    /// Creates the state in IDLE.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Transitions IDLE → DUE. Arming while already DUE is a no-op.
    pub fn arm(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Consumes a pending heartbeat, transitioning DUE → IDLE.
    ///
    /// The swap clears the flag before the caller acts on it, so a tick
    /// that fires concurrently with the clear is not lost.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

/// Interval timer driving the heartbeat flag.
///
/// Owns the timer thread; [`stop`](Self::stop) unparks and joins it.
pub struct HeartbeatScheduler {
    state: Arc<HeartbeatState>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    /// Spawns the timer thread with a fixed tick interval.
    ///
    /// Each tick arms the pending flag and wakes `waker` so the event
    /// loop's poll returns promptly. The timer rearms itself after every
    /// firing until [`stop`](Self::stop).
    ///
    /// # Panics
    ///
    /// Panics if the timer thread cannot be spawned.
    #[must_use]
    pub fn start(interval: Duration, waker: Arc<Waker>) -> Self {
        let state = Arc::new(HeartbeatState::new());
        let stop = Arc::new(AtomicBool::new(false));

        let thread_state = Arc::clone(&state);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("llrpc-heartbeat".into())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                loop {
                    let now = Instant::now();
                    if now < next {
                        // park_timeout may wake early (spurious or unpark);
                        // the deadline check below keeps the cadence fixed.
                        thread::park_timeout(next - now);
                    }
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    if Instant::now() >= next {
                        thread_state.arm();
                        if let Err(_e) = waker.wake() {
                            warn!(error = %_e, "heartbeat waker failed");
                        }
                        next += interval;
                    }
                }
                debug!("heartbeat timer exiting");
            })
            .expect("failed to spawn heartbeat timer thread");

        Self {
            state,
            stop,
            handle: Some(handle),
        }
    }

    /// Consumes a pending heartbeat if one is due.
    pub fn take(&self) -> bool {
        self.state.take()
    }

    /// Stops the timer thread and waits for it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        // Signal the thread even if stop() was never called; the park
        // timeout bounds how long it lingers.
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}
