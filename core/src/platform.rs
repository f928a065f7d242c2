//! Upstream collaborators: the serial line and the clock.
//!
//! # Design
//! `Serial` only *starts* operations. Completion is reported back by the
//! platform's interrupt side calling into the shared [`FrameReceiver`]:
//! `on_transmit_complete` once the bytes have left, and
//! `write_primary` + `on_receive_idle` for every idle-delimited frame. The
//! driver never reads the line itself. Interrupt handlers that go through
//! [`Esp01::on_receive_idle`] also get reception re-armed after each frame.
//!
//! [`FrameReceiver`]: crate::frame::FrameReceiver
//! [`Esp01::on_receive_idle`]: crate::client::Esp01::on_receive_idle

use std::time::{Duration, Instant};

use crate::error::SerialError;

pub trait Serial {
    /// Begin transmitting `bytes`. Must not block until completion.
    fn start_transmit(&self, bytes: &[u8]) -> Result<(), SerialError>;

    /// Arm idle-line reception into the receiver's primary buffer. May be
    /// called again from interrupt context after every frame.
    fn start_receive(&self) -> Result<(), SerialError>;
}

pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    fn sleep_ms(&self, ms: u64);
}

/// `Clock` backed by the host's monotonic clock and thread sleep.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

impl<T: Serial + ?Sized> Serial for &T {
    fn start_transmit(&self, bytes: &[u8]) -> Result<(), SerialError> {
        (**self).start_transmit(bytes)
    }

    fn start_receive(&self) -> Result<(), SerialError> {
        (**self).start_receive()
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn sleep_ms(&self, ms: u64) {
        (**self).sleep_ms(ms)
    }
}
