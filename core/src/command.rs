//! One-command-at-a-time issue and response matching.
//!
//! # Design
//! `issue` claims the transmitter with a compare-and-swap on the frame
//! receiver's busy flag, so a second caller gets `Busy` immediately instead of
//! interleaving bytes on the line. The flag is released only by the
//! platform's transmit-complete event.
//!
//! Waiting is a poll loop with a cooperative sleep between checks. A frame
//! counts as a match only once the receiver has flagged it ready; the error
//! marker is checked on whatever the shadow buffer holds. Matching is plain
//! substring search on the latest frame, see [`crate::frame`] for what that
//! implies for fragmented responses.

use std::sync::Arc;

use log::debug;

use crate::error::WifiError;
use crate::frame::FrameReceiver;
use crate::platform::{Clock, Serial};
use crate::response::{classify, Classification};

pub struct CommandEngine<S, C> {
    serial: S,
    clock: C,
    rx: Arc<FrameReceiver>,
    poll_interval_ms: u64,
}

impl<S: Serial, C: Clock> CommandEngine<S, C> {
    pub fn new(serial: S, clock: C, rx: Arc<FrameReceiver>, poll_interval_ms: u64) -> Self {
        Self {
            serial,
            clock,
            rx,
            poll_interval_ms,
        }
    }

    pub fn receiver(&self) -> &Arc<FrameReceiver> {
        &self.rx
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Send `command` and wait for `expected` in the reply.
    pub fn issue(&self, command: &[u8], expected: &str, timeout_ms: u64) -> Result<(), WifiError> {
        self.issue_any(command, &[expected], timeout_ms).map(|_| ())
    }

    /// Send `command` and wait for any of `expected`; returns the index of the
    /// token that matched.
    pub fn issue_any(
        &self,
        command: &[u8],
        expected: &[&str],
        timeout_ms: u64,
    ) -> Result<usize, WifiError> {
        if command.is_empty() {
            return Err(WifiError::InvalidArgument("command must not be empty"));
        }
        if expected.is_empty() || expected.iter().any(|token| token.is_empty()) {
            return Err(WifiError::InvalidArgument("expected token must not be empty"));
        }
        if !self.rx.try_begin_transmit() {
            return Err(WifiError::Busy);
        }
        self.rx.reset_response();
        debug!("-> {}", String::from_utf8_lossy(command).trim_end());
        if let Err(e) = self.serial.start_transmit(command) {
            self.rx.abort_transmit();
            return Err(e.into());
        }

        let start = self.clock.now_ms();
        loop {
            let ready = self.rx.response_ready();
            let text = self.rx.frame_text();
            match classify(&text, expected) {
                Classification::Matched(index) if ready => {
                    self.rx.clear_ready();
                    debug!("<- matched {:?}", expected[index]);
                    return Ok(index);
                }
                Classification::Failed => return Err(WifiError::Module { response: text }),
                _ => {}
            }
            if self.clock.now_ms().saturating_sub(start) >= timeout_ms {
                return Err(timeout(expected, timeout_ms));
            }
            self.clock.sleep_ms(self.poll_interval_ms);
        }
    }

    /// Wait for an unsolicited frame containing any of `expected`, without
    /// transmitting. Each ready frame is consumed as it is examined; frames
    /// that match nothing are discarded and the error marker aborts the wait.
    /// A frame that arrived before the wait began and was not yet consumed is
    /// examined too.
    pub fn expect_any(&self, expected: &[&str], timeout_ms: u64) -> Result<usize, WifiError> {
        self.expect_frame(expected, timeout_ms).map(|(index, _)| index)
    }

    /// Like [`expect_any`](Self::expect_any), also returning the text of the
    /// matching frame.
    pub fn expect_frame(
        &self,
        expected: &[&str],
        timeout_ms: u64,
    ) -> Result<(usize, String), WifiError> {
        if expected.is_empty() || expected.iter().any(|token| token.is_empty()) {
            return Err(WifiError::InvalidArgument("expected token must not be empty"));
        }
        let start = self.clock.now_ms();
        loop {
            if let Some(text) = self.rx.take_frame() {
                debug!("<- {}", text.trim_end());
                match classify(&text, expected) {
                    Classification::Matched(index) => return Ok((index, text)),
                    Classification::Failed => return Err(WifiError::Module { response: text }),
                    Classification::Pending => {}
                }
            }
            if self.clock.now_ms().saturating_sub(start) >= timeout_ms {
                return Err(timeout(expected, timeout_ms));
            }
            self.clock.sleep_ms(self.poll_interval_ms);
        }
    }

    /// Transmit `bytes` without interpreting any reply. Waits for the line to
    /// come free, then for the transmit-complete event. The shadow frame is
    /// cleared first so that anything seen afterwards answers this payload.
    pub fn send_raw(&self, bytes: &[u8], timeout_ms: u64) -> Result<(), WifiError> {
        let start = self.clock.now_ms();
        while !self.rx.try_begin_transmit() {
            if self.clock.now_ms().saturating_sub(start) >= timeout_ms {
                return Err(WifiError::Busy);
            }
            self.clock.sleep_ms(self.poll_interval_ms);
        }
        self.rx.reset_response();
        debug!("-> {} raw bytes", bytes.len());
        if let Err(e) = self.serial.start_transmit(bytes) {
            self.rx.abort_transmit();
            return Err(e.into());
        }
        while self.rx.transmit_busy() {
            if self.clock.now_ms().saturating_sub(start) >= timeout_ms {
                return Err(WifiError::Timeout {
                    waiting_for: "transmit complete".to_string(),
                    timeout_ms,
                });
            }
            self.clock.sleep_ms(self.poll_interval_ms);
        }
        Ok(())
    }

    pub fn sleep_ms(&self, ms: u64) {
        self.clock.sleep_ms(ms);
    }

    pub fn last_response(&self) -> String {
        self.rx.frame_text()
    }
}

fn timeout(expected: &[&str], timeout_ms: u64) -> WifiError {
    WifiError::Timeout {
        waiting_for: expected.join(" | "),
        timeout_ms,
    }
}
