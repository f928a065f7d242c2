//! The transport context: one serial line bound to one ESP-01.
//!
//! # Design
//! `Esp01` owns the `Serial` for its whole lifetime and shares the
//! [`FrameReceiver`] with the platform's interrupt side. Connection, socket
//! and HTTP operations live in their own modules as further `impl` blocks; all
//! of them go through the same [`CommandEngine`], so the
//! one-command-in-flight rule holds across layers.

use std::sync::Arc;

use log::info;

use crate::at;
use crate::command::CommandEngine;
use crate::config::DriverConfig;
use crate::error::WifiError;
use crate::frame::FrameReceiver;
use crate::platform::{Clock, Serial};

pub struct Esp01<S, C> {
    pub(crate) engine: CommandEngine<S, C>,
    pub(crate) config: DriverConfig,
}

impl<S: Serial, C: Clock> Esp01<S, C> {
    /// Validate `config`, create the receive buffers and bind the serial line
    /// built by `make_serial`. The closure receives the receiver its interrupt
    /// side must feed.
    pub fn bind(
        config: DriverConfig,
        clock: C,
        make_serial: impl FnOnce(Arc<FrameReceiver>) -> S,
    ) -> Result<Self, WifiError> {
        config.validate()?;
        let rx = Arc::new(FrameReceiver::new(config.rx_buffer_len));
        let serial = make_serial(Arc::clone(&rx));
        let engine = CommandEngine::new(serial, clock, rx, config.poll_interval_ms);
        Ok(Self { engine, config })
    }

    /// Bind to an existing receiver, e.g. one a test double already feeds.
    pub fn with_receiver(
        config: DriverConfig,
        serial: S,
        clock: C,
        rx: Arc<FrameReceiver>,
    ) -> Result<Self, WifiError> {
        config.validate()?;
        let engine = CommandEngine::new(serial, clock, rx, config.poll_interval_ms);
        Ok(Self { engine, config })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn receiver(&self) -> &Arc<FrameReceiver> {
        self.engine.receiver()
    }

    pub fn serial(&self) -> &S {
        self.engine.serial()
    }

    /// Idle-line interrupt: publish the `byte_count` bytes received so far
    /// and arm reception again, for platforms whose idle reception stops
    /// after each frame.
    pub fn on_receive_idle(&self, byte_count: usize) -> Result<(), WifiError> {
        self.engine.receiver().on_receive_idle(byte_count);
        self.engine.serial().start_receive()?;
        Ok(())
    }

    /// Arm reception, let the module boot, probe it and select station mode.
    pub fn init(&self) -> Result<(), WifiError> {
        self.engine.serial().start_receive()?;
        self.engine.sleep_ms(self.config.boot_delay_ms);
        self.engine
            .issue(at::PROBE.as_bytes(), "OK", self.config.probe_timeout_ms)?;
        self.engine
            .issue(at::STATION_MODE.as_bytes(), "OK", self.config.probe_timeout_ms)?;
        info!("wifi module ready in station mode");
        Ok(())
    }

    /// Issue an arbitrary AT command and wait for `expected`.
    pub fn send_command(
        &self,
        command: &str,
        expected: &str,
        timeout_ms: u64,
    ) -> Result<(), WifiError> {
        if command.len() > self.config.command_buffer_len {
            return Err(WifiError::Overflow {
                what: "command",
                capacity: self.config.command_buffer_len,
            });
        }
        self.engine.issue(command.as_bytes(), expected, timeout_ms)
    }

    /// Wait for an unsolicited `token` without sending anything.
    pub fn expect(&self, token: &str, timeout_ms: u64) -> Result<(), WifiError> {
        self.engine.expect_any(&[token], timeout_ms).map(|_| ())
    }

    pub fn expect_any(&self, tokens: &[&str], timeout_ms: u64) -> Result<usize, WifiError> {
        self.engine.expect_any(tokens, timeout_ms)
    }

    /// Transmit bytes verbatim and wait until they have left the line.
    pub fn send_raw(&self, bytes: &[u8], timeout_ms: u64) -> Result<(), WifiError> {
        self.engine.send_raw(bytes, timeout_ms)
    }

    /// Text of the most recent frame.
    pub fn last_response(&self) -> String {
        self.engine.last_response()
    }
}
