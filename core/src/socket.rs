//! Single TCP exchange as a chain of AT commands.
//!
//! A socket exists only between `open_socket` and `close_socket`; nothing
//! about it is remembered afterwards. The module supports one such session at
//! a time.

use log::{debug, warn};

use crate::at;
use crate::client::Esp01;
use crate::error::WifiError;
use crate::platform::{Clock, Serial};
use crate::response::Marker;

impl<S: Serial, C: Clock> Esp01<S, C> {
    /// Open, announce, push `payload`, then close.
    ///
    /// The first failing step decides the result. Close is attempted on every
    /// path and its own outcome is only logged.
    pub fn send_tcp(&self, host: &str, port: u16, payload: &[u8]) -> Result<(), WifiError> {
        if host.is_empty() {
            return Err(WifiError::InvalidArgument("host must not be empty"));
        }
        let result = self.transfer(host, port, payload);
        self.close_socket(self.config.close_timeout_ms);
        result
    }

    /// Open, announce and push without closing.
    pub(crate) fn transfer(&self, host: &str, port: u16, payload: &[u8]) -> Result<(), WifiError> {
        self.open_socket(host, port)?;
        self.announce(payload.len())?;
        self.push(payload)
    }

    /// The module acknowledges with either `OK` or `CONNECT`, and a socket
    /// that is already up may report `ALREADY CONNECTED` with an error.
    pub fn open_socket(&self, host: &str, port: u16) -> Result<(), WifiError> {
        let cmd = at::open_tcp(host, port, self.config.command_buffer_len)?;
        match self.engine.issue(
            cmd.as_bytes(),
            Marker::Ok.token(),
            self.config.open_timeout_ms,
        ) {
            Ok(()) => Ok(()),
            Err(e) if Marker::Connected.found_in(&self.engine.last_response()) => {
                debug!("socket to {host}:{port} reported connected ({e})");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Declare the payload length and wait for the data prompt.
    pub fn announce(&self, len: usize) -> Result<(), WifiError> {
        if len == 0 {
            return Err(WifiError::InvalidArgument("payload must not be empty"));
        }
        let cmd = at::announce(len, self.config.command_buffer_len)?;
        self.engine.issue(
            cmd.as_bytes(),
            Marker::Prompt.token(),
            self.config.announce_timeout_ms,
        )
    }

    pub fn push(&self, payload: &[u8]) -> Result<(), WifiError> {
        self.engine.send_raw(payload, self.config.push_timeout_ms)
    }

    /// Best-effort close; failures are logged, never returned.
    pub fn close_socket(&self, timeout_ms: u64) {
        if let Err(e) = self
            .engine
            .issue(at::CLOSE_SOCKET.as_bytes(), Marker::Ok.token(), timeout_ms)
        {
            warn!("socket close not acknowledged: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::client::Esp01;
    use crate::config::DriverConfig;
    use crate::error::{Status, WifiError};
    use crate::testing::{ManualClock, ScriptedSerial};

    fn module(serial: ScriptedSerial) -> Esp01<ScriptedSerial, ManualClock> {
        let rx = serial.receiver();
        Esp01::with_receiver(DriverConfig::default(), serial, ManualClock::default(), rx).unwrap()
    }

    fn healthy() -> ScriptedSerial {
        ScriptedSerial::new(128)
            .on("AT+CIPSTART", &["CONNECT\r\n\r\nOK\r\n"])
            .on("AT+CIPSEND", &["\r\nOK\r\n> "])
            .on("AT+CIPCLOSE", &["CLOSED\r\n\r\nOK\r\n"])
            .on_payload(&["\r\nRecv 19 bytes\r\n\r\nSEND OK\r\n"])
    }

    #[test]
    fn send_runs_the_full_chain() {
        let esp = module(healthy());
        esp.send_tcp("192.168.1.105", 5000, b"Hello from STM32!\r\n").unwrap();
        assert_eq!(
            esp.serial().sent(),
            vec![
                "AT+CIPSTART=\"TCP\",\"192.168.1.105\",5000\r\n",
                "AT+CIPSEND=19\r\n",
                "Hello from STM32!\r\n",
                "AT+CIPCLOSE\r\n",
            ]
        );
    }

    #[test]
    fn connect_marker_counts_as_open() {
        let esp = module(
            ScriptedSerial::new(128)
                .on("AT+CIPSTART", &["ALREADY CONNECTED\r\n\r\nERROR\r\n"])
                .on("AT+CIPSEND", &["\r\nOK\r\n> "])
                .on("AT+CIPCLOSE", &["CLOSED\r\n\r\nOK\r\n"]),
        );
        esp.send_tcp("10.0.0.1", 80, b"ping").unwrap();
        assert_eq!(esp.serial().sent().len(), 4);
    }

    #[test]
    fn failed_open_short_circuits_but_still_closes() {
        let esp = module(
            ScriptedSerial::new(128)
                .on("AT+CIPSTART", &["\r\nERROR\r\nCLOSED\r\n"])
                .on("AT+CIPCLOSE", &["\r\nERROR\r\n"]),
        );
        let result = esp.send_tcp("10.0.0.1", 80, b"ping");
        assert_eq!(Status::from(&result), Status::Error);
        assert_eq!(
            esp.serial().sent(),
            vec!["AT+CIPSTART=\"TCP\",\"10.0.0.1\",80\r\n", "AT+CIPCLOSE\r\n"]
        );
    }

    #[test]
    fn missing_prompt_returns_announce_timeout() {
        let esp = module(
            ScriptedSerial::new(128)
                .on("AT+CIPSTART", &["CONNECT\r\n\r\nOK\r\n"])
                .on("AT+CIPCLOSE", &["CLOSED\r\n\r\nOK\r\n"]),
        );
        let result = esp.send_tcp("10.0.0.1", 80, b"ping");
        assert!(matches!(result, Err(WifiError::Timeout { timeout_ms: 5000, .. })));
        assert_eq!(esp.serial().sent().len(), 3);
    }

    #[test]
    fn close_failure_does_not_change_result() {
        let esp = module(
            ScriptedSerial::new(128)
                .on("AT+CIPSTART", &["CONNECT\r\n\r\nOK\r\n"])
                .on("AT+CIPSEND", &["\r\nOK\r\n> "]),
        );
        assert!(esp.send_tcp("10.0.0.1", 80, b"ping").is_ok());
    }

    #[test]
    fn empty_payload_is_rejected_before_announce() {
        let esp = module(healthy());
        let result = esp.send_tcp("10.0.0.1", 80, b"");
        assert!(matches!(result, Err(WifiError::InvalidArgument(_))));
        assert_eq!(esp.serial().sent().len(), 2);
    }
}
