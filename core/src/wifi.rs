//! Station association and address retrieval.

use log::{debug, info, warn};

use crate::at;
use crate::client::Esp01;
use crate::error::WifiError;
use crate::platform::{Clock, Serial};
use crate::response::{station_address, Marker};

impl<S: Serial, C: Clock> Esp01<S, C> {
    /// Join `ssid` and fetch the station address.
    ///
    /// Succeeds only with a non-empty address: a join the module
    /// acknowledges but that yields no address is still a failure.
    pub fn connect(&self, ssid: &str, password: &str) -> Result<String, WifiError> {
        if ssid.is_empty() {
            return Err(WifiError::InvalidArgument("ssid must not be empty"));
        }
        let cmd = at::join(ssid, password, self.config.command_buffer_len)?;
        if let Err(e) = self
            .engine
            .issue(cmd.as_bytes(), Marker::Ok.token(), self.config.join_timeout_ms)
        {
            warn!("join {ssid:?} failed: {e}");
            return Err(WifiError::NotConnected {
                source: Box::new(e),
            });
        }
        match self.get_address() {
            Ok(address) => {
                info!("connected to {ssid:?}, address {address}");
                Ok(address)
            }
            Err(e) => {
                warn!("joined {ssid:?} but got no address: {e}");
                Err(WifiError::NoAddress)
            }
        }
    }

    /// Query the station address.
    ///
    /// While the module answers "busy p", sleeps `address_backoff_ms` and
    /// asks again. Each query has its own timeout; the number of retries is
    /// capped by `max_address_polls`, and unbounded when that is `None`.
    pub fn get_address(&self) -> Result<String, WifiError> {
        let busy = Marker::BusyProcessing.token();
        let mut polls: u32 = 0;
        loop {
            self.engine.issue_any(
                at::QUERY_ADDRESS.as_bytes(),
                &[busy, Marker::Ok.token()],
                self.config.address_timeout_ms,
            )?;
            let text = self.engine.last_response();
            if !Marker::BusyProcessing.found_in(&text) {
                return station_address(&text)
                    .map(str::to_owned)
                    .ok_or(WifiError::NoAddress);
            }

            polls += 1;
            if let Some(max) = self.config.max_address_polls {
                if polls > max {
                    return Err(WifiError::Timeout {
                        waiting_for: "non-busy address reply".to_string(),
                        timeout_ms: self.config.address_timeout_ms,
                    });
                }
            }
            debug!("module busy, retrying address query ({polls})");
            self.engine.sleep_ms(self.config.address_backoff_ms);
        }
    }
}
