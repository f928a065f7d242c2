//! AT command texts understood by the ESP-01 firmware.

use crate::buffer::BoundedBuf;
use crate::error::WifiError;

pub const PROBE: &str = "AT\r\n";
pub const STATION_MODE: &str = "AT+CWMODE=1\r\n";
pub const QUERY_ADDRESS: &str = "AT+CIFSR\r\n";
pub const CLOSE_SOCKET: &str = "AT+CIPCLOSE\r\n";

/// `AT+CWJAP="<ssid>","<password>"`, with the firmware's backslash escaping.
pub fn join(ssid: &str, password: &str, capacity: usize) -> Result<BoundedBuf, WifiError> {
    let mut cmd = BoundedBuf::new(capacity, "join command");
    cmd.push_str("AT+CWJAP=\"")?;
    push_escaped(&mut cmd, ssid)?;
    cmd.push_str("\",\"")?;
    push_escaped(&mut cmd, password)?;
    cmd.push_str("\"\r\n")?;
    Ok(cmd)
}

/// `AT+CIPSTART="TCP","<host>",<port>`.
pub fn open_tcp(host: &str, port: u16, capacity: usize) -> Result<BoundedBuf, WifiError> {
    let mut cmd = BoundedBuf::new(capacity, "socket-open command");
    cmd.push_fmt(format_args!("AT+CIPSTART=\"TCP\",\"{host}\",{port}\r\n"))?;
    Ok(cmd)
}

/// `AT+CIPSEND=<len>`.
pub fn announce(len: usize, capacity: usize) -> Result<BoundedBuf, WifiError> {
    let mut cmd = BoundedBuf::new(capacity, "send-size command");
    cmd.push_fmt(format_args!("AT+CIPSEND={len}\r\n"))?;
    Ok(cmd)
}

fn push_escaped(cmd: &mut BoundedBuf, value: &str) -> Result<(), WifiError> {
    for ch in value.chars() {
        if matches!(ch, '"' | ',' | '\\') {
            cmd.push_str("\\")?;
        }
        let mut utf8 = [0u8; 4];
        cmd.push_str(ch.encode_utf8(&mut utf8))?;
    }
    Ok(())
}
