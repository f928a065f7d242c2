//! Capacity-checked byte buffer for commands and requests.
//!
//! Appends fail as a whole instead of truncating, so a command or request is
//! either complete or never transmitted.

use std::fmt;

use crate::error::WifiError;

#[derive(Debug, Clone)]
pub struct BoundedBuf {
    bytes: Vec<u8>,
    capacity: usize,
    what: &'static str,
}

impl BoundedBuf {
    /// `what` names the buffer in overflow errors.
    pub fn new(capacity: usize, what: &'static str) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
            what,
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), WifiError> {
        if bytes.len() > self.remaining() {
            return Err(self.overflow());
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    pub fn push_str(&mut self, s: &str) -> Result<(), WifiError> {
        self.push_bytes(s.as_bytes())
    }

    /// Append formatted text; on overflow nothing from this call is kept.
    pub fn push_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), WifiError> {
        let mark = self.bytes.len();
        if fmt::Write::write_fmt(self, args).is_err() {
            self.bytes.truncate(mark);
            return Err(self.overflow());
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn overflow(&self) -> WifiError {
        WifiError::Overflow {
            what: self.what,
            capacity: self.capacity,
        }
    }
}

impl fmt::Write for BoundedBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if s.len() > self.remaining() {
            return Err(fmt::Error);
        }
        self.bytes.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_to_exact_capacity() {
        let mut buf = BoundedBuf::new(4, "test");
        buf.push_str("ab").unwrap();
        buf.push_str("cd").unwrap();
        assert_eq!(buf.as_bytes(), b"abcd");
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn overflow_keeps_previous_contents() {
        let mut buf = BoundedBuf::new(4, "test");
        buf.push_str("ab").unwrap();
        let err = buf.push_str("cde").unwrap_err();
        assert!(matches!(err, WifiError::Overflow { what: "test", capacity: 4 }));
        assert_eq!(buf.as_bytes(), b"ab");
    }

    #[test]
    fn formatted_overflow_rolls_back_partial_write() {
        let mut buf = BoundedBuf::new(8, "cmd");
        buf.push_str("AT").unwrap();
        let err = buf.push_fmt(format_args!("+{}={}", "CIPSEND", 1024)).unwrap_err();
        assert!(matches!(err, WifiError::Overflow { .. }));
        assert_eq!(buf.as_bytes(), b"AT");
    }
}
