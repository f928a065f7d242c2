//! A simulated ESP-01 on the far side of the serial line.
//!
//! # Design
//! `SimModem` implements the core's `Serial` trait. `start_transmit` hands
//! the bytes to a worker thread and raises transmit-complete at once; the
//! worker plays the module firmware and publishes replies through the shared
//! [`FrameReceiver`] the way the UART idle interrupt would, one frame per
//! reply. Socket commands are bridged to real `std::net::TcpStream`s, with a
//! reader thread per socket turning received bytes into `+IPD` frames.
//!
//! All frame publication goes through one lock so frames from the worker and
//! a reader never interleave. Consecutive frames are spaced by `frame_gap_ms`
//! so a polling driver sees each of them.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use esp01_core::{FrameReceiver, Serial, SerialError};
use log::{debug, warn};

/// How the simulated module behaves.
#[derive(Debug, Clone)]
pub struct ModemProfile {
    /// Network that accepts the join.
    pub ssid: String,
    pub password: String,
    /// Address reported once joined.
    pub station_ip: String,
    /// Number of `AT+CIFSR` queries answered with "busy p..." before the
    /// real reply.
    pub busy_address_polls: u32,
    pub frame_gap_ms: u64,
    pub connect_timeout_ms: u64,
    /// `host:port` pairs redirected to a local address, so requests to a
    /// device-side address such as `192.168.1.200:80` reach a test server.
    pub routes: Vec<(String, u16, SocketAddr)>,
}

impl Default for ModemProfile {
    fn default() -> Self {
        Self {
            ssid: "Net".to_string(),
            password: "Pass".to_string(),
            station_ip: "192.168.1.42".to_string(),
            busy_address_polls: 0,
            frame_gap_ms: 5,
            connect_timeout_ms: 1000,
            routes: Vec::new(),
        }
    }
}

impl ModemProfile {
    pub fn route(mut self, host: &str, port: u16, to: SocketAddr) -> Self {
        self.routes.push((host.to_string(), port, to));
        self
    }

    fn resolve(&self, host: &str, port: u16) -> Option<SocketAddr> {
        if let Some((_, _, to)) = self.routes.iter().find(|(h, p, _)| h == host && *p == port) {
            return Some(*to);
        }
        (host, port).to_socket_addrs().ok()?.next()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The receive side of the UART as seen from the module.
struct Line {
    rx: Arc<FrameReceiver>,
    gap: Duration,
    publish: Mutex<()>,
}

impl Line {
    /// Publish `text` as one or more idle-delimited frames.
    fn emit(&self, text: &[u8]) {
        let _guard = lock(&self.publish);
        let max = self.rx.capacity() - 1;
        for chunk in text.chunks(max) {
            let n = self.rx.write_primary(chunk);
            self.rx.on_receive_idle(n);
            thread::sleep(self.gap);
        }
    }

    fn emit_str(&self, text: &str) {
        self.emit(text.as_bytes());
    }

    /// Largest payload that fits one `+IPD` frame with its header.
    fn ipd_chunk(&self) -> usize {
        self.rx.capacity().saturating_sub(1 + "\r\n+IPD,9999:".len()).max(1)
    }
}

/// The single TCP link, tagged so a reader thread can tell whether the link
/// it serves is still the current one.
#[derive(Default)]
struct Link {
    current: Mutex<Option<(u64, TcpStream)>>,
    next_id: AtomicU64,
}

pub struct SimModem {
    commands: Sender<Vec<u8>>,
    line: Arc<Line>,
    armed: AtomicBool,
    transcript: Arc<Mutex<Vec<String>>>,
}

impl SimModem {
    /// Start the firmware thread feeding `rx`.
    pub fn spawn(rx: Arc<FrameReceiver>, profile: ModemProfile) -> Self {
        let (commands, inbox) = mpsc::channel();
        let line = Arc::new(Line {
            rx,
            gap: Duration::from_millis(profile.frame_gap_ms),
            publish: Mutex::new(()),
        });
        let transcript = Arc::new(Mutex::new(Vec::new()));
        let firmware = Firmware {
            profile,
            line: Arc::clone(&line),
            link: Arc::new(Link::default()),
            transcript: Arc::clone(&transcript),
            joined: false,
            busy_left: 0,
            pending_send: None,
        };
        thread::spawn(move || firmware.run(inbox));
        Self {
            commands,
            line,
            armed: AtomicBool::new(false),
            transcript,
        }
    }

    /// Every AT command received so far, without its line ending.
    pub fn transcript(&self) -> Vec<String> {
        lock(&self.transcript).clone()
    }

    pub fn receive_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Publish an unsolicited frame, e.g. `WIFI DISCONNECT`.
    pub fn inject(&self, text: &str) {
        self.line.emit_str(text);
    }
}

impl Serial for SimModem {
    fn start_transmit(&self, bytes: &[u8]) -> Result<(), SerialError> {
        self.commands
            .send(bytes.to_vec())
            .map_err(|_| SerialError("simulated module has stopped".to_string()))?;
        self.line.rx.on_transmit_complete();
        Ok(())
    }

    fn start_receive(&self) -> Result<(), SerialError> {
        self.armed.store(true, Ordering::Release);
        Ok(())
    }
}

struct PendingSend {
    expected: usize,
    data: Vec<u8>,
}

struct Firmware {
    profile: ModemProfile,
    line: Arc<Line>,
    link: Arc<Link>,
    transcript: Arc<Mutex<Vec<String>>>,
    joined: bool,
    busy_left: u32,
    pending_send: Option<PendingSend>,
}

impl Firmware {
    fn run(mut self, inbox: Receiver<Vec<u8>>) {
        while let Ok(bytes) = inbox.recv() {
            if self.pending_send.is_some() {
                self.accept_payload(&bytes);
                continue;
            }
            let text = String::from_utf8_lossy(&bytes);
            let command = text.trim_end_matches(['\r', '\n']);
            lock(&self.transcript).push(command.to_string());
            debug!("modem <- {command}");
            let reply = self.handle(command);
            self.line.emit_str(&reply);
        }
        self.close_link();
    }

    fn handle(&mut self, command: &str) -> String {
        let ok = || "\r\nOK\r\n".to_string();
        let error = || "\r\nERROR\r\n".to_string();
        match command {
            "AT" | "AT+CWMODE=1" => ok(),
            "AT+CIFSR" => self.query_address(),
            "AT+CIPCLOSE" => {
                if self.close_link() {
                    "CLOSED\r\n\r\nOK\r\n".to_string()
                } else {
                    error()
                }
            }
            _ => {
                if let Some(args) = command.strip_prefix("AT+CWJAP=") {
                    self.join(args)
                } else if let Some(args) = command.strip_prefix("AT+CIPSTART=") {
                    self.open(args)
                } else if let Some(len) = command.strip_prefix("AT+CIPSEND=") {
                    self.announce(len)
                } else {
                    error()
                }
            }
        }
    }

    fn join(&mut self, args: &str) -> String {
        let fields = quoted_fields(args);
        let accepted = matches!(fields.as_slice(), [ssid, password]
            if *ssid == self.profile.ssid && *password == self.profile.password);
        self.joined = accepted;
        if accepted {
            self.busy_left = self.profile.busy_address_polls;
            "WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n".to_string()
        } else {
            "+CWJAP:1\r\n\r\nFAIL\r\n".to_string()
        }
    }

    fn query_address(&mut self) -> String {
        if self.busy_left > 0 {
            self.busy_left -= 1;
            return "busy p...\r\n".to_string();
        }
        let address = if self.joined {
            self.profile.station_ip.as_str()
        } else {
            "0.0.0.0"
        };
        format!("+CIFSR:STAIP,\"{address}\"\r\n+CIFSR:STAMAC,\"5c:cf:7f:00:00:01\"\r\n\r\nOK\r\n")
    }

    fn open(&mut self, args: &str) -> String {
        if !self.joined {
            return "\r\nERROR\r\n".to_string();
        }
        if lock(&self.link.current).is_some() {
            return "ALREADY CONNECTED\r\n\r\nERROR\r\n".to_string();
        }
        let fields = quoted_fields(args);
        let port = args.rsplit(',').next().and_then(|p| p.trim().parse::<u16>().ok());
        let (Some(host), Some(port)) = (fields.get(1), port) else {
            return "\r\nERROR\r\n".to_string();
        };
        let Some(addr) = self.profile.resolve(host, port) else {
            return "DNS Fail\r\n\r\nERROR\r\n".to_string();
        };
        let timeout = Duration::from_millis(self.profile.connect_timeout_ms);
        let stream = match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("modem: connect to {addr} failed: {e}");
                return "\r\nERROR\r\nCLOSED\r\n".to_string();
            }
        };
        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                warn!("modem: cannot clone socket: {e}");
                return "\r\nERROR\r\nCLOSED\r\n".to_string();
            }
        };
        let id = self.link.next_id.fetch_add(1, Ordering::Relaxed);
        *lock(&self.link.current) = Some((id, stream));

        let line = Arc::clone(&self.line);
        let link = Arc::clone(&self.link);
        thread::spawn(move || forward_incoming(id, reader, &line, &link));
        "CONNECT\r\n\r\nOK\r\n".to_string()
    }

    fn announce(&mut self, len: &str) -> String {
        let Ok(expected) = len.trim().parse::<usize>() else {
            return "\r\nERROR\r\n".to_string();
        };
        if expected == 0 || lock(&self.link.current).is_none() {
            return "link is not valid\r\n\r\nERROR\r\n".to_string();
        }
        self.pending_send = Some(PendingSend {
            expected,
            data: Vec::with_capacity(expected),
        });
        "\r\nOK\r\n> ".to_string()
    }

    fn accept_payload(&mut self, bytes: &[u8]) {
        let Some(pending) = self.pending_send.as_mut() else {
            return;
        };
        let wanted = pending.expected - pending.data.len();
        pending.data.extend_from_slice(&bytes[..bytes.len().min(wanted)]);
        if pending.data.len() < pending.expected {
            return;
        }
        let Some(PendingSend { expected, data }) = self.pending_send.take() else {
            return;
        };
        lock(&self.transcript).push(format!("<{expected} bytes>"));

        let mut current = lock(&self.link.current);
        match current.as_mut() {
            Some((_, stream)) => {
                // Report before forwarding so the peer's answer cannot overtake it.
                self.line
                    .emit_str(&format!("\r\nRecv {expected} bytes\r\n\r\nSEND OK\r\n"));
                if let Err(e) = stream.write_all(&data) {
                    warn!("modem: forwarding payload failed: {e}");
                }
            }
            None => self.line.emit_str("\r\nSEND FAIL\r\n"),
        }
    }

    /// Drop the current link; `false` if there was none.
    fn close_link(&self) -> bool {
        match lock(&self.link.current).take() {
            Some((_, stream)) => {
                let _ = stream.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }
}

/// Relay bytes from the peer as `+IPD` frames until either side closes. A
/// peer close is reported with `CLOSED`; a close requested by `AT+CIPCLOSE`
/// is reported by the command itself.
fn forward_incoming(id: u64, mut reader: TcpStream, line: &Line, link: &Link) {
    let mut buf = vec![0u8; line.ipd_chunk()];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut frame = format!("\r\n+IPD,{n}:").into_bytes();
                frame.extend_from_slice(&buf[..n]);
                line.emit(&frame);
            }
        }
    }
    let mut current = lock(&link.current);
    if matches!(current.as_ref(), Some((current_id, _)) if *current_id == id) {
        *current = None;
        drop(current);
        line.emit_str("CLOSED\r\n");
    }
}

/// Values of the double-quoted fields in an AT argument list, with the
/// firmware's backslash escapes removed.
fn quoted_fields(args: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = args.chars();
    while let Some(c) = chars.next() {
        if c != '"' {
            continue;
        }
        let mut field = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        field.push(escaped);
                    }
                }
                '"' => break,
                c => field.push(c),
            }
        }
        fields.push(field);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_fields_unescape() {
        assert_eq!(
            quoted_fields(r#""My \"Net\"","p\,w\\d""#),
            vec![r#"My "Net""#.to_string(), r"p,w\d".to_string()]
        );
        assert_eq!(
            quoted_fields(r#""TCP","192.168.1.200",80"#),
            vec!["TCP".to_string(), "192.168.1.200".to_string()]
        );
    }

    #[test]
    fn routes_take_precedence() {
        let to: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let profile = ModemProfile::default().route("192.168.1.200", 80, to);
        assert_eq!(profile.resolve("192.168.1.200", 80), Some(to));
        assert_eq!(
            profile.resolve("127.0.0.1", 81),
            Some("127.0.0.1:81".parse().unwrap())
        );
    }

    #[test]
    fn frames_are_split_to_capacity() {
        let rx = Arc::new(FrameReceiver::new(8));
        let line = Line {
            rx: Arc::clone(&rx),
            gap: Duration::ZERO,
            publish: Mutex::new(()),
        };
        line.emit_str("0123456789");
        assert_eq!(rx.frame_text(), "789");
        assert_eq!(line.ipd_chunk(), 1);
    }
}
