//! Interrupt-fed double buffer.
//!
//! # Design
//! The hardware side fills the *primary* buffer; on an idle-line event the
//! completed frame is copied into the *shadow* buffer, terminated, and the
//! primary buffer is zeroed and re-armed so reception never stalls. The
//! caller side only ever reads the shadow buffer.
//!
//! Each frame overwrites the previous one wholesale. A response split across
//! several idle-delimited frames is never reassembled, so a token straddling
//! two frames will not be seen. Callers rely on the one-command-in-flight
//! discipline to consume each frame before the next exchange starts.
//!
//! Both buffers sit behind one critical-section mutex. Every hold is a bounded
//! copy and no caller code runs inside one, so an idle interrupt either waits
//! out a copy that masks it or runs entirely before or after it. Readers copy
//! the frame out and examine the copy.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

struct Buffers {
    primary: Box<[u8]>,
    cursor: usize,
    shadow: Box<[u8]>,
    len: usize,
}

impl Buffers {
    fn frame(&self) -> String {
        String::from_utf8_lossy(&self.shadow[..self.len]).into_owned()
    }
}

pub struct FrameReceiver {
    capacity: usize,
    buffers: Mutex<CriticalSectionRawMutex, RefCell<Buffers>>,
    rx_size: AtomicUsize,
    response_ready: AtomicBool,
    tx_busy: AtomicBool,
}

impl FrameReceiver {
    /// `capacity` includes the terminator, so frames carry at most
    /// `capacity - 1` bytes. Capacities below 2 are raised to 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            buffers: Mutex::new(RefCell::new(Buffers {
                primary: vec![0; capacity].into_boxed_slice(),
                cursor: 0,
                shadow: vec![0; capacity].into_boxed_slice(),
                len: 0,
            })),
            rx_size: AtomicUsize::new(0),
            response_ready: AtomicBool::new(false),
            tx_busy: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // -----------------------------------------------------------------------
    // Interrupt side
    // -----------------------------------------------------------------------

    /// Deposit received bytes into the primary buffer, as the receive DMA or
    /// per-byte interrupt would. Bytes beyond capacity are dropped; returns
    /// how many were accepted.
    pub fn write_primary(&self, bytes: &[u8]) -> usize {
        self.buffers.lock(|cell| {
            let mut b = cell.borrow_mut();
            let free = self.capacity - b.cursor;
            let accepted = bytes.len().min(free);
            let start = b.cursor;
            b.primary[start..start + accepted].copy_from_slice(&bytes[..accepted]);
            b.cursor += accepted;
            accepted
        })
    }

    /// Idle-line event carrying the number of bytes received since the last
    /// event. Counts above `capacity - 1` are clamped.
    pub fn on_receive_idle(&self, byte_count: usize) {
        let len = byte_count.min(self.capacity - 1);
        self.buffers.lock(|cell| {
            let mut guard = cell.borrow_mut();
            let b = &mut *guard;
            b.shadow[..len].copy_from_slice(&b.primary[..len]);
            b.shadow[len] = 0;
            b.len = len;
            self.rx_size.store(len, Ordering::Release);
            self.response_ready.store(true, Ordering::Release);

            b.primary.fill(0);
            b.cursor = 0;
        });
    }

    pub fn on_transmit_complete(&self) {
        self.tx_busy.store(false, Ordering::Release);
    }

    // -----------------------------------------------------------------------
    // Caller side
    // -----------------------------------------------------------------------

    /// Claim the transmitter. Returns `false` if a transmission is in flight.
    pub fn try_begin_transmit(&self) -> bool {
        self.tx_busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn transmit_busy(&self) -> bool {
        self.tx_busy.load(Ordering::Acquire)
    }

    /// Release the transmitter without a completion event, used when the
    /// platform refused to start the transmission.
    pub(crate) fn abort_transmit(&self) {
        self.tx_busy.store(false, Ordering::Release);
    }

    pub fn response_ready(&self) -> bool {
        self.response_ready.load(Ordering::Acquire)
    }

    pub fn clear_ready(&self) {
        self.response_ready.store(false, Ordering::Release);
    }

    /// Drop the ready flag and the current shadow frame.
    pub fn reset_response(&self) {
        self.buffers.lock(|cell| {
            let mut b = cell.borrow_mut();
            self.response_ready.store(false, Ordering::Release);
            b.shadow.fill(0);
            b.len = 0;
            self.rx_size.store(0, Ordering::Release);
        });
    }

    /// Length of the current shadow frame.
    pub fn rx_size(&self) -> usize {
        self.rx_size.load(Ordering::Acquire)
    }

    /// Run `f` over a copy of the current shadow frame. Frames published
    /// while `f` runs do not disturb it.
    pub fn with_frame<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let text = self.frame_text();
        f(&text)
    }

    /// Consume the ready frame, if any. Copying the frame and clearing the
    /// ready flag happen in one critical section, so a frame published
    /// concurrently is never marked consumed unseen.
    pub fn take_frame(&self) -> Option<String> {
        self.buffers.lock(|cell| {
            if !self.response_ready.swap(false, Ordering::AcqRel) {
                return None;
            }
            Some(cell.borrow().frame())
        })
    }

    pub fn frame_text(&self) -> String {
        self.buffers.lock(|cell| cell.borrow().frame())
    }

    pub fn frame_contains(&self, needle: &str) -> bool {
        self.with_frame(|text| text.contains(needle))
    }
}

impl std::fmt::Debug for FrameReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReceiver")
            .field("capacity", &self.capacity)
            .field("rx_size", &self.rx_size())
            .field("response_ready", &self.response_ready())
            .field("tx_busy", &self.transmit_busy())
            .finish()
    }
}
