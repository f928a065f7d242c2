//! Scripted serial line and virtual clock for unit tests.
//!
//! `ScriptedSerial` answers each transmission synchronously from inside
//! `start_transmit`, the way a fast interrupt would preempt the caller:
//! transmit-complete first, then one reply frame. `ManualClock` advances only
//! when slept on, so timeouts cost no wall time.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::SerialError;
use crate::frame::FrameReceiver;
use crate::platform::{Clock, Serial};

struct Rule {
    prefix: String,
    replies: VecDeque<String>,
}

impl Rule {
    /// Next reply; the last one repeats forever.
    fn next(&mut self) -> Option<String> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

pub(crate) struct ScriptedSerial {
    rx: Arc<FrameReceiver>,
    rules: RefCell<Vec<Rule>>,
    payload: RefCell<Option<Rule>>,
    sent: RefCell<Vec<String>>,
    hold_tx: bool,
    fail_tx: bool,
    arms: Cell<u32>,
}

impl ScriptedSerial {
    pub(crate) fn new(rx_capacity: usize) -> Self {
        Self {
            rx: Arc::new(FrameReceiver::new(rx_capacity)),
            rules: RefCell::new(Vec::new()),
            payload: RefCell::new(None),
            sent: RefCell::new(Vec::new()),
            hold_tx: false,
            fail_tx: false,
            arms: Cell::new(0),
        }
    }

    /// Reply to commands starting with `prefix`. An empty reply is silence.
    pub(crate) fn on(self, prefix: &str, replies: &[&str]) -> Self {
        self.rules.borrow_mut().push(Rule {
            prefix: prefix.to_string(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    /// Reply to transmissions that are not AT commands.
    pub(crate) fn on_payload(self, replies: &[&str]) -> Self {
        *self.payload.borrow_mut() = Some(Rule {
            prefix: String::new(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    /// Never raise transmit-complete.
    pub(crate) fn hold_transmit_complete(mut self) -> Self {
        self.hold_tx = true;
        self
    }

    pub(crate) fn fail_transmit(mut self) -> Self {
        self.fail_tx = true;
        self
    }

    pub(crate) fn receiver(&self) -> Arc<FrameReceiver> {
        Arc::clone(&self.rx)
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }

    pub(crate) fn receive_armed(&self) -> bool {
        self.arms.get() > 0
    }

    pub(crate) fn arm_count(&self) -> u32 {
        self.arms.get()
    }

    fn reply_for(&self, text: &str) -> Option<String> {
        if text.starts_with("AT") {
            let mut rules = self.rules.borrow_mut();
            rules
                .iter_mut()
                .find(|rule| text.starts_with(&rule.prefix))
                .and_then(Rule::next)
        } else {
            self.payload.borrow_mut().as_mut().and_then(Rule::next)
        }
    }
}

impl Serial for ScriptedSerial {
    fn start_transmit(&self, bytes: &[u8]) -> Result<(), SerialError> {
        if self.fail_tx {
            return Err(SerialError("line fault".to_string()));
        }
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.sent.borrow_mut().push(text.clone());
        if !self.hold_tx {
            self.rx.on_transmit_complete();
        }
        if let Some(reply) = self.reply_for(&text).filter(|r| !r.is_empty()) {
            let n = self.rx.write_primary(reply.as_bytes());
            self.rx.on_receive_idle(n);
        }
        Ok(())
    }

    fn start_receive(&self) -> Result<(), SerialError> {
        self.arms.set(self.arms.get() + 1);
        Ok(())
    }
}

type Event = Box<dyn FnOnce()>;

#[derive(Default)]
pub(crate) struct ManualClock {
    now: Cell<u64>,
    events: RefCell<Vec<(u64, Event)>>,
    sleeps: RefCell<Vec<u64>>,
}

impl ManualClock {
    /// Run `f` once virtual time reaches `ms`.
    pub(crate) fn at(&self, ms: u64, f: impl FnOnce() + 'static) {
        self.events.borrow_mut().push((ms, Box::new(f)));
    }

    /// Every sleep longer than one poll interval, in order.
    pub(crate) fn long_sleeps(&self) -> Vec<u64> {
        self.sleeps.borrow().iter().copied().filter(|&ms| ms > 1).collect()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u64) {
        self.sleeps.borrow_mut().push(ms);
        let now = self.now.get() + ms;
        self.now.set(now);
        let due: Vec<Event> = {
            let mut events = self.events.borrow_mut();
            let mut due = Vec::new();
            let mut i = 0;
            while i < events.len() {
                if events[i].0 <= now {
                    due.push(events.remove(i).1);
                } else {
                    i += 1;
                }
            }
            due
        };
        for event in due {
            event();
        }
    }
}
