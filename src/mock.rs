//! Test doubles for the external collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use core::convert::Infallible;

use embassy_time::{Duration, Instant};
use embedded_io_async::{ErrorType, Read, ReadReady, Write};

use crate::clock::Clock;
use crate::pipeline::{Barcode, Camera, CameraMode, Classification, Detector};
use crate::power::WakeSignal;

/// Manually advanced clock shared between the code under test and its fakes.
#[derive(Clone)]
pub struct MockClock {
    now: Rc<Cell<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::from_ticks(0))),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get() - Instant::from_ticks(0)
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    async fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

/// What the fake modem answers to the next flushed write.
#[derive(Clone, Copy)]
pub enum Reply {
    /// A response line, framed as the modem does with echo off
    Line(&'static str),
    /// Bytes exactly as given
    Raw(&'static str),
    /// Bytes delivered once the clock has advanced by the given delay
    Delayed(Duration, &'static str),
    /// Nothing at all
    Silent,
}

struct ModemState {
    replies: VecDeque<Reply>,
    pending: Vec<u8>,
    rx: VecDeque<(Instant, u8)>,
    written: Vec<String>,
    written_bytes: Vec<Vec<u8>>,
}

/// Scripted modem: every flush records what was written and queues the next
/// scripted reply.
#[derive(Clone)]
pub struct MockModem {
    state: Rc<RefCell<ModemState>>,
    clock: MockClock,
}

impl MockModem {
    pub fn new(clock: &MockClock, replies: &[Reply]) -> Self {
        Self {
            state: Rc::new(RefCell::new(ModemState {
                replies: replies.iter().cloned().collect(),
                pending: Vec::new(),
                rx: VecDeque::new(),
                written: Vec::new(),
                written_bytes: Vec::new(),
            })),
            clock: clock.clone(),
        }
    }

    pub fn push_replies(&self, replies: &[Reply]) {
        self.state.borrow_mut().replies.extend(replies.iter().cloned());
    }

    /// Every flushed write, with line terminators stripped.
    pub fn written(&self) -> Vec<String> {
        self.state.borrow().written.clone()
    }

    /// Every flushed write, byte for byte.
    pub fn written_bytes(&self) -> Vec<Vec<u8>> {
        self.state.borrow().written_bytes.clone()
    }

    /// Flushed writes that were AT commands.
    pub fn commands(&self) -> Vec<String> {
        self.written()
            .into_iter()
            .filter(|w| w.starts_with("AT"))
            .collect()
    }

    pub fn remaining_replies(&self) -> usize {
        self.state.borrow().replies.len()
    }

    fn deliver(&self, at: Instant, text: &str) {
        let mut state = self.state.borrow_mut();
        state.rx.extend(text.bytes().map(|b| (at, b)));
    }
}

impl ErrorType for MockModem {
    type Error = Infallible;
}

impl Read for MockModem {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let now = self.clock.now();
        let mut state = self.state.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match state.rx.front() {
                Some(&(at, byte)) if at <= now => {
                    buf[n] = byte;
                    state.rx.pop_front();
                    n += 1;
                }
                _ => break,
            }
        }
        Ok(n)
    }
}

impl ReadReady for MockModem {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let now = self.clock.now();
        Ok(matches!(self.state.borrow().rx.front(), Some(&(at, _)) if at <= now))
    }
}

impl Write for MockModem {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.state.borrow_mut().pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        let reply = {
            let mut state = self.state.borrow_mut();
            let pending = core::mem::take(&mut state.pending);
            let text = String::from_utf8_lossy(&pending)
                .trim_end_matches(&['\r', '\n'][..])
                .to_string();
            state.written.push(text);
            state.written_bytes.push(pending);
            state.replies.pop_front()
        };

        let now = self.clock.now();
        match reply {
            Some(Reply::Line(line)) => self.deliver(now, &std::format!("\r\n{}\r\n", line)),
            Some(Reply::Raw(raw)) => self.deliver(now, raw),
            Some(Reply::Delayed(delay, raw)) => self.deliver(now + delay, raw),
            Some(Reply::Silent) | None => {}
        }
        Ok(())
    }
}

/// LED that remembers every state change.
#[derive(Clone, Default)]
pub struct MockLed {
    log: Rc<RefCell<Vec<bool>>>,
}

impl MockLed {
    pub fn transitions(&self) -> Vec<bool> {
        self.log.borrow().clone()
    }

    pub fn is_on(&self) -> bool {
        self.log.borrow().last().copied().unwrap_or(false)
    }
}

impl embedded_hal::digital::ErrorType for MockLed {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for MockLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(true);
        Ok(())
    }
}

/// Wake source that fires immediately and counts how often it was awaited.
#[derive(Clone, Default)]
pub struct MockWake {
    pub waits: Rc<Cell<usize>>,
}

impl WakeSignal for MockWake {
    async fn wait_for_wake(&mut self) {
        self.waits.set(self.waits.get() + 1);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockFrame {
    pub mode: CameraMode,
    pub index: usize,
}

#[derive(Default)]
pub struct CameraLog {
    pub modes: Vec<CameraMode>,
    pub captures: usize,
    pub shutdowns: usize,
}

/// Camera whose every capture costs `frame_time` on the shared clock.
#[derive(Clone)]
pub struct MockCamera {
    pub log: Rc<RefCell<CameraLog>>,
    clock: MockClock,
    frame_time: Duration,
    mode: CameraMode,
    image: Vec<u8>,
}

impl MockCamera {
    pub fn new(clock: &MockClock, frame_time: Duration, image: Vec<u8>) -> Self {
        Self {
            log: Rc::new(RefCell::new(CameraLog::default())),
            clock: clock.clone(),
            frame_time,
            mode: CameraMode::Barcode,
            image,
        }
    }
}

impl Camera for MockCamera {
    type Frame = MockFrame;
    type Error = Infallible;

    async fn set_mode(&mut self, mode: CameraMode) -> Result<(), Self::Error> {
        self.mode = mode;
        self.log.borrow_mut().modes.push(mode);
        Ok(())
    }

    async fn capture(&mut self) -> Result<Self::Frame, Self::Error> {
        self.clock.advance(self.frame_time);
        let mut log = self.log.borrow_mut();
        log.captures += 1;
        Ok(MockFrame {
            mode: self.mode,
            index: log.captures,
        })
    }

    fn compress(&mut self, _frame: &Self::Frame, _quality: u8) -> Result<Vec<u8>, Self::Error> {
        Ok(self.image.clone())
    }

    async fn shutdown(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().shutdowns += 1;
        Ok(())
    }
}

/// Detector answering from scripted queues, empty queues mean nothing found.
#[derive(Clone, Default)]
pub struct MockDetector {
    pub barcodes: Rc<RefCell<VecDeque<Vec<Barcode>>>>,
    pub classifications: Rc<RefCell<VecDeque<Vec<Classification>>>>,
}

impl MockDetector {
    pub fn with_barcode(self, barcode: Barcode) -> Self {
        self.barcodes.borrow_mut().push_back(std::vec![barcode]);
        self
    }

    pub fn with_classification(self, label: &str, confidence: f32) -> Self {
        self.classifications
            .borrow_mut()
            .push_back(std::vec![Classification {
                label: label.into(),
                confidence,
            }]);
        self
    }
}

impl Detector<MockFrame> for MockDetector {
    fn scan_barcodes(&mut self, _frame: &MockFrame) -> Vec<Barcode> {
        self.barcodes.borrow_mut().pop_front().unwrap_or_default()
    }

    fn classify(&mut self, _frame: &MockFrame) -> Vec<Classification> {
        self.classifications
            .borrow_mut()
            .pop_front()
            .unwrap_or_default()
    }
}
