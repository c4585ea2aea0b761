use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use super::input::RawInputEvent;
use super::rendering::PixelBuffer;
use super::scheduler::{Clock, FrameHost, FrameRequestId};

/// Source of raw device events, drained once per frame.
pub trait InputSource {
    fn drain(&mut self) -> Vec<RawInputEvent>;
}

/// The injected platform adapter. Fields are public so the runtime can
/// borrow them independently within one frame.
pub struct Platform<S> {
    pub surface: S,
    pub clock: Box<dyn Clock>,
    pub frames: Box<dyn FrameHost>,
    pub input: Box<dyn InputSource>,
}

#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now_ms: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: f64) {
        self.now_ms.set(now_ms);
    }

    pub fn advance(&self, delta_ms: f64) {
        self.now_ms.set(self.now_ms.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now_ms.get()
    }
}

#[derive(Debug, Default)]
struct FrameQueue {
    next_id: u64,
    pending: Vec<FrameRequestId>,
}

/// Records frame requests instead of scheduling them; the driver decides
/// when each callback fires. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct QueuedFrames {
    queue: Rc<RefCell<FrameQueue>>,
}

impl QueuedFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<FrameRequestId> {
        self.queue.borrow().pending.clone()
    }

    /// Removes and returns the oldest outstanding request.
    pub fn take_pending(&self) -> Option<FrameRequestId> {
        let mut queue = self.queue.borrow_mut();
        if queue.pending.is_empty() {
            None
        } else {
            Some(queue.pending.remove(0))
        }
    }
}

impl FrameHost for QueuedFrames {
    fn request_frame(&mut self) -> FrameRequestId {
        let mut queue = self.queue.borrow_mut();
        queue.next_id += 1;
        let request = FrameRequestId(queue.next_id);
        queue.pending.push(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequestId) {
        self.queue.borrow_mut().pending.retain(|id| *id != request);
    }
}

/// Pushed events wait here until the next frame drains them. Clones share
/// the same queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Rc<RefCell<VecDeque<RawInputEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: RawInputEvent) {
        self.events.borrow_mut().push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl InputSource for EventQueue {
    fn drain(&mut self) -> Vec<RawInputEvent> {
        self.events.borrow_mut().drain(..).collect()
    }
}

/// Handles kept by the caller of [`headless_platform`] to drive it.
#[derive(Debug, Clone)]
pub struct HeadlessControls {
    pub clock: ManualClock,
    pub frames: QueuedFrames,
    pub events: EventQueue,
}

/// A platform with no window: pixels land in a [`PixelBuffer`], time only
/// moves when told to, and frames fire only when driven.
pub fn headless_platform(width: u32, height: u32) -> (Platform<PixelBuffer>, HeadlessControls) {
    let controls = HeadlessControls {
        clock: ManualClock::new(0.0),
        frames: QueuedFrames::new(),
        events: EventQueue::new(),
    };
    let platform = Platform {
        surface: PixelBuffer::new(width, height),
        clock: Box::new(controls.clock.clone()),
        frames: Box::new(controls.frames.clone()),
        input: Box::new(controls.events.clone()),
    };
    (platform, controls)
}
