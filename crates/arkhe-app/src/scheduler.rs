//! Frame scheduling seam between controllers and whatever drives the host's
//! frames.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::Serialize;

/// Deferred work for the next frame.
pub type FrameCallback = Box<dyn FnOnce()>;

/// Handle returned by [`FrameScheduler::request_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameRequestId(u64);

impl FrameRequestId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Queues callbacks to run on a future frame, like a browser's
/// `requestAnimationFrame`.
pub trait FrameScheduler {
    fn request_frame(&self, callback: FrameCallback) -> FrameRequestId;

    /// Returns whether a still-pending request was removed.
    fn cancel_frame(&self, id: FrameRequestId) -> bool;
}

/// Cooperative scheduler that runs callbacks only when the host calls
/// [`ManualScheduler::run_frame`].
///
/// A callback requested while a round is running waits for the next round.
/// A callback cancelled while its round is running is skipped.
#[derive(Default)]
pub struct ManualScheduler {
    next_id: Cell<u64>,
    queue: RefCell<VecDeque<(FrameRequestId, FrameCallback)>>,
    in_flight: RefCell<HashSet<FrameRequestId>>,
    rounds: Cell<u64>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .field("rounds", &self.rounds.get())
            .finish()
    }
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one frame's worth of callbacks. Returns how many ran.
    pub fn run_frame(&self) -> usize {
        let batch: Vec<_> = self.queue.borrow_mut().drain(..).collect();
        *self.in_flight.borrow_mut() = batch.iter().map(|(id, _)| *id).collect();
        let mut ran = 0;
        for (id, callback) in batch {
            let live = self.in_flight.borrow_mut().remove(&id);
            if live {
                callback();
                ran += 1;
            }
        }
        self.in_flight.borrow_mut().clear();
        self.rounds.set(self.rounds.get() + 1);
        ran
    }

    /// Run `frames` rounds, returning the total number of callbacks run.
    pub fn run_frames(&self, frames: usize) -> usize {
        (0..frames).map(|_| self.run_frame()).sum()
    }

    /// Requests waiting for the next round.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Rounds run so far.
    #[must_use]
    pub fn rounds(&self) -> u64 {
        self.rounds.get()
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&self, callback: FrameCallback) -> FrameRequestId {
        let id = FrameRequestId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.queue.borrow_mut().push_back((id, callback));
        id
    }

    fn cancel_frame(&self, id: FrameRequestId) -> bool {
        if self.in_flight.borrow_mut().remove(&id) {
            return true;
        }
        let mut queue = self.queue.borrow_mut();
        match queue.iter().position(|(queued, _)| *queued == id) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        }
    }
}
