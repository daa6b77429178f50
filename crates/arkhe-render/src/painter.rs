use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::surface::{DrawCommand, DrawingSurface};

/// Collects projected draw commands and flushes them back to front.
///
/// Commands at equal depth keep submission order.
#[derive(Debug, Default)]
pub struct DepthQueue {
    items: Vec<(OrderedFloat<f32>, u32, DrawCommand)>,
    next_seq: u32,
}

impl DepthQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, depth: f32, command: DrawCommand) {
        let depth = if depth.is_nan() { f32::MAX } else { depth };
        self.items.push((OrderedFloat(depth), self.next_seq, command));
        self.next_seq = self.next_seq.wrapping_add(1);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Submit every queued command, farthest first, and empty the queue.
    /// Returns the number of commands submitted.
    pub fn flush(&mut self, surface: &mut dyn DrawingSurface) -> usize {
        self.items.sort_by_key(|(depth, seq, _)| (Reverse(*depth), *seq));
        let submitted = self.items.len();
        for (_, _, command) in self.items.drain(..) {
            surface.submit(command);
        }
        self.next_seq = 0;
        submitted
    }
}
