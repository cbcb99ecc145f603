//! Interrupt channel dispatch.
//!
//! Breakpoints and other asynchronous conditions are delivered through
//! named channels. Raising a channel enqueues it; the owning executor
//! drains the queue at the end of each step, which is the only point at
//! which delivery is guaranteed to be observed. Handlers are looked up
//! at drain time, not enqueue time.

use std::collections::VecDeque;

/// The interrupt channels the execution core raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptChannel {
    /// The ISA program counter matched a breakpoint.
    BreakpointAsm,
    /// The current microcode line carries a breakpoint.
    BreakpointMicro,
}

/// Queued callback dispatch keyed by channel.
///
/// External observers register callbacks per channel; the executor that
/// owns the handler reacts to the channels `drain` returns, since its
/// own state cannot be captured in a callback.
#[derive(Default)]
pub struct InterruptHandler {
    handlers: Vec<(InterruptChannel, Box<dyn FnMut()>)>,
    queue: VecDeque<InterruptChannel>,
}

impl InterruptHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a channel. Multiple callbacks may be
    /// registered for the same channel; they run in registration order.
    pub fn register(&mut self, channel: InterruptChannel, handler: impl FnMut() + 'static) {
        self.handlers.push((channel, Box::new(handler)));
    }

    /// Queue a channel for delivery at the next drain.
    pub fn interrupt(&mut self, channel: InterruptChannel) {
        self.queue.push_back(channel);
    }

    /// Deliver a channel immediately, bypassing the queue.
    pub fn interrupt_now(&mut self, channel: InterruptChannel) {
        self.dispatch(channel);
    }

    /// Deliver every queued channel in FIFO order and return them so the
    /// owner can react as well.
    pub fn drain(&mut self) -> Vec<InterruptChannel> {
        let mut delivered = Vec::new();
        while let Some(channel) = self.queue.pop_front() {
            self.dispatch(channel);
            delivered.push(channel);
        }
        delivered
    }

    /// Discard queued channels without delivering them.
    pub fn clear_queued(&mut self) {
        self.queue.clear();
    }

    /// True if any channel is waiting for delivery.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    fn dispatch(&mut self, channel: InterruptChannel) {
        for (registered, handler) in &mut self.handlers {
            if *registered == channel {
                handler();
            }
        }
    }
}
