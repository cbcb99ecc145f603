//! Plain callback lists for core events.
//!
//! The core stays headless: memory-changed notifications and
//! simulation-lifecycle events go through these lists rather than any
//! signal/slot framework. Subscribers are boxed closures invoked in
//! subscription order.

/// A list of subscribers to one event kind.
pub struct Listeners<T> {
    callbacks: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> Listeners<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a subscriber.
    pub fn subscribe(&mut self, callback: impl FnMut(&T) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Deliver an event to every subscriber.
    pub fn emit(&mut self, event: &T) {
        for callback in &mut self.callbacks {
            callback(event);
        }
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_see_events_in_order() {
        let mut listeners: Listeners<u16> = Listeners::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        listeners.subscribe(move |value| sink.borrow_mut().push(*value * 2));
        let sink = Rc::clone(&seen);
        listeners.subscribe(move |value| sink.borrow_mut().push(*value));

        listeners.emit(&21);
        assert_eq!(*seen.borrow(), vec![42, 21]);
    }
}
