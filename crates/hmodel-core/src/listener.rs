#![forbid(unsafe_code)]

//! Registration lists for change listeners.
//!
//! [`ListenerList`] stores boxed callbacks keyed by a [`ListenerId`] handed
//! out at registration. Listeners are invoked in registration order; there is
//! no other ordering promise.

use std::fmt;

/// Handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Get the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

type Listener<M> = Box<dyn FnMut(&M)>;

/// Ordered list of listeners receiving messages of type `M`.
pub struct ListenerList<M> {
    next_id: u64,
    entries: Vec<(ListenerId, Listener<M>)>,
}

impl<M> Default for ListenerList<M> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }
}

impl<M> fmt::Debug for ListenerList<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field(
                "ids",
                &self.entries.iter().map(|(id, _)| id.0).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<M> ListenerList<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; returns the handle used to remove it.
    pub fn register(&mut self, listener: impl FnMut(&M) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` when `id` is not registered.
    pub fn deregister(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    #[must_use]
    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver `message` to every listener in registration order.
    pub fn notify(&mut self, message: &M) {
        for (_, listener) in &mut self.entries {
            listener(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn notifies_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = ListenerList::<u32>::new();
        let first = Rc::clone(&log);
        list.register(move |m| first.borrow_mut().push(("first", *m)));
        let second = Rc::clone(&log);
        list.register(move |m| second.borrow_mut().push(("second", *m)));

        list.notify(&7);
        assert_eq!(*log.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn deregister_stops_delivery() {
        let count = Rc::new(RefCell::new(0));
        let mut list = ListenerList::<()>::new();
        let counter = Rc::clone(&count);
        let id = list.register(move |_| *counter.borrow_mut() += 1);
        list.notify(&());
        assert!(list.deregister(id));
        assert!(!list.deregister(id));
        list.notify(&());
        assert_eq!(*count.borrow(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let mut list = ListenerList::<()>::new();
        let a = list.register(|_| {});
        let b = list.register(|_| {});
        assert_ne!(a, b);
        assert!(list.contains(a) && list.contains(b));
        assert_eq!(list.len(), 2);
    }
}
