//! Local event listener registry backing `on` / `once` / `removeListener`.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value as JsonValue;

use crate::traits::Listener;

struct Entry {
    event: String,
    listener: Listener,
    once: bool,
}

#[derive(Default)]
pub struct ListenerRegistry {
    entries: RefCell<Vec<Entry>>,
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, listener: Listener) {
        self.add(event, listener, false);
    }

    pub fn once(&self, event: &str, listener: Listener) {
        self.add(event, listener, true);
    }

    fn add(&self, event: &str, listener: Listener, once: bool) {
        self.entries.borrow_mut().push(Entry {
            event: event.to_string(),
            listener,
            once,
        });
    }

    pub fn remove_all(&self, event: Option<&str>) {
        match event {
            Some(event) => self.entries.borrow_mut().retain(|entry| entry.event != event),
            None => self.entries.borrow_mut().clear(),
        }
    }

    /// Removes the first registration of `listener` for `event`.
    pub fn remove(&self, event: &str, listener: &Listener) {
        let mut entries = self.entries.borrow_mut();
        if let Some(index) = entries
            .iter()
            .position(|entry| entry.event == event && same_listener(&entry.listener, listener))
        {
            entries.remove(index);
        }
    }

    pub fn count(&self, event: Option<&str>) -> usize {
        let entries = self.entries.borrow();
        match event {
            Some(event) => entries.iter().filter(|entry| entry.event == event).count(),
            None => entries.len(),
        }
    }

    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.event == event)
            .map(|entry| entry.listener.clone())
            .collect()
    }

    /// Calls every listener for `event`; `once` registrations are dropped first.
    /// Returns whether anything was listening.
    pub fn emit(&self, event: &str, payload: &JsonValue) -> bool {
        let listeners: Vec<Listener> = {
            let mut entries = self.entries.borrow_mut();
            let listeners = entries
                .iter()
                .filter(|entry| entry.event == event)
                .map(|entry| entry.listener.clone())
                .collect();
            entries.retain(|entry| !(entry.once && entry.event == event));
            listeners
        };
        for listener in &listeners {
            listener(payload);
        }
        !listeners.is_empty()
    }
}
