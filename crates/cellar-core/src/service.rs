//! The contract between remote cells and whatever pushes their values.
//!
//! A service keeps one [`Pusher`] per registration and calls it whenever the
//! value behind a token changes. Tokens are opaque to this crate; they do not
//! have to match the key a remote cell is stored under in a group.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Type-erased push function handed to a service on registration.
///
/// Two pushers compare equal only if they are clones of the same registration.
#[derive(Clone)]
pub struct Pusher(Rc<dyn Fn(&dyn Any)>);

impl Pusher {
    pub fn new(f: impl Fn(&dyn Any) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn push<V: Any>(&self, value: V) {
        (self.0)(&value)
    }

    pub fn push_any(&self, value: &dyn Any) {
        (self.0)(value)
    }

    pub fn same(&self, other: &Pusher) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl PartialEq for Pusher {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Pusher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pusher({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

pub trait StateService {
    fn register(&self, token: &str, pusher: Pusher);
    fn unregister(&self, token: &str, pusher: &Pusher);

    /// Synchronous pull, used by a connected remote cell that has not seen a
    /// push yet.
    fn current_state(&self, _token: &str) -> Option<Rc<dyn Any>> {
        None
    }
}

/// In-process service: remembers the last value per token and fans pushes
/// out to every registration.
#[derive(Default)]
pub struct MemoryService {
    registrations: RefCell<HashMap<String, Vec<Pusher>>>,
    latest: RefCell<HashMap<String, Rc<dyn Any>>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` as the current state of `token` and delivers it.
    /// Returns how many registrations received it.
    pub fn push<V: Any>(&self, token: &str, value: V) -> usize {
        let value: Rc<dyn Any> = Rc::new(value);
        self.latest
            .borrow_mut()
            .insert(token.to_string(), value.clone());
        let pushers = self
            .registrations
            .borrow()
            .get(token)
            .cloned()
            .unwrap_or_default();
        for pusher in &pushers {
            pusher.push_any(value.as_ref());
        }
        log::debug!("service push '{token}' -> {} registration(s)", pushers.len());
        pushers.len()
    }

    /// Sets the pull value for `token` without notifying anyone.
    pub fn seed<V: Any>(&self, token: &str, value: V) {
        self.latest
            .borrow_mut()
            .insert(token.to_string(), Rc::new(value));
    }

    pub fn registration_count(&self, token: &str) -> usize {
        self.registrations.borrow().get(token).map_or(0, Vec::len)
    }

    pub fn is_registered(&self, token: &str) -> bool {
        self.registration_count(token) > 0
    }

    pub fn tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .registrations
            .borrow()
            .iter()
            .filter(|(_, pushers)| !pushers.is_empty())
            .map(|(token, _)| token.clone())
            .collect();
        tokens.sort();
        tokens
    }
}

impl StateService for MemoryService {
    fn register(&self, token: &str, pusher: Pusher) {
        self.registrations
            .borrow_mut()
            .entry(token.to_string())
            .or_default()
            .push(pusher);
    }

    fn unregister(&self, token: &str, pusher: &Pusher) {
        let mut registrations = self.registrations.borrow_mut();
        if let Some(pushers) = registrations.get_mut(token) {
            pushers.retain(|p| !p.same(pusher));
            if pushers.is_empty() {
                registrations.remove(token);
            }
        }
    }

    fn current_state(&self, token: &str) -> Option<Rc<dyn Any>> {
        self.latest.borrow().get(token).cloned()
    }
}
