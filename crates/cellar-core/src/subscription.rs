use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::scope::Dispose;

pub type SubId = usize;

/// Anything a subscription can detach itself from.
pub(crate) trait Detach {
    fn detach(&self, id: SubId) -> bool;
    fn is_attached(&self, id: SubId) -> bool;
}

/// Handle returned by every `subscribe`.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`]
/// (or hand it to a scope through [`Subscription::into_dispose`]).
#[derive(Clone)]
pub struct Subscription {
    id: SubId,
    source: Weak<dyn Detach>,
    detached: Rc<Cell<bool>>,
}

impl Subscription {
    pub(crate) fn new(id: SubId, source: Weak<dyn Detach>) -> Self {
        Self {
            id,
            source,
            detached: Rc::new(Cell::new(false)),
        }
    }

    pub fn id(&self) -> SubId {
        self.id
    }

    /// Detaches the callback. Safe to call more than once, and from inside
    /// the callback itself.
    pub fn unsubscribe(&self) {
        if self.detached.replace(true) {
            return;
        }
        if let Some(source) = self.source.upgrade() {
            source.detach(self.id);
        }
    }

    /// False once unsubscribed, or once the cell it listens to was closed or dropped.
    pub fn is_active(&self) -> bool {
        !self.detached.get()
            && self
                .source
                .upgrade()
                .is_some_and(|source| source.is_attached(self.id))
    }

    pub fn into_dispose(self) -> Dispose {
        Dispose::new(move || self.unsubscribe())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
