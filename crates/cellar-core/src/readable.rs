use std::fmt;
use std::rc::Rc;

use crate::cell::{Listener, StateCell};
use crate::error::StateResult;
use crate::remote::RemoteCell;
use crate::subscription::Subscription;

/// The read side shared by local cells, remote cells, and read-only views.
///
/// This is what the binding hooks accept.
pub trait ReadState {
    type Value: Clone + 'static;

    fn get(&self) -> Self::Value;
    fn subscribe_listener(&self, listener: Listener<Self::Value>) -> StateResult<Subscription>;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

impl<T: Clone + 'static> ReadState for StateCell<T> {
    type Value = T;

    fn get(&self) -> T {
        StateCell::get(self)
    }
    fn subscribe_listener(&self, listener: Listener<T>) -> StateResult<Subscription> {
        self.core().subscribe(listener)
    }
    fn close(&self) {
        StateCell::close(self)
    }
    fn is_closed(&self) -> bool {
        StateCell::is_closed(self)
    }
}

impl<T: Clone + 'static> ReadState for RemoteCell<T> {
    type Value = T;

    fn get(&self) -> T {
        RemoteCell::get(self)
    }
    fn subscribe_listener(&self, listener: Listener<T>) -> StateResult<Subscription> {
        self.core().subscribe(listener)
    }
    fn close(&self) {
        RemoteCell::close(self)
    }
    fn is_closed(&self) -> bool {
        RemoteCell::is_closed(self)
    }
}

enum Source<T: 'static> {
    Local(StateCell<T>),
    Remote(RemoteCell<T>),
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        match self {
            Source::Local(c) => Source::Local(c.clone()),
            Source::Remote(c) => Source::Remote(c.clone()),
        }
    }
}

/// A cell handle without `set`. Shares the underlying cell, so writes made
/// through the original handle are visible here.
pub struct ReadonlyCell<T: 'static> {
    source: Source<T>,
}

impl<T> Clone for ReadonlyCell<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: 'static> From<StateCell<T>> for ReadonlyCell<T> {
    fn from(cell: StateCell<T>) -> Self {
        Self {
            source: Source::Local(cell),
        }
    }
}

impl<T: 'static> From<RemoteCell<T>> for ReadonlyCell<T> {
    fn from(cell: RemoteCell<T>) -> Self {
        Self {
            source: Source::Remote(cell),
        }
    }
}

impl<T: Clone + 'static> ReadonlyCell<T> {
    pub fn get(&self) -> T {
        match &self.source {
            Source::Local(c) => c.get(),
            Source::Remote(c) => c.get(),
        }
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> StateResult<Subscription> {
        self.subscribe_listener(Rc::new(f))
    }

    pub fn close(&self) {
        match &self.source {
            Source::Local(c) => c.close(),
            Source::Remote(c) => c.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.source {
            Source::Local(c) => c.is_closed(),
            Source::Remote(c) => c.is_closed(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.source, Source::Remote(_))
    }
}

impl<T: Clone + 'static> ReadState for ReadonlyCell<T> {
    type Value = T;

    fn get(&self) -> T {
        ReadonlyCell::get(self)
    }
    fn subscribe_listener(&self, listener: Listener<T>) -> StateResult<Subscription> {
        match &self.source {
            Source::Local(c) => c.subscribe_listener(listener),
            Source::Remote(c) => c.subscribe_listener(listener),
        }
    }
    fn close(&self) {
        ReadonlyCell::close(self)
    }
    fn is_closed(&self) -> bool {
        ReadonlyCell::is_closed(self)
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for ReadonlyCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadonlyCell")
            .field("value", &self.get())
            .field("remote", &self.is_remote())
            .finish()
    }
}
