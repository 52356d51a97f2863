use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::error::{StateError, StateResult};
use crate::readable::ReadonlyCell;
use crate::subscription::{Detach, SubId, Subscription};

pub type Listener<T> = Rc<dyn Fn(&T)>;

type Listeners<T> = SmallVec<[(SubId, Listener<T>); 4]>;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct CellFlags: u8 {
        const CLOSED = 1 << 0;
        /// Remote only: registered with a service.
        const CONNECTED = 1 << 1;
        /// Remote only: at least one push arrived.
        const RECEIVED = 1 << 2;
    }
}

pub(crate) struct Inner<T> {
    value: T,
    pub(crate) flags: CellFlags,
    subs: Listeners<T>,
    next_id: SubId,
}

impl<T> Detach for RefCell<Inner<T>> {
    fn detach(&self, id: SubId) -> bool {
        let removed = {
            let mut inner = self.borrow_mut();
            let pos = inner.subs.iter().position(|(sid, _)| *sid == id);
            pos.map(|i| inner.subs.remove(i))
        };
        removed.is_some()
    }

    fn is_attached(&self, id: SubId) -> bool {
        self.borrow().subs.iter().any(|(sid, _)| *sid == id)
    }
}

/// Shared value + listener storage behind both local and remote cells.
pub(crate) struct Core<T>(Rc<RefCell<Inner<T>>>);

impl<T> Clone for Core<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> Core<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(Inner {
            value,
            flags: CellFlags::empty(),
            subs: SmallVec::new(),
            next_id: 0,
        })))
    }

    pub(crate) fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.borrow().value.clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.borrow().value)
    }

    pub(crate) fn flags(&self) -> CellFlags {
        self.0.borrow().flags
    }

    pub(crate) fn set_flag(&self, flag: CellFlags, on: bool) {
        self.0.borrow_mut().flags.set(flag, on);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.flags().contains(CellFlags::CLOSED)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.0.borrow().subs.len()
    }

    /// Stores `value`, then notifies the listeners attached at the time of
    /// the write. The listener list is copied before the first callback runs.
    pub(crate) fn set(&self, value: T) -> StateResult<()>
    where
        T: Clone,
    {
        let listeners = {
            let mut inner = self.0.borrow_mut();
            if inner.flags.contains(CellFlags::CLOSED) {
                return Err(StateError::Closed);
            }
            inner.value = value.clone();
            inner.subs.clone()
        };
        for (id, listener) in listeners {
            // removed by an earlier listener of this same write
            if !self.0.is_attached(id) {
                continue;
            }
            listener(&value);
        }
        Ok(())
    }

    /// Mutates a copy of the value and stores it like [`Core::set`]. `f` runs
    /// with no borrow held, so it may read or write this cell through any
    /// handle; a write made from `f` is overwritten by the result.
    pub(crate) fn update(&self, f: impl FnOnce(&mut T)) -> StateResult<()>
    where
        T: Clone,
    {
        if self.is_closed() {
            return Err(StateError::Closed);
        }
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    pub(crate) fn subscribe(&self, listener: Listener<T>) -> StateResult<Subscription> {
        let id = {
            let mut inner = self.0.borrow_mut();
            if inner.flags.contains(CellFlags::CLOSED) {
                return Err(StateError::Closed);
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subs.push((id, listener));
            id
        };
        let source: Weak<dyn Detach> = Rc::downgrade(&self.0) as Weak<RefCell<Inner<T>>>;
        Ok(Subscription::new(id, source))
    }

    /// Returns false if the cell was already closed.
    pub(crate) fn close(&self) -> bool {
        let dropped = {
            let mut inner = self.0.borrow_mut();
            if inner.flags.contains(CellFlags::CLOSED) {
                return false;
            }
            inner.flags.insert(CellFlags::CLOSED);
            std::mem::take(&mut inner.subs)
        };
        drop(dropped);
        true
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<Inner<T>>> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<RefCell<Inner<T>>>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A mutable value with change listeners.
///
/// Handles are cheap to clone and all clones share one value. Listeners run
/// synchronously inside [`StateCell::set`], in the order they subscribed.
/// Subscribing never replays the current value; read it with
/// [`StateCell::get`] first if needed.
///
/// ```rust
/// use cellar_core::*;
///
/// let count = state(1);
/// let sub = count.subscribe(|v| println!("count = {v}")).unwrap();
/// count.set(2).unwrap();
/// assert_eq!(count.get(), 2);
/// sub.unsubscribe();
/// ```
pub struct StateCell<T: 'static> {
    core: Core<T>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: 'static> StateCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            core: Core::new(value),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.core.get()
    }

    /// Reads the value without cloning it.
    ///
    /// # Panics
    ///
    /// The cell stays borrowed while `f` runs. Reading it again is fine, but
    /// calling `set`, `update`, `subscribe`, `close`, or unsubscribing from it
    /// inside `f` panics. Use [`StateCell::get`] when `f` needs to write back.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.core.with(f)
    }

    pub fn set(&self, value: T) -> StateResult<()>
    where
        T: Clone,
    {
        self.core.set(value)
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) -> StateResult<()>
    where
        T: Clone,
    {
        self.core.update(f)
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> StateResult<Subscription> {
        self.core.subscribe(Rc::new(f))
    }

    /// Drops every listener and rejects further writes. Idempotent.
    pub fn close(&self) {
        self.core.close();
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    pub fn readonly(&self) -> ReadonlyCell<T> {
        ReadonlyCell::from(self.clone())
    }

    /// True if both handles point at the same cell.
    pub fn same(&self, other: &Self) -> bool {
        self.core.ptr_eq(&other.core)
    }

    pub(crate) fn core(&self) -> &Core<T> {
        &self.core
    }
}

impl<T: 'static> StateCell<Option<T>> {
    /// A cell that starts out without a value.
    pub fn empty() -> Self {
        Self::new(None)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| {
            f.debug_struct("StateCell")
                .field("value", value)
                .field("closed", &self.is_closed())
                .field("subscribers", &self.subscriber_count())
                .finish()
        })
    }
}

pub fn state<T: 'static>(value: T) -> StateCell<T> {
    StateCell::new(value)
}
