//! Component instances as seen by the binding hooks.
//!
//! A [`Composition`] stands in for one mounted component: it owns the
//! `remember` slots that survive re-renders, a [`Scope`] whose disposers run
//! on teardown, and a dirty flag raised when bound state changes. The UI
//! layer drives it: call [`Composition::compose`] for every render and
//! [`Composition::dispose`] when the component goes away.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::scope::Scope;

thread_local! {
    static COMPOSING: RefCell<Vec<Composition>> = const { RefCell::new(Vec::new()) };
}

#[derive(Default)]
struct Slots {
    ordered: Vec<Box<dyn Any>>,
    cursor: usize,
    keyed: HashMap<String, Box<dyn Any>>,
}

struct CompositionInner {
    slots: RefCell<Slots>,
    scope: Scope,
    dirty: Cell<bool>,
    renders: Cell<u64>,
    disposed: Cell<bool>,
    on_invalidate: RefCell<Option<Rc<dyn Fn()>>>,
}

#[derive(Clone)]
pub struct Composition {
    inner: Rc<CompositionInner>,
}

impl Default for Composition {
    fn default() -> Self {
        Self::new()
    }
}

impl Composition {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(CompositionInner {
                slots: RefCell::new(Slots::default()),
                scope: Scope::new(),
                dirty: Cell::new(false),
                renders: Cell::new(0),
                disposed: Cell::new(false),
                on_invalidate: RefCell::new(None),
            }),
        }
    }

    /// Runs one render pass with this composition current.
    pub fn compose<R>(&self, body: impl FnOnce() -> R) -> R {
        if self.inner.disposed.get() {
            log::warn!("composing a disposed composition; hooks will not subscribe");
        }
        self.inner.slots.borrow_mut().cursor = 0;
        self.inner.dirty.set(false);

        COMPOSING.with(|stack| stack.borrow_mut().push(self.clone()));
        let result = self.inner.scope.run(body);
        COMPOSING.with(|stack| stack.borrow_mut().pop());

        self.inner.renders.set(self.inner.renders.get() + 1);
        result
    }

    /// Tears the component down: runs every cleanup once and forgets all
    /// remembered slots.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.scope.dispose();
        let slots = std::mem::take(&mut *self.inner.slots.borrow_mut());
        drop(slots);
        log::debug!(
            "composition disposed after {} render(s)",
            self.inner.renders.get()
        );
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn render_count(&self) -> u64 {
        self.inner.renders.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Returns and clears the re-render request.
    pub fn take_dirty(&self) -> bool {
        self.inner.dirty.replace(false)
    }

    /// Called every time this composition becomes dirty; the host uses it to
    /// schedule a render.
    pub fn set_on_invalidate(&self, f: impl Fn() + 'static) {
        *self.inner.on_invalidate.borrow_mut() = Some(Rc::new(f));
    }

    pub fn invalidate(&self) {
        invalidate(&self.inner);
    }

    /// A weak trigger for [`Composition::invalidate`] that outlives neither the
    /// composition nor its teardown.
    pub(crate) fn invalidator(&self) -> impl Fn() + 'static {
        let weak: Weak<CompositionInner> = Rc::downgrade(&self.inner);
        move || {
            if let Some(inner) = weak.upgrade() {
                if !inner.disposed.get() {
                    invalidate(&inner);
                }
            }
        }
    }
}

fn invalidate(inner: &CompositionInner) {
    inner.dirty.set(true);
    let hook = inner.on_invalidate.borrow().clone();
    if let Some(hook) = hook {
        hook();
    }
}

pub fn current_composition() -> Option<Composition> {
    COMPOSING.with(|stack| stack.borrow().last().cloned())
}

/// Slot-based remember: the Nth call in a render always returns the Nth value.
pub fn remember<T: 'static>(init: impl FnOnce() -> T) -> Rc<T> {
    let Some(composition) = current_composition() else {
        log::warn!("remember called outside a composition; value will not persist");
        return Rc::new(init());
    };
    let cursor = {
        let mut slots = composition.inner.slots.borrow_mut();
        let cursor = slots.cursor;
        slots.cursor += 1;
        match slots.ordered.get(cursor) {
            Some(existing) => {
                if let Some(rc) = existing.downcast_ref::<Rc<T>>() {
                    return rc.clone();
                }
                log::warn!(
                    "remember: slot {cursor} changed type; replacing. \
                     Use remember_with_key for conditionally called hooks."
                );
            }
            // reserve the slot so hooks called from `init` land after it
            None => slots.ordered.push(Box::new(())),
        }
        cursor
    };

    let rc = Rc::new(init());
    composition.inner.slots.borrow_mut().ordered[cursor] = Box::new(rc.clone());
    rc
}

/// Key-based remember, stable across conditional branches.
pub fn remember_with_key<T: 'static>(key: impl Into<String>, init: impl FnOnce() -> T) -> Rc<T> {
    let Some(composition) = current_composition() else {
        log::warn!("remember_with_key called outside a composition; value will not persist");
        return Rc::new(init());
    };
    let key = key.into();

    if let Some(existing) = composition.inner.slots.borrow().keyed.get(&key) {
        if let Some(rc) = existing.downcast_ref::<Rc<T>>() {
            return rc.clone();
        }
        log::warn!("remember_with_key: key '{key}' reused with a different type; replacing.");
    }

    let rc = Rc::new(init());
    composition
        .inner
        .slots
        .borrow_mut()
        .keyed
        .insert(key, Box::new(rc.clone()));
    rc
}
