//! Hooks that keep a component's copy of a cell in sync.
//!
//! Every hook subscribes at most once per [`Composition`], before it reads,
//! so no write between the first read and the subscription is lost. The
//! subscription is released exactly once when the composition is disposed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::cell::Listener;
use crate::composition::{Composition, current_composition, remember};
use crate::error::{StateError, StateResult};
use crate::group::{StateKind, StateValue};
use crate::readable::ReadState;
use crate::scope::{Dispose, effect};
use crate::store::StateStore;

struct Binding<T> {
    value: RefCell<Option<T>>,
    installed: Cell<bool>,
}

impl<T> Default for Binding<T> {
    fn default() -> Self {
        Self {
            value: RefCell::new(None),
            installed: Cell::new(false),
        }
    }
}

impl<T: Clone + 'static> Binding<T> {
    /// Listener that refreshes the local copy and requests a re-render.
    fn listener(self: &Rc<Self>, composition: &Composition) -> Listener<T> {
        let weak = Rc::downgrade(self);
        let invalidate = composition.invalidator();
        Rc::new(move |value: &T| {
            if let Some(binding) = weak.upgrade() {
                *binding.value.borrow_mut() = Some(value.clone());
                invalidate();
            }
        })
    }

    fn current(&self) -> Option<T> {
        self.value.borrow().clone()
    }
}

fn mounted() -> Option<Composition> {
    current_composition().filter(|c| !c.is_disposed())
}

/// Current value of `state` for this component.
///
/// Outside a live composition this is a plain `get()`. A closed cell is read
/// once and never subscribed.
pub fn use_state<S: ReadState>(state: &S) -> S::Value {
    let Some(composition) = mounted() else {
        return state.get();
    };
    let binding = remember(Binding::<S::Value>::default);

    if !binding.installed.replace(true) {
        match state.subscribe_listener(binding.listener(&composition)) {
            Ok(sub) => {
                effect(move || sub.into_dispose());
            }
            Err(e) => log::warn!("use_state: not subscribing ({e}); showing last value"),
        }
        *binding.value.borrow_mut() = Some(state.get());
    }

    binding.current().unwrap_or_else(|| state.get())
}

/// Calls `callback` on every change of `state` while the component is
/// mounted. The most recent `callback` passed in is the one invoked.
pub fn use_state_changed<S: ReadState>(state: &S, callback: impl Fn(&S::Value) + 'static) {
    if mounted().is_none() {
        log::warn!("use_state_changed called outside a composition");
        return;
    }
    let latest = remember(|| RefCell::new(None::<Listener<S::Value>>));
    *latest.borrow_mut() = Some(Rc::new(callback));

    let installed = remember(|| Cell::new(false));
    if installed.replace(true) {
        return;
    }
    let weak = Rc::downgrade(&latest);
    let listener: Listener<S::Value> = Rc::new(move |value: &S::Value| {
        let current = weak.upgrade().and_then(|l| l.borrow().clone());
        if let Some(callback) = current {
            callback(value);
        }
    });
    match state.subscribe_listener(listener) {
        Ok(sub) => {
            effect(move || sub.into_dispose());
        }
        Err(e) => log::warn!("use_state_changed: not subscribing ({e})"),
    }
}

/// Keyed variant of [`use_state`] for stores.
///
/// Goes through [`StateStore::subscribe`], so the binding survives
/// [`StateStore::reset_states`].
pub fn use_store_state<T: StateValue>(store: &StateStore, key: &str) -> StateResult<T> {
    let Some(composition) = mounted() else {
        return store.get(key);
    };
    let binding = remember(Binding::<T>::default);

    if !binding.installed.get() {
        let listener = binding.listener(&composition);
        let sub = store.subscribe::<T>(key, move |v| listener(v))?;
        binding.installed.set(true);
        effect(move || Dispose::new(move || sub.unsubscribe()));
        *binding.value.borrow_mut() = Some(store.get(key)?);
    }

    match binding.current() {
        Some(value) => Ok(value),
        None => store.get(key),
    }
}

/// Setter for a local key of `store`. Remote keys are refused up front.
///
/// Unlike [`use_store_state`], which only reads during the render, the setter
/// is called later from event handlers, so it keeps its own `Rc` to the store
/// and stays usable after the caller's handle is gone.
pub fn use_set_state<T: StateValue>(
    store: &Rc<StateStore>,
    key: &str,
) -> StateResult<impl Fn(T) -> StateResult<()> + 'static> {
    if store.kind(key)? == StateKind::Remote {
        return Err(StateError::RemoteStateImmutable {
            key: key.to_string(),
        });
    }
    let store = store.clone();
    let key = key.to_string();
    Ok(move |value: T| store.set(&key, value))
}
