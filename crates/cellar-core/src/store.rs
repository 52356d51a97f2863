//! Lifecycle management around a single [`StateGroup`].
//!
//! A store remembers the factory it was created from so it can rebuild its
//! group, and keeps track of every subscription made through it so those can
//! be dropped without touching the cells.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{SlotMap, new_key_type};

use crate::cell::{Listener, StateCell};
use crate::error::{StateError, StateResult};
use crate::group::{GroupBuilder, GroupOptions, ReadonlyGroup, Snapshot, StateGroup, StateKind, StateValue};
use crate::readable::{ReadState, ReadonlyCell};
use crate::remote::RemoteCell;
use crate::service::StateService;
use crate::subscription::Subscription;

pub type Factory = Rc<dyn Fn(&mut GroupBuilder)>;

new_key_type! {
    pub struct SubscriptionKey;
}

type Attach = Rc<dyn Fn(&StateGroup) -> StateResult<Subscription>>;
type Redeliver = Rc<dyn Fn(&StateGroup)>;

struct Entry {
    key: String,
    live: Subscription,
    attach: Attach,
    redeliver: Redeliver,
}

type Entries = RefCell<SlotMap<SubscriptionKey, Entry>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorePhase {
    Uninitialized,
    Initialized,
    Closed,
}

/// Keyed façade over a state group.
///
/// ```rust
/// use std::rc::Rc;
/// use cellar_core::*;
///
/// let store = StateStore::create(|b| {
///     b.local_empty::<String>("a");
///     b.local("b", "1".to_string());
///     b.remote_empty::<String>("c", "c-token");
/// })
/// .unwrap();
///
/// let service = Rc::new(MemoryService::new());
/// store.connect_service(service.clone()).unwrap();
///
/// store.set("a", Some("x".to_string())).unwrap();
/// service.push("c-token", Some("y".to_string()));
/// assert_eq!(store.get::<Option<String>>("c").unwrap().as_deref(), Some("y"));
/// ```
pub struct StateStore {
    options: GroupOptions,
    phase: Cell<StorePhase>,
    factory: RefCell<Option<Factory>>,
    group: RefCell<Option<Rc<StateGroup>>>,
    service: RefCell<Option<Rc<dyn StateService>>>,
    entries: Rc<Entries>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_options(GroupOptions::default())
    }

    pub fn with_options(options: GroupOptions) -> Self {
        Self {
            options,
            phase: Cell::new(StorePhase::Uninitialized),
            factory: RefCell::new(None),
            group: RefCell::new(None),
            service: RefCell::new(None),
            entries: Rc::new(RefCell::new(SlotMap::with_key())),
        }
    }

    /// `new()` followed by `create_states(factory)`.
    pub fn create(factory: impl Fn(&mut GroupBuilder) + 'static) -> StateResult<Self> {
        let store = Self::new();
        store.create_states(factory)?;
        Ok(store)
    }

    pub fn phase(&self) -> StorePhase {
        self.phase.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.phase.get() == StorePhase::Initialized
    }

    pub fn is_closed(&self) -> bool {
        self.phase.get() == StorePhase::Closed
    }

    fn build(&self, factory: &Factory) -> StateResult<Rc<StateGroup>> {
        let mut group = StateGroup::with_options(self.options.clone());
        group.init(|b| factory(b))?;
        Ok(Rc::new(group))
    }

    /// Builds the group. Accepted once per store.
    pub fn create_states(&self, factory: impl Fn(&mut GroupBuilder) + 'static) -> StateResult<()> {
        match self.phase.get() {
            StorePhase::Uninitialized => {}
            StorePhase::Initialized => return Err(StateError::AlreadyInitialized),
            StorePhase::Closed => return Err(StateError::Closed),
        }
        let factory: Factory = Rc::new(factory);
        let group = self.build(&factory)?;
        *self.factory.borrow_mut() = Some(factory);
        *self.group.borrow_mut() = Some(group);
        self.phase.set(StorePhase::Initialized);
        Ok(())
    }

    fn group(&self) -> StateResult<Rc<StateGroup>> {
        match self.phase.get() {
            StorePhase::Uninitialized => Err(StateError::NotInitialized),
            StorePhase::Closed => Err(StateError::Closed),
            StorePhase::Initialized => self
                .group
                .borrow()
                .clone()
                .ok_or(StateError::NotInitialized),
        }
    }

    pub fn keys(&self) -> StateResult<Vec<String>> {
        Ok(self.group()?.keys())
    }

    pub fn kind(&self, key: &str) -> StateResult<StateKind> {
        self.group()?.kind(key)
    }

    pub fn get<T: StateValue>(&self, key: &str) -> StateResult<T> {
        self.group()?.get(key)
    }

    /// Local keys only; remote keys fail with `RemoteStateImmutable`.
    pub fn set<T: StateValue>(&self, key: &str, value: T) -> StateResult<()> {
        self.group()?.set(key, value)
    }

    pub fn update<T: StateValue>(&self, key: &str, f: impl FnOnce(&mut T)) -> StateResult<()> {
        self.group()?.update(key, f)
    }

    pub fn cell<T: StateValue>(&self, key: &str) -> StateResult<StateCell<T>> {
        self.group()?.cell(key)
    }

    pub fn remote_cell<T: StateValue>(&self, key: &str) -> StateResult<RemoteCell<T>> {
        self.group()?.remote_cell(key)
    }

    pub fn readable<T: StateValue>(&self, key: &str) -> StateResult<ReadonlyCell<T>> {
        self.group()?.readable(key)
    }

    pub fn readonly(&self, keys: Option<&[&str]>) -> StateResult<ReadonlyGroup> {
        self.group()?.export_readonly(keys)
    }

    pub fn snapshot(&self) -> StateResult<Snapshot> {
        self.group()?.snapshot()
    }

    /// Subscribes through the store. The subscription follows the key across
    /// [`StateStore::reset_states`] and is dropped by
    /// [`StateStore::close_subscriptions`].
    pub fn subscribe<T: StateValue>(
        &self,
        key: &str,
        f: impl Fn(&T) + 'static,
    ) -> StateResult<StoreSubscription> {
        let group = self.group()?;
        let listener: Listener<T> = Rc::new(f);

        let attach: Attach = {
            let key = key.to_string();
            let listener = listener.clone();
            Rc::new(move |group: &StateGroup| {
                group
                    .readable::<T>(&key)?
                    .subscribe_listener(listener.clone())
            })
        };
        let redeliver: Redeliver = {
            let key = key.to_string();
            Rc::new(move |group: &StateGroup| {
                if let Ok(value) = group.get::<T>(&key) {
                    listener(&value);
                }
            })
        };

        let live = attach(&group)?;
        let id = self.entries.borrow_mut().insert(Entry {
            key: key.to_string(),
            live,
            attach,
            redeliver,
        });
        Ok(StoreSubscription {
            id,
            entries: Rc::downgrade(&self.entries),
        })
    }

    /// Number of live store subscriptions on `key`.
    pub fn consumer_count(&self, key: &str) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|e| e.key == key)
            .count()
    }

    /// Drops every subscription made through the store. Cells stay open.
    pub fn close_subscriptions(&self) {
        let drained: Vec<Entry> = self.entries.borrow_mut().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.live.unsubscribe();
        }
        if !drained.is_empty() {
            log::debug!("store dropped {} subscription(s)", drained.len());
        }
    }

    /// Connects every remote cell to `service`. The service is reused after a
    /// reset.
    pub fn connect_service(&self, service: Rc<dyn StateService>) -> StateResult<()> {
        self.group()?.connect_service(service.clone())?;
        *self.service.borrow_mut() = Some(service);
        Ok(())
    }

    /// Rebuilds the group from the stored factory.
    ///
    /// The previous group is closed, so handles taken from it reject writes
    /// from now on. Store subscriptions move to the new cells and receive the
    /// new value once.
    pub fn reset_states(&self) -> StateResult<()> {
        let old = self.group()?;
        let factory = self
            .factory
            .borrow()
            .clone()
            .ok_or(StateError::NotInitialized)?;
        let fresh = self.build(&factory)?;

        *self.group.borrow_mut() = Some(fresh.clone());
        old.close_all();

        let service = self.service.borrow().clone();
        if let Some(service) = service {
            fresh.connect_service(service)?;
        }

        let moving: Vec<(SubscriptionKey, Attach, Redeliver)> = self
            .entries
            .borrow()
            .iter()
            .map(|(id, e)| (id, e.attach.clone(), e.redeliver.clone()))
            .collect();

        let mut attached = Vec::with_capacity(moving.len());
        for (id, attach, redeliver) in moving {
            match attach(&fresh) {
                Ok(live) => {
                    let mut entries = self.entries.borrow_mut();
                    match entries.get_mut(id) {
                        Some(entry) => {
                            entry.live = live;
                            attached.push(redeliver);
                        }
                        None => live.unsubscribe(),
                    }
                }
                Err(e) => {
                    log::warn!("store subscription dropped on reset: {e}");
                    self.entries.borrow_mut().remove(id);
                }
            }
        }
        for redeliver in &attached {
            redeliver(&fresh);
        }

        log::debug!(
            "store reset; {} subscription(s) carried over",
            attached.len()
        );
        Ok(())
    }

    /// Drops store subscriptions, closes every cell, and retires the store.
    /// Idempotent.
    pub fn close_states(&self) {
        if self.phase.get() == StorePhase::Closed {
            return;
        }
        self.close_subscriptions();
        let group = self.group.borrow().clone();
        if let Some(group) = group {
            group.close_all();
        }
        self.service.borrow_mut().take();
        self.phase.set(StorePhase::Closed);
        log::debug!("store closed");
    }

    /// Per-key value and consumer report, also written to the debug log.
    pub fn inspect(&self) -> StateResult<StoreInspection> {
        let group = self.group()?;
        let keys = group
            .raw_slots()
            .iter()
            .map(|slot| KeyInspection {
                key: slot.key.clone(),
                kind: slot.state.kind(),
                token: slot.state.token().map(str::to_string),
                value: slot.state.value_debug(),
                value_type: slot.state.value_type(),
                consumers: self.consumer_count(&slot.key),
                subscribers: slot.state.subscriber_count(),
                closed: slot.state.is_closed(),
            })
            .collect::<Vec<_>>();
        for k in &keys {
            log::debug!(
                "{} [{:?}] = {} ({} consumer(s))",
                k.key,
                k.kind,
                k.value,
                k.consumers
            );
        }
        Ok(StoreInspection { keys })
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("phase", &self.phase.get())
            .field("group", &self.group.borrow())
            .field("subscriptions", &self.entries.borrow().len())
            .finish()
    }
}

/// Handle for a subscription made through a [`StateStore`].
#[derive(Clone)]
pub struct StoreSubscription {
    id: SubscriptionKey,
    entries: Weak<Entries>,
}

impl StoreSubscription {
    pub fn key(&self) -> SubscriptionKey {
        self.id
    }

    /// Detaches the callback and forgets it. Idempotent.
    pub fn unsubscribe(&self) {
        let Some(entries) = self.entries.upgrade() else {
            return;
        };
        let removed = entries.borrow_mut().remove(self.id);
        if let Some(entry) = removed {
            entry.live.unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        self.entries
            .upgrade()
            .is_some_and(|entries| entries.borrow().get(self.id).is_some_and(|e| e.live.is_active()))
    }
}

impl fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSubscription")
            .field("key", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KeyInspection {
    pub key: String,
    pub kind: StateKind,
    pub token: Option<String>,
    pub value: String,
    pub value_type: &'static str,
    /// Subscriptions made through the store.
    pub consumers: usize,
    /// All listeners on the cell, store-mediated or not.
    pub subscribers: usize,
    pub closed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StoreInspection {
    pub keys: Vec<KeyInspection>,
}

impl StoreInspection {
    pub fn get(&self, key: &str) -> Option<&KeyInspection> {
        self.keys.iter().find(|k| k.key == key)
    }
}
