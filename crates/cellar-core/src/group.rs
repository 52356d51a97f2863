//! Named collections of cells built together from one factory.

use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::cell::StateCell;
use crate::error::{StateError, StateResult};
use crate::readable::ReadonlyCell;
use crate::remote::RemoteCell;
use crate::service::StateService;
use crate::subscription::Subscription;

/// Values that can live in a group: cloneable for fan-out, debuggable for
/// tracing and snapshots.
pub trait StateValue: Clone + fmt::Debug + 'static {}
impl<T: Clone + fmt::Debug + 'static> StateValue for T {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StateKind {
    Local,
    Remote,
}

/// Type-erased view of a cell stored in a group.
pub(crate) trait AnyState {
    fn kind(&self) -> StateKind;
    fn as_any(&self) -> &dyn Any;
    fn token(&self) -> Option<&str>;
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn subscriber_count(&self) -> usize;
    fn connect(&self, service: Rc<dyn StateService>) -> StateResult<()>;
    fn value_any(&self) -> Rc<dyn Any>;
    fn value_debug(&self) -> String;
    fn value_type(&self) -> &'static str;
    fn trace(&self, label: String);
}

impl<T: StateValue> AnyState for StateCell<T> {
    fn kind(&self) -> StateKind {
        StateKind::Local
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn token(&self) -> Option<&str> {
        None
    }
    fn close(&self) {
        StateCell::close(self)
    }
    fn is_closed(&self) -> bool {
        StateCell::is_closed(self)
    }
    fn subscriber_count(&self) -> usize {
        StateCell::subscriber_count(self)
    }
    fn connect(&self, _service: Rc<dyn StateService>) -> StateResult<()> {
        Ok(())
    }
    fn value_any(&self) -> Rc<dyn Any> {
        Rc::new(self.get())
    }
    fn value_debug(&self) -> String {
        self.with(|v| format!("{v:?}"))
    }
    fn value_type(&self) -> &'static str {
        type_name::<T>()
    }
    fn trace(&self, label: String) {
        log::debug!("{label} = {:?}", self.get());
        if let Err(e) = self.subscribe(move |v| log::debug!("{label} = {v:?}")) {
            log::warn!("cannot trace closed state: {e}");
        }
    }
}

impl<T: StateValue> AnyState for RemoteCell<T> {
    fn kind(&self) -> StateKind {
        StateKind::Remote
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn token(&self) -> Option<&str> {
        Some(RemoteCell::token(self))
    }
    fn close(&self) {
        RemoteCell::close(self)
    }
    fn is_closed(&self) -> bool {
        RemoteCell::is_closed(self)
    }
    fn subscriber_count(&self) -> usize {
        RemoteCell::subscriber_count(self)
    }
    fn connect(&self, service: Rc<dyn StateService>) -> StateResult<()> {
        RemoteCell::connect(self, service)
    }
    fn value_any(&self) -> Rc<dyn Any> {
        Rc::new(self.get())
    }
    fn value_debug(&self) -> String {
        format!("{:?}", self.get())
    }
    fn value_type(&self) -> &'static str {
        type_name::<T>()
    }
    fn trace(&self, label: String) {
        log::debug!("{label} = {:?}", self.get());
        if let Err(e) = self.subscribe(move |v| log::debug!("{label} = {v:?}")) {
            log::warn!("cannot trace closed state: {e}");
        }
    }
}

#[derive(Clone)]
pub(crate) struct Slot {
    pub(crate) key: String,
    pub(crate) state: Rc<dyn AnyState>,
}

impl Slot {
    fn readable<T: StateValue>(&self) -> StateResult<ReadonlyCell<T>> {
        let any = self.state.as_any();
        let cell = match self.state.kind() {
            StateKind::Local => any
                .downcast_ref::<StateCell<T>>()
                .map(|c| ReadonlyCell::from(c.clone())),
            StateKind::Remote => any
                .downcast_ref::<RemoteCell<T>>()
                .map(|c| ReadonlyCell::from(c.clone())),
        };
        cell.ok_or_else(|| self.mismatch::<T>())
    }

    fn mismatch<T>(&self) -> StateError {
        StateError::TypeMismatch {
            key: self.key.clone(),
            expected: type_name::<T>(),
        }
    }
}

fn find<'a>(slots: &'a [Slot], key: &str) -> StateResult<&'a Slot> {
    slots
        .iter()
        .find(|s| s.key == key)
        .ok_or_else(|| StateError::UnknownKey {
            key: key.to_string(),
        })
}

fn snapshot_of(slots: &[Slot]) -> Snapshot {
    Snapshot {
        entries: slots
            .iter()
            .map(|s| SnapshotEntry {
                key: s.key.clone(),
                kind: s.state.kind(),
                value: s.state.value_any(),
                debug: s.state.value_debug(),
            })
            .collect(),
    }
}

/// Collects the cells a factory declares.
#[derive(Default)]
pub struct GroupBuilder {
    slots: Vec<Slot>,
    duplicate: Option<String>,
}

impl GroupBuilder {
    fn insert(&mut self, key: String, state: Rc<dyn AnyState>) {
        if self.slots.iter().any(|s| s.key == key) {
            self.duplicate.get_or_insert(key);
            return;
        }
        self.slots.push(Slot { key, state });
    }

    pub fn local<T: StateValue>(&mut self, key: impl Into<String>, value: T) -> StateCell<T> {
        let cell = StateCell::new(value);
        self.insert(key.into(), Rc::new(cell.clone()));
        cell
    }

    pub fn local_empty<T: StateValue>(&mut self, key: impl Into<String>) -> StateCell<Option<T>> {
        self.local(key, None)
    }

    pub fn remote<T: StateValue>(
        &mut self,
        key: impl Into<String>,
        token: impl Into<String>,
        value: T,
    ) -> RemoteCell<T> {
        let cell = RemoteCell::new(token, value);
        self.insert(key.into(), Rc::new(cell.clone()));
        cell
    }

    pub fn remote_empty<T: StateValue>(
        &mut self,
        key: impl Into<String>,
        token: impl Into<String>,
    ) -> RemoteCell<Option<T>> {
        self.remote(key, token, None)
    }
}

#[derive(Clone, Debug, Default)]
pub struct GroupOptions {
    /// Log every key's initial value and each change at debug level.
    pub tracing: bool,
    /// Prefix for trace labels (`"<global_id>:<key>"`).
    pub global_id: Option<String>,
}

impl GroupOptions {
    pub fn traced(global_id: impl Into<String>) -> Self {
        Self {
            tracing: true,
            global_id: Some(global_id.into()),
        }
    }

    fn label(&self, key: &str) -> String {
        match &self.global_id {
            Some(id) => format!("{id}:{key}"),
            None => key.to_string(),
        }
    }
}

/// A fixed set of named local and remote cells.
///
/// ```rust
/// use cellar_core::*;
///
/// let group = StateGroup::build(|b| {
///     b.local_empty::<String>("a");
///     b.local("b", "1".to_string());
///     b.remote_empty::<String>("c", "c-token");
/// })
/// .unwrap();
///
/// group.set("a", Some("x".to_string())).unwrap();
/// assert!(group.set("c", Some("y".to_string())).is_err());
/// ```
#[derive(Default)]
pub struct StateGroup {
    options: GroupOptions,
    slots: Option<Vec<Slot>>,
    remote: RefCell<Vec<usize>>,
    closed: Cell<bool>,
}

impl StateGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: GroupOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn build(factory: impl FnOnce(&mut GroupBuilder)) -> StateResult<Self> {
        let mut group = Self::new();
        group.init(factory)?;
        Ok(group)
    }

    /// Runs `factory` to declare the group's cells. Only the first call is
    /// accepted.
    pub fn init(&mut self, factory: impl FnOnce(&mut GroupBuilder)) -> StateResult<&mut Self> {
        if self.slots.is_some() {
            return Err(StateError::AlreadyInitialized);
        }
        let mut builder = GroupBuilder::default();
        factory(&mut builder);
        if let Some(key) = builder.duplicate {
            return Err(StateError::DuplicateKey { key });
        }

        let remote = builder
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state.kind() == StateKind::Remote)
            .map(|(i, _)| i)
            .collect();
        *self.remote.borrow_mut() = remote;

        if self.options.tracing {
            for slot in &builder.slots {
                slot.state.trace(self.options.label(&slot.key));
            }
        }
        log::debug!(
            "state group created with {} key(s), {} remote",
            builder.slots.len(),
            self.remote.borrow().len()
        );
        self.slots = Some(builder.slots);
        Ok(self)
    }

    pub fn is_initialized(&self) -> bool {
        self.slots.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub fn options(&self) -> &GroupOptions {
        &self.options
    }

    fn slots(&self) -> StateResult<&[Slot]> {
        self.slots.as_deref().ok_or(StateError::NotInitialized)
    }

    /// Like `slots`, but refuses a closed group.
    fn open_slots(&self) -> StateResult<&[Slot]> {
        let slots = self.slots()?;
        if self.closed.get() {
            return Err(StateError::Closed);
        }
        Ok(slots)
    }

    fn slot(&self, key: &str) -> StateResult<&Slot> {
        find(self.slots()?, key)
    }

    pub(crate) fn raw_slots(&self) -> &[Slot] {
        self.slots.as_deref().unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.raw_slots().iter().map(|s| s.key.clone()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.raw_slots().iter().any(|s| s.key == key)
    }

    pub fn kind(&self, key: &str) -> StateResult<StateKind> {
        Ok(self.slot(key)?.state.kind())
    }

    /// `(key, token)` for every remote cell still tracked by the group.
    pub fn remote_tokens(&self) -> Vec<(String, String)> {
        let slots = self.raw_slots();
        self.remote
            .borrow()
            .iter()
            .filter_map(|&i| {
                let slot = &slots[i];
                slot.state
                    .token()
                    .map(|t| (slot.key.clone(), t.to_string()))
            })
            .collect()
    }

    /// Writable handle to a local cell.
    pub fn cell<T: StateValue>(&self, key: &str) -> StateResult<StateCell<T>> {
        let slot = self.slot(key)?;
        if slot.state.kind() == StateKind::Remote {
            return Err(StateError::RemoteStateImmutable {
                key: key.to_string(),
            });
        }
        slot.state
            .as_any()
            .downcast_ref::<StateCell<T>>()
            .cloned()
            .ok_or_else(|| slot.mismatch::<T>())
    }

    pub fn remote_cell<T: StateValue>(&self, key: &str) -> StateResult<RemoteCell<T>> {
        let slot = self.slot(key)?;
        slot.state
            .as_any()
            .downcast_ref::<RemoteCell<T>>()
            .cloned()
            .ok_or_else(|| slot.mismatch::<T>())
    }

    /// Read-only handle to a cell of either kind.
    pub fn readable<T: StateValue>(&self, key: &str) -> StateResult<ReadonlyCell<T>> {
        self.slot(key)?.readable()
    }

    pub fn get<T: StateValue>(&self, key: &str) -> StateResult<T> {
        Ok(self.readable::<T>(key)?.get())
    }

    pub fn set<T: StateValue>(&self, key: &str, value: T) -> StateResult<()> {
        self.cell::<T>(key)?.set(value)
    }

    pub fn update<T: StateValue>(&self, key: &str, f: impl FnOnce(&mut T)) -> StateResult<()> {
        self.cell::<T>(key)?.update(f)
    }

    pub fn subscribe<T: StateValue>(
        &self,
        key: &str,
        f: impl Fn(&T) + 'static,
    ) -> StateResult<Subscription> {
        self.readable::<T>(key)?.subscribe(f)
    }

    /// A view over `keys` (all keys if `None`) sharing this group's cells.
    pub fn export_readonly(&self, keys: Option<&[&str]>) -> StateResult<ReadonlyGroup> {
        let slots = self.open_slots()?;
        let slots = match keys {
            None => slots.to_vec(),
            Some(keys) => keys
                .iter()
                .map(|k| find(slots, k).cloned())
                .collect::<StateResult<Vec<_>>>()?,
        };
        Ok(ReadonlyGroup { slots })
    }

    pub fn snapshot(&self) -> StateResult<Snapshot> {
        Ok(snapshot_of(self.open_slots()?))
    }

    /// Closes every cell, then stops tracking the remote ones. Afterwards
    /// `connect_service`, `export_readonly` and `snapshot` fail with
    /// `Closed`; reads still return the last values.
    pub fn close_all(&self) {
        if self.closed.replace(true) {
            return;
        }
        let slots = self.raw_slots();
        for slot in slots {
            slot.state.close();
        }
        self.remote.borrow_mut().clear();
        log::debug!("state group closed ({} key(s))", slots.len());
    }

    /// Connects every tracked remote cell to `service`.
    pub fn connect_service(&self, service: Rc<dyn StateService>) -> StateResult<()> {
        let slots = self.open_slots()?;
        let remote = self.remote.borrow().clone();
        for i in remote {
            slots[i].state.connect(service.clone())?;
        }
        Ok(())
    }
}

impl fmt::Debug for StateGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGroup")
            .field("keys", &self.keys())
            .field("remote", &self.remote.borrow().len())
            .field("closed", &self.closed.get())
            .finish()
    }
}

/// Subset of a group without write access. Cells are shared, not copied.
#[derive(Clone)]
pub struct ReadonlyGroup {
    slots: Vec<Slot>,
}

impl ReadonlyGroup {
    pub fn keys(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.key.clone()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.iter().any(|s| s.key == key)
    }

    pub fn readable<T: StateValue>(&self, key: &str) -> StateResult<ReadonlyCell<T>> {
        find(&self.slots, key)?.readable()
    }

    pub fn get<T: StateValue>(&self, key: &str) -> StateResult<T> {
        Ok(self.readable::<T>(key)?.get())
    }

    pub fn subscribe<T: StateValue>(
        &self,
        key: &str,
        f: impl Fn(&T) + 'static,
    ) -> StateResult<Subscription> {
        self.readable::<T>(key)?.subscribe(f)
    }

    /// Closes the cells in this view (they are the source group's cells).
    pub fn close(&self) {
        for slot in &self.slots {
            slot.state.close();
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        snapshot_of(&self.slots)
    }
}

impl fmt::Debug for ReadonlyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadonlyGroup")
            .field("keys", &self.keys())
            .finish()
    }
}

pub struct SnapshotEntry {
    pub key: String,
    pub kind: StateKind,
    value: Rc<dyn Any>,
    debug: String,
}

impl SnapshotEntry {
    pub fn value<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn debug_value(&self) -> &str {
        &self.debug
    }
}

/// Values of every key at one moment, in declaration order.
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.value::<T>())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for e in &self.entries {
            map.key(&e.key).value(&format_args!("{}", e.debug));
        }
        map.finish()
    }
}
