use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::cell::{CellFlags, Core};
use crate::error::{StateError, StateResult};
use crate::readable::ReadonlyCell;
use crate::service::{Pusher, StateService};
use crate::subscription::Subscription;

struct Link {
    service: Rc<dyn StateService>,
    pusher: Pusher,
}

struct RemoteInner<T: 'static> {
    core: Core<T>,
    token: String,
    link: RefCell<Option<Link>>,
}

/// A cell whose value is written only by a [`StateService`].
///
/// There is no `set`: after construction the value changes only when the
/// service calls the pusher registered by [`RemoteCell::connect`].
pub struct RemoteCell<T: 'static> {
    inner: Rc<RemoteInner<T>>,
}

impl<T> Clone for RemoteCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> RemoteCell<T> {
    pub fn new(token: impl Into<String>, value: T) -> Self {
        Self {
            inner: Rc::new(RemoteInner {
                core: Core::new(value),
                token: token.into(),
                link: RefCell::new(None),
            }),
        }
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.borrow().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.core.is_closed()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.core.subscriber_count()
    }

    /// Borrows the value; see [`crate::StateCell::with`] for what `f` must not do.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.core.with(f)
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> StateResult<Subscription> {
        self.inner.core.subscribe(Rc::new(f))
    }

    /// Unregisters from the service (if connected), then closes. Idempotent.
    pub fn close(&self) {
        let link = self.inner.link.borrow_mut().take();
        if let Some(link) = link {
            link.service.unregister(&self.inner.token, &link.pusher);
            self.inner.core.set_flag(CellFlags::CONNECTED, false);
            log::debug!("remote state '{}' disconnected", self.inner.token);
        }
        self.inner.core.close();
    }

    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn core(&self) -> &Core<T> {
        &self.inner.core
    }
}

impl<T: Clone + 'static> RemoteCell<T> {
    /// Last pushed value. Before the first push a connected cell asks the
    /// service for its current state, falling back to the initial value.
    pub fn get(&self) -> T {
        let flags = self.inner.core.flags();
        if flags.contains(CellFlags::CONNECTED) && !flags.contains(CellFlags::RECEIVED) {
            let pulled = self.inner.link.borrow().as_ref().and_then(|link| {
                link.service
                    .current_state(&self.inner.token)
                    .and_then(|v| v.downcast_ref::<T>().cloned())
            });
            if let Some(value) = pulled {
                return value;
            }
        }
        self.inner.core.get()
    }

    /// Registers this cell with `service` under its token.
    pub fn connect(&self, service: Rc<dyn StateService>) -> StateResult<()> {
        if self.is_closed() {
            return Err(StateError::Closed);
        }
        if self.is_connected() {
            return Err(StateError::AlreadyConnected {
                token: self.inner.token.clone(),
            });
        }

        let pusher = {
            let weak = self.inner.core.downgrade();
            let token = self.inner.token.clone();
            Pusher::new(move |value| {
                let Some(core) = Core::<T>::upgrade(&weak) else {
                    return;
                };
                let Some(value) = value.downcast_ref::<T>() else {
                    log::warn!(
                        "remote state '{token}': ignoring push that is not a {}",
                        type_name::<T>()
                    );
                    return;
                };
                core.set_flag(CellFlags::RECEIVED, true);
                if core.set(value.clone()).is_err() {
                    log::warn!("remote state '{token}': ignoring push after close");
                }
            })
        };

        *self.inner.link.borrow_mut() = Some(Link {
            service: service.clone(),
            pusher: pusher.clone(),
        });
        self.inner.core.set_flag(CellFlags::CONNECTED, true);
        service.register(&self.inner.token, pusher);
        log::debug!("remote state '{}' connected", self.inner.token);
        Ok(())
    }

    pub fn readonly(&self) -> ReadonlyCell<T> {
        ReadonlyCell::from(self.clone())
    }
}

impl<T: 'static> RemoteCell<Option<T>> {
    pub fn empty(token: impl Into<String>) -> Self {
        Self::new(token, None)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for RemoteCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| {
            f.debug_struct("RemoteCell")
                .field("token", &self.inner.token)
                .field("value", value)
                .field("connected", &self.is_connected())
                .field("closed", &self.is_closed())
                .finish()
        })
    }
}
