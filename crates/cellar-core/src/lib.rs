//! # Cells, Groups, and Stores
//!
//! Cellar keeps UI state outside the component tree and lets components
//! subscribe to it. There are four layers:
//!
//! - `StateCell<T>`: observable value with `get` / `set` / `subscribe` / `close`.
//! - `RemoteCell<T>`: read-only cell fed by a `StateService`.
//! - `StateGroup`: named cells declared together by a factory.
//! - `StateStore`: lifecycle around one group (reset, close, bookkeeping).
//!
//! ## Cells
//!
//! ```rust
//! use cellar_core::*;
//!
//! let count = state(0);
//! let seen = std::rc::Rc::new(std::cell::Cell::new(0));
//! let sub = count.subscribe({
//!     let seen = seen.clone();
//!     move |v| seen.set(*v)
//! }).unwrap();
//!
//! count.set(2).unwrap();
//! assert_eq!(seen.get(), 2);
//!
//! sub.unsubscribe();
//! count.close();
//! assert!(count.set(3).is_err());
//! assert_eq!(count.get(), 2);
//! ```
//!
//! Listeners run synchronously, in subscription order, before `set`
//! returns. Subscribing does not replay the current value.
//!
//! ## Remote state
//!
//! Remote cells have no `set`. They are connected to a service, which pushes
//! values under the cell's token:
//!
//! ```rust
//! use std::rc::Rc;
//! use cellar_core::*;
//!
//! let service = Rc::new(MemoryService::new());
//! let price = RemoteCell::<Option<u32>>::empty("ticker/price");
//! price.connect(service.clone()).unwrap();
//!
//! service.push("ticker/price", Some(42u32));
//! assert_eq!(price.get(), Some(42));
//! ```
//!
//! ## Groups and stores
//!
//! A group is declared once by a factory; keys are fixed afterwards. The
//! keyed API rejects writes to remote keys at runtime, typed handles make it
//! impossible at compile time.
//!
//! ```rust
//! use cellar_core::*;
//!
//! let store = StateStore::create(|b| {
//!     b.local("count", 0u32);
//!     b.remote_empty::<String>("motd", "server/motd");
//! })
//! .unwrap();
//!
//! store.set("count", 1u32).unwrap();
//! assert!(matches!(
//!     store.set("motd", Some(String::new())),
//!     Err(StateError::RemoteStateImmutable { .. })
//! ));
//!
//! store.reset_states().unwrap();
//! assert_eq!(store.get::<u32>("count").unwrap(), 0);
//! ```
//!
//! ## Components
//!
//! `Composition` models one mounted component. Hooks such as `use_state`
//! subscribe once per composition and release on `dispose`:
//!
//! ```rust
//! use cellar_core::*;
//!
//! let name = state("Jane".to_string());
//! let view = Composition::new();
//!
//! let shown = view.compose(|| use_state(&name));
//! assert_eq!(shown, "Jane");
//!
//! name.set("Joe".to_string()).unwrap();
//! assert!(view.take_dirty());
//! assert_eq!(view.compose(|| use_state(&name)), "Joe");
//!
//! view.dispose();
//! assert_eq!(name.subscriber_count(), 0);
//! ```

pub mod bind;
pub mod cell;
pub mod composition;
pub mod error;
pub mod group;
pub mod prelude;
pub mod readable;
pub mod remote;
pub mod scope;
pub mod service;
pub mod store;
pub mod subscription;
pub mod tests;

pub use prelude::*;
