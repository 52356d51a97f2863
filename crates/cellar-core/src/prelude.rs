pub use crate::bind::{use_set_state, use_state, use_state_changed, use_store_state};
pub use crate::cell::{Listener, StateCell, state};
pub use crate::composition::{
    Composition, current_composition, remember, remember_with_key,
};
pub use crate::error::{StateError, StateResult};
pub use crate::group::{
    GroupBuilder, GroupOptions, ReadonlyGroup, Snapshot, SnapshotEntry, StateGroup, StateKind,
    StateValue,
};
pub use crate::readable::{ReadState, ReadonlyCell};
pub use crate::remote::RemoteCell;
pub use crate::scope::{Dispose, Scope, current_scope, effect};
pub use crate::service::{MemoryService, Pusher, StateService};
pub use crate::store::{
    Factory, KeyInspection, StateStore, StoreInspection, StorePhase, StoreSubscription,
    SubscriptionKey,
};
pub use crate::subscription::{SubId, Subscription};
