pub mod event;
pub mod inmemory;
pub mod sled_log;
pub mod store;

pub use event::{
    CollectionSnapshot, EventInfo, EventPayload, PlayStatusSnapshot, PlaylistItemRef,
    PlaylistSnapshot, PrivacyScopeTag, StoredEvent, SubscriptionSnapshot,
};
pub use inmemory::InMemoryEventLog;
pub use sled_log::SledEventLog;
pub use store::{AppendError, EventLog, EventLogError, EventResult, NewEvent};
