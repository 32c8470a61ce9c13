pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod privacy;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PodsyncConfig;
pub use error::{DispatchError, DomainError, InfrastructureError, ProjectorError};
pub use ids::{CollectionId, DeviceId, FeedId, ItemId, PlaylistId, SourceId, UserId};
pub use privacy::{PrivacyLevel, PrivacyScope};
