//! The per-user aggregate (C2) and its conflict resolver (C3): pure
//! `decide`/`apply` functions plus the state they operate on.

pub mod apply;
pub mod checkpoint;
pub mod command;
pub mod conflict;
pub mod decide;
pub mod state;

pub use apply::{apply as apply_event, fold};
pub use command::{Command, PrivacyScope, SyncPlaylist};
pub use decide::decide;
pub use state::UserAggregateState;
