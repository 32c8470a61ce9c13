//! The command dispatcher (C4): per-aggregate serialized workers with
//! optimistic-concurrency retry and bounded concurrency.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, DispatcherOptions};
