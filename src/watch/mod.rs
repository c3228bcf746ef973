//! Incremental mailbox watching over the history API.

pub mod handler;
pub mod history;
pub mod watcher;

pub use handler::Handler;
pub use history::{HistoryEvent, HistoryType};
pub use watcher::{Watcher, WatcherConfig};
