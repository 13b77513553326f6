//! Live leaderboard client: WebSocket first, HTTP polling when the socket stays down.

mod backoff;
mod watcher;

pub use backoff::ReconnectPolicy;
pub use watcher::{LeaderboardWatcher, WatchError, WatchEvent};
