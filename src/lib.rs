pub mod config;
pub mod model;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub mod client;

pub mod prelude {
    pub use crate::config::ServerConfig;
    pub use crate::model::HuntError;
    pub use crate::model::HuntEvent;
    pub use crate::model::LeaderboardEntry;
    pub use crate::model::Lobby;
    pub use crate::model::Race;
    pub use crate::model::Team;
    pub use crate::model::TeamRaceProgress;
    pub use crate::model::Topic;

    #[cfg(feature = "server")]
    pub use crate::server::{create_router, AppState, HuntService};

    #[cfg(feature = "client")]
    pub use crate::client::{LeaderboardWatcher, ReconnectPolicy, WatchEvent};
}
