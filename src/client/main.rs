#![cfg(feature = "client")]

use clap::Parser;
use scavenger_hunt::client::{LeaderboardWatcher, WatchEvent};
use scavenger_hunt::model::LeaderboardEntry;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Prints a hunt leaderboard as it changes.
#[derive(Debug, Parser)]
#[command(name = "leaderboard-watch", version)]
struct Args {
    /// HTTP root of the hunt server
    #[arg(long, env = "HUNT_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Follow one race instead of the global board
    #[arg(long)]
    race_id: Option<Uuid>,

    /// Seconds between HTTP polls while the socket is down
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: u64,

    /// Polls between attempts to restore the socket
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    reconnect_every: u32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scavenger_hunt=info,warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let watcher = match LeaderboardWatcher::new(args.server) {
        Ok(watcher) => watcher
            .with_poll_interval(Duration::from_secs(args.poll_interval))
            .with_reconnect_every(args.reconnect_every),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };
    let watcher = match args.race_id {
        Some(race_id) => watcher.for_race(race_id),
        None => watcher,
    };

    let (mut events, handle) = watcher.spawn();
    while let Some(event) = events.recv().await {
        match event {
            WatchEvent::Connected => println!("-- live"),
            WatchEvent::Disconnected => println!("-- connection lost, retrying"),
            WatchEvent::Polling => println!("-- live updates unavailable, polling"),
            WatchEvent::Update(entries) => print_board(&entries),
        }
    }
    if let Ok(Err(e)) = handle.await {
        error!("Watcher stopped: {}", e);
    }
}

fn print_board(entries: &[LeaderboardEntry]) {
    println!("{:>4}  {:<24} {:>6} {:>9}", "#", "Team", "Points", "Progress");
    for entry in entries {
        println!(
            "{:>4}  {:<24} {:>6} {:>5}/{:<3}",
            entry.rank, entry.name, entry.points, entry.progress, entry.total_questions
        );
    }
    println!();
}
