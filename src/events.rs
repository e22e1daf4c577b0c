//! Event types and the main event loop driver for the nearby client.
//!
//! This module defines the [`Event`] enum (ticks, shutdown requests, typed
//! commands, tracker notifications and feed updates) and the
//! [`EventHandler`], which owns the channel everything is funnelled through.
//! The main loop in `main.rs` receives events via [`EventHandler::next`]; the
//! location tracker and the nearby-users fetcher post events via clones of
//! [`EventHandler::tx`].

use crate::models::{Coordinate, NearbyUser, PermissionState};
use chrono::{DateTime, Utc};
use std::io::BufRead;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A line typed on stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `l` / `like`: like the current user and move on.
    Like,
    /// `i` / `ignore`: skip the current user.
    Ignore,
    /// `bio <text>`: replace the profile bio.
    Bio(String),
    /// `q` / `quit`
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        match word.to_ascii_lowercase().as_str() {
            "l" | "like" => Some(Command::Like),
            "i" | "ignore" => Some(Command::Ignore),
            "bio" if !rest.is_empty() => Some(Command::Bio(rest.to_string())),
            "q" | "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Events processed by the application event loop.
///
/// The main loop matches on these to update [`App`](crate::app::App) state.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Periodic tick used for status logging.
    Tick,
    /// Ctrl-C or another request to exit.
    Shutdown,
    /// A command typed by the user.
    Command(Command),
    /// The permission gate moved to a new state. `error` carries the message
    /// shown to the user when the state is `Denied` or `Error`.
    PermissionChanged {
        state: PermissionState,
        error: Option<String>,
    },
    /// A sample was acquired. Display only; not necessarily reported.
    PositionUpdated(Coordinate),
    /// The backend accepted a location update.
    LocationReported {
        coordinate: Coordinate,
        /// Distance from the previous baseline; `None` for the first report.
        distance_m: Option<f64>,
        timestamp: DateTime<Utc>,
    },
    /// A report failed for a reason other than authentication.
    ReportFailed(String),
    /// The backend rejected our credentials. The session must be dropped.
    SessionExpired,
    /// Fresh discovery feed.
    NearbyUsers(Vec<NearbyUser>),
}

/// Multiplexes ticks, shutdown signals and background notifications into a
/// single event stream.
///
/// Holds an unbounded channel: the sender ([`tx`](EventHandler::tx)) can be
/// cloned and given to other tasks, while the receiver is consumed by
/// [`next`](EventHandler::next) in the main loop.
pub struct EventHandler {
    /// Sender for posting events (e.g. from the tracker or a fetch task).
    pub tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Creates a new event handler and spawns the tick and Ctrl-C tasks.
    ///
    /// Both tasks stop on their own once every receiver is gone.
    ///
    /// # Arguments
    ///
    /// * `tick_rate` - Interval between [`Event::Tick`] emissions.
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let tick_tx = tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_rate);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tick_tx.send(Event::Tick).is_err() {
                    break;
                }
            }
        });

        let signal_tx = tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, shutting down");
                    signal_tx.send(Event::Shutdown).ok();
                }
                Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
            }
        });

        Self { tx, rx }
    }

    /// Reads [`Command`]s from stdin on a dedicated thread.
    ///
    /// A plain thread rather than `tokio::io::stdin`, whose blocking read
    /// would hold up runtime shutdown until the next newline.
    pub fn listen_for_commands(&self) {
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Could not read stdin: {}", e);
                        return;
                    }
                };
                match Command::parse(&line) {
                    Some(command) => {
                        if tx.send(Event::Command(command)).is_err() {
                            return;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!(
                        "Unknown command {:?}; use like, ignore, bio <text> or quit",
                        line.trim()
                    ),
                }
            }
            debug!("stdin closed; no more commands");
        });
    }

    /// Receives the next event from the channel.
    ///
    /// Returns `None` only if every sender was dropped, which cannot happen
    /// while `self.tx` is alive.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_and_forwarded_events_share_one_stream() {
        let mut handler = EventHandler::new(Duration::from_secs(5));
        assert_eq!(handler.next().await, Some(Event::Tick));

        handler.tx.send(Event::SessionExpired).unwrap();
        assert_eq!(handler.next().await, Some(Event::SessionExpired));

        assert_eq!(handler.next().await, Some(Event::Tick));
    }

    #[test]
    fn commands_parse_short_and_long_forms() {
        assert_eq!(Command::parse("l"), Some(Command::Like));
        assert_eq!(Command::parse("  LIKE \n"), Some(Command::Like));
        assert_eq!(Command::parse("i"), Some(Command::Ignore));
        assert_eq!(Command::parse("ignore"), Some(Command::Ignore));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(
            Command::parse("bio  Learning Rust, 3x a week "),
            Some(Command::Bio("Learning Rust, 3x a week".to_string()))
        );
    }

    #[test]
    fn unknown_or_incomplete_commands_are_rejected() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("bio"), None);
        assert_eq!(Command::parse("bio   "), None);
        assert_eq!(Command::parse("likes"), None);
        assert_eq!(Command::parse("swipe left"), None);
    }
}
