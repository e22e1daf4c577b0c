use crate::events::{Command, Event};
use crate::feed::Feed;
use crate::models::{Coordinate, PermissionState, User};
use chrono::{DateTime, Utc};
use tracing::info;

/// Display-side state, folded from [`Event`]s.
#[derive(Debug, Default)]
pub struct App {
    pub user: Option<User>,
    pub permission: PermissionState,
    pub user_coords: Option<Coordinate>,
    pub location_error: Option<String>,
    pub feed: Feed,
    pub tick_count: usize,
    pub should_quit: bool,

    // Reporting telemetry
    pub last_report: Option<DateTime<Utc>>,
    pub last_report_error: Option<String>,
    pub reports_sent: usize,
}

impl App {
    pub fn new(user: Option<User>) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    /// Applies one event. Returns `true` when permission was just granted,
    /// which is the cue to load the discovery feed.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Tick => self.on_tick(),
            Event::Shutdown => self.should_quit = true,
            Event::Command(command) => self.on_command(command),
            Event::PermissionChanged { state, error } => {
                let granted_now =
                    state == PermissionState::Granted && self.permission != PermissionState::Granted;
                self.permission = state;
                self.location_error = error;
                if state != PermissionState::Granted && state != PermissionState::Requesting {
                    self.feed.clear();
                }
                return granted_now;
            }
            Event::PositionUpdated(coords) => self.user_coords = Some(coords),
            Event::LocationReported { timestamp, .. } => {
                self.last_report = Some(timestamp);
                self.last_report_error = None;
                self.reports_sent += 1;
            }
            Event::ReportFailed(message) => self.last_report_error = Some(message),
            Event::SessionExpired => {
                self.user = None;
                self.feed.clear();
                self.should_quit = true;
            }
            Event::NearbyUsers(users) => self.feed.replace(users),
        }
        false
    }

    /// Feed commands act here; `Bio` needs the backend and is sent by `main`.
    fn on_command(&mut self, command: Command) {
        match command {
            Command::Like | Command::Ignore => {
                let acted = if command == Command::Like {
                    self.feed.like()
                } else {
                    self.feed.ignore()
                };
                if acted.is_none() {
                    info!("No more users nearby. Check back later.");
                } else if let Some(next) = self.feed.current() {
                    info!(
                        "Next: {} ({})",
                        next.name.as_deref().unwrap_or("?"),
                        next.goal.as_deref().unwrap_or("no goal listed")
                    );
                }
            }
            Command::Bio(_) => {}
            Command::Quit => self.should_quit = true,
        }
    }

    fn on_tick(&mut self) {
        self.tick_count += 1;
        let coords = self
            .user_coords
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        info!(
            permission = %self.permission,
            reports = self.reports_sent,
            nearby = self.feed.remaining(),
            "Status: location {}",
            coords
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NearbyUser;

    fn nearby(id: &str) -> NearbyUser {
        NearbyUser {
            id: id.to_string(),
            name: None,
            goal: None,
            distance: None,
            pic: None,
        }
    }

    #[test]
    fn grant_is_reported_once() {
        let mut app = App::new(None);
        let granted = Event::PermissionChanged {
            state: PermissionState::Granted,
            error: None,
        };
        assert!(app.handle_event(granted.clone()));
        assert!(!app.handle_event(granted));
    }

    #[test]
    fn losing_permission_clears_feed_and_keeps_error() {
        let mut app = App::new(None);
        app.handle_event(Event::NearbyUsers(vec![nearby("1")]));
        assert_eq!(app.feed.remaining(), 1);

        app.handle_event(Event::PermissionChanged {
            state: PermissionState::Denied,
            error: Some("Location permission denied".to_string()),
        });
        assert!(app.feed.is_exhausted());
        assert_eq!(app.location_error.as_deref(), Some("Location permission denied"));
    }

    #[test]
    fn session_expiry_logs_out_and_quits() {
        let mut app = App::new(Some(User {
            id: None,
            name: Some("Ada".to_string()),
            email: None,
        }));
        app.handle_event(Event::SessionExpired);
        assert!(app.user.is_none());
        assert!(app.should_quit);
    }

    #[test]
    fn reports_are_counted() {
        let mut app = App::new(None);
        app.handle_event(Event::ReportFailed("502".to_string()));
        app.handle_event(Event::LocationReported {
            coordinate: Coordinate::new(40.0, -74.0),
            distance_m: None,
            timestamp: Utc::now(),
        });
        assert_eq!(app.reports_sent, 1);
        assert!(app.last_report_error.is_none());
        assert!(app.last_report.is_some());
    }

    #[test]
    fn like_and_ignore_commands_walk_the_feed() {
        let mut app = App::new(None);
        app.handle_event(Event::NearbyUsers(vec![nearby("1"), nearby("2")]));

        assert!(!app.handle_event(Event::Command(Command::Like)));
        assert_eq!(app.feed.current().map(|u| u.id.as_str()), Some("2"));
        app.handle_event(Event::Command(Command::Ignore));
        assert!(app.feed.is_exhausted());

        // Nothing left; stays exhausted without panicking.
        app.handle_event(Event::Command(Command::Like));
        assert!(app.feed.is_exhausted());
        assert!(!app.should_quit);
    }

    #[test]
    fn quit_command_stops_the_loop() {
        let mut app = App::new(None);
        app.handle_event(Event::Command(Command::Bio("hi".to_string())));
        assert!(!app.should_quit);
        app.handle_event(Event::Command(Command::Quit));
        assert!(app.should_quit);
    }
}
