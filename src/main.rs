use color_eyre::eyre::bail;
use color_eyre::Result;
use nearby_client::{
    api::BackendClient,
    app::App,
    config::Config,
    events::{Command, Event, EventHandler},
    location::LocationSource,
    logging,
    models::PermissionState,
    session::SessionStore,
    tracker::{LocationTracker, TrackerSettings},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Instrumentation and safety
    let _log_guard = logging::initialize_logging();
    color_eyre::install()?;

    let config = Config::load();
    let client = Arc::new(BackendClient::new(&config.backend)?);

    // Restore or establish a session
    let mut session = SessionStore::load(&config.session.path);
    if let Some(token) = session.token() {
        client.set_bearer(Some(token.to_string()));
    } else {
        let Some(access_token) = config.backend.google_access_token.as_deref() else {
            bail!("No stored session; set backend.google_access_token in config.toml to log in");
        };
        match client.login_with_google(access_token).await {
            Ok(auth) => session.establish(auth)?,
            Err(e) => {
                error!("Failed to complete login via backend: {}", e);
                session.logout()?;
                return Err(e.into());
            }
        }
    }

    let mut events = EventHandler::new(Duration::from_secs(30));
    events.listen_for_commands();
    let tracker = LocationTracker::new(
        LocationSource::from_config(&config.location),
        Arc::clone(&client),
        TrackerSettings::from_config(&config),
        events.tx.clone(),
    );
    let mut app = App::new(session.user().cloned());
    info!(
        "Signed in as {}",
        app.user.as_ref().map(|u| u.display_name()).unwrap_or("?")
    );

    info!("Commands: like (l), ignore (i), bio <text>, quit (q)");
    tracker.set_session_active(true);
    match tracker.request_permission().await {
        PermissionState::Granted => info!("Location sharing enabled"),
        state => warn!(
            %state,
            "Location is needed to find people near you. Restart to retry."
        ),
    }

    // Main loop
    while !app.should_quit {
        let Some(event) = events.next().await else {
            break;
        };
        let expired = event == Event::SessionExpired;
        if let Event::Command(Command::Bio(bio)) = &event {
            spawn_profile_update(Arc::clone(&client), bio.clone(), events.tx.clone());
        }

        if app.handle_event(event) {
            spawn_nearby_fetch(Arc::clone(&client), events.tx.clone());
        }
        if expired {
            tracker.set_session_active(false);
            client.set_bearer(None);
            session.logout()?;
            warn!("Session expired. Log in again to keep sharing your location.");
        }
    }

    tracker.stop();
    info!("Shut down cleanly.");
    Ok(())
}

fn spawn_nearby_fetch(client: Arc<BackendClient>, tx: UnboundedSender<Event>) {
    tokio::spawn(async move {
        match client.fetch_nearby().await {
            Ok(users) => {
                info!("Loaded {} nearby users", users.len());
                tx.send(Event::NearbyUsers(users)).ok();
            }
            Err(e) if e.is_auth() => {
                warn!("Authentication error fetching users: {}", e);
                tx.send(Event::SessionExpired).ok();
            }
            Err(e) => error!("Could not load nearby users at this time: {}", e),
        }
    });
}

fn spawn_profile_update(client: Arc<BackendClient>, bio: String, tx: UnboundedSender<Event>) {
    tokio::spawn(async move {
        match client.update_profile(&bio).await {
            Ok(()) => info!("Profile updated successfully"),
            Err(e) if e.is_auth() => {
                warn!("Authentication error updating profile: {}", e);
                tx.send(Event::SessionExpired).ok();
            }
            Err(e) => error!("Failed to update profile: {}", e),
        }
    });
}
