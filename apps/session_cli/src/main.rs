use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    Credentials, Freshness, HttpAuthRemote, Profile, SessionController, SessionEvent, SessionState,
};
use storage::{KeyValueStore, SqliteStore, TOKEN_KEY, USER_KEY};
use tokio::sync::broadcast::{error::TryRecvError, Receiver};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "client.toml")]
    config: PathBuf,
    /// Overrides the configured API base url.
    #[arg(long)]
    api_base_url: Option<String>,
    /// Print states as JSON instead of the dashboard view.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Resume the cached session and refresh the profile.
    Restore {
        /// Print the cached view only and skip waiting for the refresh.
        #[arg(long)]
        no_wait: bool,
    },
    Logout,
    /// Show what is cached on this device without contacting the server.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if let Some(api_base_url) = args.api_base_url {
        settings.api_base_url = api_base_url;
    }
    info!(
        "session_cli: api={} cache={}",
        settings.api_base_url, settings.cache_database_url
    );

    let store = Arc::new(
        SqliteStore::new(&settings.cache_database_url)
            .await
            .with_context(|| format!("failed to open cache '{}'", settings.cache_database_url))?,
    );
    let remote = HttpAuthRemote::new(&settings.api_base_url, settings.request_timeout())?
        .with_profile_path(&settings.profile_path)?;
    let controller = SessionController::new(Arc::new(remote), store.clone());
    let mut events = controller.subscribe_events();

    match args.command {
        Command::Login { username, password } => {
            let credentials = Credentials::new(username, password);
            if let Err(err) = controller.login(&credentials).await {
                bail!("{}", err.user_message());
            }
            print_state(&controller.state().await, args.json)?;
        }
        Command::Restore { no_wait } => {
            let optimistic = controller.restore_session().await;
            print_state(&optimistic, args.json)?;
            if !no_wait && !matches!(optimistic, SessionState::Unauthenticated) {
                let settled = controller.wait_for_refresh().await;
                report_refresh_events(&mut events);
                if settled != optimistic {
                    print_state(&settled, args.json)?;
                }
            }
        }
        Command::Logout => {
            controller.logout().await;
            println!("Signed out.");
        }
        Command::Status => {
            let cached = cached_state(store.as_ref()).await?;
            print_state(&cached, args.json)?;
        }
    }

    Ok(())
}

/// Read-only view of the cache. The controller is not involved, so nothing is written.
async fn cached_state(store: &dyn KeyValueStore) -> Result<SessionState> {
    let token = store.get(TOKEN_KEY).await?.filter(|token| !token.is_empty());
    if token.is_none() {
        return Ok(SessionState::Unauthenticated);
    }
    let profile = store
        .get(USER_KEY)
        .await?
        .and_then(|raw| serde_json::from_str::<Profile>(&raw).ok());
    Ok(match profile {
        Some(profile) => SessionState::authenticated(profile, Freshness::Cached),
        None => SessionState::Authenticating,
    })
}

fn report_refresh_events(events: &mut Receiver<SessionEvent>) {
    loop {
        match events.try_recv() {
            Ok(event) => {
                if let Some(notice) = refresh_notice(&event) {
                    eprintln!("{notice}");
                }
            }
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

fn refresh_notice(event: &SessionEvent) -> Option<String> {
    match event {
        // The saved profile stays on screen, but the server no longer accepts the token.
        SessionEvent::RefreshFailed(err) if err.requires_reauth() => {
            Some("Your session has expired. Please sign in again.".to_string())
        }
        SessionEvent::RefreshFailed(err) => {
            Some(format!("Profile refresh failed: {}", err.user_message()))
        }
        SessionEvent::RedirectToLogin => {
            Some("Your session has ended. Please sign in again.".to_string())
        }
        SessionEvent::StateChanged(_) => None,
    }
}

fn print_state(state: &SessionState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
    } else {
        println!("{}", render_state(state));
    }
    Ok(())
}

fn render_state(state: &SessionState) -> String {
    let Some(profile) = state.profile() else {
        return match state {
            SessionState::Authenticating => "Loading...".to_string(),
            SessionState::LoggedOut => "Signed out.".to_string(),
            _ => "Not signed in.".to_string(),
        };
    };

    let mut lines = vec![
        format!("Welcome, {}!", profile.username),
        format!("  Role:         {}", profile.role),
        format!("  Email:        {}", profile.email),
        format!("  User ID:      {}", profile.id),
        format!("  Status:       {}", profile.status_label()),
        format!("  Member Since: {}", profile.member_since()),
    ];
    if matches!(state, SessionState::Degraded { .. }) {
        lines.push("  (offline: showing saved profile)".to_string());
    }
    lines.join("\n")
}
