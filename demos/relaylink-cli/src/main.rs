//! Command-line driver for the session coordinator.
//!
//! Each run behaves like one page load of the dashboard: restore the
//! persisted session, apply one command, print the resulting state.
//!
//! Run with: cargo run -p relaylink-cli -- --state-file session.json status

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relaylink_core::{LinkStatus, LoginGrant, Navigation, Profile, SessionPhase};
use relaylink_session::{SessionCoordinator, storage::FileStore};
use relaylink_transport::{
    ClientConfig, HttpBrokerClient, HttpTokenRefresher, config::normalize_base_url,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relaylink", about = "Drive the relay dashboard session from a terminal")]
struct Cli {
    /// File holding the persisted session.
    #[arg(long, default_value = "relaylink-session.json")]
    state_file: PathBuf,

    /// Backend base URL. Overrides RELAYLINK_API_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the restored session state.
    Status,
    /// Store tokens from an external login and open the realtime link.
    Login {
        access_token: String,
        refresh_token: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        fullname: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Close the realtime link and forget the session.
    Logout,
    /// Re-open the realtime link with the stored token.
    Connect,
    /// Show where the router would send a path.
    Navigate { path: String },
    /// Print cached profile fields.
    Profile,
    /// Print session events recorded during this run.
    Events,
}

#[derive(Serialize)]
struct Report {
    phase: SessionPhase,
    link: LinkStatus,
    logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    navigation: Option<Navigation>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = normalize_base_url(base_url)?;
    }
    tracing::debug!(base_url = %config.base_url, state_file = %cli.state_file.display(), "starting");

    let store = FileStore::open(&cli.state_file)?;
    let broker = HttpBrokerClient::new(config.clone())?;
    let refresher = HttpTokenRefresher::new(config)?;
    let coordinator = SessionCoordinator::new(store, broker, refresher);

    if let Some(startup) = coordinator.restore() {
        startup.await?;
    }

    let mut navigation = None;
    match cli.command {
        Command::Status => {}
        Command::Login {
            access_token,
            refresh_token,
            username,
            fullname,
            email,
        } => {
            let profile = Profile {
                username,
                fullname,
                email,
                ..Profile::default()
            };
            let mut grant = LoginGrant::new(access_token, refresh_token);
            if !profile.is_empty() {
                grant = grant.with_profile(profile);
            }
            coordinator.login(grant)?.await?;
        }
        Command::Logout => {
            if let Some(task) = coordinator.logout() {
                task.await?;
            } else {
                tracing::info!("Already logged out");
            }
        }
        Command::Connect => {
            if let Some(task) = coordinator.connect()? {
                task.await?;
            }
        }
        Command::Navigate { path } => {
            navigation = Some(coordinator.navigate(&path));
        }
        Command::Profile => {
            println!("{}", serde_json::to_string_pretty(&coordinator.profile()?)?);
            return Ok(());
        }
        Command::Events => {
            for event in coordinator.events().history() {
                println!("{}", serde_json::to_string(&event)?);
            }
            return Ok(());
        }
    }

    let snapshot = coordinator.snapshot();
    let report = Report {
        phase: snapshot.phase,
        link: snapshot.link,
        logged_in: snapshot.is_logged_in(),
        navigation,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
