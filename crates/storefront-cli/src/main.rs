//! Storefront CLI - log in to the storefront API and keep the session alive.
//!
//! Tokens are stored where the config says (`file` by default), so a
//! session started with `login` is picked up by later commands.

mod notify;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use storefront_core::auth::RefreshOutcome;
use storefront_core::{Config, SessionManager, SessionState};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use notify::StderrNotifier;

const USAGE: &str = "Usage: storefront <command>

Commands:
  login [username]   Log in and store the session
  logout             End the session and clear stored tokens
  status             Show who is logged in
  refresh            Renew the access token once
  watch              Keep the session alive until interrupted";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login { username: Option<String> },
    Logout,
    Status,
    Refresh,
    Watch,
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Command::Help);
        };
        let command = match name.as_str() {
            "login" => Command::Login {
                username: args.get(1).cloned(),
            },
            "logout" => Command::Logout,
            "status" => Command::Status,
            "refresh" => Command::Refresh,
            "watch" => Command::Watch,
            "help" | "-h" | "--help" => Command::Help,
            other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
        };
        Ok(command)
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env();
    info!(api = %config.api_base_url, storage = ?config.storage, "Storefront CLI starting");

    let session = SessionManager::builder(Arc::new(config.api_client()?), config.token_store()?)
        .notifier(Arc::new(StderrNotifier))
        .config(config.session_config())
        .build();

    let result = run(command, &session, &mut config).await;
    session.shutdown();
    result
}

async fn run(command: Command, session: &SessionManager, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { username } => login(session, config, username).await,
        Command::Logout => {
            session.logout();
            println!("Logged out");
            Ok(())
        }
        Command::Status => {
            session.initialize().await;
            print_status(&session.state());
            Ok(())
        }
        Command::Refresh => {
            session.initialize().await;
            match session.refresh().await? {
                RefreshOutcome::NoSession => bail!("Not logged in"),
                RefreshOutcome::Refreshed => println!("Access token renewed"),
                RefreshOutcome::Discarded | RefreshOutcome::Ended => {
                    bail!("Session ended, please log in again")
                }
            }
            Ok(())
        }
        Command::Watch => watch(session).await,
        Command::Help => Ok(()),
    }
}

async fn login(session: &SessionManager, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username {
        Some(username) => username,
        None => prompt_username(config.last_username.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let role = session.login(&username, &password).await?;
    println!("Logged in as {} ({})", username, role);

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }
    Ok(())
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => eprint!("Username [{}]: ", last),
        None => eprint!("Username: "),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line).context("Failed to read username")?;
    let entered = line.trim();
    match (entered.is_empty(), last) {
        (false, _) => Ok(entered.to_string()),
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("A username is required"),
    }
}

fn print_status(state: &SessionState) {
    match state {
        SessionState::Authenticated(_, identity) => {
            println!("Logged in as {} (id {}, {})", identity.username, identity.id, identity.role);
            if let Some(expires_at) = identity.expires_at {
                println!("Access token expires {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        _ => println!("Not logged in"),
    }
}

/// Hold the session open, letting the refresh timer renew it, until Ctrl-C
/// or until the session ends.
async fn watch(session: &SessionManager) -> Result<()> {
    if !session.initialize().await.is_authenticated() {
        bail!("Not logged in");
    }
    print_status(&session.state());
    eprintln!("Keeping session alive, press Ctrl-C to stop");

    let mut states = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving session in place");
                return Ok(());
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = states.borrow_and_update().clone();
                match state {
                    SessionState::Authenticated(_, identity) => {
                        eprintln!("Access token renewed for {}", identity.username);
                    }
                    SessionState::Unauthenticated | SessionState::RefreshFailed => {
                        bail!("Session ended, please log in again");
                    }
                    SessionState::Authenticating => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_login_with_username() {
        assert_eq!(
            Command::parse(&args(&["login", "ada"])).unwrap(),
            Command::Login {
                username: Some("ada".to_string())
            }
        );
        assert_eq!(
            Command::parse(&args(&["login"])).unwrap(),
            Command::Login { username: None }
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse(&args(&["logout"])).unwrap(), Command::Logout);
        assert_eq!(Command::parse(&args(&["status"])).unwrap(), Command::Status);
        assert_eq!(Command::parse(&args(&["refresh"])).unwrap(), Command::Refresh);
        assert_eq!(Command::parse(&args(&["watch"])).unwrap(), Command::Watch);
        assert_eq!(Command::parse(&args(&[])).unwrap(), Command::Help);
        assert_eq!(Command::parse(&args(&["--help"])).unwrap(), Command::Help);
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = Command::parse(&args(&["shop"])).unwrap_err();
        assert!(err.to_string().contains("Unknown command 'shop'"));
    }
}
