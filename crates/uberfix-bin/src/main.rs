//! UberFix service host: OTP verification, map credential loading and
//! reference data behind a local request broker.

mod app;
mod broker;

use std::path::PathBuf;

use app::{AppState, Provider};
use clap::{Parser, Subcommand};
use uberfix_config_and_utils::{init_logging, init_logging_for_service, Config, Paths};

/// UberFix command-line interface.
#[derive(Parser)]
#[command(name = "uberfix")]
#[command(about = "UberFix OTP, map credential and reference data services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (socket, logs, config). Defaults to ~/.uberfix
    #[arg(long, global = true, env = "UBERFIX_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the local request broker in the foreground
    Serve,
    /// Issue and verify one-time passwords
    Otp {
        #[command(subcommand)]
        command: OtpCommands,
    },
    /// Load map provider credentials
    Maps {
        #[command(subcommand)]
        command: MapsCommands,
    },
    /// Read a reference table (`cities`, `districts:<city_id>`, ...)
    Reference { key: String },
    /// Print a diagnostic snapshot
    Status,
}

#[derive(Subcommand)]
enum OtpCommands {
    /// Issue a code and send it by SMS
    Send {
        phone: String,
        /// Action the code authorizes
        #[arg(long)]
        action: Option<String>,
        /// Client address used for rate limiting
        #[arg(long, default_value = "local")]
        client: String,
    },
    /// Redeem a code
    Verify { phone: String, otp: String },
    /// Delete expired codes
    Purge,
}

#[derive(Subcommand)]
enum MapsCommands {
    /// Fetch the credential and inject the provider resource
    Load { provider: Provider },
    /// Drop the cached credential and loaded resource
    Reset { provider: Provider },
    /// Show loader state
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    match cli.command {
        None | Some(Commands::Serve) => init_logging(&level, &paths),
        Some(_) => init_logging_for_service("uberfix-cli", &level, &paths),
    }

    let state = AppState::build(config, paths).await?;

    match cli.command {
        None | Some(Commands::Serve) => app::run_broker(state).await?,
        Some(Commands::Otp { command }) => match command {
            OtpCommands::Send {
                phone,
                action,
                client,
            } => app::run_otp_send(&state, phone, action, &client).await?,
            OtpCommands::Verify { phone, otp } => app::run_otp_verify(&state, phone, otp).await?,
            OtpCommands::Purge => app::run_otp_purge(&state).await?,
        },
        Some(Commands::Maps { command }) => match command {
            MapsCommands::Load { provider } => app::run_maps_load(&state, provider).await?,
            MapsCommands::Reset { provider } => app::run_maps_reset(&state, provider)?,
            MapsCommands::Status => app::run_maps_status(&state)?,
        },
        Some(Commands::Reference { key }) => app::run_reference(&state, &key).await?,
        Some(Commands::Status) => app::run_status(&state).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_otp_send() {
        let cli = Cli::try_parse_from([
            "uberfix",
            "--base-dir",
            "/tmp/uberfix",
            "otp",
            "send",
            "01234567890",
            "--action",
            "signup",
        ])
        .unwrap();
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/uberfix")));
        match cli.command {
            Some(Commands::Otp {
                command: OtpCommands::Send { phone, action, client },
            }) => {
                assert_eq!(phone, "01234567890");
                assert_eq!(action.as_deref(), Some("signup"));
                assert_eq!(client, "local");
            }
            _ => panic!("expected otp send"),
        }
    }

    #[test]
    fn test_parse_maps_provider() {
        let cli = Cli::try_parse_from(["uberfix", "maps", "load", "google-maps"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Maps {
                command: MapsCommands::Load {
                    provider: Provider::GoogleMaps
                }
            })
        ));
        assert!(Cli::try_parse_from(["uberfix", "maps", "load", "bing"]).is_err());
    }
}
