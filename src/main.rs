use anyhow::Result;
use chatter_client::ApiClient;
use chatter_config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chatter", about = "chatter social-networking API client")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Credential file path (default: ~/.chatter/credentials.json).
    #[arg(long, value_name = "PATH", global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and persist the session credential.
    Login {
        username: String,
        password: String,
    },
    /// Sign out and remove the stored credential.
    Logout,
    /// Show local session status without touching the network.
    Status,
    /// Verify the stored session against the server.
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path).map_err(|e| anyhow::anyhow!("config error: {e}"))?
    } else {
        Config::default()
    };
    if let Some(store) = cli.store {
        config.store_path = Some(store);
    }

    let (client, _events) = ApiClient::from_config(&config).await?;

    match cli.command {
        Commands::Login { username, password } => {
            let user = client
                .login(&username, &password)
                .await
                .map_err(|e| anyhow::anyhow!("login failed: {e}"))?;
            eprintln!("logged in as {}", user.username);
        }
        Commands::Logout => {
            client
                .logout()
                .await
                .map_err(|e| anyhow::anyhow!("logout failed: {e}"))?;
            eprintln!("logged out");
        }
        Commands::Status => {
            match client.store().load().await? {
                Some(token) => {
                    let state = if token.is_expired() { "expired" } else { "valid" };
                    println!("credential: {state}");
                    if let Some(expires_at) = token.expires_at {
                        println!("expires_at: {expires_at}");
                    }
                    println!(
                        "refresh_token: {}",
                        if token.refresh_token.is_some() { "present" } else { "absent" }
                    );
                }
                None => println!("not logged in"),
            }
        }
        Commands::Whoami => match client.check_auth().await {
            Ok(Some(user)) => println!("{}", user.username),
            Ok(None) => {
                eprintln!("session expired, please log in again");
                std::process::exit(1);
            }
            Err(e) => return Err(anyhow::anyhow!("auth check failed: {e}")),
        },
    }

    Ok(())
}
