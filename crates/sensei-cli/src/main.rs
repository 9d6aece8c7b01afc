use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sensei_agents::AgentServiceFactory;
use sensei_integrations::TokenVerifier;
use sensei_server::{
    config::SECRET_ENV_VAR, AgentSessionManager, Gateway, IdleReaper, ServerConfig,
    SessionRegistry,
};

#[derive(Parser)]
#[command(name = "sensei")]
#[command(about = "Learner engagement session server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the real-time gateway and idle reaper
    Serve {
        /// Path to the server config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Connection-token helpers
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Path to the server config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Mint a connection token for local testing
    Mint {
        /// Token subject (the authenticated user id)
        #[arg(short, long)]
        subject: String,
        /// Seconds until the token expires
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
        /// Path to the server config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(config.as_deref()).await,
        Commands::Config { action } => match action {
            ConfigAction::Show { config } => show_config(config.as_deref()),
        },
        Commands::Token { action } => match action {
            TokenAction::Mint {
                subject,
                ttl,
                config,
            } => mint_token(&subject, ttl, config.as_deref()),
        },
    }
}

async fn serve(config_path: Option<&Path>) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    if config.shared_secret == "change-me" {
        log::warn!("running with the default shared secret; set {SECRET_ENV_VAR}");
    }

    let registry = Arc::new(SessionRegistry::new());
    let factory = Arc::new(AgentServiceFactory::new(&config.agent_service_url));
    let manager = Arc::new(AgentSessionManager::new(registry.clone(), factory));
    let verifier = Arc::new(TokenVerifier::new(config.shared_secret.clone()));
    let gateway = Arc::new(Gateway::new(registry.clone(), manager, verifier));
    let reaper = IdleReaper::new(
        registry,
        config.reap_idle_after_secs,
        config.sweep_interval_secs,
    );

    tokio::select! {
        result = gateway.listen(&config.listen_addr) => result,
        () = reaper.run() => Ok(()),
        _ = tokio::signal::ctrl_c() => {
            log::info!("received Ctrl-C, shutting down");
            Ok(())
        }
    }
}

fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn mint_token(subject: &str, ttl: i64, config_path: Option<&Path>) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let verifier = TokenVerifier::new(config.shared_secret);
    let token = verifier.mint(subject, ttl, chrono::Utc::now());
    println!("{token}");
    Ok(())
}
