use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use learnbot_core::config::{self, Config};
use learnbot_core::service::gateway::{self, Gateway};
use learnbot_core::store::postgrest::PostgrestStore;
use learnbot_core::store::StoreClient;

#[derive(Parser)]
#[command(
    name = "learnbot",
    about = format!("{} learnbot - SimpleLearn waitlist bot", learnbot_core::LOGO),
    version = learnbot_core::VERSION,
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot and the liveness endpoint
    Serve {
        /// Liveness endpoint port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Test the store connection and exit
    Check,
    /// Show which configuration keys are set
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { port } => cmd_serve(port).await?,
        Commands::Check => cmd_check().await?,
        Commands::Status => cmd_status(),
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "learnbot=debug,learnbot_core=debug"
    } else {
        "learnbot=info,learnbot_core=info"
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !verbose && !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(default),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config() -> Config {
    match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            eprintln!("Set it in the environment or in a .env file. Run `learnbot status` to see what is missing.");
            std::process::exit(1);
        }
    }
}

async fn cmd_serve(port: Option<u16>) -> Result<()> {
    let mut cfg = load_config();
    if let Some(port) = port {
        cfg.liveness.port = port;
    }

    println!(
        "{} Starting learnbot v{} ({})",
        learnbot_core::LOGO,
        learnbot_core::VERSION,
        learnbot_core::GIT_HASH
    );
    tracing::debug!(config = ?cfg, "Loaded configuration");

    let gateway = Gateway::from_config(&cfg)?;
    if let Err(e) = gateway.run(gateway::shutdown_signal()).await {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_check() -> Result<()> {
    let cfg = load_config();
    let store = StoreClient::new(Arc::new(PostgrestStore::new(&cfg.store)?), cfg.tables.clone());

    match store.check_connectivity().await {
        Ok(()) => {
            println!("✅ Supabase connection successful!");
            Ok(())
        }
        Err(e) => {
            println!("❌ Supabase connection failed: {}", e);
            println!("\nPossible solutions:");
            for (i, hint) in gateway::remediation_hints(&e).iter().enumerate() {
                println!("{}. {}", i + 1, hint);
            }
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    println!("{} learnbot Status\n", learnbot_core::LOGO);
    for (key, set) in config::env_presence() {
        println!("{:<22} {}", key, if set { "✓" } else { "not set" });
    }
}
