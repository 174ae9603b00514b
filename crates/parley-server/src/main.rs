//! Parley server binary.
//!
//! # Usage
//!
//! ```bash
//! # Development (built-in secret and admin credentials)
//! parley-server --bind 0.0.0.0:4040
//!
//! # Production
//! parley-server --bind 0.0.0.0:4040 --secret "$JWT_SECRET" \
//!     --admin-user operator --admin-pass "$ADMIN_PASSWORD"
//! ```

use clap::Parser;
use parley_auth::AuthorityConfig;
use parley_core::ChatConfig;
use parley_server::{Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Built-in development credentials; unusable silently in production.
const DEV_SECRET: &str = "parley-dev-secret";

/// Parley chat server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "Multi-room chat session server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4040")]
    bind: String,

    /// Token signing secret shared with the credential exchange
    #[arg(long, default_value = DEV_SECRET)]
    secret: String,

    /// Administrator username (reserved; guests cannot claim it)
    #[arg(long, default_value = "admin")]
    admin_user: String,

    /// Administrator password
    #[arg(long, default_value = "admin")]
    admin_pass: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parley server starting");

    if args.secret == DEV_SECRET {
        tracing::warn!("Using the built-in development signing secret");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let config = ServerConfig {
        bind_address: args.bind,
        auth: AuthorityConfig::new(args.secret, args.admin_user, args.admin_pass),
        chat: ChatConfig::default(),
    };

    let server = Server::bind(config).await?;

    tracing::info!("Listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
