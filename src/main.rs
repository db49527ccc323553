use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

mod backend;
mod dispatcher;
mod locale;
mod progress;
mod repl;
mod server;
mod session;
mod settings;

use backend::RestWebhook;
use dispatcher::Dispatcher;
use settings::{CliOverrides, EnvDefaults, resolve_chat_settings};

#[derive(Debug, Parser)]
#[command(name = "profile_chat")]
#[command(about = "Onboarding chat client that tracks profile completion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct BackendArgs {
    /// Base URL of the dialogue backend
    #[arg(long)]
    backend_url: Option<String>,
    /// Language for the greeting and error text (en, fil)
    #[arg(long)]
    locale: Option<String>,
    /// Fixed sender id sent to the backend; random per session when unset
    #[arg(long)]
    sender_id: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// JSON file with an alternate section layout
    #[arg(long)]
    schema: Option<PathBuf>,
}

impl From<BackendArgs> for CliOverrides {
    fn from(a: BackendArgs) -> Self {
        Self {
            backend_url: a.backend_url,
            locale: a.locale,
            sender_id: a.sender_id,
            timeout_secs: a.timeout_secs,
            schema_path: a.schema,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the chat session over HTTP for a widget front-end
    Serve {
        #[arg(long, default_value = "127.0.0.1:7272")]
        listen: String,
        /// Expose Prometheus metrics on this address
        #[arg(long)]
        metrics_listen: Option<String>,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Chat in the terminal
    Chat {
        #[command(flatten)]
        backend: BackendArgs,
    },
}

fn build_dispatcher(args: BackendArgs) -> anyhow::Result<Dispatcher> {
    let settings = resolve_chat_settings(&EnvDefaults::from_env(), &args.into())?;
    let backend = RestWebhook::new(&settings.backend_url, settings.timeout)?;
    tracing::info!(
        endpoint = %backend.endpoint(),
        locale = ?settings.locale,
        sections = settings.schema.sections().len(),
        fields = settings.schema.total_fields(),
        "dialogue backend configured"
    );
    Ok(Dispatcher::new(Arc::new(backend), settings.schema, settings.locale, settings.sender_id))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { listen, metrics_listen, backend } => {
            fmt().with_env_filter(EnvFilter::from_default_env()).init();
            if let Some(metrics_addr) = metrics_listen {
                let metrics_addr: SocketAddr = metrics_addr.parse()?;
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(metrics_addr)
                    .install()?;
            }
            let addr: SocketAddr = listen.parse()?;
            let state = server::AppState { dispatcher: Arc::new(build_dispatcher(backend)?) };
            server::serve(addr, state).await?;
        }
        Commands::Chat { backend } => {
            // keep the transcript on stdout readable
            fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();
            let dispatcher = build_dispatcher(backend)?;
            repl::run(&dispatcher).await?;
        }
    }
    Ok(())
}
