use anyhow::Result;
use clap::{Parser, Subcommand};
use simple_search_local::extract::ExtractConfig;
use simple_search_local::search::{DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};
use simple_search_local::{DuckDuckGoSearch, HttpFetcher, SearchConfig};
use simple_search_mcp::mcp::{self, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "simple-search")]
#[command(about = "Keyless web search (MCP stdio server)", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (default).
    McpStdio,
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug, Clone)]
struct Settings {
    /// Longest wait for the next request line (ms).
    #[arg(long, global = true, env = "SIMPLE_SEARCH_READ_TIMEOUT_MS", default_value_t = 30_000)]
    read_timeout_ms: u64,
    /// Longest a single tool call may run (ms).
    #[arg(long, global = true, env = "SIMPLE_SEARCH_CALL_TIMEOUT_MS", default_value_t = 45_000)]
    call_timeout_ms: u64,
    /// Bound on one fetch attempt (ms).
    #[arg(long, global = true, env = "SIMPLE_SEARCH_FETCH_TIMEOUT_MS", default_value_t = 15_000)]
    fetch_timeout_ms: u64,
    /// Fetch attempts per search.
    #[arg(
        long,
        global = true,
        env = "SIMPLE_SEARCH_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    max_attempts: u64,
    /// Pause between failed attempts (ms).
    #[arg(long, global = true, env = "SIMPLE_SEARCH_RETRY_PAUSE_MS", default_value_t = 1_000)]
    retry_pause_ms: u64,
    /// Results returned per search.
    #[arg(long, global = true, env = "SIMPLE_SEARCH_MAX_RESULTS", default_value_t = 10)]
    max_results: usize,
    /// HTML search endpoint.
    #[arg(long, global = true, env = "SIMPLE_SEARCH_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
    /// Origin used to absolutize root-relative result links.
    #[arg(
        long,
        global = true,
        env = "SIMPLE_SEARCH_ORIGIN",
        default_value = "https://duckduckgo.com"
    )]
    origin: String,
    /// User-Agent sent with every search request.
    #[arg(
        long,
        global = true,
        env = "SIMPLE_SEARCH_USER_AGENT",
        default_value = DEFAULT_USER_AGENT
    )]
    user_agent: String,
}

impl Settings {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }

    fn search_config(&self) -> SearchConfig {
        SearchConfig {
            endpoint: self.endpoint.clone(),
            user_agent: self.user_agent.clone(),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            max_attempts: usize::try_from(self.max_attempts).unwrap_or(usize::MAX),
            retry_pause: Duration::from_millis(self.retry_pause_ms),
            max_results: self.max_results,
            extract: ExtractConfig {
                origin: self.origin.clone(),
                ..ExtractConfig::default()
            },
            ..SearchConfig::default()
        }
    }
}

/// Logs go to stderr only; stdout carries protocol frames.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("SIMPLE_SEARCH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::McpStdio) {
        Commands::McpStdio => {
            init_tracing();
            let settings = cli.settings;
            let fetcher = HttpFetcher::new()?;
            let provider = DuckDuckGoSearch::new(fetcher, settings.search_config());
            tracing::info!(
                endpoint = %settings.endpoint,
                read_timeout_ms = settings.read_timeout_ms,
                call_timeout_ms = settings.call_timeout_ms,
                "starting simple-search"
            );
            mcp::serve_stdio(provider, settings.server_config()).await?;
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "name": "simple-search",
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": mcp::protocol::PROTOCOL_VERSION,
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("simple-search {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
