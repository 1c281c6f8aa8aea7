use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::table::PageSize;

pub const DEFAULT_LOG_FILTER: &str = "info,roster=info";

/// Development backend serving an in-memory store over HTTP.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct ServerArgs {
    #[clap(long, default_value = "127.0.0.1:54321")]
    pub addr: String,

    /// JSON snapshot loaded at start and written back on shutdown.
    #[clap(long)]
    pub seed: Option<PathBuf>,

    /// Serve the tables without the tag procedures.
    #[clap(long)]
    pub no_procedures: bool,
}

/// Interactive client for entities and their tags.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    #[clap(long, default_value = "http://127.0.0.1:54321")]
    pub url: String,

    #[clap(long, env = "ROSTER_API_KEY")]
    pub api_key: Option<String>,

    #[clap(long, default_value = "25")]
    pub page_size: PageSize,

    /// Where column preferences are kept.
    #[clap(long, default_value = ".roster-prefs.dat")]
    pub prefs: PathBuf,
}

/// Installs the fmt subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_level(true)
    .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_args_parse_page_size() {
        let args = CliArgs::parse_from(["roster-cli", "--page-size", "all", "--url", "http://x"]);
        assert_eq!(args.page_size, PageSize::All);
        assert_eq!(args.url, "http://x");
    }

    #[test]
    fn server_defaults() {
        let args = ServerArgs::parse_from(["roster"]);
        assert!(args.seed.is_none());
        assert!(!args.no_procedures);
    }
}
