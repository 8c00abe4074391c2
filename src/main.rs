//! revfs-admin binary entry point

use revfs::cli::{self, Cli};
use revfs::core::config::Config;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse_args();

    // RUST_LOG wins, then --debug, then the global config. Logs go to stderr.
    let config = Config::load(None).map(|r| r.config).unwrap_or_default();
    let default_level = if cli.debug { "debug" } else { config.log_level() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(e) = cli::run(cli) {
        eprintln!("revfs-admin: {:#}", e);
        std::process::exit(1);
    }
}
