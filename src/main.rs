use clap::Parser;
use quire::cli::commands::Cli;
use quire::cli::handlers;
use tracing_subscriber::EnvFilter;

fn main() {
    // Diagnostics go to stderr so --json output stays clean
    let filter = EnvFilter::try_from_env("QUIRE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = handlers::dispatch(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
