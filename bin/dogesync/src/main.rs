//! dogesync: a syncing full-node client for the dogechain network.

mod config;
mod server;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dogesync", author, version, about = "dogechain syncing full node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the node.
    Server(server::ServerArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Server(args) => server::run(args),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
