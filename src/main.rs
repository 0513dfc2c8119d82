use clap::Parser;
use pairlink_lib::commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pairlink_lib::run(Cli::parse()).await
}
