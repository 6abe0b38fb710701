mod cli;
mod text_summary;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::init_tracing(args.verbose)?;

    let cli::Command::Run(run) = args.command;
    let json = run.json;
    match cli::run(run).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if json {
                println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
