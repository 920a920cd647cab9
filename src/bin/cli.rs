//! Command-line entrypoint for migration operations.

use clap::Parser;

use strato_migrate::cli::{self, Cli};
use strato_migrate::{setup_tracing, Ctx};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Cli::parse();
    let ctx = Ctx::load_file(&args.config)?;
    setup_tracing(ctx.log_level);

    cli::run(ctx, args.command).await?;
    Ok(())
}
