use anyhow::Context;
use clap::Parser;
use pmp_llm_cache::cli::{self, Cli};
use pmp_llm_cache::config::CacheSettings;
use pmp_llm_cache::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => CacheSettings::load_from(path),
        None => CacheSettings::load(),
    }
    .context("loading settings")?;

    init_logging(&settings.logging)?;

    let mut stdout = std::io::stdout();
    cli::run(&cli.command, &settings, &mut stdout).await
}
