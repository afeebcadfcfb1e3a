mod app;
mod cli;
mod config;
mod logging;
mod render;

use clap::Parser;
use runwatch_logging::rw_info;

use crate::cli::Cli;
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    config.validate()?;

    logging::initialize(
        config.log_destination,
        runwatch_logging::level_from_name(&config.log_level),
        &config.log_file,
    );
    rw_info!("following runs at {}", config.supervisor.base_url);

    app::run(config, cli.start, cli.until_done).await
}
