use anyhow::Result;
use clap::Parser;

use submission_cache::{
    app::load_config,
    cache,
    cli::{handle_command, Cli},
    constants::VERBOSE_LOG_LEVEL,
    utils::init_logger,
};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration; CLI flags win over it
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(path) = &cli.cache_file {
        config.cache.path = path.clone();
    }

    let level = if cli.verbose {
        VERBOSE_LOG_LEVEL
    } else {
        config.logging.level.as_str()
    };
    init_logger(level);

    let cache = cache::init(&config);
    handle_command(&cli.command, &cache, &config)
}
