//! myautoml - Main Entry Point

use clap::Parser;
use myautoml::cli::{self, Cli};
use myautoml::config::load_config;
use myautoml::logging::init_logging;
use myautoml::train::Interrupt;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_config(cli.config.as_deref(), true, true)?;
    init_logging(&settings.logging)?;

    // First Ctrl-C stops the search after the running trial, a second one exits.
    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    ctrlc::set_handler(move || {
        if handler.is_triggered() {
            std::process::exit(130);
        }
        tracing::warn!("Interrupt received, finishing the current trial");
        handler.trigger();
    })?;

    cli::run(cli, &settings, &interrupt)
}
