use anyhow::Result;
use clap::Parser;

use medcrux::cli::{Cli, Commands};
use medcrux_core::Settings;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    dispatch(cli.command, settings)
}

fn dispatch(command: Commands, mut settings: Settings) -> Result<()> {
    match command {
        Commands::Build {
            sources,
            out,
            vocabulary,
        } => {
            if vocabulary.is_some() {
                settings.vocabulary_path = vocabulary;
            }
            medcrux::cli::build::run(&settings, &sources, &out)
        }
        Commands::Retrieve { query, kb, context } => {
            if kb.is_some() {
                settings.kb_dir = kb;
            }
            medcrux::cli::retrieve::run(&settings, &query, context)
        }
        Commands::Check {
            label,
            findings,
            conditions,
            primary,
        } => {
            if conditions.is_some() {
                settings.conditions_path = conditions;
            }
            medcrux::cli::check::run(&settings, &label, findings.as_deref(), primary.as_deref())
        }
        Commands::Labels { text } => medcrux::cli::labels::run(&text),
        Commands::Reconcile { report, derived } => medcrux::cli::reconcile::run(&report, &derived),
    }
}
