use std::{error::Error, path::PathBuf, time::Instant};

use ariadne::Source;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::check::script_error_to_report;

use self::{config::BuilderConfig, script::Script};

pub mod config;
pub mod script;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ReplayArgs {
    /// The script to replay.
    input: PathBuf,

    /// A TOML file whose `[builder]` table replaces the one of the script.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let start_time = Instant::now();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = ReplayArgs::parse();
    let path = args.input.display().to_string();
    let source = std::fs::read_to_string(&args.input)?;
    tracing::debug!("script:\n{}", source);

    let result = Script::parse(&source).and_then(|script| match &args.config {
        Some(config) => script.replay_with(BuilderConfig::load(config)?),
        None => script.replay(),
    });

    match result {
        Ok(output) => println!("{output}"),
        Err(error) => {
            script_error_to_report(&path, &error).eprint((path.clone(), Source::from(&source)))?;
            std::process::exit(1);
        }
    }

    let elapsed = start_time.elapsed();
    tracing::debug!("Done in {:?}", elapsed);

    Ok(())
}
