use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::process::ExitCode;

use affect_replay::config::ReplayConfig;
use affect_replay::error::Result;
use affect_replay::{logging, replay, write_report};

fn main() -> ExitCode {
    let config = match ReplayConfig::from_env() {
        Ok(config) => config.with_args(std::env::args().skip(1)),
        Err(err) => {
            eprintln!("affect-replay: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init_tracing(&config.log_level, config.log_dir.as_deref());

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "replay failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ReplayConfig) -> Result<()> {
    let report = match &config.input {
        Some(path) => {
            tracing::info!(input = %path.display(), "replaying frames");
            replay(BufReader::new(File::open(path)?), &config.affect)?
        }
        None => replay(io::stdin().lock(), &config.affect)?,
    };

    match &config.output {
        Some(path) => write_report(&report, BufWriter::new(File::create(path)?)),
        None => write_report(&report, io::stdout().lock()),
    }
}
