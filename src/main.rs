//! door-link - run the echo door for a BBS caller
//!
//! Usage:
//!   door-link [OPTIONS] [DROP_FILE]...
//!
//! Exit codes: 0 door finished, 1 no drop file could be linked, 2 door failed.

use clap::Parser;
use door_link::cli::Cli;
use door_link::constants::EXIT_DOOR_FAILED;
use door_link::error::DoorError;
use door_link::{config, logging, DoorRunner, EchoDoor};
use tracing::error;

fn main() {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref());
    logging::init_tracing(
        cli.verbose || config.logs.verbose,
        config.logs.file.as_deref(),
    );

    if cli.no_time_limit {
        config.door.enforce_time_limit = false;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("{}", DoorError::Runtime { source: e });
            std::process::exit(EXIT_DOOR_FAILED);
        }
    };

    let runner = DoorRunner::new(config).with_drop_files(cli.drop_files);
    let code = runtime.block_on(runner.run(EchoDoor));

    // Pump tasks are already joined; don't wait on anything else
    runtime.shutdown_background();
    std::process::exit(code);
}
