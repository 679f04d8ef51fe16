//! Off-axis selection driver
//!
//! Usage: `offaxis_selection <config file> <events file> [output prefix]`
//!
//! Reads a selection configuration and a JSON-lines event file, runs the
//! selection, and writes `<prefix>.summary`, `<prefix>.times` and
//! `<prefix>.json` (the prefix defaults to "selection").
//!
//! Log verbosity is controlled by the `RUST_LOG` environment variable and
//! defaults to `info`.

use eyre::{bail, WrapErr};
use offaxis_selection::{
    config::Configuration,
    input::EventReader,
    output,
    scheduling::{self, StopFlag},
    Result,
};
use std::{fs::File, io::BufReader, time::Instant};

/// This will act as our main function, with suitable error handling
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ### COMMAND LINE ###

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (config_path, events_path, prefix) = match &args[..] {
        [config, events] => (config, events, "selection"),
        [config, events, prefix] => (config, events, &prefix[..]),
        _ => bail!("Usage: offaxis_selection <config file> <events file> [output prefix]"),
    };

    // ### CONFIGURATION READOUT ###

    let cfg = Configuration::load(config_path).wrap_err("Failed to load the configuration")?;

    // ### SELECTION EXECUTION ###

    // Start the clock after configuration I/O, to avoid IO-induced timing
    // fluctuations
    let saved_time = Instant::now();

    let events_file = File::open(events_path)
        .wrap_err_with(|| format!("Failed to open event file {events_path}"))?;
    let events = EventReader::new(BufReader::new(events_file));
    let stop = StopFlag::new();
    let results = scheduling::run_selection(&cfg, events, &stop)
        .wrap_err("Failed to set up the selection")?;

    // ### RESULTS STORAGE ###

    let elapsed_time = saved_time.elapsed();
    output::dump_results(&results, prefix, elapsed_time).wrap_err("Failed to output the results")?;
    Ok(())
}
