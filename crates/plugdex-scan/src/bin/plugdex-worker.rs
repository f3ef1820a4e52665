//! Standalone single-plugin scan worker.
//!
//! Runs in its own process so a crashing or hanging plug-in can only take
//! this process down. Loads exactly one plug-in, writes its outcome into
//! the journal row for the given path, and exits; the orchestrator
//! reconciles the row if this process never gets that far.
//!
//! Usage: plugdex-worker --plugin-path PATH --plugin-name NAME
//!                       --plugin-type {vst3|aufx} --journal-path FILE

use clap::Parser;

use plugdex_scan::worker::{self, WorkerArgs};

fn main() {
    let args = WorkerArgs::parse();
    if let Err(e) = worker::run(&args) {
        // The journal could not even be opened; the orchestrator will see
        // the non-zero exit and mark the row itself.
        eprintln!("plugdex-worker: {e}");
        std::process::exit(1);
    }
}
