//! Runs the promise integration conformance suite
//!
//! ```text
//! jspi [config.json]
//! ```
//!
//! Set `RUST_LOG=jspi=debug` to trace continuations as they suspend and
//! resume.

use jspi::conformance;
use jspi::EngineConfig;
use std::env;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn set_up_logging() {
    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr).compact();
    let filter_layer = EnvFilter::builder().from_env_lossy();

    tracing_subscriber::registry().with(filter_layer).with(fmt_layer).init();
}

fn main() -> ExitCode {
    set_up_logging();

    let config = match env::args().nth(1) {
        Some(path) => match EngineConfig::from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(2);
            }
        },
        None => EngineConfig::default(),
    };

    let results = conformance::run_all(&config);
    let mut failed = 0;
    for (name, result) in &results {
        match result {
            Ok(()) => println!("ok    {name}"),
            Err(e) => {
                failed += 1;
                println!("FAIL  {name}: {e}");
            }
        }
    }
    println!("\n{} passed, {failed} failed", results.len() - failed);

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
