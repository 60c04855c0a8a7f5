use std::path::PathBuf;
use std::process::ExitCode;

use atomictest::{run_on_device, Scenario};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "atomictest", about = "test atomic modesetting")]
struct Args {
    /// DRM device node to use instead of the first one with a
    /// connected connector
    #[arg(long)]
    card: Option<PathBuf>,
    /// Name of the test to run
    test: Option<String>,
}

fn print_tests() {
    eprintln!("Available tests:");
    for scenario in Scenario::ALL {
        eprintln!("    {}", scenario.name());
    }
}

fn main() -> ExitCode {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().init();
    }

    let args = Args::parse();
    let name = match args.test {
        Some(name) => name,
        None => {
            print_tests();
            return ExitCode::FAILURE;
        }
    };
    let scenario = match Scenario::from_name(&name) {
        Some(scenario) => scenario,
        None => {
            eprintln!("Unknown test '{}'", name);
            print_tests();
            return ExitCode::FAILURE;
        }
    };

    match run_on_device(scenario, args.card.as_deref()) {
        Ok(()) => {
            println!("[  PASSED  ] atomictest.{}", scenario.name());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            println!("[  FAILED  ] atomictest.{}", scenario.name());
            ExitCode::FAILURE
        }
    }
}
