//! CLI entry point: parses arguments, builds a [`ldsim::Config`], runs the
//! simulation, prints the rendered report, and exits with the matching code.

use clap::Parser;
use ldsim::cli::Args;
use ldsim::Config;

fn main() {
    env_logger_init();

    let args = Args::parse();
    let config = match Config::from_env_and_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ldsim: {e}");
            std::process::exit(1);
        }
    };

    match ldsim::run(&args.paths, &config) {
        Ok((text, code)) => {
            print!("{text}");
            std::process::exit(code.code());
        }
        Err(e) => {
            eprintln!("ldsim: {e}");
            std::process::exit(1);
        }
    }
}

fn env_logger_init() {
    let _ = env_logger::try_init();
}
