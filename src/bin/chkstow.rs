use clap::Parser;
use std::process;
use stowfarm::chkstow::{self, DEFAULT_TARGET, Mode};
use stowfarm::cli::ChkstowArgs;
use stowfarm::logging::init_logger;

fn main() {
    init_logger();
    let args = ChkstowArgs::parse();
    let mode = Mode::from_args(&args);

    let target = match &args.target {
        Some(path) => path.display().to_string(),
        None => DEFAULT_TARGET.to_string(),
    };

    match chkstow::check(&target, mode) {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        },
        Err(e) => {
            eprintln!("chkstow: {}", e);
            process::exit(e.exit_code());
        },
    }
}
