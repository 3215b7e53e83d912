use std::process;
use stowfarm::cli::Args;
use stowfarm::config::Config;
use stowfarm::logging::init_logger;
use stowfarm::{RustowError, Stower};

fn main() {
    init_logger();
    let args = Args::parse_ordered();

    match run(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            report_error(&e);
            process::exit(e.exit_code());
        },
    }
}

/// Plans every unstow, then every stow, and executes only if no package
/// conflicts.
fn run(args: Args) -> stowfarm::Result<i32> {
    let config = Config::from_args(args)?;
    let mut stower = Stower::new(&config)?;
    stower.plan_unstow(config.unstow_packages.as_slice())?;
    stower.plan_stow(config.stow_packages.as_slice())?;

    if !stower.conflicts().is_empty() {
        for (operation, package, messages) in stower.conflicts().iter() {
            eprintln!("WARNING! {} {} would cause conflicts:", operation.progressive(), package);
            let mut messages = messages.to_vec();
            messages.sort();
            for message in messages {
                eprintln!("  * {}", message);
            }
        }
        eprintln!("All operations aborted.");
        return Ok(1);
    }

    if config.simulate {
        eprintln!("WARNING: in simulation mode so not modifying filesystem.");
        return Ok(0);
    }

    stower.process_tasks()?;
    Ok(0)
}

fn report_error(error: &RustowError) {
    if error.is_internal() {
        eprintln!("\n!!! INTERNAL ERROR !!!");
        eprintln!("{}", error);
        eprintln!("This is a bug in stowfarm; please report it along with the command that triggered it.");
    } else {
        eprintln!("stowfarm: ERROR: {}", error);
    }
}
