use std::path::Path;
use std::process;

use log::{error, Level, LevelFilter};

use patchkit::commands::{build_cli, CommandFactory, PatchkitCommandFactory};
use patchkit::utils::logger::Logger;

fn main() {
    let matches = build_cli().get_matches();

    let verbose = matches.get_flag("verbose");
    match matches.get_one::<String>("log-file") {
        Some(log_file) => {
            let level = if verbose { Level::Debug } else { Level::Info };
            if let Err(e) = Logger::init_global_logger(Path::new(log_file), level) {
                eprintln!("Error setting up global logger: {}", e);
                process::exit(1);
            }
        },
        None => {
            let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
            Logger::init_console_logger(level);
        },
    }

    let factory = PatchkitCommandFactory::new();

    let command_result = factory.create_command(&matches);
    match command_result {
        Ok(command) => {
            if let Err(e) = command.execute() {
                error!("Command execution error: {}", e);
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        Err(e) => {
            error!("Failed to create command: {}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
}
