use std::process::ExitCode;

use clap::Parser;

use pixelsel::{cli, log_info, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    logger::init();
    logger::set_echo(args.verbose);
    log_info!("pixelsel {} starting, {} input pattern(s)", env!("CARGO_PKG_VERSION"), args.input.len());

    cli::run(args)
}
