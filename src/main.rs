use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use log::{error, Log};

mod cleanup;
mod cmd;
mod context;

use cleanup::{install_ctrlc_handler, CleanupManager};
use cmd::{Args, Execute};
use context::Context;

pub struct CombineLogger<L1, L2>(pub L1, pub Option<L2>);

impl<L1: Log, L2: Log> Log for CombineLogger<L1, L2> {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.0.enabled(metadata) || self.1.as_ref().is_some_and(|l| l.enabled(metadata))
    }

    fn log(&self, record: &log::Record<'_>) {
        self.0.log(record);
        if let Some(ref l) = self.1 {
            l.log(record);
        }
    }

    fn flush(&self) {
        self.0.flush();
        if let Some(ref l) = self.1 {
            l.flush();
        }
    }
}

fn setup_logging(args: &Args) {
    let info_level = if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    let info_logger = env_logger::builder()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter_level(info_level)
        .build();
    let debug_logger = if args.debug {
        Some(
            env_logger::builder()
                .filter_level(log::LevelFilter::Debug)
                .build(),
        )
    } else {
        None
    };
    let logger = CombineLogger(info_logger, debug_logger);
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }
}

fn run(args: Args) -> Result<()> {
    let cleanup_manager = Arc::new(Mutex::new(CleanupManager::new()));
    install_ctrlc_handler(cleanup_manager.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let context = Context::load(args.directory.as_deref())?;
    match args.command {
        Some(ref command) => runtime.block_on(command.execute(context, cleanup_manager)),
        None => Err(anyhow::anyhow!("No subcommand specified")),
    }
}

fn main() {
    let args = Args::parse();
    setup_logging(&args);
    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
