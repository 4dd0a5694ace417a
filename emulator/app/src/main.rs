/*++

Licensed under the Apache-2.0 license.

File Name:

    main.rs

Abstract:

    File contains main entrypoint for the MCU16 bootloader emulator.

--*/

use clap::Parser;
use emulator::{Emulator, EmulatorArgs, RunResult, EMULATOR_RUNNING};
use std::io::{self, IsTerminal, Write};
use std::process::exit;
use std::sync::atomic::Ordering;

fn main() -> anyhow::Result<()> {
    let cli = EmulatorArgs::parse();
    let _ = simple_logger::SimpleLogger::new()
        .with_level(cli.log_level)
        .init();

    let mut emulator = Emulator::from_args(cli, false)?;

    // exit cleanly on Ctrl-C so that we save any state; a second one gives up.
    if io::stdout().is_terminal() {
        let hangup = emulator.uart_hangup();
        ctrlc::set_handler(move || {
            hangup.store(true, Ordering::Relaxed);
            if !EMULATOR_RUNNING.swap(false, Ordering::Relaxed) {
                exit(130);
            }
        })?;
    }

    let result = emulator.run()?;
    drop(emulator);
    io::stdout().flush()?;

    match result {
        RunResult::Booted { entry } => log::info!("application started at word {}", entry),
        RunResult::Halted(err) => log::error!("halted with ERROR_{}: {}", err.code(), err),
        RunResult::Interrupted => log::warn!("interrupted"),
    }
    exit(result.exit_code());
}
