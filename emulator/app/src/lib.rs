/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Library interface for the MCU16 bootloader emulator.

--*/

use std::sync::atomic::AtomicBool;

pub mod emulator;

pub use emulator::{Emulator, EmulatorArgs, RunResult, HALT_EXIT_BASE};

/// Cleared to stop the emulator at the next bootloader step.
pub static EMULATOR_RUNNING: AtomicBool = AtomicBool::new(true);
