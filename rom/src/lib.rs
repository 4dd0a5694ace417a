/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Resident bootloader of the MCU16 core: receives, verifies, stores and
    starts executable images.

--*/

#![cfg_attr(not(test), no_std)]

mod boot;
pub use boot::{BootOutcome, Bootloader, States as BootState};
pub mod console;
mod error;
pub use error::{BootError, FlashError};
pub mod flash;
mod image;
pub use image::*;
mod params;
pub use params::{BootParameters, ParamError};
mod rom_env;
pub use rom_env::RomEnv;

pub const BOOTLOADER_VERSION: &str = env!("CARGO_PKG_VERSION");
