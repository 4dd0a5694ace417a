/*++

Licensed under the Apache-2.0 license.

File Name:

    emulator.rs

Abstract:

    File contains the Emulator struct implementation.

--*/

use crate::EMULATOR_RUNNING;
use anyhow::{anyhow, bail, Context};
use boot_image::{word_from_wire, BootImage, ImageBuilder, BOOT_SIGNATURE};
use clap::{ArgAction, Parser};
use clap_num::maybe_hex;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use emulator_periph::{
    EmuPlatform, EmuPlatformArgs, HwInfo, SpiFlash, TimerClock, UartHangup, UartInput,
};
use mcu_bootloader::{BootError, BootOutcome, BootParameters, BootState, Bootloader};
use std::cell::RefCell;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Base of the process exit status used for a halted bootloader. The
/// error code is added to it.
pub const HALT_EXIT_BASE: i32 = 64;

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.trim().parse::<log::LevelFilter>().map_err(|_| {
        format!(
            "Invalid log level: {}. Supported levels are off, error, warn, info, debug and trace.",
            s
        )
    })
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, name = "MCU16 Bootloader Emulator")]
pub struct EmulatorArgs {
    /// Backing file for the serial flash. Loaded at start and written back
    /// on exit. Missing files start out erased.
    #[arg(short, long)]
    pub flash_image: Option<PathBuf>,

    /// Program to place in flash before reset. Raw binaries are wrapped in a
    /// boot image header, complete images are checked and stored as is.
    #[arg(short, long)]
    pub program: Option<PathBuf>,

    /// Boot image streamed to the UART after the scripted keys.
    #[arg(short, long)]
    pub upload: Option<PathBuf>,

    /// Keystrokes queued on the UART before anything else. The first one
    /// aborts the autoboot countdown.
    #[arg(short, long)]
    pub keys: Option<String>,

    /// Keystrokes queued after the uploaded image.
    #[arg(long)]
    pub post_keys: Option<String>,

    /// Write the execution memory contents here when the emulator stops.
    #[arg(short, long)]
    pub dump_imem: Option<PathBuf>,

    /// Byte address of the boot image in flash.
    #[arg(long, value_parser=maybe_hex::<u32>, default_value = "0x80000")]
    pub flash_base: u32,

    /// Flash part to emulate.
    #[arg(long, default_value = emulator_periph::SpiFlashImpl::DEFAULT_PART)]
    pub flash_part: String,

    /// Leave the flash socket empty.
    #[arg(long, default_value_t = false)]
    pub no_flash: bool,

    /// Seconds before the image in flash is booted.
    #[arg(long, env = "MCU16_AUTOBOOT_TIMEOUT", default_value_t = 4)]
    pub autoboot_timeout: u32,

    /// Execution memory size in bytes.
    #[arg(long, value_parser=maybe_hex::<usize>, default_value = "0x4000")]
    pub imem_size: usize,

    /// Data memory size in bytes.
    #[arg(long, value_parser=maybe_hex::<usize>, default_value = "0x2000")]
    pub dmem_size: usize,

    /// Synthesize the execution memory as read-only.
    #[arg(long, default_value_t = false)]
    pub true_rom: bool,

    /// Initial execution memory contents, high byte of each word first.
    #[arg(long)]
    pub imem_init: Option<PathBuf>,

    /// Advance the tick timer on every read instead of in real time.
    #[arg(long, default_value_t = false)]
    pub polled_timer: bool,

    /// Host log level.
    #[arg(long, value_parser = parse_log_level, default_value = "warn")]
    pub log_level: log::LevelFilter,

    // `--no-stdin-uart` clears the flag, so stdin feeds the UART unless asked not to.
    /// Pass stdin to the UART Rx.
    #[arg(long = "no-stdin-uart", action = ArgAction::SetFalse)]
    pub stdin_uart: bool,

    // accepted so a later `--stdin-uart` cancels an earlier `--no-stdin-uart`
    #[arg(long = "stdin-uart", overrides_with = "stdin_uart")]
    pub _no_stdin_uart: bool,
}

/// How an emulator run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Booted { entry: usize },
    Halted(BootError),
    /// Stopped from the host before the bootloader finished.
    Interrupted,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunResult::Booted { .. } => 0,
            RunResult::Halted(err) => HALT_EXIT_BASE + i32::from(err.code()),
            RunResult::Interrupted => 130,
        }
    }
}

impl From<BootOutcome> for RunResult {
    fn from(outcome: BootOutcome) -> Self {
        match outcome {
            BootOutcome::Boot { entry } => RunResult::Booted { entry },
            BootOutcome::Halted(err) => RunResult::Halted(err),
        }
    }
}

pub struct Emulator {
    platform: EmuPlatform,
    params: BootParameters,
    flash_image: Option<PathBuf>,
    dump_imem: Option<PathBuf>,
    uart_output: Option<Rc<RefCell<Vec<u8>>>>,
    uart_input: UartInput,
    uart_hangup: UartHangup,
    raw_console: bool,
}

impl Emulator {
    pub fn from_args(cli: EmulatorArgs, capture_uart_output: bool) -> anyhow::Result<Self> {
        let params = BootParameters {
            flash_base: cli.flash_base,
            autoboot_timeout_s: cli.autoboot_timeout,
            ..Default::default()
        };
        params
            .validate()
            .map_err(|err| anyhow!("invalid boot parameters: {}", err))?;

        let flash = if cli.no_flash {
            None
        } else {
            let flash = SpiFlash::new(&cli.flash_part)
                .ok_or_else(|| anyhow!("unknown flash part {}", cli.flash_part))?;
            if let Some(path) = cli.flash_image.as_ref().filter(|path| path.exists()) {
                flash
                    .load_file(path)
                    .with_context(|| format!("loading flash image {}", path.display()))?;
            }
            if let Some(path) = &cli.program {
                let image = load_program(path)?;
                let end = cli.flash_base as usize + image.len();
                if end > flash.chip_size() as usize {
                    bail!(
                        "program {} does not fit the {} byte flash at 0x{:x}",
                        path.display(),
                        flash.chip_size(),
                        cli.flash_base
                    );
                }
                flash.preload(cli.flash_base, &image);
            }
            Some(flash)
        };
        if flash.is_none() && cli.program.is_some() {
            bail!("--program needs a flash device");
        }

        let uart_output = if capture_uart_output {
            Some(Rc::new(RefCell::new(Vec::new())))
        } else {
            None
        };
        let uart_input = UartInput::default();
        // Without stdin the scripted bytes are all the UART will ever see.
        let uart_hangup = UartHangup::new(AtomicBool::new(!cli.stdin_uart));
        queue_input(&uart_input, cli.keys.as_deref().unwrap_or_default().as_bytes());
        if let Some(path) = &cli.upload {
            let image = std::fs::read(path)
                .with_context(|| format!("reading upload image {}", path.display()))?;
            queue_input(&uart_input, &image);
        }
        queue_input(
            &uart_input,
            cli.post_keys.as_deref().unwrap_or_default().as_bytes(),
        );

        let mut platform = EmuPlatform::new(EmuPlatformArgs {
            hw: HwInfo {
                imem_size: cli.imem_size,
                dmem_size: cli.dmem_size,
                imem_writable: !cli.true_rom,
                ..Default::default()
            },
            flash,
            clock: if cli.polled_timer {
                TimerClock::Polled
            } else {
                TimerClock::Wall
            },
            uart_output: uart_output.clone(),
            uart_input: uart_input.clone(),
            uart_hangup: uart_hangup.clone(),
        });

        if let Some(path) = &cli.imem_init {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading imem contents {}", path.display()))?;
            let words: Vec<u16> = bytes
                .chunks(2)
                .map(|pair| word_from_wire(pair[0], pair.get(1).copied().unwrap_or(0)))
                .collect();
            platform.imem.preload(&words);
        }

        let raw_console = cli.stdin_uart && std::io::stdin().is_terminal();
        if raw_console {
            crossterm::terminal::enable_raw_mode().context("enabling raw terminal mode")?;
            let stdin_uart = uart_input.clone();
            let hangup = uart_hangup.clone();
            std::thread::spawn(move || read_console(stdin_uart, hangup));
        } else if cli.stdin_uart {
            let stdin_uart = uart_input.clone();
            let hangup = uart_hangup.clone();
            std::thread::spawn(move || read_pipe(stdin_uart, hangup));
        }

        Ok(Self {
            platform,
            params,
            flash_image: cli.flash_image,
            dump_imem: cli.dump_imem,
            uart_output,
            uart_input,
            uart_hangup,
            raw_console,
        })
    }

    /// Ends UART input: a transfer waiting for data fails and a console
    /// waiting for a key stops the run.
    pub fn uart_hangup(&self) -> UartHangup {
        self.uart_hangup.clone()
    }


    pub fn platform(&self) -> &EmuPlatform {
        &self.platform
    }

    /// UART output, when it is being captured.
    pub fn uart_output(&self) -> Vec<u8> {
        self.uart_output
            .as_ref()
            .map(|o| o.borrow().clone())
            .unwrap_or_default()
    }

    /// Runs the bootloader from reset until it boots, halts or the host
    /// stops it, then persists flash and execution memory.
    pub fn run(&mut self) -> anyhow::Result<RunResult> {
        let result = {
            let mut bootloader = Bootloader::new(self.platform.env(), self.params);
            loop {
                if !EMULATOR_RUNNING.load(Ordering::Relaxed) {
                    log::info!("stopped in state {:?}", bootloader.state());
                    break RunResult::Interrupted;
                }
                let waiting_for_key = matches!(
                    bootloader.state(),
                    BootState::AwaitCommand | BootState::ConfirmStore
                );
                if waiting_for_key && input_exhausted(&self.uart_hangup, &self.uart_input) {
                    log::info!("UART input ended in state {:?}", bootloader.state());
                    break RunResult::Interrupted;
                }
                if let Some(outcome) = bootloader.step() {
                    break RunResult::from(outcome);
                }
                if self.raw_console {
                    std::thread::yield_now();
                }
            }
        };
        self.finish()?;
        Ok(result)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if self.raw_console {
            self.raw_console = false;
            crossterm::terminal::disable_raw_mode().context("restoring terminal mode")?;
        }
        if let (Some(path), Some(flash)) = (&self.flash_image, self.platform.flash()) {
            flash
                .save_file(path)
                .with_context(|| format!("saving flash image {}", path.display()))?;
        }
        if let Some(path) = &self.dump_imem {
            std::fs::write(path, self.platform.imem.to_be_bytes())
                .with_context(|| format!("writing imem dump {}", path.display()))?;
        }
        Ok(())
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        if self.raw_console {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

/// Reads a program file. Files that already start with the boot signature
/// must be well formed images, anything else is wrapped as a raw payload.
fn load_program(path: &std::path::Path) -> anyhow::Result<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading program {}", path.display()))?;
    if bytes.len() >= 2 && word_from_wire(bytes[0], bytes[1]) == BOOT_SIGNATURE {
        BootImage::parse(&bytes).with_context(|| format!("checking image {}", path.display()))?;
        return Ok(bytes);
    }
    Ok(ImageBuilder::from_bytes(&bytes).build()?)
}

fn queue_input(uart_input: &UartInput, bytes: &[u8]) {
    if let Ok(mut queue) = uart_input.lock() {
        queue.extend(bytes.iter().copied());
    }
}

/// True once the UART feeder hung up and the bootloader read everything.
fn input_exhausted(hangup: &UartHangup, uart_input: &UartInput) -> bool {
    hangup.load(Ordering::Relaxed)
        && uart_input
            .lock()
            .map(|queue| queue.is_empty())
            .unwrap_or(true)
}

/// Forwards piped stdin to the UART byte for byte.
fn read_pipe(stdin_uart: UartInput, hangup: UartHangup) {
    let mut stdin = std::io::stdin().lock();
    let mut buffer = [0u8; 256];
    while EMULATOR_RUNNING.load(Ordering::Relaxed) {
        match stdin.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => queue_input(&stdin_uart, &buffer[..n]),
            Err(err) => {
                log::warn!("stdin closed: {}", err);
                break;
            }
        }
    }
    hangup.store(true, Ordering::Relaxed);
}

fn read_console(stdin_uart: UartInput, hangup: UartHangup) {
    while EMULATOR_RUNNING.load(Ordering::Relaxed) {
        // Poll so the thread notices a stopped emulator.
        if !crossterm::event::poll(Duration::from_millis(50)).unwrap_or(false) {
            continue;
        }
        let byte = match crossterm::event::read() {
            Ok(Event::Key(KeyEvent {
                code: KeyCode::Char('c'),
                modifiers,
                ..
            })) if modifiers.contains(KeyModifiers::CONTROL) => {
                EMULATOR_RUNNING.store(false, Ordering::Relaxed);
                hangup.store(true, Ordering::Relaxed);
                break;
            }
            Ok(Event::Key(KeyEvent {
                code: KeyCode::Char(ch),
                ..
            })) if ch.is_ascii() => ch as u8,
            Ok(Event::Key(KeyEvent {
                code: KeyCode::Enter,
                ..
            })) => b'\r',
            Ok(Event::Key(KeyEvent {
                code: KeyCode::Backspace,
                ..
            })) => 8,
            _ => continue, // ignore other keys
        };
        queue_input(&stdin_uart, &[byte]);
    }
}
