/*++

Licensed under the Apache-2.0 license.

File Name:

    boot.rs

Abstract:

    Bootloader control flow - autoboot countdown, interactive console and
    the two terminal states.

--*/

use crate::console::{self, Command};
use crate::flash::SpiFlash;
use crate::{get_image, store_image, BootError, BootParameters, ImageSource, RomEnv};
use smlang::statemachine;

statemachine! {
    derive_states: [Clone, Copy, Debug],
    derive_events: [Clone, Debug],
    transitions: {
        // syntax: CurrentState Event [guard] / action = NextState

        // bring every peripheral into a known state and start the countdown
        *Init + PowerOn / on_power_on = AutobootWait,

        // any key aborts the countdown
        AutobootWait + KeyPressed(u8) / on_autoboot_aborted = Console,
        AutobootWait + Tick(u32) [autoboot_expired] = AutobootTriggered,

        AutobootTriggered + ImageLoaded / on_image_loaded = Boot,
        AutobootTriggered + ImageFailed(BootError) / on_fatal_error = HaltError,

        Console + ShowPrompt / on_show_prompt = AwaitCommand,

        AwaitCommand + Key(Command) [is_restart] = Init,
        AwaitCommand + Key(Command) [is_upload] / on_upload = Upload,
        AwaitCommand + Key(Command) [is_confirmed_program] / on_confirm_store = ConfirmStore,
        AwaitCommand + Key(Command) [is_direct_program] = Program,
        AwaitCommand + Key(Command) [is_execute] = Boot,
        AwaitCommand + Key(Command) [is_local] / on_local_command = Console,

        Upload + ImageLoaded / on_image_loaded = Console,
        Upload + ImageFailed(BootError) [is_fatal_in_console] / on_fatal_error = HaltError,
        Upload + ImageFailed(BootError) [!is_fatal_in_console] / on_command_failed = Console,

        // only 'y' programs, every other answer declines
        ConfirmStore + KeyPressed(u8) [is_yes] = Program,
        ConfirmStore + KeyPressed(u8) [!is_yes] = Console,

        Program + ImageStored / on_image_stored = Console,
        Program + StoreFailed(BootError) / on_command_failed = Console,
    }
}

/// How control leaves the bootloader. Neither outcome returns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Execution memory is locked and control goes to word `entry`.
    Boot { entry: usize },
    /// The system is frozen with interrupts off and the status LED on.
    Halted(BootError),
}

/// State machine extended variables.
pub(crate) struct Context<'a> {
    env: RomEnv<'a>,
    params: BootParameters,
    halt_error: Option<BootError>,
}

impl<'a> Context<'a> {
    fn new(env: RomEnv<'a>, params: BootParameters) -> Self {
        Self {
            env,
            params,
            halt_error: None,
        }
    }

    /// Reads one key and echoes it back followed by a line break.
    fn read_key(&mut self) -> Option<u8> {
        let key = self.env.serial.try_read()?;
        self.env.serial.write(key);
        self.env.print("\r\n");
        Some(key)
    }

    fn load(&mut self, source: ImageSource) -> Events {
        match get_image(&mut self.env, &self.params, source) {
            Ok(_) => Events::ImageLoaded,
            Err(err) => Events::ImageFailed(err),
        }
    }

    fn program(&mut self) -> Events {
        self.env.print("Programming... ");
        match store_image(&mut self.env, &self.params) {
            Ok(_) => Events::ImageStored,
            Err(err) => Events::StoreFailed(err),
        }
    }

    fn boot(&mut self) -> BootOutcome {
        self.env.print("Booting from 0x0000...\r\n\r\n");
        let env = &mut self.env;
        SpiFlash::new(&mut *env.spi, self.params.flash_busy_poll_limit).power_down();

        let mut polls = 0;
        while env.serial.tx_busy() {
            polls += 1;
            if polls >= self.params.serial_tx_poll_limit {
                log::warn!("serial transmitter did not drain before boot");
                break;
            }
        }

        env.sys.disable_interrupts();
        env.timer.stop();
        env.imem.lock();
        log::info!("starting application at word 0");
        BootOutcome::Boot { entry: 0 }
    }

    fn halt(&mut self, err: BootError) -> BootOutcome {
        log::error!("bootloader halted: {}", err);
        let env = &mut self.env;
        env.print_fmt(format_args!("\x07ERROR_{}\r\n", err.code()));
        env.sys.disable_interrupts();
        env.imem.lock();
        env.sys.set_status_led(true);
        BootOutcome::Halted(err)
    }
}

impl StateMachineContext for Context<'_> {
    fn on_power_on(&mut self) -> Result<(), ()> {
        let env = &mut self.env;
        env.sys.disable_watchdog();
        env.sys.reset_peripherals();
        env.sys.set_status_led(false);
        env.timer.stop();
        env.timer.start(self.params.tick_hz);
        env.serial.enable();
        SpiFlash::new(&mut *env.spi, self.params.flash_busy_poll_limit).release_power_down();
        env.sys.enable_interrupts();

        console::print_banner(env);
        env.print_fmt(format_args!(
            "Autoboot in {}s. Press key to abort.\r\n",
            self.params.autoboot_timeout_s
        ));
        Ok(())
    }

    fn on_autoboot_aborted(&mut self, _key: u8) -> Result<(), ()> {
        self.env.print("Aborted.\r\n\r\n");
        self.env.print(console::HELP);
        Ok(())
    }

    fn on_image_loaded(&mut self) -> Result<(), ()> {
        self.env.print("OK\r\n");
        Ok(())
    }

    fn on_fatal_error(&mut self, err: BootError) -> Result<(), ()> {
        self.halt_error = Some(err);
        Ok(())
    }

    fn on_show_prompt(&mut self) -> Result<(), ()> {
        self.env.print(console::PROMPT);
        Ok(())
    }

    fn on_upload(&mut self, _command: Command) -> Result<(), ()> {
        self.env.print("Awaiting image... ");
        Ok(())
    }

    fn on_confirm_store(&mut self, _command: Command) -> Result<(), ()> {
        self.env.print(console::CONFIRM_STORE);
        Ok(())
    }

    fn on_local_command(&mut self, command: Command) -> Result<(), ()> {
        match command {
            Command::Help => self.env.print(console::HELP),
            _ => self.env.print("Bad command!\r\n"),
        }
        Ok(())
    }

    fn on_command_failed(&mut self, err: BootError) -> Result<(), ()> {
        log::error!("console command failed: {}", err);
        self.env
            .print_fmt(format_args!("\r\nERROR_{}: {}\r\n", err.code(), err));
        Ok(())
    }

    fn on_image_stored(&mut self) -> Result<(), ()> {
        self.env.print("OK\r\n");
        Ok(())
    }

    // Guards

    fn autoboot_expired(&self, ticks: &u32) -> Result<bool, ()> {
        Ok(*ticks >= self.params.autoboot_ticks())
    }

    fn is_restart(&self, command: &Command) -> Result<bool, ()> {
        Ok(*command == Command::Restart)
    }

    fn is_upload(&self, command: &Command) -> Result<bool, ()> {
        Ok(*command == Command::Upload)
    }

    fn is_confirmed_program(&self, command: &Command) -> Result<bool, ()> {
        Ok(*command == Command::Program && self.params.confirm_store)
    }

    fn is_direct_program(&self, command: &Command) -> Result<bool, ()> {
        Ok(*command == Command::Program && !self.params.confirm_store)
    }

    fn is_execute(&self, command: &Command) -> Result<bool, ()> {
        Ok(*command == Command::Execute)
    }

    fn is_local(&self, command: &Command) -> Result<bool, ()> {
        Ok(matches!(command, Command::Help | Command::Unknown(_)))
    }

    fn is_fatal_in_console(&self, err: &BootError) -> Result<bool, ()> {
        Ok(err.is_fatal_in_console())
    }

    fn is_yes(&self, key: &u8) -> Result<bool, ()> {
        Ok(*key == b'y')
    }
}

pub struct Bootloader<'a> {
    state_machine: StateMachine<Context<'a>>,
}

impl<'a> Bootloader<'a> {
    pub fn new(env: RomEnv<'a>, params: BootParameters) -> Self {
        Self {
            state_machine: StateMachine::new(Context::new(env, params)),
        }
    }

    pub fn state(&self) -> States {
        *self.state_machine.state()
    }

    pub fn params(&self) -> &BootParameters {
        &self.state_machine.context().params
    }

    /// Runs until one of the terminal states has been executed.
    pub fn run(&mut self) -> BootOutcome {
        loop {
            if let Some(outcome) = self.step() {
                return outcome;
            }
            core::hint::spin_loop();
        }
    }

    /// Executes one state. Waiting states return without a transition when
    /// there is nothing to do yet.
    pub fn step(&mut self) -> Option<BootOutcome> {
        let prev_state = self.state();
        let event = match prev_state {
            States::Init => Events::PowerOn,
            States::AutobootWait => {
                let ctx = self.state_machine.context_mut();
                match ctx.env.serial.try_read() {
                    Some(key) => Events::KeyPressed(key),
                    None => Events::Tick(ctx.env.timer.ticks()),
                }
            }
            States::AutobootTriggered => {
                let ctx = self.state_machine.context_mut();
                ctx.env.print("Loading... ");
                let base = ctx.params.flash_base;
                ctx.load(ImageSource::Flash { base })
            }
            States::Console => Events::ShowPrompt,
            States::AwaitCommand => {
                let key = self.state_machine.context_mut().read_key()?;
                Events::Key(Command::from(key))
            }
            States::Upload => self.state_machine.context_mut().load(ImageSource::Serial),
            States::ConfirmStore => Events::KeyPressed(self.state_machine.context_mut().read_key()?),
            States::Program => self.state_machine.context_mut().program(),
            States::Boot => return Some(self.state_machine.context_mut().boot()),
            States::HaltError => {
                let ctx = self.state_machine.context_mut();
                let err = ctx.halt_error?;
                return Some(ctx.halt(err));
            }
        };

        // A rejected tick only means the countdown is still running.
        let _ = self.state_machine.process_event(event);
        if self.state() != prev_state {
            log::debug!("bootloader: {:?} -> {:?}", prev_state, self.state());
        }
        None
    }
}
