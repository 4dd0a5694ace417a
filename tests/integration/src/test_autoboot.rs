// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{image, small_hw, step_until, test_params, Board};
    use anyhow::Result;
    use boot_image::ImageBuilder;
    use emulator_periph::SpiFlash;
    use mcu_bootloader::console::HELP;
    use mcu_bootloader::{
        BootError, BootOutcome, BootParameters, BootState, Bootloader, BOOTLOADER_VERSION,
    };
    use romtime::{SystemControl, TickTimer};

    const BASE: u32 = 0x80000;

    fn assert_halted(board: &Board, outcome: BootOutcome, err: BootError) {
        assert_eq!(outcome, BootOutcome::Halted(err));
        assert!(board
            .terminal
            .output()
            .ends_with(&format!("\x07ERROR_{}\r\n", err.code())));
        assert!(board.platform.sys.status_led());
        assert!(!board.platform.sys.interrupts_enabled());
        assert!(board.platform.imem.is_locked());
    }

    #[test]
    fn test_autoboot_from_flash() {
        let mut board = Board::small();
        board
            .flash()
            .preload(BASE, &image(&[0x1111, 0x2222, 0x3333]));

        let outcome = board.run(test_params());
        assert_eq!(outcome, BootOutcome::Boot { entry: 0 });

        let output = board.terminal.output();
        assert!(output.contains(&format!("MCU16 Bootloader v{}", BOOTLOADER_VERSION)));
        assert!(output.contains("IMEM: 256 bytes\r\n"));
        assert!(output.contains("Autoboot in 1s. Press key to abort.\r\n"));
        assert!(output.ends_with("Loading... OK\r\nBooting from 0x0000...\r\n\r\n"));

        assert_eq!(&board.imem()[..4], &[0x1111, 0x2222, 0x3333, 0]);
        assert!(board.platform.imem.is_locked());
        assert!(!board.platform.sys.watchdog_enabled());
        assert!(!board.platform.sys.interrupts_enabled());
        assert!(!board.platform.sys.status_led());
        assert!(!board.platform.timer.is_running());
        assert!(board.flash().is_powered_down());
    }

    #[test]
    fn test_countdown_length() {
        let mut board = Board::small();
        board.flash().preload(BASE, &image(&[0x0001]));
        let params = test_params();

        let mut bootloader = Bootloader::new(board.platform.env(), params);
        assert_eq!(
            step_until(&mut bootloader, |state| state == BootState::AutobootWait),
            None
        );
        let mut waits = 0;
        while bootloader.state() == BootState::AutobootWait {
            assert_eq!(bootloader.step(), None);
            waits += 1;
        }
        // Every wait step reads the polled timer once.
        assert_eq!(waits, params.autoboot_ticks());
        assert_eq!(bootloader.state(), BootState::AutobootTriggered);
    }

    #[test]
    fn test_heartbeat_follows_ticks() {
        let mut board = Board::small();
        let platform = &mut board.platform;
        platform.timer.start(4);
        platform.timer.ticks();
        // masked ticks are lost
        assert!(!platform.sys.heartbeat_led());

        platform.sys.enable_interrupts();
        let levels: Vec<bool> = (0..4)
            .map(|_| {
                platform.timer.ticks();
                platform.sys.heartbeat_led()
            })
            .collect();
        assert_eq!(levels, [true, false, true, false]);

        platform.sys.disable_interrupts();
        platform.timer.ticks();
        assert!(!platform.sys.heartbeat_led());
    }

    #[test]
    fn test_key_aborts_autoboot() {
        let mut board = Board::small();
        board.flash().preload(BASE, &image(&[0x0001]));

        assert_eq!(board.console(test_params(), b""), None);
        let output = board.terminal.output();
        assert!(output.contains(&format!("Aborted.\r\n\r\n{}", HELP)));
        assert!(output.ends_with("CMD:> "));
        assert!(!output.contains("Loading"));
        assert!(board.imem().iter().all(|&w| w == 0));
    }

    #[test]
    fn test_erased_flash_halts() {
        let mut board = Board::small();
        let outcome = board.run(test_params());
        assert_halted(&board, outcome, BootError::InvalidExecutable);
        assert!(board.terminal.output().contains("Loading... \x07ERROR_2"));
    }

    #[test]
    fn test_missing_flash_halts() {
        let mut board = Board::new(small_hw(), None);
        let outcome = board.run(test_params());
        assert_halted(&board, outcome, BootError::InvalidExecutable);
    }

    #[test]
    fn test_corrupt_image_halts() {
        let mut board = Board::small();
        let bad = ImageBuilder::from_words(&[0x1111, 0x2222])
            .checksum(0xdead)
            .build()
            .unwrap();
        board.flash().preload(BASE, &bad);

        let outcome = board.run(test_params());
        assert_halted(&board, outcome, BootError::ChecksumMismatch);
    }

    #[test]
    fn test_oversized_image_halts() {
        let mut board = Board::small();
        let big = ImageBuilder::from_words(&[0x1111]).size(0x2000).build().unwrap();
        board.flash().preload(BASE, &big);

        let outcome = board.run(test_params());
        assert_halted(&board, outcome, BootError::ImageTooLarge);
        assert!(board.imem().iter().all(|&w| w == 0));
    }

    #[test]
    fn test_true_rom_halts() {
        let mut hw = small_hw();
        hw.imem_writable = false;
        let mut board = Board::new(hw, Some(SpiFlash::default()));
        board.platform.imem.preload(&[0x4321; 4]);
        board.flash().preload(BASE, &image(&[0x1111]));

        let outcome = board.run(test_params());
        assert_halted(&board, outcome, BootError::ExecMemoryReadOnly);
        assert!(board.terminal.output().contains("(true ROM)"));
        assert_eq!(&board.imem()[..4], &[0x4321; 4]);
    }

    #[test]
    fn test_flash_base_is_configurable() {
        let mut board = Board::small();
        board.flash().preload(0x10000, &image(&[0x7777]));
        let params = BootParameters {
            flash_base: 0x10000,
            ..test_params()
        };

        assert_eq!(board.run(params), BootOutcome::Boot { entry: 0 });
        assert_eq!(board.imem()[0], 0x7777);
    }

    #[test]
    fn test_flash_image_file_survives_restart() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flash.bin");

        let mut board = Board::small();
        board.platform.imem.preload(&[0xabcd, 0x1234]);
        assert_eq!(board.console(test_params(), b"py"), None);
        assert!(board.terminal.output().contains("Programming... OK"));
        board.flash().save_file(&path)?;

        let flash = SpiFlash::default();
        flash.load_file(&path)?;
        let mut board = Board::new(small_hw(), Some(flash));
        assert_eq!(board.run(test_params()), BootOutcome::Boot { entry: 0 });
        assert_eq!(&board.imem()[..3], &[0xabcd, 0x1234, 0x0000]);
        Ok(())
    }
}
