// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{image, small_hw, test_params, Board, TEST_IMEM_SIZE};
    use anyhow::Result;
    use boot_image::{BootImage, ImageBuilder, HEADER_SIZE};
    use mcu_bootloader::console::{CONFIRM_STORE, HELP, PROMPT};
    use mcu_bootloader::{BootError, BootOutcome, BootParameters};

    const BASE: u32 = 0x80000;

    fn keys(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    fn stored_image(board: &Board) -> Result<BootImage> {
        let raw = board.flash().contents(BASE, HEADER_SIZE + TEST_IMEM_SIZE);
        Ok(BootImage::parse(&raw)?)
    }

    #[test]
    fn test_help() {
        let mut board = Board::small();
        assert_eq!(board.console(test_params(), b"h"), None);

        let output = board.terminal.output();
        assert_eq!(output.matches(HELP).count(), 2);
        assert!(output.contains(&format!("{}h\r\n{}", PROMPT, HELP)));
    }

    #[test]
    fn test_unknown_commands() {
        let mut board = Board::small();
        assert_eq!(board.console(test_params(), b"xH"), None);

        let output = board.terminal.output();
        assert!(output.contains("x\r\nBad command!\r\n"));
        assert!(output.contains("H\r\nBad command!\r\n"));
        assert_eq!(output.matches(PROMPT).count(), 3);
    }

    #[test]
    fn test_upload() {
        let mut board = Board::small();
        board.platform.imem.preload(&[0xffff; 8]);
        let session = keys(&[b"u", &image(&[0xbeef, 0x0102, 0x0304])]);

        assert_eq!(board.console(test_params(), &session), None);
        assert!(board.terminal.output().contains("Awaiting image... OK\r\n"));
        assert_eq!(&board.imem()[..4], &[0xbeef, 0x0102, 0x0304, 0x0000]);
    }

    #[test]
    fn test_upload_errors_keep_console() {
        let mut board = Board::small();
        let corrupt = ImageBuilder::from_words(&[0x1111, 0x2222])
            .checksum(0x0001)
            .build()
            .unwrap();
        let unsigned = ImageBuilder::from_words(&[0x1111])
            .signature(0xbeef)
            .build()
            .unwrap();
        let session = keys(&[b"u", &corrupt, b"u", &unsigned[..2]]);

        assert_eq!(board.console(test_params(), &session), None);
        let output = board.terminal.output();
        assert!(output.contains("\r\nERROR_4: checksum mismatch\r\n"));
        assert!(output.contains("\r\nERROR_2: invalid executable signature\r\n"));
        assert!(!output.contains('\x07'));
        assert!(!board.platform.sys.status_led());
        // A failed upload still leaves its payload behind.
        assert_eq!(&board.imem()[..2], &[0x1111, 0x2222]);
    }

    #[test]
    fn test_upload_serial_timeout() {
        let mut board = Board::small();
        let session = keys(&[b"u", &image(&[0x1111, 0x2222])[..5]]);

        assert_eq!(board.console(test_params(), &session), None);
        assert!(board
            .terminal
            .output()
            .contains("ERROR_6: serial receive timeout"));
    }

    #[test]
    fn test_upload_to_true_rom_halts() {
        let mut hw = small_hw();
        hw.imem_writable = false;
        let mut board = Board::new(hw, None);

        let outcome = board.console(test_params(), b"u");
        assert_eq!(outcome, Some(BootOutcome::Halted(BootError::ExecMemoryReadOnly)));
        assert!(board.terminal.output().ends_with("\x07ERROR_1\r\n"));
        assert!(board.platform.sys.status_led());
    }

    #[test]
    fn test_program_after_confirmation() -> Result<()> {
        let mut board = Board::small();
        board.platform.imem.preload(&[0x0102, 0x0304, 0x0506]);

        assert_eq!(board.console(test_params(), b"py"), None);
        let output = board.terminal.output();
        assert!(output.contains(&format!("p\r\n{}y\r\nProgramming... OK\r\n", CONFIRM_STORE)));

        let stored = stored_image(&board)?;
        assert_eq!(usize::from(stored.header.size.get()), TEST_IMEM_SIZE);
        assert_eq!(stored.header.checksum.get(), 0x0102 ^ 0x0304 ^ 0x0506);
        assert_eq!(stored.payload.as_slice(), board.imem());
        Ok(())
    }

    #[test]
    fn test_program_declined() {
        let mut board = Board::small();
        board.platform.imem.preload(&[0x0102]);

        assert_eq!(board.console(test_params(), b"pn"), None);
        assert!(!board.terminal.output().contains("Programming"));
        assert!(board
            .flash()
            .contents(BASE, HEADER_SIZE + TEST_IMEM_SIZE)
            .iter()
            .all(|&b| b == 0xff));
    }

    #[test]
    fn test_program_without_confirmation() -> Result<()> {
        let mut board = Board::small();
        board.platform.imem.preload(&[0x0102]);
        let params = BootParameters {
            confirm_store: false,
            ..test_params()
        };

        assert_eq!(board.console(params, b"p"), None);
        assert!(!board.terminal.output().contains(CONFIRM_STORE));
        assert_eq!(stored_image(&board)?.payload[0], 0x0102);
        Ok(())
    }

    #[test]
    fn test_program_without_flash() {
        let mut board = Board::new(small_hw(), None);

        assert_eq!(board.console(test_params(), b"pyh"), None);
        let output = board.terminal.output();
        assert!(output.contains("ERROR_0: boot flash not responding"));
        assert!(output.ends_with(&format!("{}{}", HELP, PROMPT)));
    }

    #[test]
    fn test_program_stuck_flash() {
        let mut board = Board::small();
        board.flash().set_stuck_busy(true);

        assert_eq!(board.console(test_params(), b"py"), None);
        assert!(board
            .terminal
            .output()
            .contains("ERROR_5: boot flash busy timeout"));
    }

    #[test]
    fn test_execute() {
        let mut board = Board::small();
        let session = keys(&[b"u", &image(&[0x4242]), b"e"]);

        let outcome = board.console(test_params(), &session);
        assert_eq!(outcome, Some(BootOutcome::Boot { entry: 0 }));
        assert!(board
            .terminal
            .output()
            .ends_with("e\r\nBooting from 0x0000...\r\n\r\n"));
        assert_eq!(board.imem()[0], 0x4242);
        assert!(board.platform.imem.is_locked());
    }

    #[test]
    fn test_restart() {
        let mut board = Board::small();

        assert_eq!(board.console(test_params(), b"r "), None);
        let output = board.terminal.output();
        assert_eq!(output.matches("MCU16 Bootloader v").count(), 2);
        assert_eq!(output.matches("Aborted.").count(), 2);
        assert_eq!(board.platform.sys.peripheral_resets(), 2);
    }

    #[test]
    fn test_store_then_autoboot() {
        let mut board = Board::small();
        let session = keys(&[b"u", &image(&[0x1111, 0x2222, 0x3333]), b"py", b"r"]);

        let outcome = board.console(test_params(), &session);
        assert_eq!(outcome, Some(BootOutcome::Boot { entry: 0 }));
        let output = board.terminal.output();
        assert!(output.contains("Programming... OK"));
        assert!(output.ends_with("Loading... OK\r\nBooting from 0x0000...\r\n\r\n"));
        assert_eq!(&board.imem()[..4], &[0x1111, 0x2222, 0x3333, 0]);
    }
}
