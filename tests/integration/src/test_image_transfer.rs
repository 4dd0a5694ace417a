// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{image, small_hw, test_params, Board, TEST_IMEM_SIZE};
    use anyhow::Result;
    use boot_image::{BootImage, ImageBuilder, BOOT_SIGNATURE, HEADER_SIZE};
    use emulator_periph::SpiFlash;
    use mcu_bootloader::flash::{SpiFlash as FlashDriver, SECTOR_SIZE};
    use mcu_bootloader::{get_image, store_image, BootError, ImageInfo, ImageSource};
    use rand::Rng;

    const BASE: u32 = 0x80000;
    const FLASH: ImageSource = ImageSource::Flash { base: BASE };
    const WORDS: usize = TEST_IMEM_SIZE / 2;

    fn load(board: &mut Board, source: ImageSource) -> Result<ImageInfo, BootError> {
        let mut env = board.platform.env();
        get_image(&mut env, &test_params(), source)
    }

    fn store(board: &mut Board) -> Result<ImageInfo, BootError> {
        let mut env = board.platform.env();
        store_image(&mut env, &test_params())
    }

    fn random_words(count: usize) -> Vec<u16> {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| rng.gen()).collect()
    }

    #[test]
    fn test_three_word_image_from_flash() {
        let mut board = Board::small();
        board.platform.imem.preload(&[0xaaaa; WORDS]);
        board
            .flash()
            .preload(BASE, &image(&[0x1111, 0x2222, 0x3333]));

        let info = load(&mut board, FLASH).unwrap();
        assert_eq!(
            info,
            ImageInfo {
                size: 6,
                checksum: 0x0000
            }
        );
        assert_eq!(&board.imem()[..3], &[0x1111, 0x2222, 0x3333]);
        assert!(board.imem()[3..].iter().all(|&w| w == 0));
    }

    #[test]
    fn test_forced_checksum_is_rejected() {
        let mut board = Board::small();
        let bad = ImageBuilder::from_words(&[0x1111, 0x2222, 0x3333])
            .checksum(0x0001)
            .build()
            .unwrap();
        board.flash().preload(BASE, &bad);

        assert_eq!(load(&mut board, FLASH), Err(BootError::ChecksumMismatch));
        // The payload has already been copied when the mismatch shows up.
        assert_eq!(&board.imem()[..3], &[0x1111, 0x2222, 0x3333]);
    }

    #[test]
    fn test_signature_gate_reads_nothing_else() {
        let mut board = Board::small();
        let bad = ImageBuilder::from_words(&[0x1111, 0x2222, 0x3333])
            .signature(0xbeef)
            .build()
            .unwrap();
        board.platform.imem.preload(&[0x5555; WORDS]);
        board.terminal.send(&bad);

        assert_eq!(
            load(&mut board, ImageSource::Serial),
            Err(BootError::InvalidExecutable)
        );
        assert_eq!(board.terminal.pending(), bad.len() - 2);
        assert!(board.imem().iter().all(|&w| w == 0x5555));
    }

    #[test]
    fn test_size_gate_leaves_memory_untouched() {
        let mut board = Board::small();
        let oversized = ImageBuilder::from_words(&[0x1234; 4])
            .size(TEST_IMEM_SIZE as u16 + 2)
            .build()
            .unwrap();
        board.platform.imem.preload(&[0x5555; WORDS]);
        board.terminal.send(&oversized);

        assert_eq!(
            load(&mut board, ImageSource::Serial),
            Err(BootError::ImageTooLarge)
        );
        assert_eq!(board.terminal.pending(), oversized.len() - HEADER_SIZE);
        assert!(board.imem().iter().all(|&w| w == 0x5555));
    }

    #[test]
    fn test_full_memory_image_is_accepted() {
        let mut board = Board::small();
        let words = random_words(WORDS);
        board.terminal.send(&image(&words));

        let info = load(&mut board, ImageSource::Serial).unwrap();
        assert_eq!(usize::from(info.size), TEST_IMEM_SIZE);
        assert_eq!(board.imem(), words.as_slice());
    }

    #[test]
    fn test_odd_size_drops_last_byte() {
        let mut board = Board::small();
        let odd = ImageBuilder::from_words(&[0x1234, 0x5678])
            .size(3)
            .checksum(0x1234)
            .build()
            .unwrap();
        board.terminal.send(&odd);

        let info = load(&mut board, ImageSource::Serial).unwrap();
        assert_eq!(info.size, 3);
        assert_eq!(info.checksum, 0x1234);
        assert_eq!(&board.imem()[..2], &[0x1234, 0x0000]);
        assert_eq!(board.terminal.pending(), 2);
    }

    #[test]
    fn test_serial_timeout() {
        let mut board = Board::small();
        board.terminal.send(&image(&[0x1111, 0x2222])[..7]);

        assert_eq!(
            load(&mut board, ImageSource::Serial),
            Err(BootError::SerialTimeout)
        );
        assert_eq!(board.terminal.pending(), 0);
    }

    #[test]
    fn test_true_rom_rejects_transfer() {
        let mut hw = small_hw();
        hw.imem_writable = false;
        let mut board = Board::new(hw, Some(SpiFlash::default()));
        board.platform.imem.preload(&[0x5555; WORDS]);
        let upload = image(&[0x1111]);
        board.terminal.send(&upload);

        assert_eq!(
            load(&mut board, ImageSource::Serial),
            Err(BootError::ExecMemoryReadOnly)
        );
        // Rejected before the receiver is touched.
        assert_eq!(board.terminal.pending(), upload.len());
        assert_eq!(board.platform.uart.bytes_read(), 0);
        assert!(board.imem().iter().all(|&w| w == 0x5555));
        assert_eq!(
            store(&mut board).map(|info| info.size),
            Ok(TEST_IMEM_SIZE as u16)
        );
    }

    #[test]
    fn test_store_load_round_trip() -> Result<()> {
        let mut board = Board::small();
        let words = random_words(WORDS);
        board.platform.imem.preload(&words);

        let stored = store(&mut board).unwrap();
        assert_eq!(usize::from(stored.size), TEST_IMEM_SIZE);

        let raw = board.flash().contents(BASE, HEADER_SIZE + TEST_IMEM_SIZE);
        let parsed = BootImage::parse(&raw)?;
        assert_eq!(parsed.header.signature.get(), BOOT_SIGNATURE);
        assert_eq!(parsed.header.checksum.get(), stored.checksum);
        assert_eq!(parsed.payload, words);

        board.platform.imem.preload(&[0; WORDS]);
        let loaded = load(&mut board, FLASH).unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(board.imem(), words.as_slice());
        assert!(board.platform.spi.errors().is_empty());
        Ok(())
    }

    #[test]
    fn test_any_bit_flip_is_detected() {
        let mut board = Board::small();
        board.platform.imem.preload(&random_words(WORDS));
        store(&mut board).unwrap();

        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let offset = BASE + (HEADER_SIZE + rng.gen_range(0..TEST_IMEM_SIZE)) as u32;
            let original = board.flash().contents(offset, 1)[0];
            let flipped = original ^ (1u8 << rng.gen_range(0..8u32));
            board.flash().preload(offset, &[flipped]);

            assert_eq!(load(&mut board, FLASH), Err(BootError::ChecksumMismatch));

            board.flash().preload(offset, &[original]);
        }
        assert!(load(&mut board, FLASH).is_ok());
    }

    #[test]
    fn test_sector_erase_is_idempotent() {
        let mut board = Board::small();
        board.flash().preload(BASE, &[0x00; 512]);
        {
            let mut flash = FlashDriver::new(&mut board.platform.spi, 1_000);
            flash.write_byte(BASE + 0x1000, 0x42).unwrap();
            flash.erase_sector(BASE).unwrap();
        }
        let once = board.flash().contents(BASE, SECTOR_SIZE as usize);
        assert!(once.iter().all(|&b| b == 0xff));

        FlashDriver::new(&mut board.platform.spi, 1_000)
            .erase_sector(BASE)
            .unwrap();
        assert_eq!(board.flash().contents(BASE, SECTOR_SIZE as usize), once);
        assert!(board.platform.spi.errors().is_empty());
    }

    #[test]
    fn test_store_without_flash() {
        let mut board = Board::new(small_hw(), None);
        assert_eq!(store(&mut board), Err(BootError::EepromAccess));
    }

    #[test]
    fn test_store_stuck_busy_times_out() {
        let mut board = Board::small();
        board.flash().set_stuck_busy(true);
        assert_eq!(store(&mut board), Err(BootError::FlashTimeout));
    }

    #[test]
    fn test_store_rejects_memory_larger_than_sector() {
        let mut hw = small_hw();
        hw.imem_size = SECTOR_SIZE as usize;
        let mut board = Board::new(hw, Some(SpiFlash::default()));
        assert_eq!(store(&mut board), Err(BootError::ImageTooLarge));
        assert!(board.flash().contents(BASE, 16).iter().all(|&b| b == 0xff));
    }
}
