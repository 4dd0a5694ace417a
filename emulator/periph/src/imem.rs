/*++

Licensed under the Apache-2.0 license.

File Name:

    imem.rs

Abstract:

    File contains the execution memory emulation.

--*/

use romtime::ExecMemory;

/// Word addressed instruction memory. Configured either as RAM the
/// bootloader may fill, or as true ROM.
pub struct ExecMem {
    words: Vec<u16>,
    writable: bool,
    locked: bool,
    denied_writes: u64,
}

impl ExecMem {
    /// `size` is in bytes and rounded down to whole words.
    pub fn new(size: usize, writable: bool) -> Self {
        Self {
            words: vec![0; size / 2],
            writable,
            locked: false,
            denied_writes: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.words.len() * 2
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Contents in image byte order, high byte of each word first.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    /// Fills the memory from outside the CPU, as done when the ROM is
    /// synthesized. Ignores the write protection.
    pub fn preload(&mut self, words: &[u16]) {
        let len = words.len().min(self.words.len());
        self.words[..len].copy_from_slice(&words[..len]);
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Writes dropped because of true ROM or the lock.
    pub fn denied_writes(&self) -> u64 {
        self.denied_writes
    }
}

impl ExecMemory for ExecMem {
    fn read_word(&self, index: usize) -> u16 {
        self.words.get(index).copied().unwrap_or(0)
    }

    fn write_word(&mut self, index: usize, value: u16) {
        if !self.writable || self.locked {
            self.denied_writes += 1;
            return;
        }
        match self.words.get_mut(index) {
            Some(word) => *word = value,
            None => log::warn!("execution memory write beyond end: word {}", index),
        }
    }

    fn lock(&mut self) {
        self.locked = true;
    }
}
