//! Firmware SPI flash programming
//!
//! The USB microcontroller boots from a 4 MiB SPI flash. Backends that
//! expose raw page access implement [`FlashPages`]; [`program_image`] turns
//! those primitives into a full erase, write and verify cycle.

use crate::error::{Error, Result};

/// Program/read granularity
pub const PAGE_SIZE: usize = 256;
/// Erase granularity
pub const SECTOR_SIZE: usize = 64 * 1024;
/// Total flash size
pub const FLASH_SIZE: usize = 4 * 1024 * 1024;
/// Number of erase sectors
pub const SECTOR_COUNT: usize = FLASH_SIZE / SECTOR_SIZE;

/// Smallest plausible firmware image
pub const MIN_FIRMWARE_LEN: usize = 50 * 1024;
/// Largest plausible firmware image
pub const MAX_FIRMWARE_LEN: usize = 1024 * 1024;

/// Raw page-level access to the firmware flash
pub trait FlashPages {
    /// Erase one 64 KiB sector
    fn erase_sector(&mut self, sector: u8) -> Result<()>;

    /// Program one page
    fn write_page(&mut self, page: u16, data: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Read one page
    fn read_page(&mut self, page: u16, data: &mut [u8; PAGE_SIZE]) -> Result<()>;
}

/// Progress callbacks for [`program_image`]
pub trait FlashProgress {
    /// Erase is starting
    fn erasing(&mut self, sectors: usize);
    /// `done` sectors erased so far
    fn erase_progress(&mut self, done: usize);
    /// Programming is starting
    fn writing(&mut self, bytes: usize);
    /// `done` bytes programmed so far
    fn write_progress(&mut self, done: usize);
    /// Verification is starting
    fn verifying(&mut self, bytes: usize);
    /// `done` bytes verified so far
    fn verify_progress(&mut self, done: usize);
    /// Everything succeeded
    fn complete(&mut self);
}

/// A no-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {
    fn erasing(&mut self, _sectors: usize) {}
    fn erase_progress(&mut self, _done: usize) {}
    fn writing(&mut self, _bytes: usize) {}
    fn write_progress(&mut self, _done: usize) {}
    fn verifying(&mut self, _bytes: usize) {}
    fn verify_progress(&mut self, _done: usize) {}
    fn complete(&mut self) {}
}

/// Reject images that cannot be firmware.
pub fn check_firmware_len(len: usize) -> Result<()> {
    if (MIN_FIRMWARE_LEN..=MAX_FIRMWARE_LEN).contains(&len) {
        Ok(())
    } else {
        log::error!(
            "Firmware image of {} bytes is outside {}..={} bytes",
            len,
            MIN_FIRMWARE_LEN,
            MAX_FIRMWARE_LEN
        );
        Err(Error::OutOfRange(len as u64))
    }
}

fn padded_page(image: &[u8], page: usize) -> [u8; PAGE_SIZE] {
    let mut buf = [0xff; PAGE_SIZE];
    let start = page * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(image.len());
    buf[..end - start].copy_from_slice(&image[start..end]);
    buf
}

/// Erase, program and verify `image` at the start of the flash.
///
/// The last page is padded with 0xFF. A read-back mismatch returns
/// [`Error::Verify`] with the offset of the first differing byte.
pub fn program_image<F, P>(flash: &mut F, image: &[u8], progress: &mut P) -> Result<()>
where
    F: FlashPages + ?Sized,
    P: FlashProgress + ?Sized,
{
    if image.is_empty() {
        return Err(Error::BufferTooSmall);
    }
    if image.len() > FLASH_SIZE {
        return Err(Error::OutOfRange(image.len() as u64));
    }

    let pages = image.len().div_ceil(PAGE_SIZE);
    let sectors = image.len().div_ceil(SECTOR_SIZE);
    log::info!(
        "Programming {} bytes ({} pages, {} sectors)",
        image.len(),
        pages,
        sectors
    );

    progress.erasing(sectors);
    for sector in 0..sectors {
        flash.erase_sector(sector as u8)?;
        progress.erase_progress(sector + 1);
    }

    progress.writing(pages * PAGE_SIZE);
    for page in 0..pages {
        flash.write_page(page as u16, &padded_page(image, page))?;
        progress.write_progress((page + 1) * PAGE_SIZE);
    }

    progress.verifying(pages * PAGE_SIZE);
    let mut readback = [0u8; PAGE_SIZE];
    for page in 0..pages {
        flash.read_page(page as u16, &mut readback)?;
        let expected = padded_page(image, page);
        if let Some(pos) = expected.iter().zip(readback.iter()).position(|(a, b)| a != b) {
            let offset = (page * PAGE_SIZE + pos) as u32;
            log::error!("Flash verify mismatch at 0x{:08x}", offset);
            return Err(Error::Verify { offset });
        }
        progress.verify_progress((page + 1) * PAGE_SIZE);
    }

    progress.complete();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;
    use std::vec::Vec;

    /// NOR flash model: erase sets 0xFF, programming can only clear bits
    struct MemFlash {
        data: Vec<u8>,
        erased: Vec<u8>,
        stuck_low: Option<usize>,
    }

    impl MemFlash {
        fn new() -> Self {
            Self {
                data: vec![0x00; FLASH_SIZE],
                erased: Vec::new(),
                stuck_low: None,
            }
        }
    }

    impl FlashPages for MemFlash {
        fn erase_sector(&mut self, sector: u8) -> Result<()> {
            let start = sector as usize * SECTOR_SIZE;
            self.data[start..start + SECTOR_SIZE].fill(0xff);
            self.erased.push(sector);
            Ok(())
        }

        fn write_page(&mut self, page: u16, data: &[u8; PAGE_SIZE]) -> Result<()> {
            let start = page as usize * PAGE_SIZE;
            for (cell, byte) in self.data[start..start + PAGE_SIZE].iter_mut().zip(data) {
                *cell &= *byte;
            }
            if let Some(addr) = self.stuck_low {
                self.data[addr] = 0;
            }
            Ok(())
        }

        fn read_page(&mut self, page: u16, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
            let start = page as usize * PAGE_SIZE;
            data.copy_from_slice(&self.data[start..start + PAGE_SIZE]);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        sectors: usize,
        written: usize,
        verified: usize,
        completed: bool,
    }

    impl FlashProgress for CountingProgress {
        fn erasing(&mut self, sectors: usize) {
            self.sectors = sectors;
        }
        fn erase_progress(&mut self, _done: usize) {}
        fn writing(&mut self, _bytes: usize) {}
        fn write_progress(&mut self, done: usize) {
            self.written = done;
        }
        fn verifying(&mut self, _bytes: usize) {}
        fn verify_progress(&mut self, done: usize) {
            self.verified = done;
        }
        fn complete(&mut self) {
            self.completed = true;
        }
    }

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_program_pads_last_page() {
        let mut flash = MemFlash::new();
        let mut progress = CountingProgress::default();
        let fw = image(SECTOR_SIZE + 100);

        program_image(&mut flash, &fw, &mut progress).unwrap();
        assert_eq!(flash.erased, vec![0, 1]);
        assert_eq!(&flash.data[..fw.len()], &fw[..]);
        assert!(flash.data[fw.len()..fw.len() + 156].iter().all(|&b| b == 0xff));
        assert_eq!(progress.sectors, 2);
        assert_eq!(progress.written, SECTOR_SIZE + 256);
        assert_eq!(progress.verified, SECTOR_SIZE + 256);
        assert!(progress.completed);
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let mut flash = MemFlash::new();
        flash.stuck_low = Some(0x1234);
        let fw = vec![0xa5; MIN_FIRMWARE_LEN];

        let result = program_image(&mut flash, &fw, &mut NoProgress);
        assert_eq!(result, Err(Error::Verify { offset: 0x1234 }));
    }

    #[test]
    fn test_rejects_oversized_image() {
        let mut flash = MemFlash::new();
        let fw = vec![0u8; FLASH_SIZE + 1];
        assert_eq!(
            program_image(&mut flash, &fw, &mut NoProgress),
            Err(Error::OutOfRange(FLASH_SIZE as u64 + 1))
        );
        assert!(flash.erased.is_empty());
    }

    #[test]
    fn test_firmware_len_bounds() {
        assert!(check_firmware_len(MIN_FIRMWARE_LEN).is_ok());
        assert!(check_firmware_len(MAX_FIRMWARE_LEN).is_ok());
        assert_eq!(
            check_firmware_len(1000),
            Err(Error::OutOfRange(1000))
        );
    }
}
