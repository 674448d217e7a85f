//! bladectl-dummy - simulated bladeRF for testing
//!
//! This crate provides a device model that implements [`Transport`] in
//! memory: peripheral register files, an FPGA that takes a few status polls
//! to come up, a VCO whose tuning voltage depends on the capacitor trim, a
//! 4 MiB NOR flash, an OTP page holding the serial, and a TX to RX sample
//! loopback. It is useful for testing and development without hardware.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::collections::VecDeque;
#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use bladectl_core::error::{Error, Result};
use bladectl_core::flash::{self, FlashPages, FlashProgress, FLASH_SIZE, PAGE_SIZE, SECTOR_SIZE};
use bladectl_core::otp::{self, OTP_LEN};
use bladectl_core::protocol::Peripheral;
use bladectl_core::sample::{Metadata, SampleFormat};
use bladectl_core::transport::{Capabilities, Version};
use bladectl_core::{BackendKind, DeviceIdentity, Module, Transport};

/// Capacitor trim field of the VCOCAP register
const VCOCAP_MASK: u8 = 0x3f;
const VTUNE_HIGH: u8 = 0x80;
const VTUNE_LOW: u8 = 0x40;

/// Configuration for the simulated device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Serial stored in OTP
    pub serial: u64,
    /// Reported firmware version
    pub firmware_version: Version,
    /// Status polls answered "not configured" after END_PROG
    pub configure_polls: u32,
    /// Whether the FPGA starts out configured
    pub fpga_configured: bool,
    /// Capacitor trims (inclusive) at which both VCOs are in lock
    pub vco_lock_window: Option<(u8, u8)>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            serial: 0x0123_4567_89ab_cdef,
            firmware_version: Version { major: 1, minor: 6 },
            configure_polls: 3,
            fpga_configured: true,
            vco_lock_window: Some((20, 38)),
        }
    }
}

/// FPGA configuration state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpgaState {
    /// No image loaded
    Unconfigured,
    /// Between BEGIN_PROG and END_PROG
    Programming,
    /// END_PROG issued, `remaining` polls until configured
    Loading {
        /// Polls left before the FPGA reports configured
        remaining: u32,
    },
    /// Image running
    Configured,
}

/// Identity the simulated device answers to
pub fn identity(config: &DummyConfig) -> DeviceIdentity {
    DeviceIdentity {
        backend: BackendKind::Dummy,
        serial: Some(config.serial),
        usb_bus: None,
        usb_addr: None,
        instance: Some(0),
    }
}

/// List the simulated device
#[cfg(feature = "alloc")]
pub fn probe() -> Vec<DeviceIdentity> {
    vec![identity(&DummyConfig::default())]
}

fn register_bank(peripheral: Peripheral) -> usize {
    match peripheral {
        Peripheral::Gpio => 0,
        Peripheral::Lms => 1,
        Peripheral::Vctcxo => 2,
        Peripheral::Si5338 => 3,
    }
}

/// Serial as the 32 hex digits stored in OTP
fn serial_digits(serial: u64) -> [u8; 32] {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut digits = [b'0'; 32];
    for (i, digit) in digits[16..].iter_mut().enumerate() {
        let shift = 60 - 4 * i;
        *digit = HEX[((serial >> shift) & 0xf) as usize];
    }
    digits
}

/// Simulated device
///
/// Emulates a complete board in memory for testing purposes.
#[cfg(feature = "alloc")]
pub struct DummyDevice {
    config: DummyConfig,
    registers: [[u8; 256]; 4],
    fpga: FpgaState,
    image_len: usize,
    flash: Vec<u8>,
    otp: [u8; OTP_LEN],
    dac: u16,
    modules: [bool; 2],
    loopback: VecDeque<u8>,
    in_bootloader: bool,
}

#[cfg(feature = "alloc")]
impl DummyDevice {
    /// Create a simulated device with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let mut otp = [0xff; OTP_LEN];
        let mut idx = 0;
        // The serial record always fits in an empty page
        let _ = otp::encode_field(
            &mut otp,
            &mut idx,
            otp::SERIAL_FIELD,
            &serial_digits(config.serial),
        );

        let fpga = if config.fpga_configured {
            FpgaState::Configured
        } else {
            FpgaState::Unconfigured
        };

        Self {
            config,
            registers: [[0; 256]; 4],
            fpga,
            image_len: 0,
            flash: vec![0xff; FLASH_SIZE],
            otp,
            dac: 0,
            modules: [false; 2],
            loopback: VecDeque::new(),
            in_bootloader: false,
        }
    }

    /// Create a simulated device with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Open the simulated device if it matches `wanted`
    pub fn open(wanted: &DeviceIdentity) -> Result<Self> {
        let config = DummyConfig::default();
        if !wanted.matches(&identity(&config)) {
            return Err(Error::NotFound);
        }
        log::info!("Opening simulated bladeRF");
        Ok(Self::new(config))
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Current FPGA state
    pub fn fpga_state(&self) -> FpgaState {
        self.fpga
    }

    /// Size of the last image received
    pub fn image_len(&self) -> usize {
        self.image_len
    }

    /// Raw register contents
    pub fn register(&self, peripheral: Peripheral, address: u8) -> u8 {
        self.registers[register_bank(peripheral)][address as usize]
    }

    /// Trim DAC word latched by the last high-byte write
    pub fn dac(&self) -> u16 {
        self.dac
    }

    /// Whether a module's sample path is on
    pub fn module_enabled(&self, module: Module) -> bool {
        self.modules[module as usize]
    }

    /// Get a reference to the flash contents
    pub fn flash_data(&self) -> &[u8] {
        &self.flash
    }

    /// Whether the device was sent to its bootloader
    pub fn in_bootloader(&self) -> bool {
        self.in_bootloader
    }

    fn check_fpga(&self) -> Result<()> {
        if self.fpga != FpgaState::Configured {
            log::warn!("Peripheral access with the FPGA in state {:?}", self.fpga);
            return Err(Error::Io);
        }
        Ok(())
    }

    /// VTUNE comparator bits for the given VCOCAP register value
    fn vtune(&self, vcocap: u8) -> u8 {
        let cap = vcocap & VCOCAP_MASK;
        match self.config.vco_lock_window {
            Some((low, _)) if cap < low => VTUNE_HIGH,
            Some((_, high)) if cap > high => VTUNE_LOW,
            Some(_) => 0,
            None => VTUNE_HIGH,
        }
    }
}

#[cfg(feature = "alloc")]
impl FlashPages for DummyDevice {
    fn erase_sector(&mut self, sector: u8) -> Result<()> {
        let start = sector as usize * SECTOR_SIZE;
        if start + SECTOR_SIZE > self.flash.len() {
            return Err(Error::OutOfRange(sector as u64));
        }
        self.flash[start..start + SECTOR_SIZE].fill(0xff);
        Ok(())
    }

    fn write_page(&mut self, page: u16, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let start = page as usize * PAGE_SIZE;
        let cells = self
            .flash
            .get_mut(start..start + PAGE_SIZE)
            .ok_or(Error::OutOfRange(page as u64))?;
        // NOR programming can only clear bits
        for (cell, &byte) in cells.iter_mut().zip(data.iter()) {
            *cell &= byte;
        }
        Ok(())
    }

    fn read_page(&mut self, page: u16, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let start = page as usize * PAGE_SIZE;
        let cells = self
            .flash
            .get(start..start + PAGE_SIZE)
            .ok_or(Error::OutOfRange(page as u64))?;
        data.copy_from_slice(cells);
        Ok(())
    }
}

#[cfg(feature = "alloc")]
impl Transport for DummyDevice {
    fn backend(&self) -> BackendKind {
        BackendKind::Dummy
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn peripheral_read(&mut self, peripheral: Peripheral, address: u8) -> Result<u8> {
        self.check_fpga()?;
        let value = match (peripheral, address) {
            (Peripheral::Lms, 0x1a) => self.vtune(self.register(Peripheral::Lms, 0x19)),
            (Peripheral::Lms, 0x2a) => self.vtune(self.register(Peripheral::Lms, 0x29)),
            _ => self.register(peripheral, address),
        };
        log::trace!("{} read 0x{:02x} = 0x{:02x}", peripheral.name(), address, value);
        Ok(value)
    }

    fn peripheral_write(&mut self, peripheral: Peripheral, address: u8, value: u8) -> Result<()> {
        self.check_fpga()?;
        log::trace!("{} write 0x{:02x} = 0x{:02x}", peripheral.name(), address, value);
        self.registers[register_bank(peripheral)][address as usize] = value;
        if (peripheral, address) == (Peripheral::Vctcxo, 1) {
            self.dac = u16::from_le_bytes([self.register(Peripheral::Vctcxo, 0), value]);
        }
        Ok(())
    }

    fn begin_program(&mut self) -> Result<()> {
        self.fpga = FpgaState::Programming;
        self.image_len = 0;
        self.modules = [false; 2];
        Ok(())
    }

    fn write_image(&mut self, image: &[u8]) -> Result<()> {
        if self.fpga != FpgaState::Programming {
            return Err(Error::Protocol);
        }
        self.image_len += image.len();
        Ok(())
    }

    fn end_program(&mut self) -> Result<()> {
        if self.fpga != FpgaState::Programming {
            return Err(Error::Protocol);
        }
        self.fpga = if self.image_len == 0 {
            FpgaState::Unconfigured
        } else {
            FpgaState::Loading {
                remaining: self.config.configure_polls,
            }
        };
        Ok(())
    }

    fn is_configured(&mut self) -> Result<bool> {
        match self.fpga {
            FpgaState::Configured => Ok(true),
            FpgaState::Loading { remaining: 0 } => {
                self.fpga = FpgaState::Configured;
                Ok(true)
            }
            FpgaState::Loading { remaining } => {
                self.fpga = FpgaState::Loading {
                    remaining: remaining - 1,
                };
                Ok(false)
            }
            FpgaState::Unconfigured | FpgaState::Programming => Ok(false),
        }
    }

    fn fpga_loaded(&mut self) -> Result<()> {
        self.modules = [true; 2];
        Ok(())
    }

    fn flash_firmware(&mut self, image: &[u8], progress: &mut dyn FlashProgress) -> Result<()> {
        flash::check_firmware_len(image.len())?;
        flash::program_image(self, image, progress)
    }

    fn read_otp(&mut self, buf: &mut [u8; OTP_LEN]) -> Result<()> {
        buf.copy_from_slice(&self.otp);
        Ok(())
    }

    fn firmware_version(&mut self) -> Result<Version> {
        Ok(self.config.firmware_version)
    }

    fn enable_module(&mut self, module: Module, enable: bool) -> Result<()> {
        self.modules[module as usize] = enable;
        Ok(())
    }

    fn rx(
        &mut self,
        format: SampleFormat,
        buf: &mut [u8],
        count: usize,
        metadata: Option<&mut Metadata>,
    ) -> Result<usize> {
        if metadata.is_some() {
            return Err(Error::Unsupported);
        }
        let total = format.byte_len(count, buf.len())?;
        if !self.module_enabled(Module::Rx) {
            return Err(Error::Io);
        }
        for byte in buf[..total].iter_mut() {
            *byte = self.loopback.pop_front().unwrap_or(0);
        }
        Ok(count)
    }

    fn tx(
        &mut self,
        format: SampleFormat,
        buf: &[u8],
        count: usize,
        metadata: Option<&Metadata>,
    ) -> Result<usize> {
        if metadata.is_some() {
            return Err(Error::Unsupported);
        }
        let total = format.byte_len(count, buf.len())?;
        if !self.module_enabled(Module::Tx) {
            return Err(Error::Io);
        }
        self.loopback.extend(buf[..total].iter().copied());
        Ok(count)
    }

    fn device_reset(&mut self) -> Result<()> {
        log::info!("Resetting simulated bladeRF");
        let config = self.config.clone();
        let flash = core::mem::take(&mut self.flash);
        *self = Self::new(DummyConfig {
            fpga_configured: false,
            ..config
        });
        self.flash = flash;
        Ok(())
    }

    fn jump_to_bootloader(&mut self) -> Result<()> {
        self.in_bootloader = true;
        self.fpga = FpgaState::Unconfigured;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bladectl_core::bitstream::{BitstreamLoader, Clock, LoadState};
    use bladectl_core::flash::NoProgress;
    use bladectl_core::{init, lms, si5338};
    use core::time::Duration;

    struct NoDelay;

    impl Clock for NoDelay {
        fn sleep(&mut self, _duration: Duration) {}
    }

    #[test]
    fn test_bitstream_load_waits_for_configuration() {
        let mut dev = DummyDevice::new(DummyConfig {
            fpga_configured: false,
            ..DummyConfig::default()
        });
        assert_eq!(dev.gpio_read(), Err(Error::Io));

        let mut loader = BitstreamLoader::new(&mut dev, NoDelay);
        loader.load(&[0xa5; 4096]).unwrap();
        assert_eq!(loader.state(), LoadState::Configured);
        assert_eq!(loader.polls(), 4);

        assert_eq!(dev.image_len(), 4096);
        assert!(dev.module_enabled(Module::Rx));
        assert!(dev.module_enabled(Module::Tx));
        init::init_device(&mut dev).unwrap();
        assert_eq!(dev.gpio_read().unwrap(), init::DEFAULT_GPIO);
    }

    #[test]
    fn test_bitstream_load_times_out() {
        let mut dev = DummyDevice::new(DummyConfig {
            configure_polls: 50,
            ..DummyConfig::default()
        });
        let mut loader = BitstreamLoader::new(&mut dev, NoDelay);
        assert_eq!(loader.load(&[0; 16]), Err(Error::Timeout));
        assert_eq!(loader.state(), LoadState::TimedOut);
    }

    #[test]
    fn test_tune_and_read_back() {
        let mut dev = DummyDevice::new_default();
        let plan = lms::set_frequency(&mut dev, Module::Rx, 915_000_000).unwrap();
        assert_eq!(plan.x, 8);

        // Lock window 20..=38
        assert_eq!(dev.register(Peripheral::Lms, 0x29) & VCOCAP_MASK, 29);
        let hz = lms::get_frequency(&mut dev, Module::Rx).unwrap();
        assert!(hz.abs_diff(915_000_000) <= 1);

        // DSMs are off again
        assert_eq!(dev.register(Peripheral::Lms, lms::REG_CLK_EN) & 0x05, 0);
    }

    #[test]
    fn test_tune_without_lock_fails_closed() {
        let mut dev = DummyDevice::new(DummyConfig {
            vco_lock_window: None,
            ..DummyConfig::default()
        });
        assert_eq!(
            lms::set_frequency(&mut dev, Module::Tx, 2_400_000_000),
            Err(Error::Calibration)
        );
        assert_eq!(dev.register(Peripheral::Lms, lms::REG_CLK_EN) & 0x05, 0);
    }

    #[test]
    fn test_sample_rate_round_trip() {
        let mut dev = DummyDevice::new_default();
        for rate in [160_000, 1_000_000, 10_000_000, 40_000_000] {
            si5338::set_sample_rate(&mut dev, Module::Tx, rate).unwrap();
            assert_eq!(si5338::get_sample_rate(&mut dev, Module::Tx).unwrap(), rate);
        }
    }

    #[test]
    fn test_dac_latches_on_high_byte() {
        let mut dev = DummyDevice::new_default();
        dev.peripheral_write(Peripheral::Vctcxo, 0, 0x34).unwrap();
        assert_eq!(dev.dac(), 0);

        dev.dac_write(0x8abc).unwrap();
        assert_eq!(dev.dac(), 0x8abc);
        assert_eq!(dev.register(Peripheral::Vctcxo, 0), 0xbc);
        assert_eq!(dev.register(Peripheral::Vctcxo, 1), 0x8a);
    }

    #[test]
    fn test_serial_from_otp() {
        let mut dev = DummyDevice::new_default();
        assert_eq!(dev.read_serial().unwrap(), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn test_flash_firmware() {
        let mut dev = DummyDevice::new_default();
        let image: Vec<u8> = (0..flash::MIN_FIRMWARE_LEN).map(|i| (i % 251) as u8).collect();
        dev.flash_firmware(&image, &mut NoProgress).unwrap();
        assert_eq!(&dev.flash_data()[..image.len()], &image[..]);

        assert_eq!(
            dev.flash_firmware(&image[..1024], &mut NoProgress),
            Err(Error::OutOfRange(1024))
        );
    }

    #[test]
    fn test_sample_loopback() {
        let mut dev = DummyDevice::new_default();
        dev.fpga_loaded().unwrap();

        let sent = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(dev.tx(SampleFormat::Sc16Q12, &sent, 2, None), Ok(2));

        let mut received = [0xffu8; 12];
        assert_eq!(dev.rx(SampleFormat::Sc16Q12, &mut received, 3, None), Ok(3));
        assert_eq!(&received[..8], &sent);
        assert_eq!(&received[8..], &[0; 4]);

        let mut meta = Metadata::default();
        assert_eq!(
            dev.rx(SampleFormat::Sc16Q12, &mut received, 1, Some(&mut meta)),
            Err(Error::Unsupported)
        );
    }

    #[test]
    fn test_reset_keeps_flash() {
        let mut dev = DummyDevice::new_default();
        dev.write_page(0, &[0u8; PAGE_SIZE]).unwrap();
        dev.gpio_write(0x51).unwrap();
        dev.device_reset().unwrap();
        assert_eq!(dev.fpga_state(), FpgaState::Unconfigured);
        assert_eq!(dev.flash_data()[0], 0);
        assert_eq!(dev.register(Peripheral::Gpio, 0), 0);
    }

    #[test]
    fn test_open_matches_identity() {
        let any = DeviceIdentity::with_backend(BackendKind::Dummy);
        assert!(DummyDevice::open(&any).is_ok());

        let other = DeviceIdentity {
            serial: Some(1),
            ..any
        };
        assert!(matches!(DummyDevice::open(&other), Err(Error::NotFound)));
    }
}
