//! The transport trait implemented by every backend
//!
//! A [`Transport`] is one open connection to one device. Only register
//! access and identification are mandatory; everything else defaults to
//! [`Error::Unsupported`] so that a backend (or a test double) implements
//! exactly what it can do. Multi-byte register helpers are provided on top
//! of the single-byte primitives so that every backend produces the same
//! sequence of byte transactions.

use core::fmt;

use bitflags::bitflags;

use crate::bitstream::PollPolicy;
use crate::error::{Error, Result};
use crate::flash::FlashProgress;
use crate::identity::BackendKind;
use crate::otp::{self, OTP_LEN};
use crate::protocol::Peripheral;
use crate::sample::{Metadata, SampleFormat};

bitflags! {
    /// Optional operations a transport supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Can load an FPGA bitstream
        const FPGA_LOAD  = 1 << 0;
        /// Can reprogram the firmware SPI flash
        const FLASH      = 1 << 1;
        /// Can read the OTP page
        const OTP        = 1 << 2;
        /// Can stream samples
        const SAMPLES    = 1 << 3;
        /// Can reset the device
        const RESET      = 1 << 4;
        /// Can reboot the device into its bootloader
        const BOOTLOADER = 1 << 5;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::empty()
    }
}

/// RF signal path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    /// Receive path
    Rx,
    /// Transmit path
    Tx,
}

impl Module {
    /// Lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rx => "rx",
            Self::Tx => "tx",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Firmware or FPGA version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One open connection to a device
///
/// Operations block until the device answers or the backend's timeout
/// expires. Calls on one transport are applied in issue order; callers
/// sharing a transport between threads must serialize access themselves.
pub trait Transport {
    /// Which backend this transport belongs to
    fn backend(&self) -> BackendKind;

    /// Optional operations this transport supports
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Read one byte from a peripheral register
    fn peripheral_read(&mut self, peripheral: Peripheral, address: u8) -> Result<u8>;

    /// Write one byte to a peripheral register
    fn peripheral_write(&mut self, peripheral: Peripheral, address: u8, value: u8) -> Result<()>;

    /// Put the FPGA into configuration mode
    fn begin_program(&mut self) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Stream a complete bitstream to the FPGA, chunked as the backend needs
    fn write_image(&mut self, _image: &[u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Leave configuration mode
    fn end_program(&mut self) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Whether the FPGA reports a loaded configuration
    fn is_configured(&mut self) -> Result<bool> {
        Err(Error::Unsupported)
    }

    /// How the bitstream loader polls [`is_configured`](Self::is_configured)
    fn fpga_poll_policy(&self) -> PollPolicy {
        PollPolicy::default()
    }

    /// Hook run after the FPGA reports configured
    fn fpga_loaded(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reprogram the firmware flash with `image`
    fn flash_firmware(&mut self, _image: &[u8], _progress: &mut dyn FlashProgress) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Read the 256-byte OTP page
    fn read_otp(&mut self, _buf: &mut [u8; OTP_LEN]) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// 64-bit device serial, read from the OTP `S` field by default
    fn read_serial(&mut self) -> Result<u64> {
        let mut page = [0u8; OTP_LEN];
        self.read_otp(&mut page)?;
        otp::read_serial(&page)
    }

    /// Version of the firmware running on the USB microcontroller
    fn firmware_version(&mut self) -> Result<Version> {
        Err(Error::Unsupported)
    }

    /// Version of the loaded FPGA image
    fn fpga_version(&mut self) -> Result<Version> {
        log::debug!("FPGA image carries no version register, reporting 0.0");
        Ok(Version::default())
    }

    /// Write the VCTCXO trim DAC, low byte to address 0 then high byte to address 1
    ///
    /// The FPGA latches the DAC word on the address 1 write.
    fn dac_write(&mut self, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        log::trace!("dac write 0x{:04x}", value);
        self.peripheral_write(Peripheral::Vctcxo, 0, lo)?;
        self.peripheral_write(Peripheral::Vctcxo, 1, hi)
    }

    /// Enable or disable an RF module's sample path
    fn enable_module(&mut self, _module: Module, _enable: bool) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Receive `count` samples into `buf`, returning the samples transferred
    fn rx(
        &mut self,
        _format: SampleFormat,
        _buf: &mut [u8],
        _count: usize,
        _metadata: Option<&mut Metadata>,
    ) -> Result<usize> {
        Err(Error::Unsupported)
    }

    /// Transmit `count` samples from `buf`, returning the samples transferred
    fn tx(
        &mut self,
        _format: SampleFormat,
        _buf: &[u8],
        _count: usize,
        _metadata: Option<&Metadata>,
    ) -> Result<usize> {
        Err(Error::Unsupported)
    }

    /// Reset the device; the transport is unusable afterwards
    fn device_reset(&mut self) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Reboot into the USB bootloader; the transport is unusable afterwards
    fn jump_to_bootloader(&mut self) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Release the connection. Dropping the transport does the same.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read four consecutive byte registers as a little-endian word.
    ///
    /// Every byte read must succeed before the next is issued; nothing is
    /// returned unless all four do.
    fn peripheral_read_le32(&mut self, peripheral: Peripheral, base: u8) -> Result<u32> {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.peripheral_read(peripheral, base.wrapping_add(i as u8))?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// Write a little-endian word as four consecutive byte registers
    fn peripheral_write_le32(&mut self, peripheral: Peripheral, base: u8, value: u32) -> Result<()> {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.peripheral_write(peripheral, base.wrapping_add(i as u8), byte)?;
        }
        Ok(())
    }

    /// Read the 32-bit GPIO register
    fn gpio_read(&mut self) -> Result<u32> {
        self.peripheral_read_le32(Peripheral::Gpio, 0)
    }

    /// Write the 32-bit GPIO register
    fn gpio_write(&mut self, value: u32) -> Result<()> {
        self.peripheral_write_le32(Peripheral::Gpio, 0, value)
    }

    /// Read an LMS6002D register
    fn lms_read(&mut self, address: u8) -> Result<u8> {
        self.peripheral_read(Peripheral::Lms, address)
    }

    /// Write an LMS6002D register
    fn lms_write(&mut self, address: u8, value: u8) -> Result<()> {
        self.peripheral_write(Peripheral::Lms, address, value)
    }

    /// Read a Si5338 register
    fn si5338_read(&mut self, address: u8) -> Result<u8> {
        self.peripheral_read(Peripheral::Si5338, address)
    }

    /// Write a Si5338 register
    fn si5338_write(&mut self, address: u8, value: u8) -> Result<()> {
        self.peripheral_write(Peripheral::Si5338, address, value)
    }
}
