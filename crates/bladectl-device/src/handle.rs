//! DeviceHandle - one open device behind whichever backend found it

use bladectl_core::bitstream::{BitstreamLoader, Clock, StdClock};
use bladectl_core::error::Result;
use bladectl_core::flash::FlashProgress;
use bladectl_core::otp::OTP_LEN;
use bladectl_core::protocol::Peripheral;
use bladectl_core::sample::{Metadata, SampleFormat};
use bladectl_core::transport::{Capabilities, Module, Version};
use bladectl_core::{init, lms, si5338, BackendKind};

use crate::registry::BoxedTransport;

/// An open device
///
/// The handle owns the transport and exposes the device-level operations
/// the CLI needs, without ever naming a backend type. Sample rates set
/// through the handle are cached until the next FPGA load or reset.
pub struct DeviceHandle {
    transport: BoxedTransport,
    rx_rate: Option<u32>,
    tx_rate: Option<u32>,
    closed: bool,
}

impl DeviceHandle {
    /// Wrap an already opened transport
    pub fn new(transport: BoxedTransport) -> Self {
        Self {
            transport,
            rx_rate: None,
            tx_rate: None,
            closed: false,
        }
    }

    /// Backend the device was opened with
    pub fn backend(&self) -> BackendKind {
        self.transport.backend()
    }

    /// Optional operations the backend supports
    pub fn capabilities(&self) -> Capabilities {
        self.transport.capabilities()
    }

    /// Direct access to the transport
    pub fn transport(&mut self) -> &mut BoxedTransport {
        &mut self.transport
    }

    /// Load an FPGA bitstream and write the default register state
    pub fn load_bitstream(&mut self, image: &[u8]) -> Result<()> {
        self.load_bitstream_with_clock(image, StdClock)
    }

    /// [`load_bitstream`](Self::load_bitstream) with an explicit delay source
    pub fn load_bitstream_with_clock<C: Clock>(&mut self, image: &[u8], clock: C) -> Result<()> {
        log::info!("Loading {} byte FPGA image", image.len());
        let mut loader = BitstreamLoader::new(&mut *self.transport, clock);
        loader.load(image)?;
        log::debug!("FPGA configured after {} status polls", loader.polls());

        self.rx_rate = None;
        self.tx_rate = None;
        init::init_device(&mut *self.transport)
    }

    /// Tune a module's LO, returning the frequency actually programmed
    pub fn set_frequency(&mut self, module: Module, hz: u64) -> Result<u64> {
        let plan = lms::set_frequency(&mut *self.transport, module, hz)?;
        Ok(plan.frequency())
    }

    /// Read a module's LO frequency back from the PLL registers
    pub fn frequency(&mut self, module: Module) -> Result<u64> {
        lms::get_frequency(&mut *self.transport, module)
    }

    /// Program a module's sample rate
    pub fn set_sample_rate(&mut self, module: Module, rate: u32) -> Result<u32> {
        let plan = si5338::set_sample_rate(&mut *self.transport, module, rate)?;
        *self.rate_slot(module) = Some(plan.sample_rate);
        Ok(plan.sample_rate)
    }

    /// A module's sample rate, from the cache or read back from the Si5338
    pub fn sample_rate(&mut self, module: Module) -> Result<u32> {
        if let Some(rate) = *self.rate_slot(module) {
            return Ok(rate);
        }
        let rate = si5338::get_sample_rate(&mut *self.transport, module)?;
        *self.rate_slot(module) = Some(rate);
        Ok(rate)
    }

    fn rate_slot(&mut self, module: Module) -> &mut Option<u32> {
        match module {
            Module::Rx => &mut self.rx_rate,
            Module::Tx => &mut self.tx_rate,
        }
    }

    /// Reprogram the firmware flash
    pub fn flash_firmware(&mut self, image: &[u8], progress: &mut dyn FlashProgress) -> Result<()> {
        log::info!("Flashing {} byte firmware image", image.len());
        self.transport.flash_firmware(image, progress)
    }

    /// Device serial number
    pub fn serial(&mut self) -> Result<u64> {
        self.transport.read_serial()
    }

    /// Raw OTP page
    pub fn read_otp(&mut self) -> Result<[u8; OTP_LEN]> {
        let mut page = [0u8; OTP_LEN];
        self.transport.read_otp(&mut page)?;
        Ok(page)
    }

    /// Firmware version of the USB microcontroller
    pub fn firmware_version(&mut self) -> Result<Version> {
        self.transport.firmware_version()
    }

    /// Version of the loaded FPGA image
    pub fn fpga_version(&mut self) -> Result<Version> {
        self.transport.fpga_version()
    }

    /// Whether the FPGA is configured
    pub fn is_fpga_configured(&mut self) -> Result<bool> {
        self.transport.is_configured()
    }

    /// Read a peripheral register
    pub fn peripheral_read(&mut self, peripheral: Peripheral, address: u8) -> Result<u8> {
        self.transport.peripheral_read(peripheral, address)
    }

    /// Write a peripheral register
    pub fn peripheral_write(&mut self, peripheral: Peripheral, address: u8, value: u8) -> Result<()> {
        self.transport.peripheral_write(peripheral, address, value)
    }

    /// Read the GPIO register
    pub fn gpio_read(&mut self) -> Result<u32> {
        self.transport.gpio_read()
    }

    /// Write the GPIO register
    pub fn gpio_write(&mut self, value: u32) -> Result<()> {
        self.transport.gpio_write(value)
    }

    /// Write the VCTCXO trim DAC
    pub fn dac_write(&mut self, value: u16) -> Result<()> {
        self.transport.dac_write(value)
    }

    /// Enable or disable a module's sample path
    pub fn enable_module(&mut self, module: Module, enable: bool) -> Result<()> {
        self.transport.enable_module(module, enable)
    }

    /// Receive `count` SC16Q12 samples into `buf`
    pub fn rx(&mut self, buf: &mut [u8], count: usize) -> Result<usize> {
        self.transport.rx(SampleFormat::Sc16Q12, buf, count, None)
    }

    /// Receive with stream metadata
    pub fn rx_with_metadata(
        &mut self,
        buf: &mut [u8],
        count: usize,
        metadata: &mut Metadata,
    ) -> Result<usize> {
        self.transport.rx(SampleFormat::Sc16Q12, buf, count, Some(metadata))
    }

    /// Transmit `count` SC16Q12 samples from `buf`
    pub fn tx(&mut self, buf: &[u8], count: usize) -> Result<usize> {
        self.transport.tx(SampleFormat::Sc16Q12, buf, count, None)
    }

    /// Reset the device. The handle is closed afterwards.
    pub fn reset(mut self) -> Result<()> {
        log::info!("Resetting device");
        self.closed = true;
        self.transport.device_reset()
    }

    /// Reboot into the USB bootloader. The handle is closed afterwards.
    pub fn jump_to_bootloader(mut self) -> Result<()> {
        log::info!("Jumping to bootloader");
        self.closed = true;
        self.transport.jump_to_bootloader()
    }

    /// Close the device, reporting any error from releasing it
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.transport.close()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.transport.close() {
                log::warn!("Error closing device: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bladectl_core::error::Error;
    use bladectl_core::flash::NoProgress;
    use bladectl_dummy::{DummyConfig, DummyDevice};
    use core::time::Duration;

    struct NoDelay;

    impl Clock for NoDelay {
        fn sleep(&mut self, _duration: Duration) {}
    }

    fn handle(config: DummyConfig) -> DeviceHandle {
        DeviceHandle::new(Box::new(DummyDevice::new(config)))
    }

    #[test]
    fn test_load_then_init() {
        let mut dev = handle(DummyConfig {
            fpga_configured: false,
            ..DummyConfig::default()
        });
        assert_eq!(dev.is_fpga_configured(), Ok(false));
        dev.load_bitstream_with_clock(&[0x5a; 1024], NoDelay).unwrap();
        assert_eq!(dev.is_fpga_configured(), Ok(true));
        assert_eq!(dev.gpio_read(), Ok(init::DEFAULT_GPIO));
        for (address, value) in init::DEFAULT_LMS_REGISTERS {
            assert_eq!(dev.peripheral_read(Peripheral::Lms, address), Ok(value));
        }
        for module in [Module::Tx, Module::Rx] {
            assert_eq!(dev.sample_rate(module), Ok(init::DEFAULT_SAMPLE_RATE));
            let hz = dev.frequency(module).unwrap();
            assert!(hz.abs_diff(init::DEFAULT_FREQUENCY_HZ) <= 1);
        }
        // Both sample paths are on
        assert_eq!(dev.tx(&[0u8; 4], 1), Ok(1));
        assert_eq!(dev.rx(&mut [0u8; 4], 1), Ok(1));
    }

    #[test]
    fn test_empty_bitstream_rejected() {
        let mut dev = handle(DummyConfig::default());
        assert!(dev.load_bitstream_with_clock(&[], NoDelay).is_err());
    }

    #[test]
    fn test_tune() {
        let mut dev = handle(DummyConfig::default());
        let programmed = dev.set_frequency(Module::Rx, 915_000_000).unwrap();
        assert!(programmed.abs_diff(915_000_000) <= 1);
        assert_eq!(dev.frequency(Module::Rx), Ok(programmed));
        assert_eq!(
            dev.set_frequency(Module::Rx, 100_000_000),
            Err(Error::OutOfRange(100_000_000))
        );
    }

    #[test]
    fn test_sample_rate_cache_cleared_by_load() {
        let mut dev = handle(DummyConfig::default());
        assert_eq!(dev.set_sample_rate(Module::Rx, 2_000_000), Ok(2_000_000));
        assert_eq!(dev.sample_rate(Module::Rx), Ok(2_000_000));

        // Overwrite the hardware behind the cache's back
        si5338::set_sample_rate(&mut **dev.transport(), Module::Rx, 4_000_000).unwrap();
        assert_eq!(dev.sample_rate(Module::Rx), Ok(2_000_000));

        // The load resets the rate to its default and drops the cache
        dev.load_bitstream_with_clock(&[0; 64], NoDelay).unwrap();
        assert_eq!(dev.sample_rate(Module::Rx), Ok(init::DEFAULT_SAMPLE_RATE));
    }

    #[test]
    fn test_info_queries() {
        let mut dev = handle(DummyConfig::default());
        assert_eq!(dev.backend(), BackendKind::Dummy);
        assert_eq!(dev.serial(), Ok(0x0123_4567_89ab_cdef));
        assert_eq!(dev.firmware_version(), Ok(Version { major: 1, minor: 6 }));
        assert_eq!(dev.read_otp().unwrap()[1], b'S');
    }

    #[test]
    fn test_samples_loop_back() {
        let mut dev = handle(DummyConfig::default());
        assert_eq!(dev.rx(&mut [0u8; 4], 1), Err(Error::Io));
        dev.enable_module(Module::Rx, true).unwrap();
        dev.enable_module(Module::Tx, true).unwrap();

        let out = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(dev.tx(&out, 2), Ok(2));

        let mut buf = [0u8; 8];
        assert_eq!(dev.rx(&mut buf, 2), Ok(2));
        assert_eq!(buf, out);

        let mut meta = Metadata::default();
        assert_eq!(
            dev.rx_with_metadata(&mut buf, 2, &mut meta),
            Err(Error::Unsupported)
        );
    }

    #[test]
    fn test_flash_and_close() {
        let mut dev = handle(DummyConfig::default());
        assert_eq!(
            dev.flash_firmware(&[0; 16], &mut NoProgress),
            Err(Error::OutOfRange(16))
        );
        dev.flash_firmware(&vec![0x42; 64 * 1024], &mut NoProgress)
            .unwrap();
        dev.close().unwrap();
    }
}
