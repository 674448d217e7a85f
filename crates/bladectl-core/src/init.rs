//! Default device state after an FPGA load

use crate::error::Result;
use crate::lms;
use crate::si5338;
use crate::transport::{Module, Transport};

/// GPIO value after an FPGA load
pub const DEFAULT_GPIO: u32 = 0x51;

/// LMS6002D registers written after every FPGA load
pub const DEFAULT_LMS_REGISTERS: [(u8, u8); 6] = [
    (0x05, 0x3e),
    (0x47, 0x40),
    (0x59, 0x29),
    (0x64, 0x36),
    (0x79, 0x37),
    (0x5a, 0xa0),
];

/// Sample rate both modules start at
pub const DEFAULT_SAMPLE_RATE: u32 = 1_000_000;
/// Frequency both PLLs are tuned to
pub const DEFAULT_FREQUENCY_HZ: u64 = 1_000_000_000;

/// Bring a freshly configured device into its default state.
///
/// Writes the default GPIO and LMS registers, then sets both modules to
/// [`DEFAULT_SAMPLE_RATE`], enables them and tunes them to
/// [`DEFAULT_FREQUENCY_HZ`], TX first. The first failing step aborts.
pub fn init_device<T: Transport + ?Sized>(dev: &mut T) -> Result<()> {
    log::debug!("Writing default register state");
    dev.gpio_write(DEFAULT_GPIO)?;
    for (address, value) in DEFAULT_LMS_REGISTERS {
        dev.lms_write(address, value)?;
    }

    for module in [Module::Tx, Module::Rx] {
        si5338::set_sample_rate(dev, module, DEFAULT_SAMPLE_RATE)?;
    }
    for module in [Module::Tx, Module::Rx] {
        dev.enable_module(module, true)?;
    }
    for module in [Module::Tx, Module::Rx] {
        lms::set_frequency(dev, module, DEFAULT_FREQUENCY_HZ)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::MockTransport;
    use crate::protocol::Peripheral;

    fn locking_vco(cap: u8) -> u8 {
        match cap {
            0..=19 => 0x80,
            20..=39 => 0x00,
            _ => 0x40,
        }
    }

    #[test]
    fn test_init_sequence() {
        let mut dev = MockTransport::new();
        dev.vtune = Some(locking_vco);
        init_device(&mut dev).unwrap();

        assert_eq!(dev.gpio_read().unwrap(), DEFAULT_GPIO);
        for (address, value) in DEFAULT_LMS_REGISTERS {
            assert_eq!(dev.reg(Peripheral::Lms, address), value);
        }
        assert_eq!(dev.writes[4..10].len(), DEFAULT_LMS_REGISTERS.len());
        assert!(dev.writes[4..10].iter().all(|&(p, _, _)| p == Peripheral::Lms));

        for module in [Module::Tx, Module::Rx] {
            assert_eq!(si5338::get_sample_rate(&mut dev, module), Ok(DEFAULT_SAMPLE_RATE));
            let hz = lms::get_frequency(&mut dev, module).unwrap();
            assert!(hz.abs_diff(DEFAULT_FREQUENCY_HZ) <= 1);
        }
        assert_eq!(dev.modules, std::vec![(Module::Tx, true), (Module::Rx, true)]);
    }

    #[test]
    fn test_init_stops_when_tuning_fails() {
        let mut dev = MockTransport::new();
        dev.vtune = Some(|_| 0x80);
        assert_eq!(init_device(&mut dev), Err(Error::Calibration));
        assert_eq!(dev.modules.len(), 2);
        // RX was never swept
        assert!(!dev.writes.contains(&(Peripheral::Lms, 0x29, 0x80)));
    }
}
