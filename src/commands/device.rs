//! Device control commands

use super::progress::IndicatifProgress;
use super::read_file;
use bladectl_core::protocol::Peripheral;
use bladectl_core::transport::Capabilities;
use bladectl_core::Module;
use bladectl_device::DeviceHandle;
use std::path::Path;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn describe_capabilities(caps: Capabilities) -> String {
    if caps.is_empty() {
        return "none".to_string();
    }
    let names: Vec<String> = caps
        .iter_names()
        .map(|(name, _)| name.to_lowercase().replace('_', "-"))
        .collect();
    names.join(", ")
}

/// Print serial, versions and state of an open device
pub fn cmd_info(handle: &mut DeviceHandle) -> CmdResult {
    println!("Backend:          {}", handle.backend());
    println!("Capabilities:     {}", describe_capabilities(handle.capabilities()));

    match handle.serial() {
        Ok(serial) => println!("Serial:           {:016x}", serial),
        Err(e) => println!("Serial:           unavailable ({})", e),
    }
    match handle.firmware_version() {
        Ok(version) => println!("Firmware version: {}", version),
        Err(e) => println!("Firmware version: unavailable ({})", e),
    }

    let configured = handle.is_fpga_configured()?;
    println!(
        "FPGA:             {}",
        if configured { "configured" } else { "not configured" }
    );
    if configured {
        println!("FPGA version:     {}", handle.fpga_version()?);
        for module in [Module::Rx, Module::Tx] {
            match handle.frequency(module) {
                Ok(hz) => println!("{} frequency:     {} Hz", module.name().to_uppercase(), hz),
                Err(e) => log::debug!("Could not read {} frequency: {}", module, e),
            }
            match handle.sample_rate(module) {
                Ok(rate) => println!("{} sample rate:   {} sps", module.name().to_uppercase(), rate),
                Err(e) => log::debug!("Could not read {} sample rate: {}", module, e),
            }
        }
    }
    Ok(())
}

/// Load an FPGA bitstream
pub fn cmd_load(handle: &mut DeviceHandle, input: &Path) -> CmdResult {
    let image = read_file(input)?;
    handle.load_bitstream(&image)?;
    println!("FPGA loaded from {:?}", input);
    Ok(())
}

/// Reprogram the firmware flash
pub fn cmd_flash(mut handle: DeviceHandle, input: &Path, reset: bool) -> CmdResult {
    let image = read_file(input)?;
    let mut progress = IndicatifProgress::new();
    handle.flash_firmware(&image, &mut progress)?;
    println!("Firmware written and verified");

    if reset {
        handle.reset()?;
        println!("Device reset; it will re-enumerate with the new firmware");
    } else {
        println!("Power cycle or reset the device to run the new firmware");
    }
    Ok(())
}

/// Read `count` consecutive registers
pub fn cmd_peek(
    handle: &mut DeviceHandle,
    peripheral: Peripheral,
    address: u8,
    count: u16,
) -> CmdResult {
    let end = (address as u16 + count).min(256);
    for reg in address as u16..end {
        let reg = reg as u8;
        let value = handle.peripheral_read(peripheral, reg)?;
        println!("{} 0x{:02x}: 0x{:02x}", peripheral.name(), reg, value);
    }
    Ok(())
}

/// Write one register
pub fn cmd_poke(handle: &mut DeviceHandle, peripheral: Peripheral, address: u8, value: u8) -> CmdResult {
    handle.peripheral_write(peripheral, address, value)?;
    log::info!("{} 0x{:02x} <- 0x{:02x}", peripheral.name(), address, value);
    Ok(())
}

/// Read or write the GPIO register
pub fn cmd_gpio(handle: &mut DeviceHandle, value: Option<u32>) -> CmdResult {
    if let Some(value) = value {
        handle.gpio_write(value)?;
    }
    println!("GPIO: 0x{:08x}", handle.gpio_read()?);
    Ok(())
}

/// Write the VCTCXO trim DAC
pub fn cmd_dac(handle: &mut DeviceHandle, value: u16) -> CmdResult {
    handle.dac_write(value)?;
    println!("VCTCXO DAC set to 0x{:04x}", value);
    Ok(())
}

/// Tune a module, or print its current frequency
pub fn cmd_tune(handle: &mut DeviceHandle, module: Module, frequency: Option<u64>) -> CmdResult {
    if let Some(hz) = frequency {
        let actual = handle.set_frequency(module, hz)?;
        println!("{} tuned to {} Hz (requested {} Hz)", module, actual, hz);
    } else {
        println!("{} frequency: {} Hz", module, handle.frequency(module)?);
    }
    Ok(())
}

/// Set a module's sample rate, or print the current one
pub fn cmd_samplerate(handle: &mut DeviceHandle, module: Module, rate: Option<u64>) -> CmdResult {
    if let Some(rate) = rate {
        let rate = u32::try_from(rate)
            .map_err(|_| format!("Sample rate {} is out of range", rate))?;
        let actual = handle.set_sample_rate(module, rate)?;
        println!("{} sample rate set to {} sps", module, actual);
    } else {
        println!("{} sample rate: {} sps", module, handle.sample_rate(module)?);
    }
    Ok(())
}

/// Reset the device or reboot it into the bootloader
pub fn cmd_reset(handle: DeviceHandle, bootloader: bool) -> CmdResult {
    if bootloader {
        handle.jump_to_bootloader()?;
        println!("Device is rebooting into the bootloader");
    } else {
        handle.reset()?;
        println!("Device reset");
    }
    Ok(())
}
