//! bladectl - control utility for bladeRF-class USB SDRs
//!
//! Loads FPGA bitstreams, reprograms firmware, tunes the RF front end and
//! moves samples over whichever backend finds the device: generic USB or
//! the Linux kernel driver.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, DeviceArgs};
use bladectl_device::{BackendSelector, DeviceHandle};

fn open(args: &DeviceArgs) -> Result<DeviceHandle, Box<dyn std::error::Error>> {
    let handle = BackendSelector::new().open(&args.device)?;
    log::info!("Using {} backend", handle.backend());
    Ok(handle)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Probe { device } => commands::list_devices(&device.device),
        Commands::Backends => {
            commands::list_backends();
            Ok(())
        }
        Commands::Info { device } => commands::device::cmd_info(&mut open(&device)?),
        Commands::Load { device, input } => commands::device::cmd_load(&mut open(&device)?, &input),
        Commands::Flash {
            device,
            input,
            reset,
        } => commands::device::cmd_flash(open(&device)?, &input, reset),
        Commands::Peek {
            device,
            peripheral,
            address,
            count,
        } => commands::device::cmd_peek(&mut open(&device)?, peripheral.into(), address, count),
        Commands::Poke {
            device,
            peripheral,
            address,
            value,
        } => commands::device::cmd_poke(&mut open(&device)?, peripheral.into(), address, value),
        Commands::Gpio { device, value } => commands::device::cmd_gpio(&mut open(&device)?, value),
        Commands::Dac { device, value } => commands::device::cmd_dac(&mut open(&device)?, value),
        Commands::Tune {
            device,
            module,
            frequency,
        } => commands::device::cmd_tune(&mut open(&device)?, module.into(), frequency),
        Commands::Samplerate {
            device,
            module,
            rate,
        } => commands::device::cmd_samplerate(&mut open(&device)?, module.into(), rate),
        Commands::Rx {
            device,
            output,
            samples,
        } => commands::samples::cmd_rx(&mut open(&device)?, &output, samples),
        Commands::Tx { device, input } => commands::samples::cmd_tx(&mut open(&device)?, &input),
        Commands::Reset { device, bootloader } => {
            commands::device::cmd_reset(open(&device)?, bootloader)
        }
    }
}
