//! CLI argument parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u16
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let value = parse_hex_u32(s)?;
    u16::try_from(value).map_err(|_| format!("Value {} does not fit in 16 bits", value))
}

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value {} does not fit in 8 bits", value))
}

/// Parse a frequency in Hz, accepting k/M/G suffixes (e.g. "915M", "2.4G")
fn parse_frequency(s: &str) -> Result<u64, String> {
    let (number, scale) = match s.char_indices().last() {
        Some((i, 'k' | 'K')) => (&s[..i], 1e3),
        Some((i, 'M')) => (&s[..i], 1e6),
        Some((i, 'G' | 'g')) => (&s[..i], 1e9),
        _ => (s, 1.0),
    };
    if scale == 1.0 {
        if let Ok(hz) = parse_hex_u32(number) {
            return Ok(hz as u64);
        }
    }
    let value: f64 = number
        .parse()
        .map_err(|e| format!("Invalid frequency '{}': {}", s, e))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("Invalid frequency '{}'", s));
    }
    Ok((value * scale).round() as u64)
}

/// Generate dynamic help text for the device argument
fn device_help() -> String {
    format!(
        "Device specifier, e.g. usb:serial=f12c or linux:instance=0 [backends: {}]",
        bladectl_device::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "bladectl")]
#[command(author, version, about = "bladeRF control utility", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device selection shared by all commands
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    #[arg(short, long, default_value = "", help = device_help())]
    pub device: String,
}

/// RF module argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleArg {
    Rx,
    Tx,
}

impl From<ModuleArg> for bladectl_core::Module {
    fn from(arg: ModuleArg) -> Self {
        match arg {
            ModuleArg::Rx => Self::Rx,
            ModuleArg::Tx => Self::Tx,
        }
    }
}

/// Peripheral argument for raw register access
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralArg {
    Gpio,
    Lms,
    Si5338,
}

impl From<PeripheralArg> for bladectl_core::protocol::Peripheral {
    fn from(arg: PeripheralArg) -> Self {
        match arg {
            PeripheralArg::Gpio => Self::Gpio,
            PeripheralArg::Lms => Self::Lms,
            PeripheralArg::Si5338 => Self::Si5338,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List attached devices
    Probe {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Show device information
    Info {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// List backends compiled into this build
    Backends,

    /// Load an FPGA bitstream
    Load {
        #[command(flatten)]
        device: DeviceArgs,

        /// Bitstream file (.rbf)
        input: PathBuf,
    },

    /// Reprogram the firmware flash
    Flash {
        #[command(flatten)]
        device: DeviceArgs,

        /// Firmware image
        input: PathBuf,

        /// Reset the device after flashing
        #[arg(long)]
        reset: bool,
    },

    /// Read a peripheral register
    Peek {
        #[command(flatten)]
        device: DeviceArgs,

        /// Peripheral to read from
        #[arg(value_enum)]
        peripheral: PeripheralArg,

        /// Register address (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        address: u8,

        /// Number of consecutive registers to read
        #[arg(short, long, default_value = "1")]
        count: u16,
    },

    /// Write a peripheral register
    Poke {
        #[command(flatten)]
        device: DeviceArgs,

        /// Peripheral to write to
        #[arg(value_enum)]
        peripheral: PeripheralArg,

        /// Register address (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        address: u8,

        /// Value (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        value: u8,
    },

    /// Read or write the GPIO register
    Gpio {
        #[command(flatten)]
        device: DeviceArgs,

        /// Value to write (hex or decimal); reads when omitted
        #[arg(value_parser = parse_hex_u32)]
        value: Option<u32>,
    },

    /// Write the VCTCXO trim DAC
    Dac {
        #[command(flatten)]
        device: DeviceArgs,

        /// DAC value (hex or decimal)
        #[arg(value_parser = parse_hex_u16)]
        value: u16,
    },

    /// Tune or query a module's LO frequency
    Tune {
        #[command(flatten)]
        device: DeviceArgs,

        #[arg(value_enum)]
        module: ModuleArg,

        /// Frequency in Hz (k/M/G suffixes accepted); queries when omitted
        #[arg(value_parser = parse_frequency)]
        frequency: Option<u64>,
    },

    /// Set or query a module's sample rate
    Samplerate {
        #[command(flatten)]
        device: DeviceArgs,

        #[arg(value_enum)]
        module: ModuleArg,

        /// Sample rate in samples per second; queries when omitted
        #[arg(value_parser = parse_frequency)]
        rate: Option<u64>,
    },

    /// Capture SC16Q12 samples to a file
    Rx {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output file
        output: PathBuf,

        /// Number of samples to capture
        #[arg(short = 'n', long)]
        samples: usize,
    },

    /// Transmit SC16Q12 samples from a file
    Tx {
        #[command(flatten)]
        device: DeviceArgs,

        /// Input file
        input: PathBuf,
    },

    /// Reset the device
    Reset {
        #[command(flatten)]
        device: DeviceArgs,

        /// Reboot into the USB bootloader instead
        #[arg(long)]
        bootloader: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frequency() {
        assert_eq!(parse_frequency("915000000"), Ok(915_000_000));
        assert_eq!(parse_frequency("915M"), Ok(915_000_000));
        assert_eq!(parse_frequency("2.4G"), Ok(2_400_000_000));
        assert_eq!(parse_frequency("500k"), Ok(500_000));
        assert_eq!(parse_frequency("0x10"), Ok(16));
        assert!(parse_frequency("fast").is_err());
        assert!(parse_frequency("-1M").is_err());
    }

    #[test]
    fn test_parse_hex_widths() {
        assert_eq!(parse_hex_u8("0x7f"), Ok(0x7f));
        assert!(parse_hex_u8("256").is_err());
        assert_eq!(parse_hex_u16("0xffff"), Ok(0xffff));
        assert!(parse_hex_u16("0x10000").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["bladectl", "-vv", "tune", "-d", "usb", "rx", "915M"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Tune {
                device,
                module,
                frequency,
            } => {
                assert_eq!(device.device, "usb");
                assert_eq!(module, ModuleArg::Rx);
                assert_eq!(frequency, Some(915_000_000));
            }
            _ => panic!("wrong command"),
        }
    }
}
