//! Control codes and argument layouts of the bladeRF kernel driver
//!
//! Every control code is declared by the driver as `_IOR('N', nr, unsigned
//! int)` regardless of the structure actually passed, so the request numbers
//! are built with a fixed 4-byte size and the wrappers use nix's `*_bad`
//! variants to carry the real argument type.

use std::time::Duration;

use libc::{c_uchar, c_uint};

/// Directory holding the driver's device nodes
pub const DEV_DIR: &str = "/dev";
/// Device node name prefix, followed by the instance number
pub const DEV_PREFIX: &str = "bladerf";

/// Largest write the driver accepts for an FPGA image chunk
pub const IMAGE_CHUNK: usize = 1024;

/// Interval between FPGA status polls
pub const FPGA_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Number of FPGA status polls (about one second in total)
pub const FPGA_POLL_ATTEMPTS: u32 = 100;

/// ioctl magic shared by every control code
pub const IOCTL_BASE: u8 = b'N';

/// Control code numbers
pub mod nr {
    pub const QUERY_VERSION: u8 = 0;
    pub const QUERY_FPGA_STATUS: u8 = 1;
    pub const BEGIN_PROG: u8 = 2;
    pub const END_PROG: u8 = 3;
    pub const RF_RX: u8 = 5;
    pub const RF_TX: u8 = 6;
    pub const LMS_WRITE: u8 = 20;
    pub const LMS_READ: u8 = 21;
    pub const SI5338_WRITE: u8 = 22;
    pub const SI5338_READ: u8 = 23;
    pub const VCTCXO_WRITE: u8 = 24;
    pub const GPIO_WRITE: u8 = 25;
    pub const GPIO_READ: u8 = 26;
    pub const GET_BUS: u8 = 28;
    pub const GET_ADDR: u8 = 29;
    pub const OTP_READ: u8 = 43;
    pub const UPGRADE_FW: u8 = 50;
    pub const DEVICE_RESET: u8 = 53;
}

/// `struct bladeRF_version`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VersionArg {
    pub major: u16,
    pub minor: u16,
}

/// `struct uart_cmd`: one register address and its data byte
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UartCmd {
    pub addr: u8,
    pub data: u8,
}

/// `struct bladeRF_firmware`
#[repr(C)]
#[derive(Debug)]
pub struct FirmwareArg {
    pub len: c_uint,
    pub ptr: *mut c_uchar,
}

/// `struct bladeRF_sector`
#[repr(C)]
#[derive(Debug)]
pub struct SectorArg {
    pub idx: c_uint,
    pub len: c_uint,
    pub ptr: *mut c_uchar,
}

/// ioctl wrappers
pub mod ioctl {
    use super::{nr, FirmwareArg, SectorArg, UartCmd, VersionArg, IOCTL_BASE};
    use libc::{c_int, c_uint};
    use nix::{ioctl_none_bad, ioctl_read_bad, ioctl_write_ptr_bad, request_code_read};

    const ARG: usize = core::mem::size_of::<c_uint>();

    ioctl_read_bad!(query_version, request_code_read!(IOCTL_BASE, nr::QUERY_VERSION, ARG), VersionArg);
    ioctl_read_bad!(
        query_fpga_status,
        request_code_read!(IOCTL_BASE, nr::QUERY_FPGA_STATUS, ARG),
        c_int
    );
    ioctl_read_bad!(begin_prog, request_code_read!(IOCTL_BASE, nr::BEGIN_PROG, ARG), c_int);
    ioctl_read_bad!(end_prog, request_code_read!(IOCTL_BASE, nr::END_PROG, ARG), c_int);
    ioctl_write_ptr_bad!(rf_rx, request_code_read!(IOCTL_BASE, nr::RF_RX, ARG), c_uint);
    ioctl_write_ptr_bad!(rf_tx, request_code_read!(IOCTL_BASE, nr::RF_TX, ARG), c_uint);

    ioctl_write_ptr_bad!(lms_write, request_code_read!(IOCTL_BASE, nr::LMS_WRITE, ARG), UartCmd);
    ioctl_read_bad!(lms_read, request_code_read!(IOCTL_BASE, nr::LMS_READ, ARG), UartCmd);
    ioctl_write_ptr_bad!(
        si5338_write,
        request_code_read!(IOCTL_BASE, nr::SI5338_WRITE, ARG),
        UartCmd
    );
    ioctl_read_bad!(si5338_read, request_code_read!(IOCTL_BASE, nr::SI5338_READ, ARG), UartCmd);
    ioctl_write_ptr_bad!(
        vctcxo_write,
        request_code_read!(IOCTL_BASE, nr::VCTCXO_WRITE, ARG),
        UartCmd
    );
    ioctl_write_ptr_bad!(gpio_write, request_code_read!(IOCTL_BASE, nr::GPIO_WRITE, ARG), UartCmd);
    ioctl_read_bad!(gpio_read, request_code_read!(IOCTL_BASE, nr::GPIO_READ, ARG), UartCmd);

    ioctl_read_bad!(get_bus, request_code_read!(IOCTL_BASE, nr::GET_BUS, ARG), c_int);
    ioctl_read_bad!(get_addr, request_code_read!(IOCTL_BASE, nr::GET_ADDR, ARG), c_int);

    ioctl_read_bad!(otp_read, request_code_read!(IOCTL_BASE, nr::OTP_READ, ARG), SectorArg);
    ioctl_write_ptr_bad!(
        upgrade_fw,
        request_code_read!(IOCTL_BASE, nr::UPGRADE_FW, ARG),
        FirmwareArg
    );
    ioctl_none_bad!(device_reset, request_code_read!(IOCTL_BASE, nr::DEVICE_RESET, ARG));
}

/// Instance number of a `bladerfN` node name
pub fn instance_from_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(DEV_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::request_code_read;

    #[test]
    fn test_request_codes_match_driver_header() {
        // _IOR('N', 21, unsigned int)
        assert_eq!(request_code_read!(IOCTL_BASE, nr::LMS_READ, 4) as u64, 0x8004_4e15);
        // _IOR('N', 50, unsigned int)
        assert_eq!(request_code_read!(IOCTL_BASE, nr::UPGRADE_FW, 4) as u64, 0x8004_4e32);
    }

    #[test]
    fn test_instance_from_name() {
        assert_eq!(instance_from_name("bladerf0"), Some(0));
        assert_eq!(instance_from_name("bladerf12"), Some(12));
        assert_eq!(instance_from_name("bladerf"), None);
        assert_eq!(instance_from_name("bladerfx"), None);
        assert_eq!(instance_from_name("ttyUSB0"), None);
    }

    #[test]
    fn test_arg_layouts() {
        assert_eq!(core::mem::size_of::<VersionArg>(), 4);
        assert_eq!(core::mem::size_of::<UartCmd>(), 2);
    }
}
