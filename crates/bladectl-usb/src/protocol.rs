//! USB protocol constants for the FX3 firmware
//!
//! Vendor requests are issued on interface 0. Which alternate setting is
//! active decides what the bulk endpoints carry: the FPGA configuration
//! stream, peripheral frames and samples, or SPI flash pages.

#![allow(dead_code)]

use core::time::Duration;

/// Nuand vendor ID
pub const NUAND_USB_VENDOR: u16 = 0x1d50;
/// bladeRF product ID (FX3 running device firmware)
pub const BLADERF_USB_PRODUCT: u16 = 0x6066;
/// bladeRF product ID while in the flash bootloader
pub const BLADERF_BOOT_USB_PRODUCT: u16 = 0x6080;
/// Cypress vendor ID (FX3 ROM bootloader)
pub const CYPRESS_USB_VENDOR: u16 = 0x04b4;
/// FX3 ROM bootloader product ID
pub const FX3_BOOT_USB_PRODUCT: u16 = 0x00f3;

/// The only interface the firmware exposes
pub const INTERFACE: u8 = 0;

/// Alternate setting with nothing enabled
pub const ALT_NULL: u8 = 0;
/// Peripheral frames on EP 2, samples on EP 1
pub const ALT_RF_LINK: u8 = 1;
/// Flash page transfers over vendor requests
pub const ALT_SPI_FLASH: u8 = 2;
/// FPGA configuration stream on EP 2
pub const ALT_CONFIG: u8 = 3;

/// Sample stream OUT (host to device)
pub const EP_SAMPLES_OUT: u8 = 0x01;
/// Sample stream IN (device to host)
pub const EP_SAMPLES_IN: u8 = 0x81;
/// Peripheral frames and FPGA image OUT
pub const EP_PERIPHERAL_OUT: u8 = 0x02;
/// Peripheral frames IN
pub const EP_PERIPHERAL_IN: u8 = 0x82;

/// Timeout for control requests and peripheral frames
pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);
/// Timeout for the bitstream bulk transfer
pub const IMAGE_TIMEOUT: Duration = Duration::from_millis(5000);
/// Timeout for each sample bulk transfer
pub const SAMPLE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Largest sample transfer submitted at once
pub const SAMPLE_CHUNK: usize = 64 * 1024;

/// Interval between FPGA status polls
pub const FPGA_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Number of FPGA status polls after END_PROG
pub const FPGA_POLL_ATTEMPTS: u32 = 10;

/// Vendor requests understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VendorRequest {
    /// Firmware version (4 bytes: major, minor as LE u16)
    QueryVersion = 0,
    /// FPGA configured flag
    QueryFpgaStatus = 1,
    /// Start FPGA configuration
    BeginProg = 2,
    /// Finish FPGA configuration
    EndProg = 3,
    /// Enable/disable the RX sample path
    RfRx = 4,
    /// Enable/disable the TX sample path
    RfTx = 5,
    /// Read one flash page (wIndex = page)
    FlashRead = 100,
    /// Write one flash page (wIndex = page)
    FlashWrite = 101,
    /// Erase one flash sector (wIndex = sector)
    FlashErase = 102,
    /// Read the OTP page
    ReadOtp = 103,
    /// Write the OTP page
    WriteOtp = 104,
    /// Reset the FX3
    Reset = 105,
    /// Reboot into the flash bootloader
    JumpToBootloader = 106,
}

impl VendorRequest {
    /// Raw request byte
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Requests that only work with the SPI flash alternate setting active
    pub const fn needs_flash_alt(self) -> bool {
        matches!(
            self,
            Self::FlashRead | Self::FlashWrite | Self::FlashErase | Self::ReadOtp | Self::WriteOtp
        )
    }
}

/// Decode the 4-byte little-endian status word most requests return
pub fn decode_int_response(data: &[u8]) -> Option<i32> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(i32::from_le_bytes(bytes))
}

/// Decode the QUERY_VERSION payload
pub fn decode_version(data: &[u8]) -> Option<(u16, u16)> {
    let bytes = data.get(..4)?;
    Some((
        u16::from_le_bytes([bytes[0], bytes[1]]),
        u16::from_le_bytes([bytes[2], bytes[3]]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_codes() {
        assert_eq!(VendorRequest::QueryFpgaStatus.code(), 1);
        assert_eq!(VendorRequest::RfTx.code(), 5);
        assert_eq!(VendorRequest::FlashErase.code(), 102);
        assert_eq!(VendorRequest::JumpToBootloader.code(), 106);
        assert!(VendorRequest::ReadOtp.needs_flash_alt());
        assert!(!VendorRequest::BeginProg.needs_flash_alt());
    }

    #[test]
    fn test_int_response() {
        assert_eq!(decode_int_response(&[1, 0, 0, 0]), Some(1));
        assert_eq!(decode_int_response(&[0xff, 0xff, 0xff, 0xff]), Some(-1));
        assert_eq!(decode_int_response(&[1, 0]), None);
    }

    #[test]
    fn test_version_payload() {
        assert_eq!(decode_version(&[1, 0, 6, 0]), Some((1, 6)));
        assert_eq!(decode_version(&[1, 0, 6]), None);
    }
}
