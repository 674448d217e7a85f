//! bladeRF USB transport
//!
//! This module provides [`UsbTransport`], which talks to the FX3 firmware
//! through vendor control requests and to the FPGA through bulk endpoints.

use std::time::Duration;

use bladectl_core::bitstream::PollPolicy;
use bladectl_core::error::{Error as CoreError, Result as CoreResult};
use bladectl_core::flash::{self, FlashPages, FlashProgress, PAGE_SIZE};
use bladectl_core::identity::parse_serial;
use bladectl_core::otp::OTP_LEN;
use bladectl_core::protocol::{self, FrameLink, Peripheral, FRAME_LEN};
use bladectl_core::sample::{Metadata, SampleFormat};
use bladectl_core::transport::{Capabilities, Version};
use bladectl_core::{BackendKind, DeviceIdentity, Module, Transport};
use nusb::transfer::{Buffer, Bulk, ControlIn, ControlOut, ControlType, In, Out, Recipient};
use nusb::{Endpoint, Interface, MaybeFuture};

use crate::error::{Result, UsbError};
use crate::protocol::*;

fn is_bladerf(info: &nusb::DeviceInfo) -> bool {
    info.vendor_id() == NUAND_USB_VENDOR && info.product_id() == BLADERF_USB_PRODUCT
}

fn is_bootloader(info: &nusb::DeviceInfo) -> bool {
    (info.vendor_id() == NUAND_USB_VENDOR && info.product_id() == BLADERF_BOOT_USB_PRODUCT)
        || (info.vendor_id() == CYPRESS_USB_VENDOR && info.product_id() == FX3_BOOT_USB_PRODUCT)
}

/// Describe an enumerated device the way identities are matched
fn identity_of(instance: u32, info: &nusb::DeviceInfo) -> DeviceIdentity {
    DeviceIdentity {
        backend: BackendKind::UsbGeneric,
        serial: info.serial_number().and_then(parse_serial),
        usb_bus: info.bus_id().parse().ok(),
        usb_addr: Some(info.device_address()),
        instance: Some(instance),
    }
}

/// Enumerate attached bladeRFs in bus order, paired with their identities
fn enumerate() -> Result<Vec<(DeviceIdentity, nusb::DeviceInfo)>> {
    let mut found = Vec::new();
    let mut instance = 0;

    for info in nusb::list_devices()
        .wait()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?
    {
        if is_bladerf(&info) {
            found.push((identity_of(instance, &info), info));
            instance += 1;
        } else if is_bootloader(&info) {
            log::warn!(
                "Device {:04x}:{:04x} at bus {} address {} is in bootloader mode; \
                 it can be recovered by flashing firmware",
                info.vendor_id(),
                info.product_id(),
                info.bus_id(),
                info.device_address()
            );
        }
    }

    Ok(found)
}

/// List the identities of every attached bladeRF
pub fn probe() -> Result<Vec<DeviceIdentity>> {
    let devices = enumerate()?;
    log::debug!("USB probe found {} device(s)", devices.len());
    Ok(devices.into_iter().map(|(identity, _)| identity).collect())
}

/// bladeRF attached through the generic USB stack
pub struct UsbTransport {
    /// Claimed interface 0
    interface: Interface,
    /// Currently selected alternate setting
    alt_setting: u8,
    /// Serial string descriptor, if the device reported one
    serial_string: Option<String>,
    /// Whether close() already ran
    closed: bool,
}

impl UsbTransport {
    /// Open the first attached bladeRF matching `identity`
    pub fn open(identity: &DeviceIdentity) -> Result<Self> {
        let devices = enumerate()?;
        let (found, info) = devices
            .iter()
            .find(|(candidate, _)| identity.matches(candidate))
            .ok_or(UsbError::DeviceNotFound)?;

        log::debug!("Identity {} matched {}", identity, found);
        Self::try_open_device(info)
    }

    /// Open a specific USB device
    fn try_open_device(device_info: &nusb::DeviceInfo) -> Result<Self> {
        log::info!(
            "Opening bladeRF at bus {} address {}",
            device_info.bus_id(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(INTERFACE)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        let mut transport = Self {
            interface,
            alt_setting: ALT_NULL,
            serial_string: device_info.serial_number().map(str::to_string),
            closed: false,
        };
        transport.select_alt_setting(ALT_RF_LINK)?;

        if transport.fpga_status()? {
            log::debug!("FPGA already configured, enabling RF paths");
            transport.enable_rf()?;
        }

        Ok(transport)
    }

    /// Switch interface 0 to `alt`, skipping the request when already there
    fn select_alt_setting(&mut self, alt: u8) -> Result<()> {
        if self.alt_setting == alt {
            return Ok(());
        }
        log::debug!("Selecting alternate setting {}", alt);
        self.interface
            .set_alt_setting(alt)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        self.alt_setting = alt;
        Ok(())
    }

    /// Vendor control IN request
    fn vendor_read(
        &mut self,
        request: VendorRequest,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: request.code(),
                    value,
                    index,
                    length,
                },
                CONTROL_TIMEOUT,
            )
            .wait()?;
        Ok(data)
    }

    /// Vendor control OUT request
    fn vendor_write(
        &mut self,
        request: VendorRequest,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<()> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: request.code(),
                    value,
                    index,
                    data,
                },
                CONTROL_TIMEOUT,
            )
            .wait()?;
        Ok(())
    }

    /// Vendor request answered with a 4-byte status word
    fn vendor_int(&mut self, request: VendorRequest, value: u16, index: u16) -> Result<i32> {
        let data = self.vendor_read(request, value, index, 4)?;
        decode_int_response(&data).ok_or_else(|| {
            UsbError::InvalidResponse(format!(
                "{:?} returned {} bytes, expected 4",
                request,
                data.len()
            ))
        })
    }

    /// Vendor request whose status word must not be negative
    fn vendor_command(&mut self, request: VendorRequest, value: u16, index: u16) -> Result<i32> {
        let status = self.vendor_int(request, value, index)?;
        if status < 0 {
            return Err(UsbError::Rejected {
                request: request.code(),
                status,
            });
        }
        Ok(status)
    }

    fn fpga_status(&mut self) -> Result<bool> {
        Ok(self.vendor_command(VendorRequest::QueryFpgaStatus, 0, 0)? == 1)
    }

    /// Switch to the RF link and turn both sample paths on
    fn enable_rf(&mut self) -> Result<()> {
        self.select_alt_setting(ALT_RF_LINK)?;
        self.set_module(Module::Rx, true)?;
        self.set_module(Module::Tx, true)
    }

    fn set_module(&mut self, module: Module, enable: bool) -> Result<()> {
        self.select_alt_setting(ALT_RF_LINK)?;
        let request = match module {
            Module::Rx => VendorRequest::RfRx,
            Module::Tx => VendorRequest::RfTx,
        };
        log::debug!("{} {}", if enable { "Enabling" } else { "Disabling" }, module);
        self.vendor_command(request, enable as u16, 0)?;
        Ok(())
    }

    /// Blocking bulk OUT of the whole buffer
    fn bulk_write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<()> {
        let mut out_ep: Endpoint<Bulk, Out> = self.interface.endpoint(endpoint)?;

        let mut out_buf = Buffer::new(data.len());
        out_buf.extend_from_slice(data);

        out_ep.transfer_blocking(out_buf, timeout).into_result()?;
        Ok(())
    }

    /// Blocking bulk IN; returns the number of bytes copied into `buf`
    fn bulk_read(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut in_ep: Endpoint<Bulk, In> = self.interface.endpoint(endpoint)?;

        let max_packet_size = in_ep.max_packet_size();
        let request_len = buf.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let data = in_ep.transfer_blocking(in_buf, timeout).into_result()?;

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn check_rejected_metadata(has_metadata: bool) -> CoreResult<()> {
        if has_metadata {
            log::debug!("Sample metadata is not supported over USB");
            return Err(CoreError::Unsupported);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::debug!("Releasing bladeRF interface");
        self.select_alt_setting(ALT_NULL)
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl FrameLink for UsbTransport {
    fn send_frame(&mut self, frame: &[u8; FRAME_LEN]) -> CoreResult<()> {
        self.select_alt_setting(ALT_RF_LINK)?;
        self.bulk_write(EP_PERIPHERAL_OUT, frame, CONTROL_TIMEOUT)?;
        Ok(())
    }

    fn receive_frame(&mut self, frame: &mut [u8; FRAME_LEN]) -> CoreResult<usize> {
        Ok(self.bulk_read(EP_PERIPHERAL_IN, frame, CONTROL_TIMEOUT)?)
    }
}

impl FlashPages for UsbTransport {
    fn erase_sector(&mut self, sector: u8) -> CoreResult<()> {
        self.select_alt_setting(ALT_SPI_FLASH)?;
        let status = self.vendor_int(VendorRequest::FlashErase, 0, sector as u16)?;
        if status != 0 {
            log::error!("Erasing sector {} failed with status {}", sector, status);
            return Err(CoreError::Io);
        }
        Ok(())
    }

    fn write_page(&mut self, page: u16, data: &[u8; PAGE_SIZE]) -> CoreResult<()> {
        self.select_alt_setting(ALT_SPI_FLASH)?;
        self.vendor_write(VendorRequest::FlashWrite, 0, page, data)?;
        Ok(())
    }

    fn read_page(&mut self, page: u16, data: &mut [u8; PAGE_SIZE]) -> CoreResult<()> {
        self.select_alt_setting(ALT_SPI_FLASH)?;
        let bytes = self.vendor_read(VendorRequest::FlashRead, 0, page, PAGE_SIZE as u16)?;
        if bytes.len() != PAGE_SIZE {
            return Err(UsbError::InvalidResponse(format!(
                "page {} read returned {} bytes",
                page,
                bytes.len()
            ))
            .into());
        }
        data.copy_from_slice(&bytes);
        Ok(())
    }
}

impl Transport for UsbTransport {
    fn backend(&self) -> BackendKind {
        BackendKind::UsbGeneric
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FPGA_LOAD
            | Capabilities::FLASH
            | Capabilities::OTP
            | Capabilities::SAMPLES
            | Capabilities::RESET
            | Capabilities::BOOTLOADER
    }

    fn peripheral_read(&mut self, peripheral: Peripheral, address: u8) -> CoreResult<u8> {
        protocol::read_register(self, peripheral, address)
    }

    fn peripheral_write(&mut self, peripheral: Peripheral, address: u8, value: u8) -> CoreResult<()> {
        protocol::write_register(self, peripheral, address, value)
    }

    fn begin_program(&mut self) -> CoreResult<()> {
        self.select_alt_setting(ALT_CONFIG)?;
        self.vendor_command(VendorRequest::BeginProg, 0, 0)?;
        Ok(())
    }

    fn write_image(&mut self, image: &[u8]) -> CoreResult<()> {
        self.select_alt_setting(ALT_CONFIG)?;
        log::info!("Sending {} byte FPGA image", image.len());
        self.bulk_write(EP_PERIPHERAL_OUT, image, IMAGE_TIMEOUT)?;
        Ok(())
    }

    fn end_program(&mut self) -> CoreResult<()> {
        self.vendor_command(VendorRequest::EndProg, 0, 0)?;
        Ok(())
    }

    fn is_configured(&mut self) -> CoreResult<bool> {
        Ok(self.fpga_status()?)
    }

    fn fpga_poll_policy(&self) -> PollPolicy {
        PollPolicy {
            attempts: FPGA_POLL_ATTEMPTS,
            interval: FPGA_POLL_INTERVAL,
        }
    }

    fn fpga_loaded(&mut self) -> CoreResult<()> {
        Ok(self.enable_rf()?)
    }

    fn flash_firmware(&mut self, image: &[u8], progress: &mut dyn FlashProgress) -> CoreResult<()> {
        flash::check_firmware_len(image.len())?;
        let result = flash::program_image(self, image, progress);
        self.select_alt_setting(ALT_RF_LINK)?;
        result
    }

    fn read_otp(&mut self, buf: &mut [u8; OTP_LEN]) -> CoreResult<()> {
        self.select_alt_setting(ALT_SPI_FLASH)?;
        let data = self.vendor_read(VendorRequest::ReadOtp, 0, 0, OTP_LEN as u16)?;
        self.select_alt_setting(ALT_RF_LINK)?;
        if data.len() != OTP_LEN {
            return Err(CoreError::Protocol);
        }
        buf.copy_from_slice(&data);
        Ok(())
    }

    fn read_serial(&mut self) -> CoreResult<u64> {
        if let Some(serial) = self.serial_string.as_deref().and_then(parse_serial) {
            return Ok(serial);
        }
        log::debug!("No usable serial descriptor, reading OTP");
        let mut page = [0u8; OTP_LEN];
        self.read_otp(&mut page)?;
        bladectl_core::otp::read_serial(&page)
    }

    fn firmware_version(&mut self) -> CoreResult<Version> {
        let data = self.vendor_read(VendorRequest::QueryVersion, 0, 0, 4)?;
        let (major, minor) = decode_version(&data).ok_or(CoreError::Protocol)?;
        Ok(Version { major, minor })
    }

    fn enable_module(&mut self, module: Module, enable: bool) -> CoreResult<()> {
        Ok(self.set_module(module, enable)?)
    }

    fn rx(
        &mut self,
        format: SampleFormat,
        buf: &mut [u8],
        count: usize,
        metadata: Option<&mut Metadata>,
    ) -> CoreResult<usize> {
        Self::check_rejected_metadata(metadata.is_some())?;
        let total = format.byte_len(count, buf.len())?;
        self.select_alt_setting(ALT_RF_LINK)?;

        let mut done = 0;
        while done < total {
            let end = (done + SAMPLE_CHUNK).min(total);
            let n = self.bulk_read(EP_SAMPLES_IN, &mut buf[done..end], SAMPLE_TIMEOUT)?;
            if n == 0 {
                log::error!("Sample read returned no data after {} bytes", done);
                return Err(CoreError::Io);
            }
            done += n;
        }
        Ok(done / format.bytes_per_sample())
    }

    fn tx(
        &mut self,
        format: SampleFormat,
        buf: &[u8],
        count: usize,
        metadata: Option<&Metadata>,
    ) -> CoreResult<usize> {
        Self::check_rejected_metadata(metadata.is_some())?;
        let total = format.byte_len(count, buf.len())?;
        self.select_alt_setting(ALT_RF_LINK)?;

        for chunk in buf[..total].chunks(SAMPLE_CHUNK) {
            self.bulk_write(EP_SAMPLES_OUT, chunk, SAMPLE_TIMEOUT)?;
        }
        Ok(count)
    }

    fn device_reset(&mut self) -> CoreResult<()> {
        log::info!("Resetting device");
        self.vendor_write(VendorRequest::Reset, 0, 0, &[])?;
        self.closed = true;
        Ok(())
    }

    fn jump_to_bootloader(&mut self) -> CoreResult<()> {
        log::info!("Rebooting device into the bootloader");
        self.vendor_write(VendorRequest::JumpToBootloader, 0, 0, &[])?;
        self.closed = true;
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        Ok(self.release()?)
    }
}
