//! Kernel-driver transport
//!
//! This module provides the `KernelTransport` struct that implements the
//! `Transport` trait on top of the bladeRF kernel driver's `/dev/bladerfN`
//! device nodes.

use crate::error::{KernelError, Result};
use crate::protocol::{self, ioctl, FirmwareArg, SectorArg, UartCmd, VersionArg};

use bladectl_core::bitstream::PollPolicy;
use bladectl_core::error::{Error as CoreError, Result as CoreResult};
use bladectl_core::flash::{check_firmware_len, FlashProgress};
use bladectl_core::otp::OTP_LEN;
use bladectl_core::protocol::{Peripheral, READ_FILL};
use bladectl_core::sample::{Metadata, SampleFormat};
use bladectl_core::transport::{Capabilities, Version};
use bladectl_core::{BackendKind, DeviceIdentity, Module, Transport};

use libc::{c_int, c_uint};
use nix::errno::Errno;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Wrap a raw ioctl result with the control code's name
fn check(request: &'static str, result: nix::Result<c_int>) -> Result<c_int> {
    result.map_err(|source| KernelError::Ioctl { request, source })
}

/// Device nodes present under `/dev`, sorted by instance number
pub fn device_nodes() -> Result<Vec<(u32, PathBuf)>> {
    let mut nodes = Vec::new();
    for entry in std::fs::read_dir(protocol::DEV_DIR)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(instance) = name.to_str().and_then(protocol::instance_from_name) {
            nodes.push((instance, entry.path()));
        }
    }
    nodes.sort_by_key(|(instance, _)| *instance);
    Ok(nodes)
}

/// List the identities of every device the kernel driver has bound
pub fn probe() -> Result<Vec<DeviceIdentity>> {
    let mut found = Vec::new();
    for (instance, path) in device_nodes()? {
        let mut dev = match KernelTransport::open_path(&path) {
            Ok(dev) => dev,
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        match dev.describe(instance, true) {
            Ok(identity) => found.push(identity),
            Err(e) => log::warn!("Skipping instance {}: {}", instance, e),
        }
    }
    log::debug!("Kernel probe found {} device(s)", found.len());
    Ok(found)
}

/// bladeRF attached through the kernel driver
pub struct KernelTransport {
    /// Open device node
    file: File,
    /// Path of the device node
    path: PathBuf,
}

impl KernelTransport {
    /// Open the first device node matching `identity`
    pub fn open(identity: &DeviceIdentity) -> Result<Self> {
        for (instance, path) in device_nodes()? {
            if identity.instance.is_some_and(|wanted| wanted != instance) {
                continue;
            }
            let mut dev = match Self::open_path(&path) {
                Ok(dev) => dev,
                Err(e) => {
                    log::debug!("{}", e);
                    continue;
                }
            };
            let candidate = match dev.describe(instance, identity.serial.is_some()) {
                Ok(candidate) => candidate,
                Err(e) => {
                    log::warn!("Skipping instance {}: {}", instance, e);
                    continue;
                }
            };
            if identity.matches(&candidate) {
                log::debug!("Identity {} matched {}", identity, candidate);
                return Ok(dev);
            }
        }
        Err(KernelError::NoDevice)
    }

    /// Open a specific device node
    pub fn open_path(path: &Path) -> Result<Self> {
        log::debug!("Opening {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| KernelError::OpenFailed {
                path: path.display().to_string(),
                source: e,
            })?;

        log::info!("Opened bladeRF at {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the open device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build the concrete identity of this device
    fn describe(&mut self, instance: u32, with_serial: bool) -> Result<DeviceIdentity> {
        let fd = self.file.as_raw_fd();

        let mut bus: c_int = 0;
        check("GET_BUS", unsafe { ioctl::get_bus(fd, &mut bus) })?;
        let mut addr: c_int = 0;
        check("GET_ADDR", unsafe { ioctl::get_addr(fd, &mut addr) })?;

        let serial = if with_serial {
            match self.read_serial() {
                Ok(serial) => Some(serial),
                Err(e) => {
                    log::warn!("Failed to read serial of instance {}: {}", instance, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(DeviceIdentity {
            backend: BackendKind::KernelDriver,
            serial,
            usb_bus: u8::try_from(bus).ok(),
            usb_addr: u8::try_from(addr).ok(),
            instance: Some(instance),
        })
    }

    fn uart_read(&mut self, peripheral: Peripheral, address: u8) -> Result<u8> {
        let fd = self.file.as_raw_fd();
        let mut cmd = UartCmd {
            addr: address,
            data: READ_FILL,
        };

        match peripheral {
            Peripheral::Gpio => check("GPIO_READ", unsafe { ioctl::gpio_read(fd, &mut cmd) })?,
            Peripheral::Lms => {
                cmd.addr &= 0x7f;
                check("LMS_READ", unsafe { ioctl::lms_read(fd, &mut cmd) })?
            }
            Peripheral::Si5338 => {
                cmd.addr &= 0x7f;
                check("SI5338_READ", unsafe { ioctl::si5338_read(fd, &mut cmd) })?
            }
            Peripheral::Vctcxo => return Err(CoreError::Unsupported.into()),
        };

        log::trace!("{} read 0x{:02x} = 0x{:02x}", peripheral.name(), address, cmd.data);
        Ok(cmd.data)
    }

    fn uart_write(&mut self, peripheral: Peripheral, address: u8, value: u8) -> Result<()> {
        let fd = self.file.as_raw_fd();
        let cmd = UartCmd {
            addr: address,
            data: value,
        };
        log::trace!("{} write 0x{:02x} = 0x{:02x}", peripheral.name(), address, value);

        match peripheral {
            Peripheral::Gpio => check("GPIO_WRITE", unsafe { ioctl::gpio_write(fd, &cmd) })?,
            Peripheral::Lms => check("LMS_WRITE", unsafe { ioctl::lms_write(fd, &cmd) })?,
            Peripheral::Si5338 => check("SI5338_WRITE", unsafe { ioctl::si5338_write(fd, &cmd) })?,
            Peripheral::Vctcxo => check("VCTCXO_WRITE", unsafe { ioctl::vctcxo_write(fd, &cmd) })?,
        };
        Ok(())
    }

    fn fpga_status(&mut self) -> Result<bool> {
        let mut status: c_int = 0;
        check("QUERY_FPGA_STATUS", unsafe {
            ioctl::query_fpga_status(self.file.as_raw_fd(), &mut status)
        })?;
        match status {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(KernelError::UnexpectedValue {
                request: "QUERY_FPGA_STATUS",
                value: other as i64,
            }),
        }
    }

    fn check_rejected_metadata(has_metadata: bool) -> CoreResult<()> {
        if has_metadata {
            log::debug!("Sample metadata is not supported by the kernel driver");
            return Err(CoreError::Unsupported);
        }
        Ok(())
    }
}

impl Transport for KernelTransport {
    fn backend(&self) -> BackendKind {
        BackendKind::KernelDriver
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FPGA_LOAD
            | Capabilities::FLASH
            | Capabilities::OTP
            | Capabilities::SAMPLES
            | Capabilities::RESET
    }

    fn peripheral_read(&mut self, peripheral: Peripheral, address: u8) -> CoreResult<u8> {
        Ok(self.uart_read(peripheral, address)?)
    }

    fn peripheral_write(&mut self, peripheral: Peripheral, address: u8, value: u8) -> CoreResult<()> {
        Ok(self.uart_write(peripheral, address, value)?)
    }

    fn begin_program(&mut self) -> CoreResult<()> {
        let mut status: c_int = 0;
        check("BEGIN_PROG", unsafe {
            ioctl::begin_prog(self.file.as_raw_fd(), &mut status)
        })?;
        Ok(())
    }

    fn write_image(&mut self, image: &[u8]) -> CoreResult<()> {
        log::info!("Sending {} byte FPGA image to {}", image.len(), self.path.display());
        for chunk in image.chunks(protocol::IMAGE_CHUNK) {
            self.file.write_all(chunk).map_err(KernelError::Io)?;
        }
        Ok(())
    }

    fn end_program(&mut self) -> CoreResult<()> {
        let mut status: c_int = 0;
        check("END_PROG", unsafe {
            ioctl::end_prog(self.file.as_raw_fd(), &mut status)
        })?;
        Ok(())
    }

    fn is_configured(&mut self) -> CoreResult<bool> {
        Ok(self.fpga_status()?)
    }

    fn fpga_poll_policy(&self) -> PollPolicy {
        PollPolicy {
            attempts: protocol::FPGA_POLL_ATTEMPTS,
            interval: protocol::FPGA_POLL_INTERVAL,
        }
    }

    fn flash_firmware(&mut self, image: &[u8], progress: &mut dyn FlashProgress) -> CoreResult<()> {
        check_firmware_len(image.len())?;

        // The driver erases, programs and verifies in one call
        let mut buf = image.to_vec();
        let arg = FirmwareArg {
            len: buf.len() as c_uint,
            ptr: buf.as_mut_ptr(),
        };

        log::info!("Upgrading firmware with {} byte image", image.len());
        progress.writing(image.len());
        check("UPGRADE_FW", unsafe {
            ioctl::upgrade_fw(self.file.as_raw_fd(), &arg)
        })?;
        progress.write_progress(image.len());
        progress.complete();
        Ok(())
    }

    fn read_otp(&mut self, buf: &mut [u8; OTP_LEN]) -> CoreResult<()> {
        let mut arg = SectorArg {
            idx: 0,
            len: OTP_LEN as c_uint,
            ptr: buf.as_mut_ptr(),
        };
        check("OTP_READ", unsafe {
            ioctl::otp_read(self.file.as_raw_fd(), &mut arg)
        })?;
        Ok(())
    }

    fn firmware_version(&mut self) -> CoreResult<Version> {
        let mut version = VersionArg::default();
        check("QUERY_VERSION", unsafe {
            ioctl::query_version(self.file.as_raw_fd(), &mut version)
        })?;
        Ok(Version {
            major: version.major,
            minor: version.minor,
        })
    }

    fn enable_module(&mut self, module: Module, enable: bool) -> CoreResult<()> {
        let fd = self.file.as_raw_fd();
        let value = enable as c_uint;
        log::debug!("{} {}", if enable { "Enabling" } else { "Disabling" }, module);
        match module {
            Module::Rx => check("RF_RX", unsafe { ioctl::rf_rx(fd, &value) })?,
            Module::Tx => check("RF_TX", unsafe { ioctl::rf_tx(fd, &value) })?,
        };
        Ok(())
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
        self.file
            .read_exact(&mut buf[..total])
            .map_err(KernelError::Io)?;
        Ok(count)
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
        self.file.write_all(&buf[..total]).map_err(KernelError::Io)?;
        Ok(count)
    }

    fn device_reset(&mut self) -> CoreResult<()> {
        log::info!("Resetting device at {}", self.path.display());
        match unsafe { ioctl::device_reset(self.file.as_raw_fd()) } {
            // The device drops off the bus before the driver can answer
            Ok(_) | Err(Errno::ENODEV) => Ok(()),
            Err(source) => Err(KernelError::Ioctl {
                request: "DEVICE_RESET",
                source,
            }
            .into()),
        }
    }
}
