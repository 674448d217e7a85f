//! In-crate test double for [`Transport`]

use std::collections::HashMap;
use std::vec::Vec;

use crate::error::{Error, Result};
use crate::identity::BackendKind;
use crate::otp::OTP_LEN;
use crate::protocol::Peripheral;
use crate::transport::{Capabilities, Module, Transport};

/// Register file with call recording and fault injection
pub(crate) struct MockTransport {
    pub registers: HashMap<(Peripheral, u8), u8>,
    pub writes: Vec<(Peripheral, u8, u8)>,
    /// Register transactions attempted, including failed ones
    pub transactions: usize,
    /// Fail every register transaction after this many have succeeded
    pub fail_after: Option<usize>,
    /// Lock-detect model: VCO cap value to the LMS VTUNE register value
    pub vtune: Option<fn(u8) -> u8>,
    /// Report configured on this poll (1-based); never when `None`
    pub configured_after: Option<u32>,
    pub polls: u32,
    /// Names of the FPGA/flash operations called, in order
    pub calls: Vec<&'static str>,
    /// Operation name that returns `Error::Io`
    pub fail_on: Option<&'static str>,
    pub otp: [u8; OTP_LEN],
    /// Module enable calls, in order
    pub modules: Vec<(Module, bool)>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            registers: HashMap::new(),
            writes: Vec::new(),
            transactions: 0,
            fail_after: None,
            vtune: None,
            configured_after: None,
            polls: 0,
            calls: Vec::new(),
            fail_on: None,
            otp: [0xff; OTP_LEN],
            modules: Vec::new(),
        }
    }

    pub fn reg(&self, peripheral: Peripheral, address: u8) -> u8 {
        self.registers
            .get(&(peripheral, address))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_reg(&mut self, peripheral: Peripheral, address: u8, value: u8) {
        self.registers.insert((peripheral, address), value);
    }

    fn transaction(&mut self) -> Result<()> {
        self.transactions += 1;
        match self.fail_after {
            Some(limit) if self.transactions > limit => Err(Error::Io),
            _ => Ok(()),
        }
    }

    fn call(&mut self, name: &'static str) -> Result<()> {
        self.calls.push(name);
        if self.fail_on == Some(name) {
            Err(Error::Io)
        } else {
            Ok(())
        }
    }
}

impl Transport for MockTransport {
    fn backend(&self) -> BackendKind {
        BackendKind::Dummy
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FPGA_LOAD | Capabilities::OTP
    }

    fn peripheral_read(&mut self, peripheral: Peripheral, address: u8) -> Result<u8> {
        self.transaction()?;
        if let (Peripheral::Lms, 0x1a | 0x2a, Some(vtune)) = (peripheral, address, self.vtune) {
            let cap = self.reg(Peripheral::Lms, address - 1) & 0x3f;
            return Ok(vtune(cap));
        }
        Ok(self.reg(peripheral, address))
    }

    fn peripheral_write(&mut self, peripheral: Peripheral, address: u8, value: u8) -> Result<()> {
        self.transaction()?;
        self.writes.push((peripheral, address, value));
        self.set_reg(peripheral, address, value);
        Ok(())
    }

    fn begin_program(&mut self) -> Result<()> {
        self.call("begin_program")
    }

    fn write_image(&mut self, _image: &[u8]) -> Result<()> {
        self.call("write_image")
    }

    fn end_program(&mut self) -> Result<()> {
        self.call("end_program")
    }

    fn is_configured(&mut self) -> Result<bool> {
        self.call("is_configured")?;
        self.polls += 1;
        Ok(self.configured_after.is_some_and(|n| self.polls >= n))
    }

    fn fpga_loaded(&mut self) -> Result<()> {
        self.call("fpga_loaded")
    }

    fn enable_module(&mut self, module: Module, enable: bool) -> Result<()> {
        self.call("enable_module")?;
        self.modules.push((module, enable));
        Ok(())
    }

    fn read_otp(&mut self, buf: &mut [u8; OTP_LEN]) -> Result<()> {
        self.call("read_otp")?;
        buf.copy_from_slice(&self.otp);
        Ok(())
    }
}
