//! Peripheral access frames
//!
//! Register access to the FPGA-attached peripherals travels over the USB
//! bulk endpoints as fixed 16-byte frames. Byte 0 is the magic `'N'`, byte 1
//! selects direction and peripheral, byte 2 is the register address and
//! byte 3 the data. The remaining bytes are unused. The device answers every
//! frame with exactly one 16-byte frame; for reads the register value is in
//! byte 3 of the response.

use crate::error::{Error, Result};

/// Size of every command and response frame
pub const FRAME_LEN: usize = 16;

/// First byte of every frame
pub const MAGIC: u8 = b'N';

/// Data byte sent with reads
pub const READ_FILL: u8 = 0xff;

const DIRECTION_MASK: u8 = 0xc0;
const PERIPHERAL_MASK: u8 = 0x30;
const VALID_BIT: u8 = 0x01;

/// Peripherals reachable through the frame protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Peripheral {
    /// FPGA GPIO bank (32 bits, byte addressed)
    Gpio = 0x00,
    /// LMS6002D RF transceiver
    Lms = 0x10,
    /// VCTCXO trim DAC
    Vctcxo = 0x20,
    /// Si5338 clock generator
    Si5338 = 0x30,
}

impl Peripheral {
    /// Every peripheral, in selector order
    pub const ALL: [Peripheral; 4] = [Self::Gpio, Self::Lms, Self::Vctcxo, Self::Si5338];

    /// Short lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gpio => "gpio",
            Self::Lms => "lms",
            Self::Vctcxo => "dac",
            Self::Si5338 => "si5338",
        }
    }

    /// Look up a peripheral by its short name (case insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    fn from_bits(bits: u8) -> Self {
        match bits & PERIPHERAL_MASK {
            0x00 => Self::Gpio,
            0x10 => Self::Lms,
            0x20 => Self::Vctcxo,
            _ => Self::Si5338,
        }
    }
}

/// Transfer direction as seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    /// Register read
    Read = 0x80,
    /// Register write
    Write = 0x40,
}

/// One register transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralCommand {
    /// Target peripheral
    pub peripheral: Peripheral,
    /// Read or write
    pub direction: Direction,
    /// Register address
    pub address: u8,
    /// Value to write, or the read fill byte
    pub data: u8,
}

impl PeripheralCommand {
    /// Register read of `address`
    pub fn read(peripheral: Peripheral, address: u8) -> Self {
        Self {
            peripheral,
            direction: Direction::Read,
            address,
            data: READ_FILL,
        }
    }

    /// Register write of `data` to `address`
    pub fn write(peripheral: Peripheral, address: u8, data: u8) -> Self {
        Self {
            peripheral,
            direction: Direction::Write,
            address,
            data,
        }
    }

    /// Build the 16-byte wire frame
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        encode_command(self.peripheral, self.direction, self.address, self.data)
    }

    /// Parse a frame, checking the magic and selector bytes
    pub fn decode(frame: &[u8; FRAME_LEN]) -> Result<Self> {
        if frame[0] != MAGIC {
            return Err(Error::Protocol);
        }
        let (direction, peripheral) = decode_selector(frame[1]).ok_or(Error::Protocol)?;
        Ok(Self {
            peripheral,
            direction,
            address: frame[2],
            data: frame[3],
        })
    }
}

/// Build a command frame.
pub fn encode_command(
    peripheral: Peripheral,
    direction: Direction,
    address: u8,
    data: u8,
) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = MAGIC;
    frame[1] = direction as u8 | peripheral as u8 | VALID_BIT;
    frame[2] = address;
    frame[3] = data;
    frame
}

/// Split a selector byte back into direction and peripheral.
///
/// Returns `None` when the valid bit is clear or the direction bits do not
/// name exactly one direction.
pub fn decode_selector(selector: u8) -> Option<(Direction, Peripheral)> {
    if selector & VALID_BIT == 0 {
        return None;
    }
    let direction = match selector & DIRECTION_MASK {
        0x80 => Direction::Read,
        0x40 => Direction::Write,
        _ => return None,
    };
    Some((direction, Peripheral::from_bits(selector)))
}

/// Register value carried by a read response
pub fn response_data(frame: &[u8; FRAME_LEN]) -> u8 {
    frame[3]
}

/// A bidirectional frame pipe, normally a pair of USB bulk endpoints
pub trait FrameLink {
    /// Send one full frame
    fn send_frame(&mut self, frame: &[u8; FRAME_LEN]) -> Result<()>;

    /// Receive into `frame`, returning the number of bytes received.
    ///
    /// A short count is not an error; the caller retries.
    fn receive_frame(&mut self, frame: &mut [u8; FRAME_LEN]) -> Result<usize>;
}

/// Run one request/response exchange.
///
/// Sends the command, then reads until a full frame arrives. Errors from
/// the link are returned unchanged.
pub fn send_and_receive<L: FrameLink + ?Sized>(
    link: &mut L,
    command: &PeripheralCommand,
) -> Result<[u8; FRAME_LEN]> {
    log::trace!(
        "{:?} {} addr=0x{:02x} data=0x{:02x}",
        command.direction,
        command.peripheral.name(),
        command.address,
        command.data
    );
    link.send_frame(&command.encode())?;

    let mut response = [0u8; FRAME_LEN];
    loop {
        let received = link.receive_frame(&mut response)?;
        if received == FRAME_LEN {
            return Ok(response);
        }
        log::trace!("short response ({} bytes), reading again", received);
    }
}

/// Read one peripheral register over a frame link
pub fn read_register<L: FrameLink + ?Sized>(
    link: &mut L,
    peripheral: Peripheral,
    address: u8,
) -> Result<u8> {
    let response = send_and_receive(link, &PeripheralCommand::read(peripheral, address))?;
    Ok(response_data(&response))
}

/// Write one peripheral register over a frame link
pub fn write_register<L: FrameLink + ?Sized>(
    link: &mut L,
    peripheral: Peripheral,
    address: u8,
    value: u8,
) -> Result<()> {
    send_and_receive(link, &PeripheralCommand::write(peripheral, address, value)).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Link that records sent frames and replays scripted receive results
    struct ScriptedLink {
        sent: Vec<[u8; FRAME_LEN]>,
        replies: VecDeque<Result<Vec<u8>>>,
        send_error: Option<Error>,
    }

    impl ScriptedLink {
        fn new(replies: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                sent: Vec::new(),
                replies: replies.into(),
                send_error: None,
            }
        }
    }

    impl FrameLink for ScriptedLink {
        fn send_frame(&mut self, frame: &[u8; FRAME_LEN]) -> Result<()> {
            if let Some(e) = self.send_error {
                return Err(e);
            }
            self.sent.push(*frame);
            Ok(())
        }

        fn receive_frame(&mut self, frame: &mut [u8; FRAME_LEN]) -> Result<usize> {
            let reply = self.replies.pop_front().unwrap_or(Err(Error::Timeout))?;
            frame[..reply.len()].copy_from_slice(&reply);
            Ok(reply.len())
        }
    }

    fn full_reply(data: u8) -> Vec<u8> {
        let mut frame = std::vec![0u8; FRAME_LEN];
        frame[0] = MAGIC;
        frame[3] = data;
        frame
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode_command(Peripheral::Lms, Direction::Write, 0x21, 0xa5);
        assert_eq!(&frame[..4], &[b'N', 0x40 | 0x10 | 0x01, 0x21, 0xa5]);
        assert!(frame[4..].iter().all(|&b| b == 0));

        let read = PeripheralCommand::read(Peripheral::Si5338, 0x35).encode();
        assert_eq!(&read[..4], &[b'N', 0x80 | 0x30 | 0x01, 0x35, 0xff]);
    }

    #[test]
    fn test_selector_round_trip() {
        for peripheral in Peripheral::ALL {
            for direction in [Direction::Read, Direction::Write] {
                let frame = encode_command(peripheral, direction, 0, 0);
                assert_eq!(decode_selector(frame[1]), Some((direction, peripheral)));
            }
        }
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        let mut frame = PeripheralCommand::write(Peripheral::Gpio, 1, 2).encode();
        assert_eq!(
            PeripheralCommand::decode(&frame),
            Ok(PeripheralCommand::write(Peripheral::Gpio, 1, 2))
        );

        frame[1] &= !VALID_BIT;
        assert_eq!(PeripheralCommand::decode(&frame), Err(Error::Protocol));

        frame[0] = b'X';
        assert_eq!(PeripheralCommand::decode(&frame), Err(Error::Protocol));
        assert_eq!(decode_selector(0xc1), None);
    }

    #[test]
    fn test_dac_bytes_go_out_as_two_register_frames() {
        let mut link = ScriptedLink::new(std::vec![Ok(full_reply(0)), Ok(full_reply(0))]);
        write_register(&mut link, Peripheral::Vctcxo, 0, 0x23).unwrap();
        write_register(&mut link, Peripheral::Vctcxo, 1, 0x81).unwrap();
        assert_eq!(link.sent.len(), 2);
        assert_eq!(&link.sent[0][1..4], &[0x40 | 0x20 | 0x01, 0, 0x23]);
        assert_eq!(&link.sent[1][1..4], &[0x40 | 0x20 | 0x01, 1, 0x81]);
    }

    #[test]
    fn test_read_retries_short_frames() {
        let mut link = ScriptedLink::new(std::vec![Ok(std::vec![b'N', 0]), Ok(full_reply(0x5a))]);
        let value = read_register(&mut link, Peripheral::Lms, 0x04).unwrap();
        assert_eq!(value, 0x5a);
        assert_eq!(link.sent.len(), 1);
        assert_eq!(link.replies.len(), 0);
    }

    #[test]
    fn test_errors_propagate() {
        let mut link = ScriptedLink::new(std::vec![Err(Error::Timeout)]);
        assert_eq!(
            write_register(&mut link, Peripheral::Gpio, 0, 1),
            Err(Error::Timeout)
        );

        let mut link = ScriptedLink::new(std::vec![]);
        link.send_error = Some(Error::Io);
        assert_eq!(read_register(&mut link, Peripheral::Gpio, 0), Err(Error::Io));
        assert!(link.sent.is_empty());
    }

    #[test]
    fn test_peripheral_names() {
        for p in Peripheral::ALL {
            assert_eq!(Peripheral::from_name(p.name()), Some(p));
        }
        assert_eq!(Peripheral::from_name("LMS"), Some(Peripheral::Lms));
        assert_eq!(Peripheral::from_name("nope"), None);
    }
}
