//! OTP and calibration-page field records
//!
//! Records are packed back to back: a length byte, `length` bytes of
//! field name immediately followed by the value, then a little-endian
//! CRC-16 over the length byte and the data. A length byte of 0xFF (erased
//! flash) ends the list.

use crate::error::{Error, Result};
use crate::identity::parse_serial;

/// Size of the OTP page
pub const OTP_LEN: usize = 256;

/// Field holding the device serial
pub const SERIAL_FIELD: &str = "S";

const END_MARKER: u8 = 0xff;

/// CRC-16 with polynomial 0x1021 and zero initial value (XMODEM)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Find the value of the first record whose data starts with `name`.
///
/// A record with a bad checksum stops the search with [`Error::Protocol`];
/// reaching the end marker returns [`Error::NotFound`].
pub fn extract_field<'a>(buf: &'a [u8], name: &str) -> Result<&'a [u8]> {
    let name = name.as_bytes();
    let mut pos = 0;

    while pos < buf.len() {
        let len = buf[pos] as usize;
        if buf[pos] == END_MARKER {
            break;
        }

        let record_end = pos + 1 + len;
        let crc_bytes = buf.get(record_end..record_end + 2).ok_or(Error::Protocol)?;
        let stored = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
        if crc16(&buf[pos..record_end]) != stored {
            log::debug!("OTP record at offset {} has a bad checksum", pos);
            return Err(Error::Protocol);
        }

        let data = &buf[pos + 1..record_end];
        if let Some(value) = data.strip_prefix(name) {
            return Ok(value);
        }
        pos = record_end + 2;
    }

    Err(Error::NotFound)
}

/// Append one record at `*idx`, advancing `*idx` past it.
pub fn encode_field(buf: &mut [u8], idx: &mut usize, name: &str, value: &[u8]) -> Result<()> {
    let data_len = name.len() + value.len();
    let record_len = data_len + 3;
    if data_len >= END_MARKER as usize || *idx + record_len > buf.len() {
        return Err(Error::BufferTooSmall);
    }

    let start = *idx;
    buf[start] = data_len as u8;
    buf[start + 1..start + 1 + name.len()].copy_from_slice(name.as_bytes());
    buf[start + 1 + name.len()..start + 1 + data_len].copy_from_slice(value);
    let crc = crc16(&buf[start..start + 1 + data_len]);
    buf[start + 1 + data_len..start + record_len].copy_from_slice(&crc.to_le_bytes());

    *idx += record_len;
    Ok(())
}

/// Append a record after the last one already in `buf`.
pub fn add_field(buf: &mut [u8], name: &str, value: &[u8]) -> Result<()> {
    let mut idx = 0;
    while idx < buf.len() && buf[idx] != END_MARKER {
        idx += buf[idx] as usize + 3;
    }
    if idx > buf.len() {
        return Err(Error::Protocol);
    }
    encode_field(buf, &mut idx, name, value)
}

/// Decode the serial number stored in an OTP page.
pub fn read_serial(page: &[u8]) -> Result<u64> {
    let value = extract_field(page, SERIAL_FIELD)?;
    let text = core::str::from_utf8(value).map_err(|_| Error::Protocol)?;
    parse_serial(text).ok_or(Error::Protocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_xmodem() {
        assert_eq!(crc16(b"123456789"), 0x31c3);
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_fields_are_found_in_order() {
        let mut page = [0xffu8; OTP_LEN];
        add_field(&mut page, "B", b"40").unwrap();
        add_field(&mut page, "S", b"0123456789abcdef0123456789abcdef").unwrap();

        assert_eq!(page[0], 3);
        assert_eq!(extract_field(&page, "B").unwrap(), b"40");
        assert_eq!(read_serial(&page).unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(extract_field(&page, "DAC"), Err(Error::NotFound));
    }

    #[test]
    fn test_corrupt_record_is_rejected() {
        let mut page = [0xffu8; OTP_LEN];
        let mut idx = 0;
        encode_field(&mut page, &mut idx, "S", b"00ff").unwrap();
        assert_eq!(idx, 1 + 5 + 2);
        page[3] ^= 0x01;
        assert_eq!(extract_field(&page, "S"), Err(Error::Protocol));
    }

    #[test]
    fn test_record_must_fit() {
        let mut buf = [0xffu8; 8];
        let mut idx = 0;
        assert_eq!(
            encode_field(&mut buf, &mut idx, "S", b"123456"),
            Err(Error::BufferTooSmall)
        );
        assert_eq!(idx, 0);
        encode_field(&mut buf, &mut idx, "S", b"1234").unwrap();
        assert_eq!(idx, 8);
    }

    #[test]
    fn test_blank_page_has_no_serial() {
        let page = [0xffu8; OTP_LEN];
        assert_eq!(read_serial(&page), Err(Error::NotFound));
    }
}
