//! Device identities and specifier parsing
//!
//! A [`DeviceIdentity`] names one device, or a family of devices when some of
//! its fields are left as wildcards (`None`). Identities come from specifier
//! strings such as `usb:device=1:5:instance=0` or `linux serial=c0ffee`, and
//! from backend probing, where every field is concrete.
//!
//! # Specifier syntax
//!
//! ```text
//! backend[:device=bus:addr][:instance=n][:serial=hex]
//! ```
//!
//! Tokens are separated by `:` or whitespace. Keywords and keys are case
//! insensitive. An empty specifier is the all-wildcard identity.

use core::fmt;

use crate::error::{ParseFailure, Result};

/// Which transport a device is (or should be) reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Any backend, tried in precedence order
    Any,
    /// The in-kernel driver exposing `/dev/bladerfN`
    KernelDriver,
    /// Generic USB bulk/control access
    UsbGeneric,
    /// Simulated in-memory device, only used when requested explicitly
    Dummy,
}

impl BackendKind {
    /// Parse a backend keyword (case insensitive).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        const KEYWORDS: &[(&str, BackendKind)] = &[
            ("any", BackendKind::Any),
            ("*", BackendKind::Any),
            ("usb", BackendKind::UsbGeneric),
            ("libusb", BackendKind::UsbGeneric),
            ("linux", BackendKind::KernelDriver),
            ("kernel", BackendKind::KernelDriver),
            ("dummy", BackendKind::Dummy),
        ];

        KEYWORDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(keyword))
            .map(|(_, kind)| *kind)
    }

    /// Canonical keyword used when rendering a specifier
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::KernelDriver => "linux",
            Self::UsbGeneric => "usb",
            Self::Dummy => "dummy",
        }
    }

    /// `Any` on either side matches everything.
    pub fn matches(self, other: Self) -> bool {
        self == Self::Any || other == Self::Any || self == other
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A possibly partial description of one device
///
/// `None` in any field is a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// Backend the device is reached through
    pub backend: BackendKind,
    /// 64-bit device serial number
    pub serial: Option<u64>,
    /// USB bus number
    pub usb_bus: Option<u8>,
    /// USB device address on the bus
    pub usb_addr: Option<u8>,
    /// Ordinal among the devices enumerated by one backend
    pub instance: Option<u32>,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::any()
    }
}

impl DeviceIdentity {
    /// The all-wildcard identity, matching every device
    pub const fn any() -> Self {
        Self {
            backend: BackendKind::Any,
            serial: None,
            usb_bus: None,
            usb_addr: None,
            instance: None,
        }
    }

    /// Wildcard identity restricted to one backend
    pub const fn with_backend(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::any()
        }
    }

    /// Parse a device specifier string.
    ///
    /// Either the whole specifier is accepted or an error is returned; no
    /// partially filled identity ever escapes.
    pub fn parse(specifier: &str) -> Result<Self> {
        let mut id = Self::any();
        let mut tokens = specifier
            .split(|c: char| c == ':' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .peekable();

        let backend = match tokens.next() {
            Some(token) => token,
            None => return Ok(id),
        };
        id.backend = BackendKind::from_keyword(backend).ok_or(ParseFailure::UnknownBackend)?;

        while let Some(token) = tokens.next() {
            let (key, value) = match token.split_once('=') {
                Some(pair) => pair,
                None if is_known_key(token) => return Err(ParseFailure::MissingValue.into()),
                None => return Err(ParseFailure::UnknownKey.into()),
            };

            if key.eq_ignore_ascii_case("device") {
                // The address is the token after the separator following the bus
                let addr = match tokens.peek() {
                    Some(next) if !next.contains('=') => tokens.next(),
                    _ => None,
                };
                let addr = match addr {
                    Some(addr) if !value.is_empty() => addr,
                    _ => return Err(ParseFailure::MalformedAddress.into()),
                };
                id.usb_bus = Some(parse_u8(value)?);
                id.usb_addr = Some(parse_u8(addr)?);
            } else if key.eq_ignore_ascii_case("instance") {
                if value.is_empty() {
                    return Err(ParseFailure::MissingValue.into());
                }
                let instance = parse_number(value)?;
                id.instance =
                    Some(u32::try_from(instance).map_err(|_| ParseFailure::InvalidNumber)?);
            } else if key.eq_ignore_ascii_case("serial") {
                if value.is_empty() {
                    return Err(ParseFailure::MissingValue.into());
                }
                id.serial = Some(parse_serial(value).ok_or(ParseFailure::InvalidNumber)?);
            } else {
                return Err(ParseFailure::UnknownKey.into());
            }
        }

        Ok(id)
    }

    /// Wildcard-aware comparison.
    ///
    /// Each field is compared on its own; a wildcard on either side matches
    /// anything. The relation is symmetric but not transitive.
    pub fn matches(&self, other: &Self) -> bool {
        self.backend.matches(other.backend)
            && field_matches(self.serial, other.serial)
            && field_matches(self.usb_bus, other.usb_bus)
            && field_matches(self.usb_addr, other.usb_addr)
            && field_matches(self.instance, other.instance)
    }

    /// True when every field is a wildcard
    pub fn is_any(&self) -> bool {
        *self == Self::any()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.backend)?;
        if let (Some(bus), Some(addr)) = (self.usb_bus, self.usb_addr) {
            write!(f, ":device={}:{}", bus, addr)?;
        }
        if let Some(instance) = self.instance {
            write!(f, ":instance={}", instance)?;
        }
        if let Some(serial) = self.serial {
            write!(f, ":serial={:016x}", serial)?;
        }
        Ok(())
    }
}

impl core::str::FromStr for DeviceIdentity {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn field_matches<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn is_known_key(key: &str) -> bool {
    ["device", "instance", "serial"]
        .iter()
        .any(|k| k.eq_ignore_ascii_case(key))
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(s: &str) -> Result<u64> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| ParseFailure::InvalidNumber.into())
}

fn parse_u8(s: &str) -> Result<u8> {
    let value = parse_number(s)?;
    u8::try_from(value).map_err(|_| ParseFailure::InvalidNumber.into())
}

/// Parse a hexadecimal serial number, with or without a `0x` prefix.
///
/// Strings longer than 16 digits (such as 32-digit USB serial descriptors)
/// keep their trailing 16 digits.
pub fn parse_serial(s: &str) -> Option<u64> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let tail = &digits[digits.len().saturating_sub(16)..];
    u64::from_str_radix(tail, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::vec::Vec;

    fn sample_identities() -> Vec<DeviceIdentity> {
        let backends = [
            BackendKind::Any,
            BackendKind::UsbGeneric,
            BackendKind::KernelDriver,
        ];
        let mut ids = Vec::new();
        for backend in backends {
            for serial in [None, Some(0x1234), Some(0xdead_beef)] {
                for device in [None, Some((1, 5)), Some((2, 5))] {
                    for instance in [None, Some(0), Some(1)] {
                        ids.push(DeviceIdentity {
                            backend,
                            serial,
                            usb_bus: device.map(|(b, _)| b),
                            usb_addr: device.map(|(_, a)| a),
                            instance,
                        });
                    }
                }
            }
        }
        ids
    }

    #[test]
    fn test_matches_is_symmetric() {
        let ids = sample_identities();
        for a in &ids {
            for b in &ids {
                assert_eq!(a.matches(b), b.matches(a), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_any_matches_everything() {
        let any = DeviceIdentity::any();
        for id in sample_identities() {
            assert!(id.matches(&any));
            assert!(any.matches(&id));
        }
    }

    #[test]
    fn test_concrete_fields_must_agree() {
        let a = DeviceIdentity::parse("usb:device=1:5").unwrap();
        let b = DeviceIdentity::parse("usb:device=1:6").unwrap();
        let c = DeviceIdentity::parse("linux:device=1:5").unwrap();
        assert!(!a.matches(&b));
        assert!(!a.matches(&c));
        assert!(a.matches(&DeviceIdentity::parse("any:device=1:5").unwrap()));
    }

    #[test]
    fn test_parse_full_specifier() {
        let id = DeviceIdentity::parse("usb:device=1:5:instance=0").unwrap();
        assert_eq!(
            id,
            DeviceIdentity {
                backend: BackendKind::UsbGeneric,
                serial: None,
                usb_bus: Some(1),
                usb_addr: Some(5),
                instance: Some(0),
            }
        );
    }

    #[test]
    fn test_parse_whitespace_and_case() {
        let id = DeviceIdentity::parse("LibUSB device=0x2:7 Serial=0xC0FFEE").unwrap();
        assert_eq!(id.backend, BackendKind::UsbGeneric);
        assert_eq!(id.usb_bus, Some(2));
        assert_eq!(id.usb_addr, Some(7));
        assert_eq!(id.serial, Some(0xc0ffee));
    }

    #[test]
    fn test_parse_empty_is_wildcard() {
        assert!(DeviceIdentity::parse("").unwrap().is_any());
        assert!(DeviceIdentity::parse("   ").unwrap().is_any());
        assert!(DeviceIdentity::parse("*").unwrap().is_any());
    }

    #[test]
    fn test_parse_errors() {
        let cases = [
            ("usb:device=1", ParseFailure::MalformedAddress),
            ("usb:device=1:", ParseFailure::MalformedAddress),
            ("usb:device=:5", ParseFailure::MalformedAddress),
            ("usb:device=1:instance=0", ParseFailure::MalformedAddress),
            ("usb:device=1:300", ParseFailure::InvalidNumber),
            ("usb:instance=x", ParseFailure::InvalidNumber),
            ("usb:instance=", ParseFailure::MissingValue),
            ("usb:serial", ParseFailure::MissingValue),
            ("usb:colour=red", ParseFailure::UnknownKey),
            ("usb:bogus", ParseFailure::UnknownKey),
            ("pcie:instance=0", ParseFailure::UnknownBackend),
            ("device=1:5", ParseFailure::UnknownBackend),
        ];
        for (spec, failure) in cases {
            assert_eq!(
                DeviceIdentity::parse(spec),
                Err(Error::Parse(failure)),
                "{}",
                spec
            );
        }
    }

    #[test]
    fn test_display_round_trips() {
        let id = DeviceIdentity::parse("kernel:device=3:9:instance=2:serial=ab").unwrap();
        let rendered = std::format!("{}", id);
        assert_eq!(
            rendered,
            "linux:device=3:9:instance=2:serial=00000000000000ab"
        );
        assert_eq!(DeviceIdentity::parse(&rendered).unwrap(), id);
        assert_eq!(std::format!("{}", DeviceIdentity::any()), "any");
    }

    #[test]
    fn test_parse_serial_keeps_trailing_digits() {
        assert_eq!(
            parse_serial("00000000000000000123456789abcdef"),
            Some(0x0123_4567_89ab_cdef)
        );
        assert_eq!(parse_serial("0x10"), Some(0x10));
        assert_eq!(parse_serial(""), None);
        assert_eq!(parse_serial("xyz"), None);
    }
}
