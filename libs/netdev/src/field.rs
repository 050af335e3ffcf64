//! Field assignment: configuration tuples, parsers, and soft-fail results.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::{AddressFamily, NetDevConfig};
use crate::error::KindMismatch;

/// One `Key=Value` assignment as delivered by the configuration parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub section: String,
    pub key: String,
    pub value: String,
    pub file: PathBuf,
    pub line: usize,
}

impl ConfigEntry {
    pub fn new(
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        file: impl Into<PathBuf>,
        line: usize,
    ) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            value: value.into(),
            file: file.into(),
            line,
        }
    }
}

/// Why a single assignment was ignored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("invalid {expected}")]
    Invalid { expected: &'static str },

    #[error("{found} address incompatible with already configured {fixed} address")]
    FamilyMismatch {
        fixed: AddressFamily,
        found: AddressFamily,
    },

    #[error("section not accepted by this device kind")]
    UnknownSection,

    #[error("unknown key")]
    UnknownKey,

    #[error(transparent)]
    KindMismatch(#[from] KindMismatch),
}

/// An ignored assignment with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub line: usize,
    pub section: String,
    pub key: String,
    pub value: String,
    pub error: FieldError,
}

impl Diagnostic {
    pub fn new(entry: &ConfigEntry, error: FieldError) -> Self {
        Self {
            file: entry.file.clone(),
            line: entry.line,
            section: entry.section.clone(),
            key: entry.key.clone(),
            value: entry.value.clone(),
            error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: [{}] {}={}: {}, ignoring assignment",
            self.file.display(),
            self.line,
            self.section,
            self.key,
            self.value,
            self.error
        )
    }
}

/// Result of assigning one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Accepted,
    /// The field kept its previous value.
    Rejected(Diagnostic),
}

impl Assignment {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Parser that writes one field into a configuration.
pub type ParseFn = fn(&mut NetDevConfig, &str) -> Result<(), FieldError>;

/// One entry of a field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub section: &'static str,
    pub key: &'static str,
    pub parse: ParseFn,
}

impl FieldSpec {
    pub const fn new(section: &'static str, key: &'static str, parse: ParseFn) -> Self {
        Self {
            section,
            key,
            parse,
        }
    }

    pub fn matches(&self, section: &str, key: &str) -> bool {
        self.section == section && self.key == key
    }
}

// ============================================================================
// Value parsers
// ============================================================================

pub(crate) fn parse_bool(value: &str) -> Result<bool, FieldError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "y" | "true" | "t" | "on" => Ok(true),
        "0" | "no" | "n" | "false" | "f" | "off" => Ok(false),
        _ => Err(FieldError::Invalid { expected: "boolean" }),
    }
}

pub(crate) fn parse_u8(value: &str) -> Result<u8, FieldError> {
    value.trim().parse().map_err(|_| FieldError::Invalid {
        expected: "unsigned 8-bit integer",
    })
}

pub(crate) fn parse_u32(value: &str) -> Result<u32, FieldError> {
    value.trim().parse().map_err(|_| FieldError::Invalid {
        expected: "unsigned 32-bit integer",
    })
}

/// Size with an optional 1024-based `K`, `M`, or `G` suffix.
pub(crate) fn parse_size_u32(value: &str) -> Result<u32, FieldError> {
    let invalid = FieldError::Invalid { expected: "size" };
    let value = value.trim();

    let (digits, factor) = match value.char_indices().last() {
        Some((i, 'K')) => (&value[..i], 1024u64),
        Some((i, 'M')) => (&value[..i], 1024 * 1024),
        Some((i, 'G')) => (&value[..i], 1024 * 1024 * 1024),
        _ => (value, 1),
    };

    let size = digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(factor))
        .filter(|n| *n > 0)
        .ok_or(invalid.clone())?;

    u32::try_from(size).map_err(|_| invalid)
}

/// Time span such as `300`, `2.5s`, or `1h 30min`. Bare numbers are seconds.
pub(crate) fn parse_timespan(value: &str) -> Result<Duration, FieldError> {
    let invalid = || FieldError::Invalid {
        expected: "time span",
    };

    let mut rest = value.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(end);

        let tail = tail.trim_start();
        let end = tail
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(end);

        let unit_us = unit_micros(unit).ok_or_else(invalid)?;
        let micros = scale(number, unit_us).ok_or_else(invalid)?;
        total = total.checked_add(micros).ok_or_else(invalid)?;

        rest = next.trim_start();
    }

    let micros = u64::try_from(total).map_err(|_| invalid())?;
    Ok(Duration::from_micros(micros))
}

fn unit_micros(unit: &str) -> Option<u128> {
    let us = match unit {
        "us" | "usec" => 1,
        "ms" | "msec" => 1_000,
        "" | "s" | "sec" | "second" | "seconds" => 1_000_000,
        "m" | "min" | "minute" | "minutes" => 60_000_000,
        "h" | "hr" | "hour" | "hours" => 3_600_000_000,
        "d" | "day" | "days" => 86_400_000_000,
        _ => return None,
    };
    Some(us)
}

fn scale(number: &str, unit_us: u128) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut micros = whole.checked_mul(unit_us)?;

    if !frac.is_empty() {
        let frac = &frac[..frac.len().min(18)];
        let digits: u128 = frac.parse().ok()?;
        let part = digits.checked_mul(unit_us)? / 10u128.pow(frac.len() as u32);
        micros = micros.checked_add(part)?;
    }

    Some(micros)
}

/// Interface names are 1-15 bytes without `/`, `:`, or whitespace.
pub(crate) fn parse_ifname(value: &str) -> Result<String, FieldError> {
    let value = value.trim();
    let valid = !value.is_empty()
        && value.len() <= 15
        && value != "."
        && value != ".."
        && value.chars().all(|c| c.is_ascii_graphic() && c != '/' && c != ':');

    if valid {
        Ok(value.to_string())
    } else {
        Err(FieldError::Invalid {
            expected: "interface name",
        })
    }
}

/// Assign an address-bearing field, fixing the family on first use.
///
/// A mismatching family leaves both `family` and `slot` unchanged.
pub(crate) fn assign_address(
    family: &mut Option<AddressFamily>,
    slot: &mut Option<IpAddr>,
    value: &str,
) -> Result<(), FieldError> {
    let addr: IpAddr = value.trim().parse().map_err(|_| FieldError::Invalid {
        expected: "IP address",
    })?;

    let found = AddressFamily::of(&addr);
    if let Some(fixed) = *family {
        if fixed != found {
            return Err(FieldError::FamilyMismatch { fixed, found });
        }
    }

    *family = Some(found);
    *slot = Some(addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("yes", Some(true))]
    #[case("On", Some(true))]
    #[case("1", Some(true))]
    #[case("false", Some(false))]
    #[case("off", Some(false))]
    #[case("maybe", None)]
    fn test_parse_bool(#[case] input: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_bool(input).ok(), expected);
    }

    #[rstest]
    #[case("300", 300_000_000)]
    #[case("2.5s", 2_500_000)]
    #[case("2.5", 2_500_000)]
    #[case("500ms", 500_000)]
    #[case("5min", 300_000_000)]
    #[case("1h 30min", 5_400_000_000)]
    #[case("0", 0)]
    fn test_parse_timespan(#[case] input: &str, #[case] micros: u64) {
        assert_eq!(parse_timespan(input).unwrap(), Duration::from_micros(micros));
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("5 parsecs")]
    #[case(".")]
    #[case("340282366920938463463374607431768211.999999999999999999ms")]
    fn test_parse_timespan_invalid(#[case] input: &str) {
        assert!(parse_timespan(input).is_err());
    }

    #[rstest]
    #[case("1450", Some(1450))]
    #[case("9K", Some(9216))]
    #[case("1M", Some(1_048_576))]
    #[case("0", None)]
    #[case("8G", None)]
    #[case("big", None)]
    fn test_parse_size(#[case] input: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_size_u32(input).ok(), expected);
    }

    #[rstest]
    #[case("vxlan0", true)]
    #[case("a-very-long-name", false)]
    #[case("bad/name", false)]
    #[case("with space", false)]
    #[case("eth0:1", false)]
    #[case("..", false)]
    #[case("", false)]
    fn test_parse_ifname(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(parse_ifname(input).is_ok(), valid);
    }

    #[test]
    fn test_assign_address_fixes_family() {
        let mut family = None;
        let mut group = None;

        assign_address(&mut family, &mut group, "239.0.0.1").unwrap();
        assert_eq!(family, Some(AddressFamily::Inet));

        let err = assign_address(&mut family, &mut group, "ff02::1").unwrap_err();
        assert_eq!(
            err,
            FieldError::FamilyMismatch {
                fixed: AddressFamily::Inet,
                found: AddressFamily::Inet6,
            }
        );
        assert_eq!(group, Some("239.0.0.1".parse().unwrap()));
        assert_eq!(family, Some(AddressFamily::Inet));
    }

    #[test]
    fn test_assign_address_invalid_keeps_value() {
        let mut family = None;
        let mut group = None;

        assert!(assign_address(&mut family, &mut group, "not-an-address").is_err());
        assert_eq!(family, None);
        assert_eq!(group, None);
    }

    #[test]
    fn test_diagnostic_display() {
        let entry = ConfigEntry::new("VXLAN", "TTL", "300", "/etc/netdevd/vx.netdev", 7);
        let diag = Diagnostic::new(&entry, parse_u8("300").unwrap_err());
        assert_eq!(
            diag.to_string(),
            "/etc/netdevd/vx.netdev:7: [VXLAN] TTL=300: invalid unsigned 8-bit integer, ignoring assignment"
        );
    }
}
