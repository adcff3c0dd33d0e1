//! Bit-rate values and pacing arithmetic.
//!
//! Rates are whole bits per second. Strings follow the usual
//! `<number><prefix><unit>` notation: `b` is bits, `B` is bytes, `k`/`K`,
//! `M` and `G` are decimal prefixes, and the suffix is `ps` or `/s`
//! (`"500kb/s"`, `"100kbps"`, `"1.5Gbps"`, `"64KB/s"`).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Data rate in bits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRate(u64);

/// Error parsing a data rate string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateParseError {
    #[error("Missing numeric value in rate: {0:?}")]
    MissingValue(String),

    #[error("Invalid numeric value in rate: {0:?}")]
    InvalidValue(String),

    #[error("Unknown rate unit: {0:?}")]
    UnknownUnit(String),
}

impl DataRate {
    /// Zero rate.
    pub const ZERO: DataRate = DataRate(0);

    /// Rate from bits per second.
    #[must_use]
    pub const fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    /// Rate from kilobits per second.
    #[must_use]
    pub const fn from_kbps(kbps: u64) -> Self {
        Self(kbps.saturating_mul(1_000))
    }

    /// Rate from megabits per second.
    #[must_use]
    pub const fn from_mbps(mbps: u64) -> Self {
        Self(mbps.saturating_mul(1_000_000))
    }

    /// Bits per second.
    #[must_use]
    pub const fn bps(self) -> u64 {
        self.0
    }

    /// Whether the rate is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Whole bits generated over `elapsed` at this rate (floored).
    #[must_use]
    pub fn bits_in(self, elapsed: Duration) -> u64 {
        let bits = elapsed.as_nanos().saturating_mul(u128::from(self.0)) / NANOS_PER_SEC;
        u64::try_from(bits).unwrap_or(u64::MAX)
    }

    /// Time needed to emit `bits` at this rate (floored to the nanosecond).
    ///
    /// Returns `None` for a zero rate.
    #[must_use]
    pub fn transmit_time(self, bits: u64) -> Option<Duration> {
        if self.0 == 0 {
            return None;
        }
        let nanos = u128::from(bits).saturating_mul(NANOS_PER_SEC) / u128::from(self.0);
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }
}

impl FromStr for DataRate {
    type Err = RateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        let number = number.trim();

        if number.is_empty() {
            return Err(RateParseError::MissingValue(s.to_string()));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| RateParseError::InvalidValue(s.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(RateParseError::InvalidValue(s.to_string()));
        }

        let multiplier = unit_multiplier(unit.trim())
            .ok_or_else(|| RateParseError::UnknownUnit(unit.to_string()))?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(DataRate((value * multiplier).round() as u64))
    }
}

/// Bits-per-second multiplier for a unit such as `kb/s` or `MBps`.
fn unit_multiplier(unit: &str) -> Option<f64> {
    let base = unit
        .strip_suffix("ps")
        .or_else(|| unit.strip_suffix("/s"))?;

    let (prefix, symbol) = match base.len() {
        1 => ("", base),
        2 => base.split_at(1),
        _ => return None,
    };

    let scale = match prefix {
        "" => 1.0,
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        _ => return None,
    };

    match symbol {
        "b" => Some(scale),
        "B" => Some(scale * 8.0),
        _ => None,
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bit_units() {
        assert_eq!("500kb/s".parse::<DataRate>().unwrap().bps(), 500_000);
        assert_eq!("100Kbps".parse::<DataRate>().unwrap().bps(), 100_000);
        assert_eq!("1Mb/s".parse::<DataRate>().unwrap().bps(), 1_000_000);
        assert_eq!("1.5Gbps".parse::<DataRate>().unwrap().bps(), 1_500_000_000);
        assert_eq!("1000bps".parse::<DataRate>().unwrap().bps(), 1_000);
    }

    #[test]
    fn test_parse_byte_units() {
        assert_eq!("64KB/s".parse::<DataRate>().unwrap().bps(), 512_000);
        assert_eq!("1MBps".parse::<DataRate>().unwrap().bps(), 8_000_000);
        assert_eq!("10B/s".parse::<DataRate>().unwrap().bps(), 80);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "kbps".parse::<DataRate>(),
            Err(RateParseError::MissingValue(_))
        ));
        assert!(matches!(
            "1.2.3kbps".parse::<DataRate>(),
            Err(RateParseError::InvalidValue(_))
        ));
        assert!(matches!(
            "5 furlongs".parse::<DataRate>(),
            Err(RateParseError::UnknownUnit(_))
        ));
        assert!(matches!(
            "5Tbps".parse::<DataRate>(),
            Err(RateParseError::UnknownUnit(_))
        ));
        assert!(matches!(
            "100".parse::<DataRate>(),
            Err(RateParseError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_transmit_time() {
        let rate = DataRate::from_kbps(100);
        // 1472-byte packet at 100 kb/s
        assert_eq!(
            rate.transmit_time(1472 * 8),
            Some(Duration::from_nanos(117_760_000))
        );
        // 1000 bits at 500 b/s is two seconds
        assert_eq!(
            DataRate::from_bps(500).transmit_time(1000),
            Some(Duration::from_secs(2))
        );
        assert_eq!(DataRate::ZERO.transmit_time(1000), None);
    }

    #[test]
    fn test_bits_in_floors() {
        let rate = DataRate::from_bps(500);
        assert_eq!(rate.bits_in(Duration::from_secs(1)), 500);
        // 1.5 ms at 500 b/s is 0.75 bits
        assert_eq!(rate.bits_in(Duration::from_micros(1_500)), 0);
        assert_eq!(rate.bits_in(Duration::from_millis(2_003)), 1_001);
    }

    #[test]
    fn test_display() {
        assert_eq!(DataRate::from_mbps(2).to_string(), "2000000bps");
    }
}
