//! Utilities for working with raw byte units.

use core::fmt;

/// `1 KiB`
pub const KIB: usize = 1 << 10;
/// `1 MiB`
pub const MIB: usize = 1 << 20;
/// `1 GiB`
pub const GIB: usize = 1 << 30;

/// Wrapper around raw bytes that pretty-prints
/// them using the [`Display`](core::fmt::Display)
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteUnit(pub usize);

/// Shorthand for [`ByteUnit`].
pub fn bytes(count: usize) -> ByteUnit {
    ByteUnit(count)
}

impl fmt::Display for ByteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, name) = match self.0 {
            count if count >= GIB => (GIB, "GiB"),
            count if count >= MIB => (MIB, "MiB"),
            count if count >= KIB => (KIB, "KiB"),
            count => return write!(f, "{} B", count),
        };

        // two decimal places, without going through floats
        let whole = self.0 / unit;
        let frac = (self.0 % unit) * 100 / unit;
        write!(f, "{}.{:02} {}", whole, frac, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_picks_the_largest_unit() {
        assert_eq!(bytes(512).to_string(), "512 B");
        assert_eq!(bytes(4 * KIB).to_string(), "4.00 KiB");
        assert_eq!(bytes(MIB + MIB / 2).to_string(), "1.50 MiB");
        assert_eq!(bytes(3 * GIB).to_string(), "3.00 GiB");
    }
}
