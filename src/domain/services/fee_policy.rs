//! Platform fee charged when escrow is released to a freelancer.

use crate::domain::Cents;

/// Result of splitting an escrow amount between freelancer and platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub gross: Cents,
    pub fee: Cents,
    pub net: Cents,
}

/// Fee policy expressed in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    fee_bps: u32,
}

impl FeePolicy {
    pub fn new(fee_bps: u32) -> Self {
        Self {
            fee_bps: fee_bps.min(10_000),
        }
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    /// Split `gross` into platform fee and freelancer earning.
    ///
    /// The fee is rounded half-up to the nearest cent, and `fee + net == gross`.
    pub fn split(&self, gross: Cents) -> FeeSplit {
        let gross = gross.max(0);
        let fee = ((gross as i128 * self.fee_bps as i128 + 5_000) / 10_000) as Cents;
        FeeSplit {
            gross,
            fee,
            net: gross - fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1000, 10_000 => (1000, 9000); "ten percent")]
    #[test_case(1000, 1 => (0, 1); "sub cent rounds down")]
    #[test_case(1000, 5 => (1, 4); "half cent rounds up")]
    #[test_case(0, 12_345 => (0, 12_345); "no fee")]
    #[test_case(10_000, 999 => (999, 0); "full fee")]
    fn test_split(bps: u32, gross: Cents) -> (Cents, Cents) {
        let split = FeePolicy::new(bps).split(gross);
        assert_eq!(split.fee + split.net, split.gross);
        (split.fee, split.net)
    }

    #[test]
    fn test_bps_clamped() {
        assert_eq!(FeePolicy::new(20_000).fee_bps(), 10_000);
    }
}
