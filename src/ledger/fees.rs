//! Platform fee arithmetic.
//!
//! Everything is integer cents and basis points so `fee + net == gross`
//! holds exactly for every input.

use serde::Serialize;

/// Fee rate in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeRate(i64);

impl FeeRate {
    /// Answer payout for respondents without an active subscription (15%).
    pub const STANDARD: FeeRate = FeeRate(1500);
    /// Answer payout for premium respondents (5%).
    pub const PREMIUM: FeeRate = FeeRate(500);
    /// Withdrawal to a bank account (9.98%).
    pub const WITHDRAWAL: FeeRate = FeeRate(998);

    pub fn bps(&self) -> i64 {
        self.0
    }

    /// Percentage as shown to users (`15.0`, `9.98`).
    pub fn percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn for_tier(is_premium: bool) -> Self {
        if is_premium {
            Self::PREMIUM
        } else {
            Self::STANDARD
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSplit {
    pub gross: i64,
    pub fee: i64,
    pub net: i64,
    pub rate: FeeRate,
}

/// Split a non-negative gross amount. The fee is rounded half up and the
/// remainder goes to net.
pub fn split(gross_cents: i64, rate: FeeRate) -> FeeSplit {
    debug_assert!(gross_cents >= 0, "gross must not be negative");
    // fee <= gross, so narrowing back is lossless
    let fee = ((i128::from(gross_cents) * i128::from(rate.bps()) + 5_000) / 10_000) as i64;
    FeeSplit {
        gross: gross_cents,
        fee,
        net: gross_cents - fee,
        rate,
    }
}

/// What a respondent receives for an accepted answer.
pub fn answer_payout(gross_cents: i64, is_premium: bool) -> FeeSplit {
    split(gross_cents, FeeRate::for_tier(is_premium))
}

/// What reaches the user's bank account for a withdrawal.
pub fn withdrawal(gross_cents: i64) -> FeeSplit {
    split(gross_cents, FeeRate::WITHDRAWAL)
}
