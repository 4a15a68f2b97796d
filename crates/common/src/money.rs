//! Money amounts in integer cents.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Multiplies by a quantity, saturating at the bounds of `i64`.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Applies a percentage discount, rounding half up to the nearest cent.
    ///
    /// `percent` is clamped to `0..=100`.
    pub fn discounted(&self, percent: u8) -> Money {
        let keep = 100 - i128::from(percent.min(100));
        let cents = (i128::from(self.cents) * keep + 50).div_euclid(100);
        // |cents| never grows past the undiscounted amount
        Money {
            cents: i64::try_from(cents).unwrap_or(self.cents),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!(a.multiply(3).cents(), 3000);
    }

    #[test]
    fn test_discount_bounds() {
        let price = Money::from_cents(10_000);
        assert_eq!(price.discounted(0), price);
        assert_eq!(price.discounted(20).cents(), 8_000);
        assert_eq!(price.discounted(100), Money::zero());
        assert_eq!(price.discounted(250), Money::zero());
    }

    #[test]
    fn test_discount_rounds_half_up() {
        // 999 * 0.85 = 849.15
        assert_eq!(Money::from_cents(999).discounted(15).cents(), 849);
        // 5 * 0.5 = 2.5
        assert_eq!(Money::from_cents(5).discounted(50).cents(), 3);
    }

    #[test]
    fn test_large_amounts_do_not_overflow() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max.discounted(0), max);
        assert_eq!(max.discounted(50).cents(), i64::MAX / 2 + 1);
        assert_eq!(max.multiply(3), max);
        assert_eq!(Money::from_cents(9_999_999_999).multiply(u32::MAX), max);
        assert_eq!((max + Money::from_cents(1)), max);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 5].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 355);
    }

    #[test]
    fn test_serializes_as_cents() {
        assert_eq!(serde_json::to_string(&Money::from_cents(42)).unwrap(), "42");
    }
}
