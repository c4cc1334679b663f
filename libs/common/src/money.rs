use std::fmt;

use serde::{Deserialize, Serialize};

/// An amount in integer minor units of a currency (e.g. KRW has no minor
/// unit, so `10000` is ten thousand won).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

impl Money {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Multiply a unit price by a quantity. Returns `None` on overflow.
    pub fn times(&self, quantity: i32) -> Option<Money> {
        let amount = self.amount.checked_mul(i64::from(quantity))?;
        Some(Money::new(amount, self.currency.clone()))
    }

    /// Currency codes compare case-insensitively (`krw` == `KRW`).
    pub fn same_as(&self, amount: i64, currency: &str) -> bool {
        self.amount == amount && self.currency.eq_ignore_ascii_case(currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
