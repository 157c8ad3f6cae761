//! Value Objects for E-commerce

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_uppercase() } }
    pub fn usd(amount: Decimal) -> Self { Self::new(amount, "USD") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }

    /// Price after taking `discount` percent off, rounded to cents.
    pub fn percent_off(&self, discount: Discount) -> Money {
        let factor = Decimal::from(100 - u32::from(discount.percent())) / Decimal::ONE_HUNDRED;
        Money::new(round_cents(self.amount * factor), &self.currency)
    }

    /// Sums `items`, starting from zero in `currency`.
    pub fn sum<'a>(currency: &str, items: impl IntoIterator<Item = &'a Money>) -> Result<Money, MoneyError> {
        items.into_iter().try_fold(Money::zero(currency), |acc, m| acc.add(m))
    }
}

impl Default for Money { fn default() -> Self { Self::zero("USD") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.amount, self.currency) }
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

/// Non-negative stock or sales counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
}

/// Whole-percent discount in `1..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Discount(u8);

impl Discount {
    pub fn new(percent: u8) -> Result<Self, DiscountError> {
        match percent {
            0 => Err(DiscountError::Zero),
            1..=100 => Ok(Self(percent)),
            _ => Err(DiscountError::OverHundred),
        }
    }
    pub fn percent(&self) -> u8 { self.0 }
}

impl TryFrom<u8> for Discount {
    type Error = DiscountError;
    fn try_from(value: u8) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Discount> for u8 {
    fn from(value: Discount) -> Self { value.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum DiscountError { Zero, OverHundred }
impl std::error::Error for DiscountError {}
impl fmt::Display for DiscountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Zero => write!(f, "discount must be positive"), Self::OverHundred => write!(f, "discount above 100%") }
    }
}

/// Half-open sale window `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleWindow { start: DateTime<Utc>, end: DateTime<Utc> }

impl SaleWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if start >= end { return Err(WindowError::EmptyOrInverted); }
        Ok(Self { start, end })
    }
    pub fn start(&self) -> DateTime<Utc> { self.start }
    pub fn end(&self) -> DateTime<Utc> { self.end }
    pub fn contains(&self, at: DateTime<Utc>) -> bool { self.start <= at && at < self.end }
    /// Strictly past the end; a window ending exactly now is not expired yet.
    pub fn ended_before(&self, at: DateTime<Utc>) -> bool { self.end < at }
    pub fn overlaps(&self, other: &SaleWindow) -> bool { self.start < other.end && other.start < self.end }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum WindowError { EmptyOrInverted }
impl std::error::Error for WindowError {}
impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "sale window must end after it starts") }
}
