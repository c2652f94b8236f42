// Pricing Engine
//
// Turns the nightly rate rows of a stay into the price breakdown stored on a
// booking and shown in pricing previews. Pure: no I/O, no clock.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tax applied on top of the room total (10%)
pub const TAX_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Currency used when the caller does not override it
pub const DEFAULT_CURRENCY: &str = "USD";

/// Price of one night of a stay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailyRate {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Full price breakdown of a stay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriceBreakdown {
    pub nights: i64,
    pub price_per_night: Decimal,
    pub total_price: Decimal,
    pub tax_amount: Decimal,
    pub final_total: Decimal,
    pub currency: String,
    pub price_breakdown: Vec<DailyRate>,
}

/// Errors raised when the rate rows do not describe the requested stay
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("Number of nights must be greater than 0, got {0}")]
    InvalidNights(i64),

    #[error("Rate count {actual} does not match number of nights {expected}")]
    CountMismatch { expected: i64, actual: usize },
}

/// Round half-up to cents, always carrying two decimal places
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Pricing engine for stays
#[derive(Debug, Clone)]
pub struct PricingEngine {
    currency: String,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingEngine {
    /// Create a PricingEngine quoting in the default currency
    pub fn new() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Create a PricingEngine quoting in the given currency
    pub fn with_currency(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Price a stay from its nightly rates
    ///
    /// # Arguments
    /// * `daily_rates` - One rate per night, in date order
    /// * `nights` - Number of nights in the stay
    ///
    /// # Returns
    /// The breakdown, or a `PricingError` when `nights` is not positive or
    /// does not match the number of rate rows.
    ///
    /// Sums are kept exact; rounding is applied once per output field.
    /// `final_total` is the sum of the rounded total and the rounded tax so
    /// the breakdown always adds up.
    pub fn price_stay(
        &self,
        daily_rates: &[DailyRate],
        nights: i64,
    ) -> Result<PriceBreakdown, PricingError> {
        if nights <= 0 {
            return Err(PricingError::InvalidNights(nights));
        }

        if daily_rates.len() as i64 != nights {
            return Err(PricingError::CountMismatch {
                expected: nights,
                actual: daily_rates.len(),
            });
        }

        let total: Decimal = daily_rates.iter().map(|rate| rate.price).sum();
        let total_price = round_money(total);
        let tax_amount = round_money(total * TAX_RATE);

        Ok(PriceBreakdown {
            nights,
            price_per_night: round_money(total / Decimal::from(nights)),
            total_price,
            tax_amount,
            final_total: round_money(total_price + tax_amount),
            currency: self.currency.clone(),
            price_breakdown: daily_rates.to_vec(),
        })
    }
}
