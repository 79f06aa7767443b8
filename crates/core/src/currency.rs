use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::expense::ConversionStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("no exchange rate available for `{from}` -> `{to}`")]
    RateUnavailable { from: String, to: String },
    #[error("exchange rate provider failure: {0}")]
    Provider(String),
    #[error("currency conversion timed out after {0:?}")]
    TimedOut(Duration),
}

#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    async fn convert(&self, amount: Decimal, from: &str, to: &str)
        -> Result<Decimal, ConversionError>;
}

/// Converter used when no exchange-rate provider is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityConverter;

#[async_trait]
impl CurrencyConverter for IdentityConverter {
    async fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
    ) -> Result<Decimal, ConversionError> {
        if same_currency(from, to) {
            return Ok(amount);
        }
        Err(ConversionError::RateUnavailable { from: normalize_code(from), to: normalize_code(to) })
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticRateConverter {
    rates: HashMap<(String, String), Decimal>,
}

impl StaticRateConverter {
    pub fn with_rate(mut self, from: &str, to: &str, rate: Decimal) -> Self {
        self.rates.insert((normalize_code(from), normalize_code(to)), rate);
        self
    }
}

#[async_trait]
impl CurrencyConverter for StaticRateConverter {
    async fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
    ) -> Result<Decimal, ConversionError> {
        if same_currency(from, to) {
            return Ok(amount);
        }
        let key = (normalize_code(from), normalize_code(to));
        match self.rates.get(&key) {
            Some(rate) => apply_rate(amount, *rate),
            None => Err(ConversionError::RateUnavailable { from: key.0, to: key.1 }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedAmount {
    pub amount: Decimal,
    pub status: ConversionStatus,
    pub failure: Option<String>,
}

/// Converts `amount`, falling back to the original value when the provider fails or
/// exceeds `timeout`.
pub async fn convert_or_degrade(
    converter: &dyn CurrencyConverter,
    amount: Decimal,
    from: &str,
    to: &str,
    timeout: Duration,
) -> ConvertedAmount {
    if same_currency(from, to) {
        return ConvertedAmount { amount, status: ConversionStatus::Converted, failure: None };
    }

    let result = match tokio::time::timeout(timeout, converter.convert(amount, from, to)).await {
        Ok(result) => result,
        Err(_) => Err(ConversionError::TimedOut(timeout)),
    };

    match result {
        Ok(converted) => {
            ConvertedAmount { amount: converted, status: ConversionStatus::Converted, failure: None }
        }
        Err(error) => ConvertedAmount {
            amount,
            status: ConversionStatus::Unconverted,
            failure: Some(error.to_string()),
        },
    }
}

/// Multiplies by `rate` and rounds to cents; overflow is a provider failure.
pub fn apply_rate(amount: Decimal, rate: Decimal) -> Result<Decimal, ConversionError> {
    amount
        .checked_mul(rate)
        .map(|converted| converted.round_dp(2))
        .ok_or_else(|| ConversionError::Provider("amount overflow".to_string()))
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn is_valid_code(raw: &str) -> bool {
    let code = raw.trim();
    code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic())
}

fn same_currency(from: &str, to: &str) -> bool {
    normalize_code(from) == normalize_code(to)
}
