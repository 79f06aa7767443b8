use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reimburse_core::config::CurrencyConfig;
use reimburse_core::currency::{apply_rate, normalize_code, ConversionError, CurrencyConverter};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Exchange-rate client for providers that answer `GET {base_url}/{from}` with a rate table.
#[derive(Clone)]
pub struct HttpRateConverter {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct RateTable {
    rates: HashMap<String, Decimal>,
}

impl HttpRateConverter {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key })
    }

    /// `None` when conversion is switched off or no provider is configured.
    pub fn from_config(config: &CurrencyConfig) -> Result<Option<Self>, reqwest::Error> {
        match (config.enabled, config.base_url.as_deref()) {
            (true, Some(base_url)) => {
                Self::new(base_url, config.api_key.clone(), config.timeout()).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn fetch_rates(&self, from: &str) -> Result<RateTable, ConversionError> {
        let mut request = self.client.get(format!("{}/{from}", self.base_url));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| ConversionError::Provider(error.to_string()))?;
        if !response.status().is_success() {
            return Err(ConversionError::Provider(format!(
                "rate provider answered {}",
                response.status()
            )));
        }

        response.json::<RateTable>().await.map_err(|error| ConversionError::Provider(error.to_string()))
    }
}

#[async_trait]
impl CurrencyConverter for HttpRateConverter {
    async fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
    ) -> Result<Decimal, ConversionError> {
        let from = normalize_code(from);
        let to = normalize_code(to);
        if from == to {
            return Ok(amount);
        }

        let table = self.fetch_rates(&from).await?;
        match table.rates.get(&to) {
            Some(rate) => apply_rate(amount, *rate),
            None => Err(ConversionError::RateUnavailable { from, to }),
        }
    }
}
