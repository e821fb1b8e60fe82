//! Payloads exchanged with scrapers over the scrape channel.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Instruction;
use crate::error::BrokerError;

/// Everything that travels on the scrape channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Outbound: an instruction for scrapers to execute.
    ScrapeRequest {
        api_version: String,
        instruction: Instruction,
    },
    /// Inbound: one product and its price as seen by a scraper.
    Observation {
        /// Scraper-assigned id used to drop redelivered messages.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        product: ProductObservation,
        price: PriceObservation,
    },
}

impl ChannelMessage {
    pub fn encode(&self) -> Result<Bytes, BrokerError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, BrokerError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductObservation {
    pub name: String,
    pub iri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub language: String,
    pub category_id: String,
    pub company_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceObservation {
    pub value: f64,
    pub observed_at: DateTime<Utc>,
    pub city_id: String,
}
