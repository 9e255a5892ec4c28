//! Raw feed message decoding.
//!
//! Accepts Binance trade-stream payloads, either bare
//! (`{"e":"trade","p":"60000.00","q":"0.5","m":false,...}`) or wrapped by the
//! combined-stream endpoint (`{"stream":"btcusdt@trade","data":{...}}`).

use crate::config::DecoderConfig;
use crate::entity::{IdGenerator, Side, TradeEvent};
use crate::error::DecodeError;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Result of decoding a message that was well-formed enough to classify.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A trade, ready for admission
    Trade(TradeEvent),

    /// Not a trade message (acks, other event types); ignore silently
    Skip,
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(rename = "m")]
    is_buyer_maker: Option<bool>,
    #[serde(rename = "q")]
    quantity: Option<String>,
    #[serde(rename = "p")]
    price: Option<String>,
}

/// Turns raw feed text into [`TradeEvent`]s.
///
/// Only successful decodes draw an id from the generator.
#[derive(Debug)]
pub struct EventDecoder {
    trade_tag: String,
    ids: Arc<IdGenerator>,
}

impl EventDecoder {
    /// Creates a decoder drawing ids from `ids`.
    pub fn new(config: &DecoderConfig, ids: Arc<IdGenerator>) -> Self {
        Self {
            trade_tag: config.trade_tag.clone(),
            ids,
        }
    }

    /// Returns the shared id generator.
    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// Decodes one raw message.
    pub fn decode(&self, raw: &str) -> Result<Decoded, DecodeError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;
        let body = unwrap_combined_stream(value);
        if !body.is_object() {
            return Err(DecodeError::InvalidPayload(format!("expected an object, got {}", body)));
        }

        // Classify on the raw tag; other event types may reuse m/q/p with other shapes
        match body.get("e").and_then(Value::as_str) {
            Some(tag) if tag == self.trade_tag => {}
            _ => return Ok(Decoded::Skip),
        }

        let trade: RawTrade =
            serde_json::from_value(body).map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;

        let is_buyer_maker = trade.is_buyer_maker.ok_or(DecodeError::MissingField("m"))?;
        let quantity_raw = trade.quantity.ok_or(DecodeError::MissingField("q"))?;
        let price_raw = trade.price.ok_or(DecodeError::MissingField("p"))?;

        let quantity = parse_positive("q", &quantity_raw)?;
        let price = parse_positive("p", &price_raw)?;

        let notional = quantity * price;
        if !notional.is_finite() || notional <= 0.0 {
            return Err(DecodeError::MalformedNumber {
                field: "notional",
                value: format!("{} * {}", quantity_raw, price_raw),
            });
        }

        let side = Side::from_buyer_maker(is_buyer_maker);
        Ok(Decoded::Trade(TradeEvent::new(
            self.ids.next_id(),
            side,
            price,
            quantity,
        )))
    }
}

/// Strips the `{"stream": ..., "data": {...}}` envelope if present.
fn unwrap_combined_stream(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("stream") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn parse_positive(field: &'static str, raw: &str) -> Result<f64, DecodeError> {
    let malformed = || DecodeError::MalformedNumber {
        field,
        value: raw.to_string(),
    };
    let parsed: f64 = raw.trim().parse().map_err(|_| malformed())?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(malformed());
    }
    Ok(parsed)
}
