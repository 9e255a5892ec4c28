//! Synthetic trade stream.
//!
//! Produces exchange-shaped JSON messages from a seeded RNG:
//! - **Trades**: random-walk price, log-normal quantity, random side
//! - **Noise**: subscription acks and other event types the decoder skips
//! - **Malformed**: trade-tagged messages the decoder must reject

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, LogNormal, Normal, Poisson};
use serde_json::json;

/// What a generated message is expected to decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Trade,
    Noise,
    Malformed,
}

/// One generated feed message.
#[derive(Debug, Clone)]
pub struct GeneratedMessage {
    pub kind: MessageKind,
    pub text: String,

    /// Set for trades: side derived from the maker flag
    pub is_buyer_maker: Option<bool>,

    /// Set for trades: quantity * price as encoded
    pub notional: Option<f64>,
}

/// Tunables for [`TradeGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub symbol: String,
    pub start_price: f64,

    /// Relative standard deviation of each price step
    pub price_volatility: f64,

    /// Parameters of the log-normal quantity distribution
    pub quantity_mu: f64,
    pub quantity_sigma: f64,

    /// Probability that a trade is buyer-maker (a sell)
    pub sell_probability: f64,

    /// Share of messages that are skippable noise
    pub noise_rate: f64,

    /// Share of messages that are malformed trades
    pub malformed_rate: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            start_price: 60_000.0,
            price_volatility: 0.0005,
            quantity_mu: -3.0,
            quantity_sigma: 1.5,
            sell_probability: 0.5,
            noise_rate: 0.02,
            malformed_rate: 0.0,
        }
    }
}

/// Seeded generator of exchange trade messages.
pub struct TradeGenerator {
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    price: f64,
    price_step: Option<Normal<f64>>,
    quantity: Option<LogNormal<f64>>,
    trade_id: u64,
}

impl TradeGenerator {
    pub fn new(config: GeneratorConfig, rng: ChaCha8Rng) -> Self {
        // Degenerate parameters pin the price / quantity instead
        let price_step = Normal::new(0.0, config.price_volatility.abs()).ok();
        let quantity = LogNormal::new(config.quantity_mu, config.quantity_sigma.abs()).ok();

        Self {
            price: config.start_price,
            config,
            rng,
            price_step,
            quantity,
            trade_id: 0,
        }
    }

    /// Number of messages arriving in a window, for a mean rate per second.
    pub fn arrivals(&mut self, rate_per_sec: f64, window_secs: f64) -> u64 {
        let lambda = rate_per_sec * window_secs;
        if !(lambda > 0.0) {
            return 0;
        }
        match Poisson::new(lambda) {
            Ok(dist) => dist.sample(&mut self.rng) as u64,
            Err(_) => 0,
        }
    }

    /// Next message at exchange time `time_ms`.
    pub fn next_message(&mut self, time_ms: u64) -> GeneratedMessage {
        let roll: f64 = self.rng.gen();
        if roll < self.config.malformed_rate {
            return self.malformed();
        }
        if roll < self.config.malformed_rate + self.config.noise_rate {
            return self.noise(time_ms);
        }
        self.trade(time_ms)
    }

    fn trade(&mut self, time_ms: u64) -> GeneratedMessage {
        let step = match &self.price_step {
            Some(dist) => dist.sample(&mut self.rng),
            None => 0.0,
        };
        self.price = (self.price * (1.0 + step)).max(0.01);
        let quantity = match &self.quantity {
            Some(dist) => dist.sample(&mut self.rng),
            None => 1.0,
        }
        .max(1e-8);
        let is_buyer_maker = self.rng.gen_bool(self.config.sell_probability.clamp(0.0, 1.0));
        self.trade_id += 1;

        let price_text = format!("{:.2}", self.price);
        let quantity_text = format!("{:.8}", quantity);
        let notional = price_text.parse::<f64>().unwrap_or(self.price)
            * quantity_text.parse::<f64>().unwrap_or(quantity);

        let text = json!({
            "e": "trade",
            "E": time_ms,
            "s": self.config.symbol,
            "t": self.trade_id,
            "p": price_text,
            "q": quantity_text,
            "T": time_ms,
            "m": is_buyer_maker,
            "M": true,
        })
        .to_string();

        GeneratedMessage {
            kind: MessageKind::Trade,
            text,
            is_buyer_maker: Some(is_buyer_maker),
            notional: Some(notional),
        }
    }

    fn noise(&mut self, time_ms: u64) -> GeneratedMessage {
        let text = if self.rng.gen_bool(0.5) {
            json!({ "result": null, "id": self.rng.gen_range(1..100u32) }).to_string()
        } else {
            json!({
                "e": "aggTrade",
                "E": time_ms,
                "s": self.config.symbol,
                "p": format!("{:.2}", self.price),
                "q": "1.0",
            })
            .to_string()
        };
        GeneratedMessage {
            kind: MessageKind::Noise,
            text,
            is_buyer_maker: None,
            notional: None,
        }
    }

    fn malformed(&mut self) -> GeneratedMessage {
        let text = match self.rng.gen_range(0..5u32) {
            0 => r#"{"e":"trade","m":false,"q":"abc","p":"100.0"}"#.to_string(),
            1 => r#"{"e":"trade","m":true,"q":"-1.5","p":"100.0"}"#.to_string(),
            2 => r#"{"e":"trade","m":false,"q":"0.5"}"#.to_string(),
            3 => r#"{"e":"trade","q":"0.5","p":"100.0"}"#.to_string(),
            _ => "{\"e\":\"trade\",".to_string(),
        };
        GeneratedMessage {
            kind: MessageKind::Malformed,
            text,
            is_buyer_maker: None,
            notional: None,
        }
    }
}
