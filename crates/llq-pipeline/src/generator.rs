//! Random trade attributes for exchanges.
//!
//! An exchange asks its [`TradeSource`] for a price and a volume before every
//! publish. [`UniformTradeSource`] draws both uniformly from
//! `[low, low * (1 + volatility)]`. Sources are owned by exactly one producer
//! thread and have no side effects on the rest of the pipeline.

use llq_core::LlqError;
use llq_core::config::ProducerConfig;
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

/// Produces `(price, volume)` pairs, one per call.
pub trait TradeSource: Send + 'static {
    fn next_quote(&mut self) -> (f64, i64);
}

/// Closures work as sources, e.g. a constant quote in benchmarks.
impl<F> TradeSource for F
where
    F: FnMut() -> (f64, i64) + Send + 'static,
{
    #[inline]
    fn next_quote(&mut self) -> (f64, i64) {
        self()
    }
}

/// Uniformly distributed prices and volumes.
#[derive(Debug, Clone)]
pub struct UniformTradeSource {
    rng: StdRng,
    price: Uniform<f64>,
    volume: Uniform<i64>,
}

impl UniformTradeSource {
    /// Build a source for `[price_low, price_low * (1 + volatility)]` and
    /// `[volume_low, volume_low * (1 + volatility)]`.
    ///
    /// With `seed` the sequence is reproducible; otherwise the RNG is seeded
    /// from OS entropy.
    pub fn new(price_low: f64, volume_low: i64, volatility: f64, seed: Option<u64>) -> Result<Self, LlqError> {
        if !(volatility.is_finite() && volatility >= 0.0) {
            return Err(LlqError::Config(format!("volatility {volatility} must be non-negative")));
        }
        let price_high = price_low * (1.0 + volatility);
        if !(price_low.is_finite() && price_low > 0.0 && price_high.is_finite()) {
            return Err(LlqError::Config(format!("price range [{price_low}, {price_high}] is invalid")));
        }
        if volume_low <= 0 {
            return Err(LlqError::Config(format!("volume_low {volume_low} must be positive")));
        }
        let volume_high = ((volume_low as f64) * (1.0 + volatility)) as i64;

        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            rng,
            price: Uniform::new_inclusive(price_low, price_high),
            volume: Uniform::new_inclusive(volume_low, volume_high.max(volume_low)),
        })
    }

    pub fn from_config(cfg: &ProducerConfig) -> Result<Self, LlqError> {
        Self::new(cfg.price_low, cfg.volume_low, cfg.volatility, cfg.seed)
    }
}

impl TradeSource for UniformTradeSource {
    #[inline]
    fn next_quote(&mut self) -> (f64, i64) {
        (self.price.sample(&mut self.rng), self.volume.sample(&mut self.rng))
    }
}
