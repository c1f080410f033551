//! Per-IP rate limiting.
//!
//! Tiers:
//! - Strict: /pagamento, /pagamento/verificar, /saque, /assinatura (gateway calls)
//! - Standard: questions, answers, balance and transaction history
//! - Relaxed: /health
//!
//! Webhooks are not limited; they are authenticated by signature instead.
//!
//! The limiter state lives in this process only. Running several instances
//! multiplies the effective limit by the instance count.

use std::sync::Arc;
use std::time::Duration;

use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

use crate::config::RateLimitConfig;
use crate::error::{AppError, Result};

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

type Sweep = Box<dyn Fn() + Send + Sync>;

/// Creates a layer allowing `requests_per_minute` per IP, with bursts up to
/// the same number. Also returns a closure that drops idle keys.
fn create_layer(requests_per_minute: u32) -> Result<(RateLimitLayer, Sweep)> {
    let rpm = requests_per_minute.max(1);
    let period = Duration::from_millis((60_000 / rpm as u64).max(1));

    let config = GovernorConfigBuilder::default()
        .period(period)
        .burst_size(rpm)
        .finish()
        .ok_or_else(|| AppError::Internal("Invalid rate limiter config".into()))?;

    let limiter = config.limiter().clone();
    let sweep: Sweep = Box::new(move || limiter.retain_recent());

    Ok((GovernorLayer::new(Arc::new(config)), sweep))
}

/// The three tiers plus the sweepers that keep their key maps bounded.
pub struct RateLimiters {
    pub strict: RateLimitLayer,
    pub standard: RateLimitLayer,
    pub relaxed: RateLimitLayer,
    sweeps: Vec<Sweep>,
}

impl RateLimiters {
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        let (strict, strict_sweep) = create_layer(config.strict_rpm)?;
        let (standard, standard_sweep) = create_layer(config.standard_rpm)?;
        let (relaxed, relaxed_sweep) = create_layer(config.relaxed_rpm)?;
        Ok(Self {
            strict,
            standard,
            relaxed,
            sweeps: vec![strict_sweep, standard_sweep, relaxed_sweep],
        })
    }

    /// Periodically forget IPs whose limits have fully replenished.
    /// Consumes the sweepers; call once after building the router.
    pub fn spawn_sweeper(&mut self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let sweeps = std::mem::take(&mut self.sweeps);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for sweep in &sweeps {
                    sweep();
                }
                tracing::debug!("Rate limiter keys swept");
            }
        })
    }
}
