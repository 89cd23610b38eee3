//! Trace sampling.
//!
//! # Responsibilities
//! - Decide once per trace, at the root span, whether it is recorded
//! - Build the sampler from `[tracing.sampler]` configuration
//!
//! # Design Decisions
//! - Probability set → probability sampler, otherwise rate limiting
//! - Probability sampling is counting-based: exactly `floor(n * p)` of `n`
//!   decisions are accepted, spread evenly, no randomness
//! - Reconfiguration replaces the sampler wholesale through `ArcSwap`; a
//!   sampler's state is never adjusted in place
//! - Rate windows are measured on the injected `Clock`

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::clock::Clock;
use crate::config::SamplerConfig;

const PARTS_PER_MILLION: u64 = 1_000_000;

/// A sampler that can be swapped while tracers hold it.
pub type SharedSampler = Arc<ArcSwap<Sampler>>;

/// Wrap a sampler for sharing and later replacement.
pub fn shared(sampler: Sampler) -> SharedSampler {
    Arc::new(ArcSwap::from_pointee(sampler))
}

/// Sampling strategy.
#[derive(Debug)]
pub enum Sampler {
    Always,
    Never,
    Probability(ProbabilitySampler),
    RateLimited(RateLimitingSampler),
}

impl Sampler {
    /// Build a sampler from configuration. Rate windows follow `clock`.
    pub fn from_config(config: &SamplerConfig, clock: Arc<dyn Clock>) -> Self {
        match config.probability {
            Some(p) if p >= 1.0 => Sampler::Always,
            Some(p) if p <= 0.0 => Sampler::Never,
            Some(p) => Sampler::Probability(ProbabilitySampler::new(p)),
            None if config.rate == 0 => Sampler::Never,
            None => Sampler::RateLimited(RateLimitingSampler::new(config.rate, clock)),
        }
    }

    /// Decide whether the trace rooted here is recorded.
    pub fn is_sampled(&self, _trace_id: u128) -> bool {
        match self {
            Sampler::Always => true,
            Sampler::Never => false,
            Sampler::Probability(s) => s.is_sampled(),
            Sampler::RateLimited(s) => s.is_sampled(),
        }
    }
}

/// Accepts a fixed fraction of traces.
#[derive(Debug)]
pub struct ProbabilitySampler {
    ppm: u64,
    decisions: AtomicU64,
}

impl ProbabilitySampler {
    pub fn new(probability: f64) -> Self {
        let ppm = (probability.clamp(0.0, 1.0) * PARTS_PER_MILLION as f64).round() as u64;
        Self {
            ppm,
            decisions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_sampled(&self) -> bool {
        let n = u128::from(self.decisions.fetch_add(1, Ordering::Relaxed));
        let ppm = u128::from(self.ppm);
        let per_million = u128::from(PARTS_PER_MILLION);
        (n + 1) * ppm / per_million > n * ppm / per_million
    }
}

/// Accepts at most `rate` traces per one-second window.
pub struct RateLimitingSampler {
    rate: u32,
    clock: Arc<dyn Clock>,
    window: Mutex<(Instant, u32)>,
}

impl fmt::Debug for RateLimitingSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitingSampler")
            .field("rate", &self.rate)
            .finish()
    }
}

impl RateLimitingSampler {
    pub fn new(rate: u32, clock: Arc<dyn Clock>) -> Self {
        let opened = clock.now();
        Self {
            rate,
            clock,
            window: Mutex::new((opened, 0)),
        }
    }

    pub fn is_sampled(&self) -> bool {
        let now = self.clock.now();
        let mut window = self
            .window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if now.saturating_duration_since(window.0) >= Duration::from_secs(1) {
            *window = (now, 0);
        }

        if window.1 < self.rate {
            window.1 += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    fn from_config(cfg: &SamplerConfig) -> Sampler {
        Sampler::from_config(cfg, Arc::new(SystemClock))
    }

    #[test]
    fn test_from_config() {
        let cfg = SamplerConfig { probability: Some(1.0), rate: 10 };
        assert!(matches!(from_config(&cfg), Sampler::Always));

        let cfg = SamplerConfig { probability: Some(0.0), rate: 10 };
        assert!(matches!(from_config(&cfg), Sampler::Never));

        let cfg = SamplerConfig { probability: Some(0.25), rate: 10 };
        assert!(matches!(from_config(&cfg), Sampler::Probability(_)));

        let cfg = SamplerConfig { probability: None, rate: 10 };
        assert!(matches!(from_config(&cfg), Sampler::RateLimited(_)));

        let cfg = SamplerConfig { probability: None, rate: 0 };
        assert!(matches!(from_config(&cfg), Sampler::Never));
    }

    #[test]
    fn test_probability_is_exact_over_window() {
        let sampler = ProbabilitySampler::new(0.1);
        let accepted = (0..100).filter(|_| sampler.is_sampled()).count();
        assert_eq!(accepted, 10);

        let sampler = ProbabilitySampler::new(0.333);
        let accepted = (0..1000).filter(|_| sampler.is_sampled()).count();
        assert_eq!(accepted, 333);
    }

    #[test]
    fn test_probability_survives_huge_decision_counts() {
        let sampler = ProbabilitySampler::new(0.5);
        sampler.decisions.store(u64::MAX / 2, Ordering::Relaxed);
        let accepted = (0..10).filter(|_| sampler.is_sampled()).count();
        assert_eq!(accepted, 5);
    }

    #[test]
    fn test_rate_limit_per_window() {
        let clock = Arc::new(ManualClock::new());
        let sampler = RateLimitingSampler::new(5, clock.clone());

        let accepted = (0..100).filter(|_| sampler.is_sampled()).count();
        assert_eq!(accepted, 5);

        clock.advance(Duration::from_millis(999));
        assert!(!sampler.is_sampled());

        // Next window refills.
        clock.advance(Duration::from_millis(501));
        assert!(sampler.is_sampled());
    }

    #[test]
    fn test_shared_sampler_swap() {
        let shared = shared(Sampler::Never);
        assert!(!shared.load().is_sampled(1));
        shared.store(Arc::new(Sampler::Always));
        assert!(shared.load().is_sampled(1));
    }
}
