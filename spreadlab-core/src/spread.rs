//! Spread synthesis.
//!
//! The real signal is the divergence between an exchange's mark price and
//! last traded price. Historical candles only carry one price series, so the
//! default source treats the close as the mark and derives a "last" price by
//! perturbing it with uniform noise. The simulator only depends on the
//! [`SpreadSource`] trait, so a two-feed implementation can replace it.

use crate::domain::{Candle, PositionSide};
use crate::rng::SeedHierarchy;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Default half-width of the uniform last-price noise (±0.5%).
pub const DEFAULT_NOISE: f64 = 0.005;

/// Which side the spread favours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpreadDirection {
    /// Mark above last.
    Long,
    /// Mark below last.
    Short,
    /// No divergence.
    Flat,
}

impl SpreadDirection {
    pub fn side(&self) -> Option<PositionSide> {
        match self {
            Self::Long => Some(PositionSide::Long),
            Self::Short => Some(PositionSide::Short),
            Self::Flat => None,
        }
    }
}

/// Spread observed for one candle. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSpread {
    pub timestamp: DateTime<Utc>,
    /// Magnitude of the divergence in percent (always ≥ 0).
    pub spread_percent: f64,
    pub direction: SpreadDirection,
}

impl SyntheticSpread {
    /// Spread as seen by a position on `side`: an opposite or flat spread reads as zero.
    pub fn in_direction(&self, side: PositionSide) -> f64 {
        if self.direction.side() == Some(side) {
            self.spread_percent
        } else {
            0.0
        }
    }
}

/// Percentage divergence between mark and last, with its direction.
pub fn spread_between(mark: f64, last: f64) -> (f64, SpreadDirection) {
    if mark <= 0.0 || last <= 0.0 {
        return (0.0, SpreadDirection::Flat);
    }
    if mark > last {
        ((mark - last) / last * 100.0, SpreadDirection::Long)
    } else if mark < last {
        ((last - mark) / mark * 100.0, SpreadDirection::Short)
    } else {
        (0.0, SpreadDirection::Flat)
    }
}

/// Produces one spread observation per candle.
pub trait SpreadSource {
    fn sample(&mut self, candle: &Candle) -> SyntheticSpread;
}

/// Close-as-mark with a uniformly perturbed last price.
#[derive(Debug, Clone)]
pub struct RandomSpread<R = StdRng> {
    rng: R,
    noise: f64,
}

impl RandomSpread<StdRng> {
    pub fn seeded(seed: u64, noise: f64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), noise)
    }

    /// Reproducible source for `symbol` drawn from a seed hierarchy.
    pub fn for_symbol(seeds: &SeedHierarchy, symbol: &str, noise: f64) -> Self {
        Self::with_rng(seeds.rng_for(symbol), noise)
    }
}

impl<R: Rng> RandomSpread<R> {
    pub fn with_rng(rng: R, noise: f64) -> Self {
        Self {
            rng,
            noise: noise.abs(),
        }
    }
}

impl<R: Rng> SpreadSource for RandomSpread<R> {
    fn sample(&mut self, candle: &Candle) -> SyntheticSpread {
        let mark = candle.close;
        let variation = self.rng.gen_range(-self.noise..=self.noise);
        let last = mark * (1.0 + variation);
        let (spread_percent, direction) = spread_between(mark, last);
        SyntheticSpread {
            timestamp: candle.timestamp,
            spread_percent,
            direction,
        }
    }
}

/// Replays a fixed sequence of spreads, then reports flat.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSpread {
    script: Vec<(f64, SpreadDirection)>,
    cursor: usize,
}

impl ScriptedSpread {
    /// All values read as long-side spreads.
    pub fn new(percents: impl IntoIterator<Item = f64>) -> Self {
        Self::with_directions(percents.into_iter().map(|p| (p, SpreadDirection::Long)))
    }

    pub fn with_directions(script: impl IntoIterator<Item = (f64, SpreadDirection)>) -> Self {
        Self {
            script: script.into_iter().collect(),
            cursor: 0,
        }
    }
}

impl SpreadSource for ScriptedSpread {
    fn sample(&mut self, candle: &Candle) -> SyntheticSpread {
        let (spread_percent, direction) = self
            .script
            .get(self.cursor)
            .copied()
            .unwrap_or((0.0, SpreadDirection::Flat));
        self.cursor += 1;
        SyntheticSpread {
            timestamp: candle.timestamp,
            spread_percent,
            direction,
        }
    }
}

/// Adapts a closure into a [`SpreadSource`].
pub struct FnSpread<F>(pub F);

impl<F> SpreadSource for FnSpread<F>
where
    F: FnMut(&Candle) -> SyntheticSpread,
{
    fn sample(&mut self, candle: &Candle) -> SyntheticSpread {
        (self.0)(candle)
    }
}
