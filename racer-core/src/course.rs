use crate::coins::CoinField;
use crate::config::PhysicsConfig;
use crate::error::TrackError;
use crate::track::Track;

/// Everything a race seed pins down: the terrain and its coins.
#[derive(Clone, Debug, PartialEq)]
pub struct Course {
    seed: u32,
    track: Track,
    coins: CoinField,
}

impl Course {
    pub fn new(track: Track, seed: u32, config: &PhysicsConfig) -> Self {
        let coins = CoinField::generate(&track, seed, config);
        Self { seed, track, coins }
    }

    /// Regenerate the course from the chart on record for a race.
    pub fn generate(
        price_samples: &[f64],
        seed: u32,
        config: &PhysicsConfig,
    ) -> Result<Self, TrackError> {
        Ok(Self::new(Track::generate(price_samples, seed)?, seed, config))
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn coins(&self) -> &CoinField {
        &self.coins
    }
}
