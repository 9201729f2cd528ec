use serde::{Deserialize, Serialize};

use crate::config::PhysicsConfig;
use crate::constants::{
    COIN_HOVER_SPAN, COIN_MIN_HOVER, COIN_PRESENCE_EIGHTHS, COIN_SLOT_SPACING, COIN_STREAM_SALT,
    START_FLAT_SAMPLES,
};
use crate::rng::SeededRng;
use crate::track::Track;

/// A collectible, positioned in Q16.16 world metres.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub x: i32,
    pub y: i32,
}

/// Coin placement derived from the track and the race seed alone, so the
/// verifier can rebuild it without trusting the client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinField {
    coins: Vec<Coin>,
}

impl CoinField {
    pub fn generate(track: &Track, seed: u32, config: &PhysicsConfig) -> Self {
        let mut rng = SeededRng::new(seed ^ COIN_STREAM_SALT);
        let finish_samples = (config.finish_margin / config.sample_spacing.max(1)) as usize;
        let end = track.len().saturating_sub(1 + finish_samples);

        let mut coins = Vec::new();
        let mut slot = START_FLAT_SAMPLES + COIN_SLOT_SPACING;
        while slot < end {
            // Both draws happen for every slot so one slot never shifts the next.
            let present = rng.next_int(8) < COIN_PRESENCE_EIGHTHS;
            let hover = COIN_MIN_HOVER + rng.next_int(COIN_HOVER_SPAN) as i32;
            if present {
                coins.push(Coin {
                    x: (slot as i64 * config.sample_spacing as i64) as i32,
                    y: track.sample_height(slot, config) + hover,
                });
            }
            slot += COIN_SLOT_SPACING;
        }

        Self { coins }
    }

    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

/// Which coins one race attempt has picked up.
#[derive(Clone, Debug)]
pub(crate) struct CoinTracker {
    taken: Vec<bool>,
    count: u32,
}

impl CoinTracker {
    pub(crate) fn new(field: &CoinField) -> Self {
        Self {
            taken: vec![false; field.len()],
            count: 0,
        }
    }

    /// Mark every coin within `radius` of `(x, y)`; returns how many were new.
    pub(crate) fn collect_near(&mut self, field: &CoinField, x: i32, y: i32, radius: i32) -> u32 {
        let radius_sq = radius as i64 * radius as i64;
        let mut picked = 0;
        for (coin, taken) in field.coins.iter().zip(self.taken.iter_mut()) {
            if *taken {
                continue;
            }
            let dx = (x - coin.x) as i64;
            let dy = (y - coin.y) as i64;
            if dx * dx + dy * dy <= radius_sq {
                *taken = true;
                picked += 1;
            }
        }
        self.count += picked;
        picked
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }
}
