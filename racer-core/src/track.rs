//! Price chart to terrain.
//!
//! The generator works on the 1/65536 height grid as soon as the chart is
//! normalized, so the only floating-point steps are the min/max scaling and
//! the linear resample, both plain IEEE-754 arithmetic with a fixed
//! evaluation order.

use serde::{Deserialize, Serialize};

use crate::config::PhysicsConfig;
use crate::constants::{START_FLAT_SAMPLES, TRACK_JITTER_Q16, TRACK_SAMPLE_COUNT};
use crate::error::TrackError;
use crate::fixed_point::{clamp, quantize, FX_ONE};
use crate::rng::SeededRng;

/// Terrain for one race: normalized heights in `[0, 1]`, one every
/// `sample_spacing` metres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f64>", into = "Vec<f64>")]
pub struct Track {
    samples: Vec<f64>,
    heights: Vec<i32>,
}

/// `generate_track(price_samples, seed)` as exposed to clients.
pub fn generate_track(price_samples: &[f64], seed: u32) -> Result<Vec<f64>, TrackError> {
    let usable: Vec<f64> = price_samples
        .iter()
        .copied()
        .filter(|price| price.is_finite() && *price > 0.0)
        .collect();
    if usable.is_empty() {
        return Err(TrackError::NoUsablePrices {
            provided: price_samples.len(),
        });
    }

    let min = usable.iter().copied().fold(f64::INFINITY, f64::min);
    let max = usable.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    let normalized: Vec<f64> = usable
        .iter()
        .map(|price| if span > 0.0 { (price - min) / span } else { 0.5 })
        .collect();

    let mut rng = SeededRng::new(seed);
    let mut grid: Vec<i32> = resample(&normalized, TRACK_SAMPLE_COUNT)
        .into_iter()
        .map(|value| {
            let base = quantize(value, 0.0, 1.0);
            let jitter = rng.next_range(-TRACK_JITTER_Q16, TRACK_JITTER_Q16 + 1);
            clamp(base + jitter, 0, FX_ONE)
        })
        .collect();

    let level = grid[START_FLAT_SAMPLES];
    grid[..START_FLAT_SAMPLES].fill(level);

    Ok(grid
        .into_iter()
        .map(|height| height as f64 / FX_ONE as f64)
        .collect())
}

fn resample(values: &[f64], count: usize) -> Vec<f64> {
    if values.len() == 1 {
        return vec![values[0]; count];
    }

    let last = values.len() - 1;
    let denom = count - 1;
    (0..count)
        .map(|i| {
            let position = i * last;
            let idx = position / denom;
            if idx >= last {
                return values[last];
            }
            let t = (position % denom) as f64 / denom as f64;
            values[idx] + (values[idx + 1] - values[idx]) * t
        })
        .collect()
}

impl Track {
    pub fn generate(price_samples: &[f64], seed: u32) -> Result<Self, TrackError> {
        generate_track(price_samples, seed).map(Self::from_samples)
    }

    /// Build a track from already generated samples. Values are clamped to
    /// `[0, 1]` and snapped to the 1/65536 grid.
    pub fn from_samples(samples: Vec<f64>) -> Self {
        let heights: Vec<i32> = samples
            .iter()
            .map(|sample| quantize(*sample, 0.0, 1.0))
            .collect();
        let samples = heights
            .iter()
            .map(|height| *height as f64 / FX_ONE as f64)
            .collect();
        Self { samples, heights }
    }

    pub fn flat(count: usize, level: f64) -> Self {
        Self::from_samples(vec![level; count])
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn length(&self, config: &PhysicsConfig) -> i32 {
        config.track_length(self.heights.len())
    }

    /// World height of sample `index`, Q16.16 metres.
    pub fn sample_height(&self, index: usize, config: &PhysicsConfig) -> i32 {
        match self.heights.get(index) {
            Some(height) => scale_height(*height, config),
            None => 0,
        }
    }

    /// Ground height under `x`, linearly interpolated between the two
    /// neighbouring samples. `x` outside the track is clamped to its ends.
    pub fn ground_height(&self, x: i32, config: &PhysicsConfig) -> i32 {
        let Some(last) = self.heights.len().checked_sub(1) else {
            return 0;
        };

        let x = clamp(x, 0, self.length(config)) as i64;
        let spacing = config.sample_spacing as i64;
        let idx = (x / spacing) as usize;
        if idx >= last {
            return scale_height(self.heights[last], config);
        }

        let a = self.heights[idx] as i64;
        let b = self.heights[idx + 1] as i64;
        let height = a + (b - a) * (x % spacing) / spacing;
        scale_height(height as i32, config)
    }
}

#[inline]
fn scale_height(height: i32, config: &PhysicsConfig) -> i32 {
    ((height as i64 * config.height_scale as i64) >> 16) as i32
}

impl From<Vec<f64>> for Track {
    fn from(samples: Vec<f64>) -> Self {
        Self::from_samples(samples)
    }
}

impl From<Track> for Vec<f64> {
    fn from(track: Track) -> Self {
        track.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staircase_prices() -> Vec<f64> {
        (0..120)
            .map(|i| (100 + (i * 7) % 23 + i / 4) as f64)
            .collect()
    }

    #[test]
    fn rejects_charts_without_usable_prices() {
        let err = generate_track(&[], 1).unwrap_err();
        assert_eq!(err, TrackError::NoUsablePrices { provided: 0 });

        let err = generate_track(&[0.0, -3.0, f64::NAN, f64::INFINITY], 1).unwrap_err();
        assert_eq!(err, TrackError::NoUsablePrices { provided: 4 });
    }

    #[test]
    fn output_shape_and_range() {
        let samples = generate_track(&staircase_prices(), 42).unwrap();
        assert_eq!(samples.len(), TRACK_SAMPLE_COUNT);
        for sample in &samples {
            assert!((0.0..=1.0).contains(sample));
            assert_eq!((sample * 65_536.0).fract(), 0.0, "sample {sample} is off grid");
        }
    }

    #[test]
    fn start_zone_is_level() {
        let samples = generate_track(&staircase_prices(), 7).unwrap();
        assert!(samples[..START_FLAT_SAMPLES]
            .iter()
            .all(|sample| *sample == samples[START_FLAT_SAMPLES]));
    }

    #[test]
    fn same_inputs_same_track() {
        let prices = staircase_prices();
        assert_eq!(
            generate_track(&prices, 99).unwrap(),
            generate_track(&prices, 99).unwrap()
        );
        assert_ne!(
            generate_track(&prices, 99).unwrap(),
            generate_track(&prices, 100).unwrap()
        );
    }

    #[test]
    fn unusable_prices_are_skipped_not_zeroed() {
        let prices = staircase_prices();
        let mut noisy = prices.clone();
        noisy.insert(3, f64::NAN);
        noisy.insert(50, -1.0);
        noisy.push(0.0);
        assert_eq!(
            generate_track(&noisy, 5).unwrap(),
            generate_track(&prices, 5).unwrap()
        );
    }

    #[test]
    fn flat_chart_sits_mid_height() {
        let samples = generate_track(&[3.5; 40], 11).unwrap();
        let jitter = TRACK_JITTER_Q16 as f64 / 65_536.0;
        assert!(samples
            .iter()
            .all(|sample| (sample - 0.5).abs() <= jitter + f64::EPSILON));
    }

    #[test]
    fn single_price_is_enough() {
        let samples = generate_track(&[42.0], 3).unwrap();
        assert_eq!(samples.len(), TRACK_SAMPLE_COUNT);
    }

    #[test]
    fn ground_height_interpolates_between_samples() {
        let config = PhysicsConfig::REFERENCE;
        let track = Track::from_samples(vec![0.0, 0.5, 1.0]);
        let spacing = config.sample_spacing;

        assert_eq!(track.ground_height(0, &config), 0);
        assert_eq!(track.ground_height(spacing, &config), config.height_scale / 2);
        // 32768 * 6553 / 13107 truncates to 16382 on the sample grid.
        assert_eq!(track.ground_height(spacing / 2, &config), 196_584);
        assert_eq!(track.ground_height(-500, &config), 0);
        assert_eq!(
            track.ground_height(i32::MAX, &config),
            config.height_scale
        );
    }

    #[test]
    fn from_samples_clamps_and_snaps() {
        let track = Track::from_samples(vec![-0.2, 1.7, f64::NAN, 0.3]);
        assert_eq!(track.samples()[0], 0.0);
        assert_eq!(track.samples()[1], 1.0);
        assert_eq!(track.samples()[2], 0.0);
        assert_eq!(track.samples()[3], (0.3f64 * 65_536.0).round() / 65_536.0);
    }

    #[test]
    fn serializes_as_plain_sample_array() {
        let track = Track::flat(3, 0.5);
        let json = serde_json::to_string(&track).unwrap();
        assert_eq!(json, "[0.5,0.5,0.5]");
        let back: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(back, track);
    }
}
