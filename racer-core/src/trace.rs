//! Input traces and their canonical, hashable serialization.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::PhysicsConfig;
use crate::constants::{TRACE_FRAME_SIZE, TRACE_HEADER_SIZE, TRACE_MAGIC, TRACE_VERSION};
use crate::error::TraceError;

const CANONICAL_NAN_BITS: u64 = 0x7FF8_0000_0000_0000;

/// Controls sampled at one fixed-step tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    pub time: f64,
    pub accelerate: f64,
    pub brake: f64,
    pub rotate: f64,
}

/// Ordered frames of one race attempt. Serializes as a bare JSON array.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputTrace {
    frames: Vec<InputFrame>,
}

impl InputTrace {
    pub fn new(frames: Vec<InputFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[InputFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn push(&mut self, frame: InputFrame) {
        self.frames.push(frame);
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    /// Header (`SRTR`, version, three zero bytes, frame count) followed by
    /// the IEEE-754 bits of every field, all little endian.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TRACE_HEADER_SIZE + self.frames.len() * TRACE_FRAME_SIZE);
        out.extend_from_slice(&TRACE_MAGIC);
        out.push(TRACE_VERSION);
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&(self.frames.len() as u32).to_le_bytes());

        for frame in &self.frames {
            for value in [frame.time, frame.accelerate, frame.brake, frame.rotate] {
                out.extend_from_slice(&canonical_bits(value).to_le_bytes());
            }
        }
        out
    }

    /// SHA-256 of [`Self::canonical_bytes`], 64 lowercase hex characters.
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes()))
    }

    /// Compare against a client-supplied hash. Surrounding whitespace is
    /// ignored, case is not.
    pub fn matches_hash(&self, submitted: &str) -> bool {
        submitted.trim() == self.hash()
    }

    pub fn validate(&self, config: &PhysicsConfig, max_frames: u32) -> Result<(), TraceError> {
        if self.frames.is_empty() {
            return Err(TraceError::Empty);
        }
        if self.frames.len() > max_frames as usize {
            return Err(TraceError::TooLong {
                frames: self.frames.len(),
                max_frames,
            });
        }

        let half_step = 0.5 / config.step_hz as f64;
        let mut previous_time = f64::NEG_INFINITY;
        for (index, frame) in self.frames.iter().enumerate() {
            let fields = [frame.time, frame.accelerate, frame.brake, frame.rotate];
            if fields.iter().any(|value| !value.is_finite()) {
                return Err(TraceError::NonFinite { frame: index });
            }
            if !(0.0..=1.0).contains(&frame.accelerate)
                || !(0.0..=1.0).contains(&frame.brake)
                || !(-1.0..=1.0).contains(&frame.rotate)
            {
                return Err(TraceError::ControlOutOfRange { frame: index });
            }
            if frame.time <= previous_time {
                return Err(TraceError::TimeNotIncreasing { frame: index });
            }
            if (frame.time - config.frame_time(index)).abs() > half_step {
                return Err(TraceError::TimeOffCadence { frame: index });
            }
            previous_time = frame.time;
        }

        Ok(())
    }
}

impl From<Vec<InputFrame>> for InputTrace {
    fn from(frames: Vec<InputFrame>) -> Self {
        Self::new(frames)
    }
}

#[inline]
fn canonical_bits(value: f64) -> u64 {
    if value.is_nan() {
        CANONICAL_NAN_BITS
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}
