use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{PHYSICS_VERSION, STEP_HZ};

/// Every constant the kinematic model reads.
///
/// Lengths and speeds are Q16.16 metres (per step for speeds, per step
/// squared for accelerations). Spins and angular speeds are binary angle
/// units per step. The live client and the verifier must run the same
/// version; [`PhysicsConfig::digest`] is what they compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    pub version: u16,
    pub step_hz: u32,
    pub gravity: i32,
    pub accel_torque: i32,
    pub brake_torque: i32,
    pub max_wheel_spin: i32,
    pub wheel_radius: i32,
    pub wheel_circumference: i32,
    pub half_wheel_base: i32,
    pub head_height: i32,
    pub traction: i32,
    pub max_traction: i32,
    pub rolling_resistance_shift: u32,
    pub air_rotation_torque: i32,
    pub air_lean_torque: i32,
    pub max_angular_speed: i32,
    pub angular_damping_shift: u32,
    pub max_speed: i32,
    pub contact_slop: i32,
    pub sample_spacing: i32,
    pub height_scale: i32,
    pub start_x: i32,
    pub finish_margin: i32,
    pub coin_radius: i32,
}

impl PhysicsConfig {
    pub const REFERENCE: PhysicsConfig = PhysicsConfig {
        version: PHYSICS_VERSION,
        step_hz: STEP_HZ,
        gravity: 178, // 9.8 m/s^2
        accel_torque: 400,
        brake_torque: 300,
        max_wheel_spin: 14_900, // ~30 m/s surface speed
        wheel_radius: 22_938, // 0.35 m
        wheel_circumference: 144_121,
        half_wheel_base: 45_875, // 0.7 m
        head_height: 58_982, // 0.9 m
        traction: 5_243, // 0.08
        max_traction: 524,
        rolling_resistance_shift: 8,
        air_rotation_torque: 24,
        air_lean_torque: 40,
        max_angular_speed: 1_200,
        angular_damping_shift: 5,
        max_speed: 32_768, // 0.5 m per step
        contact_slop: 1_311, // 0.02 m
        sample_spacing: 13_107, // 0.2 m
        height_scale: 786_432, // 12 m
        start_x: 131_072, // 2 m
        finish_margin: 131_072,
        coin_radius: 65_536,
    };

    /// Version first, then every field little endian in declaration order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 23 * 4);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.step_hz.to_le_bytes());
        for value in [
            self.gravity,
            self.accel_torque,
            self.brake_torque,
            self.max_wheel_spin,
            self.wheel_radius,
            self.wheel_circumference,
            self.half_wheel_base,
            self.head_height,
            self.traction,
            self.max_traction,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&self.rolling_resistance_shift.to_le_bytes());
        for value in [
            self.air_rotation_torque,
            self.air_lean_torque,
            self.max_angular_speed,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&self.angular_damping_shift.to_le_bytes());
        for value in [
            self.max_speed,
            self.contact_slop,
            self.sample_spacing,
            self.height_scale,
            self.start_x,
            self.finish_margin,
            self.coin_radius,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// SHA-256 of [`Self::canonical_bytes`], lowercase hex.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes()))
    }

    /// Milliseconds elapsed after `ticks` steps, rounded half up.
    pub fn ticks_to_ms(&self, ticks: u32) -> u64 {
        let hz = self.step_hz as u64;
        (ticks as u64 * 1_000 + hz / 2) / hz
    }

    /// Seconds since race start of the frame recorded at `index`.
    pub fn frame_time(&self, index: usize) -> f64 {
        index as f64 / self.step_hz as f64
    }

    /// Horizontal extent of a track with `sample_count` samples, Q16.16.
    pub fn track_length(&self, sample_count: usize) -> i32 {
        let intervals = sample_count.saturating_sub(1) as i64;
        (intervals * self.sample_spacing as i64).min(i32::MAX as i64) as i32
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self::REFERENCE
    }
}
