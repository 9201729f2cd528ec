//! Fixed-step kinematic model.
//!
//! [`step`] is the whole physics: one call per recorded input frame, pure in
//! its arguments and integer-only. The live client and the verifier call the
//! same function with the same [`PhysicsConfig`].

use serde::{Deserialize, Serialize};

use crate::config::PhysicsConfig;
use crate::fixed_point::{
    clamp, cos, isqrt_u64, mul, quantize, sin, wrap_angle, ANGLE_UNITS_PER_RADIAN,
};
use crate::track::Track;
use crate::trace::InputFrame;

mod session;

pub use session::{
    replay, replay_with_checkpoints, RaceProgress, RaceSession, ReplayCheckpoint, ReplayOutcome,
};

/// Rigid two-wheel vehicle. Positions and velocities are Q16.16 metres
/// (velocities per step); angles are binary angle units, positive nose-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleState {
    pub x: i32,
    pub y: i32,
    pub vx: i32,
    pub vy: i32,
    pub angle: i32,
    pub angular_velocity: i32,
    pub front_wheel_spin: i32,
    pub back_wheel_spin: i32,
    pub front_grounded: bool,
    pub back_grounded: bool,
    pub crashed: bool,
}

/// One frame of controls on the Q16.16 grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Controls {
    pub accelerate: i32,
    pub brake: i32,
    pub rotate: i32,
}

impl Controls {
    pub const IDLE: Controls = Controls {
        accelerate: 0,
        brake: 0,
        rotate: 0,
    };

    /// Clamp each control to its legal range and snap it to the grid.
    pub fn quantize(accelerate: f64, brake: f64, rotate: f64) -> Self {
        Self {
            accelerate: quantize(accelerate, 0.0, 1.0),
            brake: quantize(brake, 0.0, 1.0),
            rotate: quantize(rotate, -1.0, 1.0),
        }
    }

    pub fn from_frame(frame: &InputFrame) -> Self {
        Self::quantize(frame.accelerate, frame.brake, frame.rotate)
    }

    /// Signed drive and the torque constant it scales. Accelerate wins when
    /// both pedals are down.
    fn drive(&self, config: &PhysicsConfig) -> (i32, i32) {
        if self.accelerate > 0 {
            (self.accelerate, config.accel_torque)
        } else {
            (-self.brake, config.brake_torque)
        }
    }
}

impl VehicleState {
    /// Canonical start: level at `start_x`, wheels resting on the ground.
    pub fn start(track: &Track, config: &PhysicsConfig) -> Self {
        let mut state = Self {
            x: config.start_x,
            y: track.ground_height(config.start_x, config) + config.wheel_radius,
            vx: 0,
            vy: 0,
            angle: 0,
            angular_velocity: 0,
            front_wheel_spin: 0,
            back_wheel_spin: 0,
            front_grounded: false,
            back_grounded: false,
            crashed: false,
        };
        state.refresh_contacts(track, config);
        state
    }

    /// Speed along the body axis, Q16.16 metres per step.
    pub fn forward_speed(&self) -> i32 {
        let (c, s) = (cos(self.angle) as i64, sin(self.angle) as i64);
        ((self.vx as i64 * c + self.vy as i64 * s) >> 16) as i32
    }

    pub fn is_grounded(&self) -> bool {
        self.front_grounded || self.back_grounded
    }

    /// Penetration of the front and back wheels into the ground. Negative
    /// means the wheel is above it.
    fn wheel_penetration(&self, track: &Track, config: &PhysicsConfig) -> (i32, i32) {
        let dx = mul(config.half_wheel_base, cos(self.angle));
        let dy = mul(config.half_wheel_base, sin(self.angle));
        let front = track.ground_height(self.x + dx, config) + config.wheel_radius - (self.y + dy);
        let back = track.ground_height(self.x - dx, config) + config.wheel_radius - (self.y - dy);
        (front, back)
    }

    fn refresh_contacts(&mut self, track: &Track, config: &PhysicsConfig) {
        let (front, back) = self.wheel_penetration(track, config);
        self.front_grounded = front >= -config.contact_slop;
        self.back_grounded = back >= -config.contact_slop;
    }
}

/// Advance `state` by one fixed step. A crashed vehicle is returned as is.
pub fn step(
    state: &VehicleState,
    controls: Controls,
    track: &Track,
    config: &PhysicsConfig,
) -> VehicleState {
    let mut next = *state;
    if next.crashed {
        return next;
    }

    // Drive.
    let (drive, torque) = controls.drive(config);
    let spin_delta = mul(drive, torque);
    let forward = next.forward_speed();
    let rolling_spin = (forward as i64 * 65_536 / config.wheel_circumference as i64) as i32;
    let update_spin = |spin: i32, grounded: bool| {
        let spin = if drive != 0 {
            spin + spin_delta
        } else if grounded {
            rolling_spin
        } else {
            spin
        };
        clamp(spin, -config.max_wheel_spin, config.max_wheel_spin)
    };
    next.front_wheel_spin = update_spin(next.front_wheel_spin, next.front_grounded);
    next.back_wheel_spin = update_spin(next.back_wheel_spin, next.back_grounded);

    // Contact flags describe the pose this step starts from. In the air both
    // pedals count, so holding both cancels out.
    if !next.is_grounded() {
        let pitch = controls.accelerate - controls.brake;
        next.angular_velocity +=
            mul(pitch, config.air_rotation_torque) + mul(controls.rotate, config.air_lean_torque);
    }

    // Forces.
    next.vy -= config.gravity;
    let (c, s) = (cos(next.angle), sin(next.angle));
    for (spin, grounded) in [
        (next.front_wheel_spin, next.front_grounded),
        (next.back_wheel_spin, next.back_grounded),
    ] {
        if !grounded {
            continue;
        }
        let surface = ((spin as i64 * config.wheel_circumference as i64) >> 16) as i32;
        let impulse = (((surface - forward) as i64 * config.traction as i64) >> 16) as i32;
        let impulse = clamp(impulse, -config.max_traction, config.max_traction) / 2;
        next.vx += mul(impulse, c);
        next.vy += mul(impulse, s);
    }
    if next.is_grounded() && drive == 0 {
        next.vx -= next.vx >> config.rolling_resistance_shift;
        next.vy -= next.vy >> config.rolling_resistance_shift;
    }
    next.angular_velocity -= next.angular_velocity >> config.angular_damping_shift;
    next.angular_velocity = clamp(
        next.angular_velocity,
        -config.max_angular_speed,
        config.max_angular_speed,
    );

    let speed_sq = next.vx as i64 * next.vx as i64 + next.vy as i64 * next.vy as i64;
    let speed = isqrt_u64(speed_sq as u64) as i64;
    if speed > config.max_speed as i64 {
        next.vx = (next.vx as i64 * config.max_speed as i64 / speed) as i32;
        next.vy = (next.vy as i64 * config.max_speed as i64 / speed) as i32;
    }

    // Semi-implicit integration.
    next.x = clamp(next.x + next.vx, 0, track.length(config));
    next.y += next.vy;
    next.angle = wrap_angle(next.angle + next.angular_velocity);

    resolve_ground_contact(&mut next, track, config);

    if head_touches_ground(&next, track, config) {
        next.crashed = true;
        next.vx = 0;
        next.vy = 0;
        next.angular_velocity = 0;
        next.front_wheel_spin = 0;
        next.back_wheel_spin = 0;
    }

    next.refresh_contacts(track, config);
    next
}

fn resolve_ground_contact(state: &mut VehicleState, track: &Track, config: &PhysicsConfig) {
    let (front, back) = state.wheel_penetration(track, config);
    let front = front.max(0);
    let back = back.max(0);
    if front == 0 && back == 0 {
        return;
    }

    state.y += (front + back) >> 1;
    let tilt = (front - back) as i64 * ANGLE_UNITS_PER_RADIAN / (2 * config.half_wheel_base as i64);
    state.angle = wrap_angle(state.angle + tilt as i32);
    if state.vy < 0 {
        state.vy = 0;
    }
    state.angular_velocity >>= 1;
}

fn head_touches_ground(state: &VehicleState, track: &Track, config: &PhysicsConfig) -> bool {
    let head_x = state.x - mul(config.head_height, sin(state.angle));
    let head_y = state.y + mul(config.head_height, cos(state.angle));
    head_y <= track.ground_height(head_x, config)
}

#[cfg(test)]
mod tests;
