use super::*;
use crate::course::Course;
use crate::fixed_point::length;
use crate::trace::{InputFrame, InputTrace};

const CONFIG: PhysicsConfig = PhysicsConfig::REFERENCE;

fn flat() -> Track {
    Track::flat(1_000, 0.5)
}

fn throttle() -> Controls {
    Controls::quantize(1.0, 0.0, 0.0)
}

fn airborne(track: &Track) -> VehicleState {
    let mut state = VehicleState::start(track, &CONFIG);
    state.y += 5 << 16;
    state.front_grounded = false;
    state.back_grounded = false;
    state
}

#[test]
fn start_state_rests_on_ground() {
    let track = flat();
    let state = VehicleState::start(&track, &CONFIG);
    assert_eq!(state.x, CONFIG.start_x);
    assert_eq!(state.y, (6 << 16) + CONFIG.wheel_radius);
    assert!(state.front_grounded && state.back_grounded);
    assert!(!state.crashed);
}

#[test]
fn idle_vehicle_stays_put() {
    let track = flat();
    let start = VehicleState::start(&track, &CONFIG);
    let mut state = start;
    for _ in 0..120 {
        state = step(&state, Controls::IDLE, &track, &CONFIG);
    }
    assert_eq!(state, start);
}

#[test]
fn first_throttle_step() {
    let track = flat();
    let state = step(&VehicleState::start(&track, &CONFIG), throttle(), &track, &CONFIG);
    assert_eq!(state.front_wheel_spin, 400);
    assert_eq!(state.back_wheel_spin, 400);
    assert_eq!(state.vx, 70);
    assert_eq!(state.x, CONFIG.start_x + 70);
    assert_eq!(state.vy, 0);
}

#[test]
fn accelerate_overrides_brake() {
    let track = flat();
    let start = VehicleState::start(&track, &CONFIG);
    let both = step(&start, Controls::quantize(1.0, 1.0, 0.0), &track, &CONFIG);
    let gas = step(&start, throttle(), &track, &CONFIG);
    assert_eq!(both, gas);
}

#[test]
fn both_pedals_cancel_in_the_air() {
    let track = flat();
    let both = step(
        &airborne(&track),
        Controls::quantize(1.0, 1.0, 0.0),
        &track,
        &CONFIG,
    );
    let idle = step(&airborne(&track), Controls::IDLE, &track, &CONFIG);
    assert_eq!(both.angular_velocity, idle.angular_velocity);
    assert_eq!(both.angular_velocity, 0);
    // The wheels still take the accelerate side.
    assert!(both.back_wheel_spin > 0);

    let brake = step(
        &airborne(&track),
        Controls::quantize(0.0, 1.0, 0.0),
        &track,
        &CONFIG,
    );
    assert!(brake.angular_velocity < 0);
}

#[test]
fn brake_reverses_and_stops_at_track_start() {
    let track = flat();
    let mut state = VehicleState::start(&track, &CONFIG);
    for _ in 0..600 {
        state = step(&state, Controls::quantize(0.0, 1.0, 0.0), &track, &CONFIG);
    }
    assert_eq!(state.x, 0);
    assert!(!state.crashed);
}

#[test]
fn rotate_only_acts_in_the_air() {
    let track = flat();
    let start = VehicleState::start(&track, &CONFIG);
    assert_eq!(
        step(&start, Controls::quantize(0.0, 0.0, 1.0), &track, &CONFIG),
        step(&start, Controls::IDLE, &track, &CONFIG)
    );

    let lean = step(
        &airborne(&track),
        Controls::quantize(0.0, 0.0, 1.0),
        &track,
        &CONFIG,
    );
    // 40 from the lean torque, minus 1/32 damping.
    assert_eq!(lean.angular_velocity, 39);

    let both = step(
        &airborne(&track),
        Controls::quantize(1.0, 0.0, 1.0),
        &track,
        &CONFIG,
    );
    assert_eq!(both.angular_velocity, 62);
}

#[test]
fn upside_down_vehicle_crashes_and_freezes() {
    let track = flat();
    let mut state = VehicleState::start(&track, &CONFIG);
    state.angle = -32_768;
    let crashed = step(&state, Controls::IDLE, &track, &CONFIG);
    assert!(crashed.crashed);
    assert_eq!((crashed.vx, crashed.vy, crashed.angular_velocity), (0, 0, 0));

    assert_eq!(step(&crashed, throttle(), &track, &CONFIG), crashed);
}

#[test]
fn speed_never_exceeds_limit() {
    let prices: Vec<f64> = (0..120)
        .map(|i| (100 + (i * 7) % 23 + i / 4) as f64)
        .collect();
    let track = Track::generate(&prices, 42).unwrap();
    let mut state = VehicleState::start(&track, &CONFIG);
    for i in 0..900 {
        let rotate = if i % 90 < 45 { 0.5 } else { -0.5 };
        state = step(&state, Controls::quantize(1.0, 0.0, rotate), &track, &CONFIG);
        assert!(length(state.vx, state.vy) <= CONFIG.max_speed, "tick {i}");
        assert!(state.front_wheel_spin.abs() <= CONFIG.max_wheel_spin);
        assert!(state.angular_velocity.abs() <= CONFIG.max_angular_speed);
    }
}

#[test]
fn step_is_pure() {
    let track = flat();
    let start = VehicleState::start(&track, &CONFIG);
    let controls = Controls::quantize(0.7, 0.0, -0.3);
    assert_eq!(
        step(&start, controls, &track, &CONFIG),
        step(&start, controls, &track, &CONFIG)
    );
}

fn throttle_trace(frames: usize) -> InputTrace {
    InputTrace::new(
        (0..frames)
            .map(|i| InputFrame {
                time: i as f64 / 60.0,
                accelerate: 1.0,
                brake: 0.0,
                rotate: 0.0,
            })
            .collect(),
    )
}

#[test]
fn session_ignores_frames_after_finish() {
    let course = Course::new(flat(), 0x5EED_0001, &CONFIG);
    let mut session = RaceSession::new(&course, &CONFIG);
    let mut last = RaceProgress::Running;
    for _ in 0..600 {
        last = session.step(throttle());
    }
    assert_eq!(last, RaceProgress::Finished { ticks: 428 });
    assert_eq!(session.ticks(), 428);
    assert_eq!(session.finish_time_ms(), Some(7_133));
}

#[test]
fn replay_reports_crash() {
    // A six metre wall eight metres in.
    let wall = Track::from_samples([vec![0.5; 40], vec![1.0; 960]].concat());
    let course = Course::new(wall, 1, &CONFIG);
    let outcome = replay(&course, &throttle_trace(600), &CONFIG);
    assert_eq!(outcome.progress, RaceProgress::Crashed { ticks: 40 });
    assert_eq!(outcome.frames_consumed, 40);
    assert_eq!(outcome.finish_time_ms, None);
    assert!(outcome.final_state.crashed);
}

#[test]
fn checkpoints_bracket_the_replay() {
    let course = Course::new(flat(), 0x5EED_0001, &CONFIG);
    let trace = throttle_trace(600);
    let checkpoints = replay_with_checkpoints(&course, &trace, &CONFIG, 100);

    let ticks: Vec<u32> = checkpoints.iter().map(|c| c.tick).collect();
    assert_eq!(ticks, vec![0, 100, 200, 300, 400, 428]);
    let last = checkpoints.last().unwrap();
    let outcome = replay(&course, &trace, &CONFIG);
    assert_eq!(last.state, outcome.final_state);
    assert_eq!(last.coins_collected, outcome.coins_collected);
    assert!(checkpoints
        .windows(2)
        .all(|pair| pair[0].coins_collected <= pair[1].coins_collected));
}
