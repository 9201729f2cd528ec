use std::fs;

use serde::Deserialize;
use solracer_core::sim::{replay_with_checkpoints, ReplayCheckpoint};
use solracer_core::{Course, InputTrace, PhysicsConfig, Track};

#[derive(Deserialize)]
struct Fixture {
    seed: u32,
    #[serde(default)]
    track: Option<Vec<f64>>,
    #[serde(default)]
    price_samples: Option<Vec<f64>>,
    submission: Submission,
}

#[derive(Deserialize)]
struct Submission {
    input_trace: InputTrace,
}

fn load(path: &str) -> (Course, InputTrace) {
    let full = format!("../{path}");
    let text =
        fs::read_to_string(&full).unwrap_or_else(|err| panic!("failed reading {full}: {err}"));
    let fixture: Fixture = serde_json::from_str(&text).expect("fixture should parse");
    let config = PhysicsConfig::REFERENCE;
    let course = match (fixture.track, fixture.price_samples) {
        (Some(samples), _) => Course::new(Track::from_samples(samples), fixture.seed, &config),
        (None, Some(prices)) => {
            Course::generate(&prices, fixture.seed, &config).expect("usable chart")
        }
        (None, None) => panic!("fixture has no course"),
    };
    (course, fixture.submission.input_trace)
}

fn mix_u64(hash: u64, value: u64) -> u64 {
    // FNV-1a style mix for stable fixture fingerprinting.
    hash.wrapping_mul(0x0000_0100_0000_01B3) ^ value
}

fn checkpoint_fingerprint(checkpoints: &[ReplayCheckpoint]) -> u64 {
    let mut hash = 0xCBF2_9CE4_8422_2325u64;

    for checkpoint in checkpoints {
        let state = &checkpoint.state;
        hash = mix_u64(hash, checkpoint.tick as u64);
        hash = mix_u64(hash, checkpoint.coins_collected as u64);
        hash = mix_u64(hash, state.x as i64 as u64);
        hash = mix_u64(hash, state.y as i64 as u64);
        hash = mix_u64(hash, state.vx as i64 as u64);
        hash = mix_u64(hash, state.vy as i64 as u64);
        hash = mix_u64(hash, state.angle as i64 as u64);
        hash = mix_u64(hash, state.angular_velocity as i64 as u64);
        hash = mix_u64(hash, state.front_wheel_spin as i64 as u64);
        hash = mix_u64(hash, state.back_wheel_spin as i64 as u64);
        hash = mix_u64(hash, state.front_grounded as u64);
        hash = mix_u64(hash, state.back_grounded as u64);
        hash = mix_u64(hash, state.crashed as u64);
    }

    hash
}

#[test]
fn flat_fixture_checkpoint_fingerprint_stable() {
    let (course, trace) = load("test-fixtures/flat-throttle.json");
    let checkpoints = replay_with_checkpoints(&course, &trace, &PhysicsConfig::REFERENCE, 100);

    assert_eq!(checkpoints.len(), 6);
    let last = checkpoints.last().expect("checkpoint");
    assert_eq!(last.tick, 428);
    assert_eq!((last.state.x, last.state.y), (12_967_948, 416_154));
    assert_eq!(checkpoint_fingerprint(&checkpoints), 14_694_346_396_488_048_472);
}

#[test]
fn staircase_fixture_checkpoint_fingerprint_stable() {
    let (course, trace) = load("test-fixtures/staircase-mixed.json");
    let checkpoints = replay_with_checkpoints(&course, &trace, &PhysicsConfig::REFERENCE, 50);

    assert_eq!(checkpoints.first().expect("checkpoint").tick, 0);
    let last = checkpoints.last().expect("checkpoint");
    assert_eq!(last.tick, 626);
    assert_eq!(last.coins_collected, 16);
    assert_eq!(checkpoint_fingerprint(&checkpoints), 3_404_774_541_408_078_855);
}
