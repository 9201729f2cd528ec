use std::fs;

use serde::Deserialize;
use solracer_core::{
    verify_submission, Course, InputTrace, PhysicsConfig, RaceOutcome, RejectReason,
    ResultSubmission, Track, Verdict, VerifierConfig,
};

#[derive(Deserialize)]
struct Fixture {
    seed: u32,
    #[serde(default)]
    track: Option<Vec<f64>>,
    #[serde(default)]
    price_samples: Option<Vec<f64>>,
    submission: ResultSubmission,
}

impl Fixture {
    fn course(&self) -> Course {
        let config = PhysicsConfig::REFERENCE;
        match (&self.track, &self.price_samples) {
            (Some(samples), _) => {
                Course::new(Track::from_samples(samples.clone()), self.seed, &config)
            }
            (None, Some(prices)) => {
                Course::generate(prices, self.seed, &config).expect("fixture chart must be usable")
            }
            (None, None) => panic!("fixture has neither track nor price samples"),
        }
    }

    fn claim(&self) -> RaceOutcome {
        self.submission.claim()
    }
}

fn load(path: &str) -> Fixture {
    let full = format!("../{path}");
    let text =
        fs::read_to_string(&full).unwrap_or_else(|err| panic!("failed reading {full}: {err}"));
    serde_json::from_str(&text).unwrap_or_else(|err| panic!("failed parsing {full}: {err}"))
}

#[test]
fn flat_throttle_golden() {
    let fixture = load("test-fixtures/flat-throttle.json");
    let course = fixture.course();
    let trace = &fixture.submission.input_trace;

    assert_eq!(trace.len(), 600);
    assert_eq!(course.coins().len(), 27);
    assert_eq!(
        trace.hash(),
        "5a60c218cd82c209dcc4489eb29409dad43ce002dae78812784163066ba33602"
    );

    let verification =
        verify_submission(&course, trace, &fixture.claim(), &VerifierConfig::default());
    assert_eq!(verification.verdict, Verdict::Accepted);
    let verified = verification.verified.expect("accepted run has an outcome");
    assert_eq!(verified.finish_time_ms, 7_133);
    assert_eq!(verified.coins_collected, 17);
}

#[test]
fn staircase_mixed_golden() {
    let fixture = load("test-fixtures/staircase-mixed.json");
    let course = fixture.course();
    let trace = &fixture.submission.input_trace;

    assert_eq!(
        trace.hash(),
        "bd146473e3c1b4c01acc8a50b78e08cf5531ea77dc8738c1601d3a5dc7c52292"
    );
    let samples = course.track().samples();
    assert_eq!(samples[24], 0.3968505859375);
    assert_eq!(samples[500], 0.5532684326171875);
    assert_eq!(samples[999], 0.6769866943359375);

    let verification =
        verify_submission(&course, trace, &fixture.claim(), &VerifierConfig::default());
    assert_eq!(verification.verdict, Verdict::Accepted);
    let verified = verification.verified.expect("accepted run has an outcome");
    assert_eq!(verified.finish_time_ms, 10_433);
    assert_eq!(verified.coins_collected, 16);
}

#[test]
fn resubmission_reproduces_outcome() {
    let fixture = load("test-fixtures/staircase-mixed.json");
    let config = VerifierConfig::default();
    let first = verify_submission(
        &fixture.course(),
        &fixture.submission.input_trace,
        &fixture.claim(),
        &config,
    );
    let second = verify_submission(
        &fixture.course(),
        &fixture.submission.input_trace,
        &fixture.claim(),
        &config,
    );
    assert_eq!(first, second);
}

#[test]
fn flipping_one_input_after_hashing_is_tampering() {
    let fixture = load("test-fixtures/flat-throttle.json");
    let course = fixture.course();
    let mut frames = fixture.submission.input_trace.frames().to_vec();
    frames[200].rotate = 1.0;
    let tampered = InputTrace::new(frames);

    let verification =
        verify_submission(&course, &tampered, &fixture.claim(), &VerifierConfig::default());
    assert_eq!(
        verification.verdict,
        Verdict::Rejected(RejectReason::TraceTampered)
    );
}

#[test]
fn coins_come_from_the_race_seed() {
    let fixture = load("test-fixtures/flat-throttle.json");
    let config = PhysicsConfig::REFERENCE;
    let other_seed = Course::new(
        Track::from_samples(fixture.track.clone().expect("flat fixture carries its track")),
        fixture.seed ^ 1,
        &config,
    );

    let verification = verify_submission(
        &other_seed,
        &fixture.submission.input_trace,
        &fixture.claim(),
        &VerifierConfig::default(),
    );
    assert_eq!(
        verification.verdict,
        Verdict::Rejected(RejectReason::OutcomeMismatch)
    );
    let verified = verification.verified.expect("replay still finished");
    assert_eq!(verified.finish_time_ms, 7_133);
    assert_eq!(verified.coins_collected, 21);
}

#[test]
fn inflated_claims_are_rejected() {
    let fixture = load("test-fixtures/staircase-mixed.json");
    let course = fixture.course();
    let config = VerifierConfig::default();

    let mut faster = fixture.claim();
    faster.finish_time_ms -= 100;
    let trace = &fixture.submission.input_trace;
    let verification = verify_submission(&course, trace, &faster, &config);
    assert_eq!(
        verification.verdict,
        Verdict::Rejected(RejectReason::OutcomeMismatch)
    );

    let mut richer = fixture.claim();
    richer.coins_collected += 1;
    let verification = verify_submission(&course, trace, &richer, &config);
    assert_eq!(
        verification.verdict,
        Verdict::Rejected(RejectReason::OutcomeMismatch)
    );
}
