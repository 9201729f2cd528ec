//! Deterministic replay verification for head-to-head races.
//!
//! A client drives the kinematic model live while recording its inputs; the
//! server regenerates the course from the race seed, replays the trace and
//! only then lets the arbiter settle the race.

pub mod arbiter;
pub mod coins;
pub mod config;
pub mod constants;
pub mod course;
pub mod error;
pub mod fixed_point;
pub mod recorder;
pub mod rng;
pub mod sim;
pub mod trace;
pub mod track;
pub mod verify;

pub use arbiter::{decide, Decision, PlayerResult, Race, RaceStatus, Settlement};
pub use config::PhysicsConfig;
pub use course::Course;
pub use error::{ArbiterError, RecorderError, TraceError, TrackError};
pub use recorder::{LiveRace, TraceRecorder};
pub use trace::{InputFrame, InputTrace};
pub use track::{generate_track, Track};
pub use verify::{
    verify_submission, RaceOutcome, RejectReason, ResultSubmission, Verdict, Verification,
    VerifierConfig,
};
