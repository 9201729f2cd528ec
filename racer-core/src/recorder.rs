use tracing::{debug, warn};

use crate::config::PhysicsConfig;
use crate::course::Course;
use crate::error::RecorderError;
use crate::fixed_point::clamp_control;
use crate::sim::{Controls, RaceProgress, RaceSession};
use crate::trace::{InputFrame, InputTrace};
use crate::verify::RaceOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopped,
}

/// Samples controls once per fixed step during a live race.
#[derive(Clone, Debug)]
pub struct TraceRecorder {
    step_hz: u32,
    state: RecorderState,
    trace: InputTrace,
}

impl TraceRecorder {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            step_hz: config.step_hz,
            state: RecorderState::Idle,
            trace: InputTrace::default(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Begin a fresh trace. Starting while already recording keeps the
    /// current trace.
    pub fn start(&mut self) {
        if self.state == RecorderState::Recording {
            warn!(frames = self.trace.len(), "recorder already started");
            return;
        }
        self.trace.clear();
        self.state = RecorderState::Recording;
    }

    /// Append the controls held at this tick, clamped to their legal ranges.
    /// Returns the recorded frame.
    pub fn record_tick(&mut self, accelerate: f64, brake: f64, rotate: f64) -> Option<InputFrame> {
        if self.state != RecorderState::Recording {
            debug!(state = ?self.state, "tick ignored while not recording");
            return None;
        }

        let frame = InputFrame {
            time: self.trace.len() as f64 / self.step_hz as f64,
            accelerate: clamp_control(accelerate, 0.0, 1.0),
            brake: clamp_control(brake, 0.0, 1.0),
            rotate: clamp_control(rotate, -1.0, 1.0),
        };
        self.trace.push(frame);
        Some(frame)
    }

    pub fn stop(&mut self) -> Result<(), RecorderError> {
        match self.state {
            RecorderState::Recording => {
                self.state = RecorderState::Stopped;
                Ok(())
            }
            RecorderState::Stopped => Ok(()),
            RecorderState::Idle => Err(RecorderError::NotRecording),
        }
    }

    pub fn frames(&self) -> &[InputFrame] {
        self.trace.frames()
    }

    pub fn hash(&self) -> Result<String, RecorderError> {
        match self.state {
            RecorderState::Stopped => Ok(self.trace.hash()),
            _ => Err(RecorderError::NotStopped),
        }
    }

    pub fn into_trace(self) -> Result<InputTrace, RecorderError> {
        match self.state {
            RecorderState::Stopped => Ok(self.trace),
            _ => Err(RecorderError::NotStopped),
        }
    }
}

/// Client-side loop: each tick records the control snapshot and steps the
/// session with exactly that frame, so the trace replays the live run.
#[derive(Debug)]
pub struct LiveRace<'a> {
    recorder: TraceRecorder,
    session: RaceSession<'a>,
}

impl<'a> LiveRace<'a> {
    pub fn start(course: &'a Course, config: &PhysicsConfig) -> Self {
        let mut recorder = TraceRecorder::new(config);
        recorder.start();
        Self {
            recorder,
            session: RaceSession::new(course, config),
        }
    }

    pub fn tick(&mut self, accelerate: f64, brake: f64, rotate: f64) -> RaceProgress {
        if self.session.is_over() {
            return self.session.progress();
        }
        match self.recorder.record_tick(accelerate, brake, rotate) {
            Some(frame) => self.session.step(Controls::from_frame(&frame)),
            None => self.session.progress(),
        }
    }

    pub fn session(&self) -> &RaceSession<'a> {
        &self.session
    }

    /// Stop recording and produce the trace plus the claim to submit with
    /// it. The claim is `None` when the vehicle never crossed the line.
    pub fn finish(mut self) -> Result<(InputTrace, Option<RaceOutcome>), RecorderError> {
        self.recorder.stop()?;
        let input_hash = self.recorder.hash()?;
        let outcome = self
            .session
            .finish_time_ms()
            .map(|finish_time_ms| RaceOutcome {
                finish_time_ms,
                coins_collected: self.session.coins_collected(),
                input_hash,
            });
        Ok((self.recorder.into_trace()?, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Track;
    use crate::verify::{verify_submission, Verdict, VerifierConfig};

    #[test]
    fn lifecycle() {
        let mut recorder = TraceRecorder::new(&PhysicsConfig::REFERENCE);
        assert_eq!(recorder.record_tick(1.0, 0.0, 0.0), None);
        assert_eq!(recorder.hash(), Err(RecorderError::NotStopped));

        recorder.start();
        recorder.record_tick(1.0, 0.0, 0.0);
        recorder.record_tick(0.5, 0.0, 0.25);
        assert_eq!(recorder.hash(), Err(RecorderError::NotStopped));

        recorder.stop().unwrap();
        assert_eq!(recorder.state(), RecorderState::Stopped);
        assert_eq!(recorder.record_tick(1.0, 0.0, 0.0), None);
        let hash = recorder.hash().unwrap();

        let trace = recorder.into_trace().unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.frames()[1].time, 1.0 / 60.0);
        assert_eq!(trace.hash(), hash);
    }

    #[test]
    fn double_start_keeps_trace() {
        let mut recorder = TraceRecorder::new(&PhysicsConfig::REFERENCE);
        recorder.start();
        recorder.record_tick(1.0, 0.0, 0.0);
        recorder.start();
        assert_eq!(recorder.frames().len(), 1);
    }

    #[test]
    fn restart_after_stop_clears() {
        let mut recorder = TraceRecorder::new(&PhysicsConfig::REFERENCE);
        recorder.start();
        recorder.record_tick(1.0, 0.0, 0.0);
        recorder.stop().unwrap();
        recorder.start();
        assert!(recorder.frames().is_empty());
        assert_eq!(recorder.state(), RecorderState::Recording);
    }

    #[test]
    fn stop_before_start_fails() {
        let mut recorder = TraceRecorder::new(&PhysicsConfig::REFERENCE);
        assert_eq!(recorder.stop(), Err(RecorderError::NotRecording));
    }

    #[test]
    fn recorded_trace_is_valid() {
        let config = PhysicsConfig::REFERENCE;
        let mut recorder = TraceRecorder::new(&config);
        recorder.start();
        for i in 0..300 {
            recorder.record_tick(1.0, 0.0, if i % 2 == 0 { 0.5 } else { -0.5 });
        }
        recorder.stop().unwrap();
        let trace = recorder.into_trace().unwrap();
        assert_eq!(trace.validate(&config, 18_000), Ok(()));
    }

    #[test]
    fn raw_axes_are_clamped_when_recorded() {
        let mut recorder = TraceRecorder::new(&PhysicsConfig::REFERENCE);
        recorder.start();
        let frame = recorder.record_tick(1.0000001, f64::NAN, -3.5).unwrap();
        assert_eq!(
            (frame.accelerate, frame.brake, frame.rotate),
            (1.0, 0.0, -1.0)
        );
        let frame = recorder.record_tick(f64::INFINITY, -0.25, f64::NEG_INFINITY).unwrap();
        assert_eq!(
            (frame.accelerate, frame.brake, frame.rotate),
            (1.0, 0.0, -1.0)
        );
    }

    #[test]
    fn noisy_live_input_still_verifies() {
        let config = PhysicsConfig::REFERENCE;
        let course = Course::new(Track::flat(1_000, 0.5), 0x5EED_0001, &config);
        let mut live = LiveRace::start(&course, &config);
        for i in 0..600 {
            let rotate = if i % 7 == 0 { f64::NAN } else { -0.0 };
            live.tick(1.0000001, -0.0001, rotate);
        }

        let (trace, outcome) = live.finish().unwrap();
        let claim = outcome.expect("finished race has a claim");
        assert_eq!((claim.finish_time_ms, claim.coins_collected), (7_133, 17));
        assert_eq!(trace.validate(&config, 18_000), Ok(()));
        let verification = verify_submission(&course, &trace, &claim, &VerifierConfig::default());
        assert_eq!(verification.verdict, Verdict::Accepted);
    }

    #[test]
    fn live_race_stops_advancing_after_finish() {
        let config = PhysicsConfig::REFERENCE;
        let course = Course::new(Track::flat(1_000, 0.5), 0x5EED_0001, &config);
        let mut live = LiveRace::start(&course, &config);
        for _ in 0..600 {
            live.tick(1.0, 0.0, 0.0);
        }
        assert_eq!(live.session().progress(), RaceProgress::Finished { ticks: 428 });

        let (trace, outcome) = live.finish().unwrap();
        let outcome = outcome.expect("finished race has a claim");
        assert_eq!(trace.len(), 428);
        assert_eq!(outcome.finish_time_ms, 7_133);
        assert_eq!(outcome.coins_collected, 17);
        assert_eq!(outcome.input_hash, trace.hash());
    }
}
