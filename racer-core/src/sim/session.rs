use serde::{Deserialize, Serialize};

use super::{step, Controls, VehicleState};
use crate::coins::CoinTracker;
use crate::config::PhysicsConfig;
use crate::course::Course;
use crate::trace::InputTrace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RaceProgress {
    Running,
    Finished { ticks: u32 },
    Crashed { ticks: u32 },
}

/// One race attempt on one course: vehicle, coin pickups, finish line.
///
/// Frames fed after the race has ended are ignored.
#[derive(Clone, Debug)]
pub struct RaceSession<'a> {
    course: &'a Course,
    config: PhysicsConfig,
    state: VehicleState,
    coins: CoinTracker,
    ticks: u32,
    finish_x: i32,
    progress: RaceProgress,
}

impl<'a> RaceSession<'a> {
    pub fn new(course: &'a Course, config: &PhysicsConfig) -> Self {
        let track = course.track();
        Self {
            course,
            config: *config,
            state: VehicleState::start(track, config),
            coins: CoinTracker::new(course.coins()),
            ticks: 0,
            finish_x: track.length(config) - config.finish_margin,
            progress: RaceProgress::Running,
        }
    }

    pub fn step(&mut self, controls: Controls) -> RaceProgress {
        if self.progress != RaceProgress::Running {
            return self.progress;
        }

        self.state = step(&self.state, controls, self.course.track(), &self.config);
        self.ticks += 1;
        self.coins.collect_near(
            self.course.coins(),
            self.state.x,
            self.state.y,
            self.config.coin_radius,
        );

        if self.state.x >= self.finish_x {
            self.progress = RaceProgress::Finished { ticks: self.ticks };
        } else if self.state.crashed {
            self.progress = RaceProgress::Crashed { ticks: self.ticks };
        }
        self.progress
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn progress(&self) -> RaceProgress {
        self.progress
    }

    pub fn is_over(&self) -> bool {
        self.progress != RaceProgress::Running
    }

    pub fn coins_collected(&self) -> u32 {
        self.coins.count()
    }

    pub fn finish_time_ms(&self) -> Option<u64> {
        match self.progress {
            RaceProgress::Finished { ticks } => Some(self.config.ticks_to_ms(ticks)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub progress: RaceProgress,
    pub finish_time_ms: Option<u64>,
    pub coins_collected: u32,
    pub frames_consumed: u32,
    pub final_state: VehicleState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCheckpoint {
    pub tick: u32,
    pub coins_collected: u32,
    pub state: VehicleState,
}

/// Feed `trace` frame by frame until the race ends or the frames run out.
pub fn replay(course: &Course, trace: &InputTrace, config: &PhysicsConfig) -> ReplayOutcome {
    let mut session = RaceSession::new(course, config);
    for frame in trace.frames() {
        if session.step(Controls::from_frame(frame)) != RaceProgress::Running {
            break;
        }
    }

    ReplayOutcome {
        progress: session.progress(),
        finish_time_ms: session.finish_time_ms(),
        coins_collected: session.coins_collected(),
        frames_consumed: session.ticks(),
        final_state: *session.state(),
    }
}

/// Replay and snapshot the session every `interval` ticks, plus the start
/// and the final tick.
pub fn replay_with_checkpoints(
    course: &Course,
    trace: &InputTrace,
    config: &PhysicsConfig,
    interval: u32,
) -> Vec<ReplayCheckpoint> {
    let interval = interval.max(1);
    let mut session = RaceSession::new(course, config);
    let snapshot = |session: &RaceSession<'_>| ReplayCheckpoint {
        tick: session.ticks(),
        coins_collected: session.coins_collected(),
        state: *session.state(),
    };

    let mut checkpoints = vec![snapshot(&session)];
    for frame in trace.frames() {
        session.step(Controls::from_frame(frame));
        if session.ticks() % interval == 0 || session.is_over() {
            checkpoints.push(snapshot(&session));
        }
        if session.is_over() {
            break;
        }
    }

    if checkpoints.last().map(|last| last.tick) != Some(session.ticks()) {
        checkpoints.push(snapshot(&session));
    }
    checkpoints
}
