use core::fmt;

use crate::arbiter::RaceStatus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackError {
    NoUsablePrices { provided: usize },
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUsablePrices { provided } => write!(
                f,
                "no finite positive price among {provided} samples"
            ),
        }
    }
}

impl std::error::Error for TrackError {}

/// Structural defects found before any replay runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceError {
    Empty,
    TooLong { frames: usize, max_frames: u32 },
    NonFinite { frame: usize },
    ControlOutOfRange { frame: usize },
    TimeNotIncreasing { frame: usize },
    TimeOffCadence { frame: usize },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "trace has no frames"),
            Self::TooLong { frames, max_frames } => {
                write!(f, "trace has {frames} frames (allowed 1..={max_frames})")
            }
            Self::NonFinite { frame } => write!(f, "non-finite value at frame {frame}"),
            Self::ControlOutOfRange { frame } => {
                write!(f, "control out of range at frame {frame}")
            }
            Self::TimeNotIncreasing { frame } => {
                write!(f, "timestamp does not increase at frame {frame}")
            }
            Self::TimeOffCadence { frame } => {
                write!(f, "timestamp off the fixed-step cadence at frame {frame}")
            }
        }
    }
}

impl std::error::Error for TraceError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderError {
    NotStopped,
    NotRecording,
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStopped => write!(f, "recorder must be stopped before hashing"),
            Self::NotRecording => write!(f, "recorder is not recording"),
        }
    }
}

impl std::error::Error for RecorderError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArbiterError {
    WrongStatus { expected: RaceStatus, actual: RaceStatus },
    SameWallet,
    UnknownPlayer { wallet: String },
    DuplicateSubmission { wallet: String },
    DeadlinePassed { deadline: u64, now: u64 },
}

impl fmt::Display for ArbiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongStatus { expected, actual } => {
                write!(f, "race is {actual}, expected {expected}")
            }
            Self::SameWallet => write!(f, "a wallet cannot race against itself"),
            Self::UnknownPlayer { wallet } => write!(f, "wallet {wallet} is not in this race"),
            Self::DuplicateSubmission { wallet } => {
                write!(f, "wallet {wallet} already submitted a result")
            }
            Self::DeadlinePassed { deadline, now } => {
                write!(f, "submission window closed at {deadline} (now {now})")
            }
        }
    }
}

impl std::error::Error for ArbiterError {}
