/// Fixed simulation rate. One recorded input frame per step.
pub const STEP_HZ: u32 = 60;

/// Height samples emitted by the track generator.
pub const TRACK_SAMPLE_COUNT: usize = 1_000;
/// Leading samples levelled so every race starts on flat ground.
pub const START_FLAT_SAMPLES: usize = 24;
/// Track jitter amplitude on the 1/65536 height grid (0.01).
pub const TRACK_JITTER_Q16: i32 = 655;

pub const COIN_SLOT_SPACING: usize = 20;
pub const COIN_STREAM_SALT: u32 = 0xC01C_0FFE;
/// A slot holds a coin when `next() % 8` falls below this.
pub const COIN_PRESENCE_EIGHTHS: u32 = 5;
/// 0.6 m in Q16.16.
pub const COIN_MIN_HOVER: i32 = 39_322;
/// Hover heights span one metre above the minimum.
pub const COIN_HOVER_SPAN: u32 = 65_536;

pub const TRACE_MAGIC: [u8; 4] = *b"SRTR";
pub const TRACE_VERSION: u8 = 1;
pub const TRACE_HEADER_SIZE: usize = 12;
pub const TRACE_FRAME_SIZE: usize = 32;

/// Five minutes at the fixed rate.
pub const MAX_FRAMES_DEFAULT: u32 = 18_000;
/// Three steps at 60 Hz.
pub const FINISH_TOLERANCE_MS_DEFAULT: u64 = 50;

pub const PHYSICS_VERSION: u16 = 1;
