//! Q16.16 fixed-point helpers shared by the kinematic model and the track
//! sampler.
//!
//! Lengths are metres scaled by 65536 and angles are binary angle units with
//! 65536 units per full turn. Every operation here is integer-only so client
//! and server agree bit for bit.

/// 1.0 in Q16.16.
pub const FX_ONE: i32 = 1 << 16;

/// Binary angle units per full turn.
pub const ANGLE_FULL_TURN: i32 = 1 << 16;
pub const ANGLE_QUARTER_TURN: i32 = ANGLE_FULL_TURN / 4;
pub const ANGLE_HALF_TURN: i32 = ANGLE_FULL_TURN / 2;

/// Angle units per radian, rounded: 65536 / (2 * pi).
pub const ANGLE_UNITS_PER_RADIAN: i64 = 10_430;

/// sin(k * pi / 512) in Q16.16 for k in 0..=256 (one quarter wave).
#[rustfmt::skip]
const SIN_QUARTER: [i32; 257] = [
    0, 402, 804, 1206, 1608, 2010, 2412, 2814,
    3216, 3617, 4019, 4420, 4821, 5222, 5623, 6023,
    6424, 6824, 7224, 7623, 8022, 8421, 8820, 9218,
    9616, 10014, 10411, 10808, 11204, 11600, 11996, 12391,
    12785, 13180, 13573, 13966, 14359, 14751, 15143, 15534,
    15924, 16314, 16703, 17091, 17479, 17867, 18253, 18639,
    19024, 19409, 19792, 20175, 20557, 20939, 21320, 21699,
    22078, 22457, 22834, 23210, 23586, 23961, 24335, 24708,
    25080, 25451, 25821, 26190, 26558, 26925, 27291, 27656,
    28020, 28383, 28745, 29106, 29466, 29824, 30182, 30538,
    30893, 31248, 31600, 31952, 32303, 32652, 33000, 33347,
    33692, 34037, 34380, 34721, 35062, 35401, 35738, 36075,
    36410, 36744, 37076, 37407, 37736, 38064, 38391, 38716,
    39040, 39362, 39683, 40002, 40320, 40636, 40951, 41264,
    41576, 41886, 42194, 42501, 42806, 43110, 43412, 43713,
    44011, 44308, 44604, 44898, 45190, 45480, 45769, 46056,
    46341, 46624, 46906, 47186, 47464, 47741, 48015, 48288,
    48559, 48828, 49095, 49361, 49624, 49886, 50146, 50404,
    50660, 50914, 51166, 51417, 51665, 51911, 52156, 52398,
    52639, 52878, 53114, 53349, 53581, 53812, 54040, 54267,
    54491, 54714, 54934, 55152, 55368, 55582, 55794, 56004,
    56212, 56418, 56621, 56823, 57022, 57219, 57414, 57607,
    57798, 57986, 58172, 58356, 58538, 58718, 58896, 59071,
    59244, 59415, 59583, 59750, 59914, 60075, 60235, 60392,
    60547, 60700, 60851, 60999, 61145, 61288, 61429, 61568,
    61705, 61839, 61971, 62101, 62228, 62353, 62476, 62596,
    62714, 62830, 62943, 63054, 63162, 63268, 63372, 63473,
    63572, 63668, 63763, 63854, 63944, 64031, 64115, 64197,
    64277, 64354, 64429, 64501, 64571, 64639, 64704, 64766,
    64827, 64884, 64940, 64993, 65043, 65091, 65137, 65180,
    65220, 65259, 65294, 65328, 65358, 65387, 65413, 65436,
    65457, 65476, 65492, 65505, 65516, 65525, 65531, 65535,
    65536,
];

#[inline]
pub fn mul(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 16) as i32
}

/// `a / b` in Q16.16, truncating toward zero. `b` must be non-zero.
#[inline]
pub fn div(a: i32, b: i32) -> i32 {
    (((a as i64) << 16) / b as i64) as i32
}

#[inline]
pub fn clamp(value: i32, min: i32, max: i32) -> i32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Quantize a control or height value to Q16.16 after clamping it to
/// `[min, max]`. NaN maps to zero.
///
/// Scaling by 2^16 and `round` are exact in IEEE-754, so the result does not
/// depend on the platform.
pub fn quantize(value: f64, min: f64, max: f64) -> i32 {
    (clamp_control(value, min, max) * FX_ONE as f64).round() as i32
}

/// Clamp a raw control axis to its legal range. NaN reads as released.
pub fn clamp_control(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, max)
    }
}

/// Floor of the square root of `value`.
pub fn isqrt_u64(value: u64) -> u64 {
    if value < 2 {
        return value;
    }

    let mut x = value;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + value / x) / 2;
    }
    x
}

/// Length of a Q16.16 vector, in Q16.16.
pub fn length(x: i32, y: i32) -> i32 {
    let sq = (x as i64 * x as i64) as u64 + (y as i64 * y as i64) as u64;
    isqrt_u64(sq).min(i32::MAX as u64) as i32
}

/// Wrap an angle to `[-half turn, half turn)`.
#[inline]
pub fn wrap_angle(angle: i32) -> i32 {
    ((angle.wrapping_add(ANGLE_HALF_TURN)) & (ANGLE_FULL_TURN - 1)) - ANGLE_HALF_TURN
}

fn quarter_wave(pos: i32) -> i32 {
    let idx = (pos >> 6) as usize;
    let frac = pos & 0x3F;
    if frac == 0 {
        return SIN_QUARTER[idx];
    }
    let lo = SIN_QUARTER[idx];
    let hi = SIN_QUARTER[idx + 1];
    lo + (((hi - lo) * frac) >> 6)
}

/// Sine of a binary angle, Q16.16.
pub fn sin(angle: i32) -> i32 {
    let a = angle & (ANGLE_FULL_TURN - 1);
    let quadrant = a >> 14;
    let mut pos = a & (ANGLE_QUARTER_TURN - 1);
    if quadrant & 1 == 1 {
        pos = ANGLE_QUARTER_TURN - pos;
    }
    let value = quarter_wave(pos);
    if quadrant >= 2 {
        -value
    } else {
        value
    }
}

/// Cosine of a binary angle, Q16.16.
#[inline]
pub fn cos(angle: i32) -> i32 {
    sin(angle.wrapping_add(ANGLE_QUARTER_TURN))
}
