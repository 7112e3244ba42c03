//! Exact rational durations.
//!
//! Note durations are specified in the notation as small fractions of one
//! base note (quarter, eighth, dotted variants, tuplet subdivisions...).
//! Representing them as `f64` would let rounding error accumulate across a
//! whole gongan of additions; `Fraction` keeps everything exact until the
//! MIDI emitter converts to integer ticks at the very end of the pipeline.

use num_rational::Ratio;

pub type Fraction = Ratio<i64>;

pub const ZERO: Fraction = Ratio::new_raw(0, 1);
pub const ONE: Fraction = Ratio::new_raw(1, 1);

/// Builds a reduced fraction from a numerator/denominator pair.
pub fn frac(numerator: i64, denominator: i64) -> Fraction {
    Ratio::new(numerator, denominator)
}

/// Converts a fraction of one base note into MIDI ticks, rounding to the
/// nearest tick. `base_note_time` is the number of ticks assigned to one
/// base note (spec default: 24).
pub fn to_ticks(value: Fraction, base_note_time: u32) -> i64 {
    round_nearest(value * Ratio::from_integer(base_note_time as i64))
}

/// Rounds a fraction to the nearest integer (half rounds up), used
/// wherever an exact rational must become a count or a tick.
pub fn round_nearest(value: Fraction) -> i64 {
    let whole = value.trunc().to_integer();
    let remainder = value - Ratio::from_integer(whole);
    if remainder * Ratio::from_integer(2) >= ONE {
        whole + 1
    } else {
        whole
    }
}
