//! Shift-cycle derivation
//!
//! Every crew works the same repeating 9-day pattern, anchored at a per-crew
//! start date. A date's shift is a pure function of the whole-day distance
//! from that anchor — no state, no I/O.

use chrono::NaiveDate;

use crate::types::{Crew, ShiftCycleInfo, ShiftType};

/// Days in one full rotation.
pub const CYCLE_LENGTH: usize = 9;

/// The repeating pattern shared by all crews: three earlies, three lates,
/// three days off.
pub const SHIFT_PATTERN: [ShiftType; CYCLE_LENGTH] = [
    ShiftType::Early,
    ShiftType::Early,
    ShiftType::Early,
    ShiftType::Late,
    ShiftType::Late,
    ShiftType::Late,
    ShiftType::Off,
    ShiftType::Off,
    ShiftType::Off,
];

/// Locate `date` within `crew`'s cycle.
///
/// Dates before the anchor are valid: the day index uses a non-negative
/// modulo so the pattern extends backwards without interruption, and the
/// cycle number goes to zero and below.
pub fn shift_cycle_info(date: NaiveDate, crew: Crew) -> ShiftCycleInfo {
    let config = crew.config();
    let length = config.cycle_length as i64;

    // NaiveDate subtraction is date-only arithmetic: whole calendar days,
    // independent of time zone and DST transitions.
    let days_since_start = (date - config.cycle_start).num_days();

    let day_in_cycle = days_since_start.rem_euclid(length) as usize + 1;
    let cycle_number = days_since_start.div_euclid(length) + 1;
    let shift_type = SHIFT_PATTERN[day_in_cycle - 1];

    ShiftCycleInfo {
        day_in_cycle,
        cycle_number,
        shift_type,
    }
}

/// The base shift type for `date` and `crew`, before any user override.
pub fn shift_for_date(date: NaiveDate, crew: Crew) -> ShiftType {
    shift_cycle_info(date, crew).shift_type
}
