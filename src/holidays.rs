//! Static bank-holiday table.
//!
//! Pre-populated for 2025–2026; dates outside that span are never holidays.
//! There is no dynamic holiday calculation.

use chrono::NaiveDate;

/// Irish bank holidays, ISO `YYYY-MM-DD`.
pub const BANK_HOLIDAYS: [&str; 20] = [
    "2025-01-01", // New Year's Day
    "2025-02-03", // St. Brigid's Day
    "2025-03-17", // St. Patrick's Day
    "2025-04-21", // Easter Monday
    "2025-05-05", // May Bank Holiday
    "2025-06-02", // June Bank Holiday
    "2025-08-04", // August Bank Holiday
    "2025-10-27", // October Bank Holiday
    "2025-12-25", // Christmas Day
    "2025-12-26", // St. Stephen's Day
    "2026-01-01", // New Year's Day
    "2026-02-02", // St. Brigid's Day
    "2026-03-17", // St. Patrick's Day
    "2026-04-06", // Easter Monday
    "2026-05-04", // May Bank Holiday
    "2026-06-01", // June Bank Holiday
    "2026-08-03", // August Bank Holiday
    "2026-10-26", // October Bank Holiday
    "2026-12-25", // Christmas Day
    "2026-12-26", // St. Stephen's Day
];

/// True iff `date` appears in the bank-holiday table.
pub fn is_holiday(date: NaiveDate) -> bool {
    let iso = date.format("%Y-%m-%d").to_string();
    BANK_HOLIDAYS.contains(&iso.as_str())
}
