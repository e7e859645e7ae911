//! NSE market session window.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc};

/// IST is a fixed +05:30 offset with no daylight saving.
fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("static offset is valid")
}

/// True while the NSE equity session is open: weekdays 9:15–15:30 IST.
/// Exchange holidays are not modeled; an order placed on a holiday just
/// waits for the next session.
pub fn is_market_hours(now: DateTime<Utc>) -> bool {
    let ist = now.with_timezone(&ist_offset());
    if ist.weekday().number_from_monday() > 5 {
        return false;
    }

    let time = ist.time();
    let open = NaiveTime::from_hms_opt(9, 15, 0).expect("static time is valid");
    let close = NaiveTime::from_hms_opt(15, 30, 0).expect("static time is valid");
    time >= open && time <= close
}

/// Convenience wrapper over the current wall clock.
pub fn is_market_open_now() -> bool {
    is_market_hours(Utc::now())
}
