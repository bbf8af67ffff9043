//! Time conversions shared by the record codec and schema engine.
//!
//! Every historical record format stores flow start time as milliseconds
//! past some hour boundary, packed into a handful of bits (12, sometimes
//! split across a coarse/fine pair). The schema engine, separately, needs
//! NTP-epoch (1900-based) conversion for `dateTimeSeconds`/`dateTimeMicro`
//! information elements. Both live here so the bias constant is defined
//! exactly once.

use crate::error::DtypError;
use time::OffsetDateTime;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch
/// (1970-01-01). Subtract this from an NTP seconds-since-1900 value to
/// get Unix seconds, and add it to go the other way.
pub const NTP_UNIX_BIAS_SECS: i64 = 0x83AA_7E80;

/// Converts an NTP 32-bit seconds-since-1900 value (with fractional
/// sub-second component already folded into `frac_ms`) to Unix
/// milliseconds since the epoch.
pub fn ntp_to_unix_ms(ntp_secs: u32, frac_ms: u32) -> i64 {
    (ntp_secs as i64 - NTP_UNIX_BIAS_SECS) * 1000 + frac_ms as i64
}

/// Converts Unix milliseconds since the epoch to an NTP
/// (seconds-since-1900, millisecond-remainder) pair.
pub fn unix_ms_to_ntp(unix_ms: i64) -> (u32, u32) {
    let secs = unix_ms.div_euclid(1000) + NTP_UNIX_BIAS_SECS;
    let frac_ms = unix_ms.rem_euclid(1000);
    (secs as u32, frac_ms as u32)
}

/// Milliseconds since the Unix epoch for `now`, used by callers that
/// stamp an invocation entry or annotation with a wall-clock time.
pub fn ms_since_epoch() -> i64 {
    let now = OffsetDateTime::now_utc();
    now.unix_timestamp() * 1000 + now.millisecond() as i64
}

/// Splits a Unix-epoch millisecond timestamp, relative to a given hour
/// boundary (also Unix-epoch milliseconds, itself a multiple of
/// 3_600_000), into a 12-bit whole-second offset into that hour and a
/// millisecond remainder. This matches the on-disk `sTime`/`sTime_msec`
/// pair used by the `Routed`, `NotRouted`, `Split`, and `Generic` record
/// families: 12 bits of whole seconds (0..=4095, comfortably covering
/// the 3600 seconds in an hour) plus a separate fractional-millisecond
/// field carried alongside it in the record layout.
///
/// Returns [`DtypError::TimeOutOfRange`] if `unix_ms` falls before
/// `hour_start_ms` or more than 4095 seconds past it.
pub fn hour_relative_secs_ms(hour_start_ms: i64, unix_ms: i64) -> Result<(u16, u16), DtypError> {
    let delta_ms = unix_ms - hour_start_ms;
    if delta_ms < 0 {
        return Err(DtypError::TimeOutOfRange(unix_ms));
    }
    let secs = delta_ms / 1000;
    if secs > 4095 {
        return Err(DtypError::TimeOutOfRange(unix_ms));
    }
    let msec = delta_ms % 1000;
    Ok((secs as u16, msec as u16))
}

/// Truncates a Unix-epoch millisecond timestamp down to its containing
/// hour boundary, also expressed as Unix-epoch milliseconds.
pub fn hour_boundary_ms(unix_ms: i64) -> i64 {
    const HOUR_MS: i64 = 3_600_000;
    unix_ms.div_euclid(HOUR_MS) * HOUR_MS
}
