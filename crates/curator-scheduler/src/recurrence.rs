use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use curator_core::{Repeat, Schedule, TimeUnit};

use crate::error::{Result, SchedulerError};

/// Registration-time validation. A rule that passes here can always be
/// evaluated; anything invalid is rejected before it reaches the tick loop.
pub fn validate(schedule: &Schedule) -> Result<()> {
    if !schedule.active {
        return Ok(());
    }
    match (&schedule.repeat, &schedule.at) {
        (Some(_), Some(_)) => Err(SchedulerError::InvalidSchedule(
            "active schedule sets both repeat and at".into(),
        )),
        (None, None) => Err(SchedulerError::InvalidSchedule(
            "active schedule sets neither repeat nor at".into(),
        )),
        (Some(repeat), None) => validate_repeat(repeat),
        (None, Some(_)) => Ok(()),
    }
}

fn validate_repeat(repeat: &Repeat) -> Result<()> {
    if repeat.interval == 0 {
        return Err(SchedulerError::InvalidSchedule(
            "repeat interval must be at least 1".into(),
        ));
    }
    if let Some(tod) = repeat.time_of_day {
        if tod.hour > 23 || tod.minute > 59 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "time of day {:02}:{:02} is out of range",
                tod.hour, tod.minute
            )));
        }
        if matches!(
            repeat.unit,
            TimeUnit::Second | TimeUnit::Minute | TimeUnit::Hour
        ) {
            return Err(SchedulerError::InvalidSchedule(
                "time of day requires a day, week, or month unit".into(),
            ));
        }
    }
    if repeat.weekday.is_some() && repeat.unit != TimeUnit::Week {
        return Err(SchedulerError::InvalidSchedule(
            "weekday target requires the week unit".into(),
        ));
    }
    if let Some(day) = repeat.day_of_month {
        if repeat.unit != TimeUnit::Month {
            return Err(SchedulerError::InvalidSchedule(
                "day of month target requires the month unit".into(),
            ));
        }
        if !(1..=31).contains(&day) {
            return Err(SchedulerError::InvalidSchedule(format!(
                "day of month {day} is out of range"
            )));
        }
    }
    Ok(())
}

/// First occurrence of `schedule`, computed at registration. The returned
/// instant becomes the entry's anchor: every later occurrence is congruent
/// to it.
///
/// Fixed-length repeats are due immediately (the next tick fires them);
/// wall-clock repeats wait for their first matching instant. Returns `None`
/// when the schedule is inactive or already exhausted.
pub fn first_occurrence(schedule: &Schedule, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    if !schedule.active {
        return None;
    }
    if let Some(at) = schedule.at {
        return (at > now).then_some(at);
    }
    let repeat = schedule.repeat.as_ref()?;
    if !uses_calendar(repeat) {
        return Some(now);
    }

    let local_now = now.with_timezone(&tz);
    let time = target_time(repeat, local_now.time())?;

    match repeat.unit {
        TimeUnit::Day => {
            let today = local_now.date_naive();
            let candidate = resolve_local(today, time, tz)?;
            if candidate > now {
                Some(candidate)
            } else {
                resolve_local(today.succ_opt()?, time, tz)
            }
        }
        TimeUnit::Week => {
            let today = local_now.date_naive();
            let target = repeat
                .weekday
                .map(|d| d.to_chrono())
                .unwrap_or_else(|| today.weekday());
            let ahead =
                (7 + i64::from(target.num_days_from_monday())
                    - i64::from(today.weekday().num_days_from_monday()))
                    % 7;
            let date = today.checked_add_signed(Duration::days(ahead))?;
            let candidate = resolve_local(date, time, tz)?;
            if candidate > now {
                Some(candidate)
            } else {
                resolve_local(date.checked_add_signed(Duration::days(7))?, time, tz)
            }
        }
        TimeUnit::Month => {
            let target_day = repeat
                .day_of_month
                .map(u32::from)
                .unwrap_or_else(|| local_now.day());
            let idx = month_index(local_now.year(), local_now.month());
            let candidate = month_candidate(idx, target_day, time, tz)?;
            if candidate > now {
                Some(candidate)
            } else {
                month_candidate(idx + 1, target_day, time, tz)
            }
        }
        _ => Some(now),
    }
}

/// Smallest occurrence strictly greater than `reference`, phase-locked to
/// `anchor`. Returns `None` once the rule is exhausted.
///
/// A long gap between `anchor` and `reference` yields exactly one next
/// instant, never a backlog of missed ones.
pub fn next_occurrence(
    schedule: &Schedule,
    anchor: DateTime<Utc>,
    reference: DateTime<Utc>,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    if !schedule.active {
        return None;
    }
    if let Some(at) = schedule.at {
        return (at > reference).then_some(at);
    }
    let repeat = schedule.repeat.as_ref()?;

    if !uses_calendar(repeat) {
        let step = i64::from(repeat.interval) * repeat.unit.fixed_seconds()?;
        if reference < anchor {
            return Some(anchor);
        }
        let k = (reference - anchor).num_seconds() / step + 1;
        return anchor.checked_add_signed(Duration::seconds(k * step));
    }

    let anchor_local = anchor.with_timezone(&tz);
    let time = target_time(repeat, anchor_local.time())?;
    let ref_date = reference.with_timezone(&tz).date_naive();

    match repeat.unit {
        TimeUnit::Day | TimeUnit::Week => {
            let step_days = i64::from(repeat.interval)
                * if repeat.unit == TimeUnit::Week { 7 } else { 1 };
            let anchor_date = anchor_local.date_naive();
            let elapsed = (ref_date - anchor_date).num_days();
            let mut k = if elapsed <= 0 { 0 } else { elapsed / step_days };
            loop {
                let date = anchor_date.checked_add_signed(Duration::days(k * step_days))?;
                let candidate = resolve_local(date, time, tz)?;
                if candidate > reference {
                    return Some(candidate);
                }
                k += 1;
            }
        }
        TimeUnit::Month => {
            // Clamp from the anchor's target day each step, so Jan 31 yields
            // Feb 28 and then Mar 31 again. Short months never shorten the
            // series permanently.
            let target_day = repeat
                .day_of_month
                .map(u32::from)
                .unwrap_or_else(|| anchor_local.day());
            let anchor_idx = month_index(anchor_local.year(), anchor_local.month());
            let elapsed = month_index(ref_date.year(), ref_date.month()) - anchor_idx;
            let interval = i64::from(repeat.interval);
            let mut k = if elapsed <= 0 { 0 } else { elapsed / interval };
            loop {
                let candidate = month_candidate(anchor_idx + k * interval, target_day, time, tz)?;
                if candidate > reference {
                    return Some(candidate);
                }
                k += 1;
            }
        }
        _ => None,
    }
}

/// Whether the rule steps by calendar coordinates instead of a fixed number
/// of seconds.
fn uses_calendar(repeat: &Repeat) -> bool {
    repeat.unit == TimeUnit::Month
        || repeat.time_of_day.is_some()
        || repeat.weekday.is_some()
        || repeat.day_of_month.is_some()
}

/// Wall-clock target: the explicit time of day when given, otherwise the
/// fallback (sub-second part stripped so the phase stays on whole seconds).
fn target_time(repeat: &Repeat, fallback: NaiveTime) -> Option<NaiveTime> {
    match repeat.time_of_day {
        Some(t) => NaiveTime::from_hms_opt(u32::from(t.hour), u32::from(t.minute), 0),
        None => fallback.with_nanosecond(0),
    }
}

/// Convert a civil date + time in `tz` to a UTC instant.
///
/// A DST fall-back repeats the wall-clock hour; the first occurrence wins.
/// A spring-forward gap removes it; the target is pushed past the gap.
fn resolve_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
            LocalResult::None => None,
        },
    }
}

fn month_index(year: i32, month: u32) -> i64 {
    i64::from(year) * 12 + i64::from(month) - 1
}

fn month_candidate(idx: i64, target_day: u32, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    let year = i32::try_from(idx.div_euclid(12)).ok()?;
    let month = (idx.rem_euclid(12) + 1) as u32;
    let day = target_day.min(days_in_month(year, month)?);
    resolve_local(NaiveDate::from_ymd_opt(year, month, day)?, time, tz)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Some(NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()?.day())
}
