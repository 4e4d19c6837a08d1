use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;

const TIMEZONE_ENV_VAR: &str =
  "SALESLOG_TIMEZONE";

/// Timezone used to decide which
/// calendar day a task falls on.
pub fn display_timezone() -> &'static Tz
{
  static DISPLAY_TZ: OnceLock<Tz> =
    OnceLock::new();
  DISPLAY_TZ.get_or_init(
    resolve_display_timezone
  )
}

#[must_use]
pub fn to_display_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(display_timezone())
    .date_naive()
}

/// `dd/mm/yyyy`, zero padded.
#[must_use]
pub fn format_day(
  dt: DateTime<Utc>
) -> String {
  to_display_date(dt)
    .format("%d/%m/%Y")
    .to_string()
}

/// Twelve-hour clock, e.g. `02:30 PM`.
#[must_use]
pub fn format_clock(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(display_timezone())
    .format("%I:%M %p")
    .to_string()
}

fn resolve_display_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }
  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "resolved display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn to_utc_from_display_local(
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match display_timezone()
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in configured \
         timezone: {context}"
      ))
    }
  }
}

/// Parses a calendar day typed by the
/// user into local midnight.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_input(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token =
    input.trim().to_ascii_lowercase();
  let today = to_display_date(now);

  let day = match token.as_str() {
    | "today" => today,
    | "tomorrow" => {
      today + Duration::days(1)
    }
    | "yesterday" => {
      today - Duration::days(1)
    }
    | other => NaiveDate::parse_from_str(
      other, "%Y-%m-%d"
    )
    .or_else(|_| {
      NaiveDate::parse_from_str(
        other, "%d/%m/%Y"
      )
    })
    .map_err(|_| {
      anyhow!(
        "unrecognized date '{input}'; \
         expected YYYY-MM-DD, \
         DD/MM/YYYY or today"
      )
    })?
  };

  to_utc_from_display_local(
    day.and_time(NaiveTime::MIN),
    input
  )
}

/// Parses a clock time and places it on
/// the calendar day of `day`.
#[tracing::instrument(skip(day), fields(input = input))]
pub fn parse_time_input(
  input: &str,
  day: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let (hour, minute) =
    parse_clock_time(input)
      .ok_or_else(|| {
        anyhow!(
          "unrecognized time \
           '{input}'; expected HH:MM \
           or h:mm am/pm"
        )
      })?;
  let clock =
    NaiveTime::from_hms_opt(
      hour, minute, 0
    )
    .ok_or_else(|| {
      anyhow!("invalid time '{input}'")
    })?;

  to_utc_from_display_local(
    to_display_date(day)
      .and_time(clock),
    input
  )
}

/// Keeps the display-local clock of
/// `time` and moves it onto the
/// calendar day of `day`.
pub fn move_to_day(
  time: DateTime<Utc>,
  day: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let clock = time
    .with_timezone(display_timezone())
    .time();
  to_utc_from_display_local(
    to_display_date(day)
      .and_time(clock),
    "moved time of day"
  )
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  static CLOCK_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  let clock_re = CLOCK_RE
    .get_or_init(|| {
      Regex::new(
        r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]\.?m\.?)?$",
      )
      .ok()
    })
    .as_ref()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    let ampm = ampm_match
      .as_str()
      .replace('.', "")
      .to_ascii_lowercase();
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm.as_str() {
      | "am" => raw_hour % 12,
      | "pm" => raw_hour % 12 + 12,
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    format_clock,
    format_day,
    move_to_day,
    parse_date_input,
    parse_time_input
  };

  #[test]
  fn formats_day_zero_padded() {
    let dt = Utc
      .with_ymd_and_hms(
        2024, 1, 5, 9, 0, 0
      )
      .single()
      .expect("valid date");
    assert_eq!(
      format_day(dt),
      "05/01/2024"
    );
    assert_eq!(
      format_clock(dt),
      "09:00 AM"
    );
  }

  #[test]
  fn parses_iso_and_day_first_dates() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let iso =
      parse_date_input("2024-01-05", now)
        .expect("parse iso");
    let dmy =
      parse_date_input("05/01/2024", now)
        .expect("parse dmy");
    assert_eq!(iso, dmy);
    assert_eq!(
      format_day(iso),
      "05/01/2024"
    );
    assert_eq!(
      format_day(
        parse_date_input("tomorrow", now)
          .expect("parse tomorrow")
      ),
      "18/02/2026"
    );
    assert!(
      parse_date_input("next week", now)
        .is_err()
    );
  }

  #[test]
  fn parses_twelve_and_twenty_four_hour_times()
   {
    let day = Utc
      .with_ymd_and_hms(
        2024, 1, 5, 0, 0, 0
      )
      .single()
      .expect("valid day");
    let pm = parse_time_input(
      "2:30 pm", day
    )
    .expect("parse pm");
    let plain =
      parse_time_input("14:30", day)
        .expect("parse 24h");
    assert_eq!(pm, plain);
    assert_eq!(
      format_clock(pm),
      "02:30 PM"
    );
    let midnight =
      parse_time_input("12:05 AM", day)
        .expect("parse midnight");
    assert_eq!(
      format_clock(midnight),
      "12:05 AM"
    );
    assert!(
      parse_time_input("25:00", day)
        .is_err()
    );
  }

  #[test]
  fn moving_time_keeps_clock_on_new_day()
  {
    let time = Utc
      .with_ymd_and_hms(
        2024, 1, 5, 14, 30, 0
      )
      .single()
      .expect("valid time");
    let day = Utc
      .with_ymd_and_hms(
        2024, 2, 9, 0, 0, 0
      )
      .single()
      .expect("valid day");
    let moved = move_to_day(time, day)
      .expect("move");
    assert_eq!(
      moved,
      Utc
        .with_ymd_and_hms(
          2024, 2, 9, 14, 30, 0
        )
        .single()
        .expect("expected")
    );
  }
}
