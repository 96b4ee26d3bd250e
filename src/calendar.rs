//! Business calendar in the outlet's fixed timezone.
//!
//! "Today", archive dates and scheduler fire times are all computed in the
//! configured local offset, independent of the host and database timezones.

use crate::error::{QueueError, QueueResult};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// One local calendar day expressed as a UTC half-open range `[starts_at, ends_at)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDay {
    pub date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl BusinessDay {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.starts_at && at < self.ends_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessCalendar {
    offset: FixedOffset,
    label: String,
}

impl BusinessCalendar {
    pub fn new(offset: FixedOffset, label: impl Into<String>) -> Self {
        Self {
            offset,
            label: label.into(),
        }
    }

    /// Build from an offset string such as `+08:00` or `-05:30`
    pub fn from_offset_str(offset: &str, label: impl Into<String>) -> QueueResult<Self> {
        Ok(Self::new(parse_utc_offset(offset)?, label))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn local(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset)
    }

    pub fn today(&self) -> BusinessDay {
        self.day_of(Utc::now())
    }

    pub fn day_of(&self, at: DateTime<Utc>) -> BusinessDay {
        self.day_for_date(self.local(at).date_naive())
    }

    pub fn day_for_date(&self, date: NaiveDate) -> BusinessDay {
        let starts_at = self.to_utc(date, NaiveTime::MIN);
        BusinessDay {
            date,
            starts_at,
            ends_at: starts_at + Duration::days(1),
        }
    }

    /// Next instant strictly after `now` at local `hour:minute`
    pub fn next_daily(&self, now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
        let time = local_time(hour, minute);
        let today = self.local(now).date_naive();
        let candidate = self.to_utc(today, time);
        if candidate > now {
            candidate
        } else {
            candidate + Duration::days(1)
        }
    }

    /// Next instant strictly after `now` on local `weekday` at `hour:00`
    pub fn next_weekly(&self, now: DateTime<Utc>, weekday: Weekday, hour: u32) -> DateTime<Utc> {
        let local_date = self.local(now).date_naive();
        let days_ahead = (7 + weekday.num_days_from_monday() as i64
            - local_date.weekday().num_days_from_monday() as i64)
            % 7;
        let candidate = self.to_utc(local_date + Duration::days(days_ahead), local_time(hour, 0));
        if candidate > now {
            candidate
        } else {
            candidate + Duration::days(7)
        }
    }

    fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        let utc = local - Duration::seconds(self.offset.local_minus_utc() as i64);
        DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc)
    }
}

fn local_time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Parse `+HH:MM` or `+HHMM` with chrono's offset parser
pub fn parse_utc_offset(raw: &str) -> QueueResult<FixedOffset> {
    raw.trim()
        .parse::<FixedOffset>()
        .map_err(|e| QueueError::Configuration(format!("Invalid UTC offset '{raw}': {e}")))
}
