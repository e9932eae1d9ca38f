//! # Reminder Schedule Builder
//!
//! Turns a reminder request into the cron service's schedule object.
//! Pure: no I/O, no clock reads. The caller owns persistence and job
//! registration.

use chrono::{Datelike, NaiveDate};
use shared::{CreateReminderRequest, Frequency, ScheduleDescriptor, Slot};

/// Every reminder job runs in this timezone
pub const SCHEDULE_TIMEZONE: &str = "Europe/Prague";

/// `expiresAt` value meaning the job never expires
pub const NEVER_EXPIRES: i64 = 0;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Missing {0}")]
    MissingField(&'static str),
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("Invalid {field}: {value} (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },
}

/// Validated reminder fields, ready to be stored and scheduled
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderSpec {
    pub text: String,
    pub hour: u32,
    pub minute: u32,
    pub date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub frequency: Frequency,
    pub weekdays: Option<Vec<u32>>,
}

impl ReminderSpec {
    /// Validate a raw request. Presence is checked first, in field order,
    /// then frequency, then ranges, then dates.
    pub fn parse(request: &CreateReminderRequest) -> Result<Self, ScheduleError> {
        let text = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ScheduleError::MissingField("text"))?;
        let hour = request.hour.ok_or(ScheduleError::MissingField("hour"))?;
        let minute = request.minute.ok_or(ScheduleError::MissingField("minute"))?;
        let date = request
            .date
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or(ScheduleError::MissingField("date"))?;
        let frequency = request
            .frequency
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or(ScheduleError::MissingField("frequency"))?;

        let frequency: Frequency = frequency
            .parse()
            .map_err(|e: shared::UnknownFrequency| ScheduleError::InvalidFrequency(e.0))?;

        let hour = in_range("hour", hour, 23)?;
        let minute = in_range("minute", minute, 59)?;
        let weekdays = match &request.weekdays {
            Some(days) => Some(
                days.iter()
                    .map(|&d| in_range("weekdays", d, 6))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        let date = parse_date("date", date)?;
        let end_date = match request.end_date.as_deref().filter(|d| !d.is_empty()) {
            Some(raw) => Some(parse_date("endDate", raw)?),
            None => None,
        };

        Ok(Self {
            text: text.to_string(),
            hour,
            minute,
            date,
            end_date,
            frequency,
            weekdays,
        })
    }

    /// Build the cron schedule for this reminder
    pub fn descriptor(&self) -> ScheduleDescriptor {
        let day = Slot::At(self.date.day());
        let month = Slot::At(self.date.month());

        let (month_days, months, weekdays) = match self.frequency {
            Frequency::Once => (vec![day], vec![month], vec![Slot::Any]),
            Frequency::Daily => (vec![Slot::Any], vec![Slot::Any], vec![Slot::Any]),
            Frequency::Weekly => {
                let weekdays = match self.weekdays.as_deref() {
                    Some(days) if !days.is_empty() => days.iter().copied().map(Slot::At).collect(),
                    _ => vec![Slot::At(self.date.weekday().num_days_from_sunday())],
                };
                (vec![Slot::Any], vec![Slot::Any], weekdays)
            }
            Frequency::Monthly => (vec![day], vec![Slot::Any], vec![Slot::Any]),
            Frequency::Yearly => (vec![day], vec![month], vec![Slot::Any]),
        };

        // One-off jobs ignore endDate
        let expires_at = match self.end_date {
            Some(end) if self.frequency.is_recurring() => encode_expiration(end),
            _ => NEVER_EXPIRES,
        };

        ScheduleDescriptor {
            timezone: SCHEDULE_TIMEZONE.to_string(),
            expires_at,
            hours: vec![Slot::At(self.hour)],
            minutes: vec![Slot::At(self.minute)],
            month_days,
            months,
            weekdays,
        }
    }
}

/// Validate a request and build its cron schedule in one step
pub fn build(request: &CreateReminderRequest) -> Result<ScheduleDescriptor, ScheduleError> {
    ReminderSpec::parse(request).map(|spec| spec.descriptor())
}

/// Encode the last second of `date` as the integer YYYYMMDDhhmmss.
/// A reminder expiring "on" a date keeps firing for that whole day.
pub fn encode_expiration(date: NaiveDate) -> i64 {
    // 23:59:59.999 local; milliseconds are not part of the encoding
    let (hour, minute, second) = (23_i64, 59_i64, 59_i64);
    let ymd = i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day());
    ymd * 1_000_000 + hour * 10_000 + minute * 100 + second
}

fn in_range(field: &'static str, value: i64, max: i64) -> Result<u32, ScheduleError> {
    if (0..=max).contains(&value) {
        Ok(value as u32)
    } else {
        Err(ScheduleError::OutOfRange { field, value })
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ScheduleError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| ScheduleError::InvalidDate {
        field,
        value: value.to_string(),
    })
}
