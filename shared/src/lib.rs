use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Request sent by the voice agent when an inbound call starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitCallRequest {
    /// Caller phone number as reported by the telephony provider
    pub caller_id: Option<String>,
}

/// Conversation bootstrap payload understood by the voice agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationInitiation {
    /// Always "conversation_initiation_client_data"
    #[serde(rename = "type")]
    pub kind: String,
    pub dynamic_variables: BTreeMap<String, String>,
    pub conversation_config_override: ConversationConfigOverride,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfigOverride {
    pub agent: AgentOverride,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOverride {
    /// First sentence the agent speaks
    pub first_message: String,
}

impl ConversationInitiation {
    pub const KIND: &'static str = "conversation_initiation_client_data";

    pub fn new(dynamic_variables: BTreeMap<String, String>, first_message: impl Into<String>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            dynamic_variables,
            conversation_config_override: ConversationConfigOverride {
                agent: AgentOverride {
                    first_message: first_message.into(),
                },
            },
        }
    }
}

/// Caller profile keyed by phone number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub phone_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    /// RFC 3339
    pub created_at: String,
    /// RFC 3339
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub caller_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub profile: Profile,
}

/// How often a reminder call repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Once => "once",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Frequency::Once)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = UnknownFrequency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(Frequency::Once),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(UnknownFrequency(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownFrequency(pub String);

impl fmt::Display for UnknownFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown frequency: {}", self.0)
    }
}

impl std::error::Error for UnknownFrequency {}

/// Lifecycle of a persisted reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    /// Stored, cron job not registered yet
    Pending,
    /// Cron job registered
    Scheduled,
    /// Cron job registration was rejected
    Failed,
    /// One-off reminder that has already fired
    Completed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Scheduled => "scheduled",
            ReminderStatus::Failed => "failed",
            ReminderStatus::Completed => "completed",
        }
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "scheduled" => Ok(ReminderStatus::Scheduled),
            "failed" => Ok(ReminderStatus::Failed),
            "completed" => Ok(ReminderStatus::Completed),
            _ => Err(format!("Invalid reminder status: {}", s)),
        }
    }
}

/// Reminder creation request. Every field is optional on the wire so that
/// missing fields can be reported by name instead of as a JSON error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateReminderRequest {
    pub caller_id: Option<String>,
    /// Message spoken during the call
    pub text: Option<String>,
    pub hour: Option<i64>,
    pub minute: Option<i64>,
    /// YYYY-MM-DD
    pub date: Option<String>,
    /// YYYY-MM-DD, only used by recurring reminders
    #[serde(rename = "endDate", alias = "end_date", default)]
    pub end_date: Option<String>,
    pub frequency: Option<String>,
    /// 0 = Sunday .. 6 = Saturday, weekly reminders only
    #[serde(default)]
    pub weekdays: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReminderResponse {
    pub success: bool,
    pub reminder_id: i64,
    pub cron_job_id: i64,
    pub schedule: ScheduleDescriptor,
}

/// Persisted reminder as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub phone_number: String,
    pub text: String,
    pub hour: u32,
    pub minute: u32,
    pub date: String,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub frequency: Frequency,
    pub weekdays: Option<Vec<u32>>,
    pub status: ReminderStatus,
    pub cron_job_id: Option<i64>,
    pub last_triggered_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderListResponse {
    pub reminders: Vec<Reminder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerReminderResponse {
    pub success: bool,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// One entry of a cron schedule field.
///
/// The cron service writes "any value" as `-1`; `Any` keeps that sentinel
/// out of the Rust side while still producing it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Any,
    At(u32),
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Slot::Any => serializer.serialize_i64(-1),
            Slot::At(value) => serializer.serialize_i64(i64::from(*value)),
        }
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        match raw {
            -1 => Ok(Slot::Any),
            v if v >= 0 && v <= i64::from(u32::MAX) => Ok(Slot::At(v as u32)),
            v => Err(serde::de::Error::custom(format!("invalid schedule value: {}", v))),
        }
    }
}

/// Recurrence descriptor in the cron service's job schedule format.
/// Month days and weekdays go out as `mdays`/`wdays`, the names cron-job.org expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    pub timezone: String,
    /// 0 means the job never expires, otherwise YYYYMMDDhhmmss
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    pub hours: Vec<Slot>,
    pub minutes: Vec<Slot>,
    #[serde(rename = "mdays")]
    pub month_days: Vec<Slot>,
    pub months: Vec<Slot>,
    #[serde(rename = "wdays")]
    pub weekdays: Vec<Slot>,
}
