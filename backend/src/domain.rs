use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use shared::{
    ConversationInitiation, CreateReminderRequest, CreateReminderResponse, Frequency, Profile,
    Reminder, ReminderStatus,
};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::{DbConnection, NewReminder, ProfileFields, ReminderUpdate};
use crate::schedule::{ReminderSpec, ScheduleError};
use crate::scheduler::{CronJob, CronJobClient, SchedulerError};
use crate::voice::{OutboundCall, OutboundCallResult, VoiceClient, VoiceError};

const NEW_CALLER_GREETING: &str = "Welcome, new user!";

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error(transparent)]
    Validation(#[from] ScheduleError),
    #[error("Reminder {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Voice(#[from] VoiceError),
}

/// Caller profiles and the greeting built from them
#[derive(Clone)]
pub struct ProfileService {
    db: DbConnection,
}

impl ProfileService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Conversation bootstrap for an inbound call. Unknown callers get a
    /// bare profile so later updates have something to attach to.
    pub async fn greet(&self, phone: &str) -> Result<ConversationInitiation> {
        let profile = match self.db.find_profile_by_phone(phone).await? {
            Some(profile) => profile,
            None => {
                info!("First call from {}, creating profile", phone);
                self.db.upsert_profile(phone, &ProfileFields::default()).await?
            }
        };

        let message = greeting_for(&profile);
        let mut variables = BTreeMap::new();
        variables.insert("caller_id".to_string(), phone.to_string());

        Ok(ConversationInitiation::new(variables, message))
    }

    pub async fn update_profile(&self, phone: &str, fields: &ProfileFields) -> Result<Profile> {
        info!("Updating profile for {}", phone);
        self.db.upsert_profile(phone, fields).await
    }
}

fn greeting_for(profile: &Profile) -> String {
    match profile.first_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!("Welcome back, {}!", name),
        _ => NEW_CALLER_GREETING.to_string(),
    }
}

/// Reminder lifecycle: store, register with the cron service, fire calls
#[derive(Clone)]
pub struct ReminderService {
    db: DbConnection,
    scheduler: CronJobClient,
    voice: VoiceClient,
    config: Arc<Config>,
}

impl ReminderService {
    pub fn new(
        db: DbConnection,
        scheduler: CronJobClient,
        voice: VoiceClient,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            scheduler,
            voice,
            config,
        }
    }

    /// Validate, persist, then register the cron job.
    ///
    /// Validation failures happen before any I/O. A registration failure
    /// leaves the stored reminder marked `failed`; nothing is retried.
    pub async fn create_reminder(
        &self,
        phone: &str,
        request: &CreateReminderRequest,
    ) -> Result<CreateReminderResponse, ReminderError> {
        let spec = ReminderSpec::parse(request)?;
        let schedule = spec.descriptor();

        let reminder_id = self
            .db
            .insert_reminder(&NewReminder {
                phone_number: phone.to_string(),
                text: spec.text.clone(),
                hour: spec.hour,
                minute: spec.minute,
                date: spec.date.format("%Y-%m-%d").to_string(),
                end_date: spec.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
                frequency: spec.frequency,
                weekdays: spec.weekdays.clone(),
            })
            .await?;

        info!(
            "Stored reminder {} ({}) for {}",
            reminder_id, spec.frequency, phone
        );

        let job = CronJob {
            title: format!("Reminder {} for {}", reminder_id, phone),
            url: self.config.trigger_url(reminder_id),
            headers: self.callback_headers(),
            schedule: schedule.clone(),
        };

        let cron_job_id = match self.scheduler.create_job(&job).await {
            Ok(job_id) => job_id,
            Err(e) => {
                error!("Failed to register cron job for reminder {}: {}", reminder_id, e);
                let marked = self
                    .db
                    .update_reminder(
                        reminder_id,
                        &ReminderUpdate {
                            status: Some(ReminderStatus::Failed),
                            ..Default::default()
                        },
                    )
                    .await;
                if let Err(mark_err) = marked {
                    error!("Failed to mark reminder {} as failed: {}", reminder_id, mark_err);
                }
                return Err(e.into());
            }
        };

        self.db
            .update_reminder(
                reminder_id,
                &ReminderUpdate {
                    status: Some(ReminderStatus::Scheduled),
                    cron_job_id: Some(cron_job_id),
                    ..Default::default()
                },
            )
            .await?;

        info!("Reminder {} scheduled as cron job {}", reminder_id, cron_job_id);

        Ok(CreateReminderResponse {
            success: true,
            reminder_id,
            cron_job_id,
            schedule,
        })
    }

    pub async fn list_reminders(&self, phone: &str) -> Result<Vec<Reminder>> {
        self.db.list_reminders(phone).await
    }

    /// Remove the cron job first so a failed removal keeps the row around
    pub async fn delete_reminder(&self, id: i64) -> Result<(), ReminderError> {
        let reminder = self
            .db
            .get_reminder(id)
            .await?
            .ok_or(ReminderError::NotFound(id))?;

        if let Some(job_id) = reminder.cron_job_id {
            self.scheduler.delete_job(job_id).await?;
        }

        self.db.delete_reminder(id).await?;
        info!("Deleted reminder {}", id);
        Ok(())
    }

    /// Place the reminder call. Called by the cron service at fire time.
    /// Completed and failed reminders are skipped and yield `None`.
    pub async fn trigger_reminder(
        &self,
        id: i64,
    ) -> Result<Option<OutboundCallResult>, ReminderError> {
        let reminder = match self.db.get_reminder(id).await? {
            Some(reminder) => reminder,
            None => {
                warn!("Trigger for unknown reminder {}", id);
                return Err(ReminderError::NotFound(id));
            }
        };

        if matches!(
            reminder.status,
            ReminderStatus::Completed | ReminderStatus::Failed
        ) {
            warn!(
                "Trigger for reminder {} in status {}, no call placed",
                id,
                reminder.status.as_str()
            );
            return Ok(None);
        }

        let profile = self.db.find_profile_by_phone(&reminder.phone_number).await?;

        let mut variables = BTreeMap::new();
        variables.insert("caller_id".to_string(), reminder.phone_number.clone());
        variables.insert("reminder_text".to_string(), reminder.text.clone());
        if let Some(name) = profile.and_then(|p| p.first_name) {
            variables.insert("first_name".to_string(), name);
        }

        let result = self
            .voice
            .place_call(&OutboundCall {
                to_number: reminder.phone_number.clone(),
                first_message: reminder.text.clone(),
                dynamic_variables: variables,
            })
            .await?;

        let status = match reminder.frequency {
            Frequency::Once => Some(ReminderStatus::Completed),
            _ => None,
        };
        self.db
            .update_reminder(
                id,
                &ReminderUpdate {
                    status,
                    last_triggered_at: Some(Utc::now().to_rfc3339()),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            "Reminder {} fired to {} (call {:?})",
            id, reminder.phone_number, result.call_sid
        );

        // A once job keeps a fixed day and month, so it would fire again next year
        if reminder.frequency == Frequency::Once {
            if let Some(job_id) = reminder.cron_job_id {
                match self.scheduler.delete_job(job_id).await {
                    Ok(()) => info!("Removed cron job {} of completed reminder {}", job_id, id),
                    Err(e) => warn!(
                        "Failed to remove cron job {} of completed reminder {}: {}",
                        job_id, id, e
                    ),
                }
            }
        }

        Ok(Some(result))
    }

    /// Headers the cron service sends back so the callback passes the API-key gate
    fn callback_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.config.api_key),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ])
    }
}
