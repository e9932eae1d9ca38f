use anyhow::{Context, Result};
use chrono::Utc;
use shared::{Frequency, Profile, Reminder, ReminderStatus};
use sqlx::{migrate::MigrateDatabase, sqlite::SqliteRow, Row, Sqlite, SqlitePool};
use std::sync::Arc;

/// Profile fields a caller may set; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl ProfileFields {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.notes.is_none()
    }
}

/// Reminder row as inserted; status always starts as pending
#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub phone_number: String,
    pub text: String,
    pub hour: u32,
    pub minute: u32,
    /// YYYY-MM-DD
    pub date: String,
    pub end_date: Option<String>,
    pub frequency: Frequency,
    pub weekdays: Option<Vec<u32>>,
}

/// Partial reminder update; `None` fields are left as stored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReminderUpdate {
    pub status: Option<ReminderStatus>,
    pub cron_job_id: Option<i64>,
    pub last_triggered_at: Option<String>,
}

/// DbConnection is the profile and reminder store
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Connect to `url`, creating the database and schema if needed
    pub async fn new(url: &str) -> Result<Self> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        let pool = SqlitePool::connect(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        Self::from_pool(pool).await
    }

    /// Fresh in-memory database. A single connection keeps every query on
    /// the same memory database.
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        Self::setup_schema(&pool).await?;
        Ok(Self { pool: Arc::new(pool) })
    }

    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                phone_number TEXT PRIMARY KEY,
                first_name TEXT,
                last_name TEXT,
                email TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone_number TEXT NOT NULL,
                text TEXT NOT NULL,
                hour INTEGER NOT NULL,
                minute INTEGER NOT NULL,
                date TEXT NOT NULL,
                end_date TEXT,
                frequency TEXT NOT NULL,
                weekdays TEXT,
                status TEXT NOT NULL,
                cron_job_id INTEGER,
                last_triggered_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_reminders_phone_number
            ON reminders(phone_number);
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find_profile_by_phone(&self, phone: &str) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r#"
            SELECT phone_number, first_name, last_name, email, notes, created_at, updated_at
            FROM profiles
            WHERE phone_number = ?
            "#,
        )
        .bind(phone)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|r| profile_from_row(&r)))
    }

    /// Insert the profile or update only the supplied fields
    pub async fn upsert_profile(&self, phone: &str, fields: &ProfileFields) -> Result<Profile> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO profiles (phone_number, first_name, last_name, email, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(phone_number) DO UPDATE SET
                first_name = COALESCE(excluded.first_name, profiles.first_name),
                last_name = COALESCE(excluded.last_name, profiles.last_name),
                email = COALESCE(excluded.email, profiles.email),
                notes = COALESCE(excluded.notes, profiles.notes),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(phone)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.email)
        .bind(&fields.notes)
        .bind(&now)
        .bind(&now)
        .execute(&*self.pool)
        .await?;

        self.find_profile_by_phone(phone)
            .await?
            .context("Profile missing after upsert")
    }

    pub async fn insert_reminder(&self, reminder: &NewReminder) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let weekdays = reminder
            .weekdays
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO reminders
                (phone_number, text, hour, minute, date, end_date, frequency, weekdays, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&reminder.phone_number)
        .bind(&reminder.text)
        .bind(reminder.hour as i64)
        .bind(reminder.minute as i64)
        .bind(&reminder.date)
        .bind(&reminder.end_date)
        .bind(reminder.frequency.as_str())
        .bind(weekdays)
        .bind(ReminderStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&*self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Apply a partial update. Returns false when no such reminder exists.
    pub async fn update_reminder(&self, id: i64, update: &ReminderUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reminders SET
                status = COALESCE(?, status),
                cron_job_id = COALESCE(?, cron_job_id),
                last_triggered_at = COALESCE(?, last_triggered_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.cron_job_id)
        .bind(&update.last_triggered_at)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_reminder(&self, id: i64) -> Result<Option<Reminder>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_REMINDER))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(reminder_from_row).transpose()
    }

    /// Reminders for one phone number, newest first
    pub async fn list_reminders(&self, phone: &str) -> Result<Vec<Reminder>> {
        let rows = sqlx::query(&format!(
            "{} WHERE phone_number = ? ORDER BY id DESC",
            SELECT_REMINDER
        ))
        .bind(phone)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(reminder_from_row).collect()
    }

    pub async fn delete_reminder(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

const SELECT_REMINDER: &str = r#"
    SELECT id, phone_number, text, hour, minute, date, end_date, frequency, weekdays,
           status, cron_job_id, last_triggered_at, created_at, updated_at
    FROM reminders"#;

fn profile_from_row(row: &SqliteRow) -> Profile {
    Profile {
        phone_number: row.get("phone_number"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn reminder_from_row(row: &SqliteRow) -> Result<Reminder> {
    let frequency: String = row.get("frequency");
    let status: String = row.get("status");
    let weekdays: Option<String> = row.get("weekdays");

    Ok(Reminder {
        id: row.get("id"),
        phone_number: row.get("phone_number"),
        text: row.get("text"),
        hour: u32::try_from(row.get::<i64, _>("hour")).context("Stored reminder has bad hour")?,
        minute: u32::try_from(row.get::<i64, _>("minute"))
            .context("Stored reminder has bad minute")?,
        date: row.get("date"),
        end_date: row.get("end_date"),
        frequency: frequency
            .parse::<Frequency>()
            .with_context(|| format!("Stored reminder has bad frequency {}", frequency))?,
        weekdays: weekdays
            .as_deref()
            .map(serde_json::from_str::<Vec<u32>>)
            .transpose()
            .context("Stored reminder has bad weekdays")?,
        status: ReminderStatus::from_string(&status).map_err(anyhow::Error::msg)?,
        cron_job_id: row.get("cron_job_id"),
        last_triggered_at: row.get("last_triggered_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
