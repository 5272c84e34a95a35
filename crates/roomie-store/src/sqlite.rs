//! SQLite-backed `RecordStore` implementation with durable persistence.

use crate::{
    ActorId, CandidateFilter, LikeEdge, NewProfile, NewTicket, Profile, ProfileUpdate,
    RecordStore, StoreError, StoreResult, SupportTicket, TicketId, TicketQuery, TicketStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use roomie_types::{Gender, GenderFilter, MediaRef, ReasonCategory};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROFILE_COLUMNS: &str =
    "p.actor_id, p.name, p.age, p.gender, p.affiliation, p.description, p.photo, p.created_at";
const TICKET_COLUMNS: &str =
    "id, requester, requester_handle, body, created_at, status, reason, assigned_admin";

/// Persistent SQLite store backend.
#[derive(Debug)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        tracing::info!(path = %store.db_path.display(), "record store ready");
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_id INTEGER NOT NULL UNIQUE,
                name TEXT NOT NULL,
                age INTEGER NOT NULL,
                gender TEXT NOT NULL,
                affiliation TEXT NOT NULL,
                description TEXT NULL,
                photo TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS likes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                from_id INTEGER NOT NULL,
                to_id INTEGER NOT NULL,
                UNIQUE (from_id, to_id)
            );

            CREATE INDEX IF NOT EXISTS idx_likes_to ON likes (to_id, seq);

            CREATE TABLE IF NOT EXISTS support_tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                requester INTEGER NOT NULL,
                requester_handle TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 0,
                reason TEXT NOT NULL,
                assigned_admin INTEGER NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_admin ON support_tickets (assigned_admin, status);
            "#,
        )?;
        Ok(())
    }

    fn query_profiles(&self, sql: &str, values: Vec<SqlValue>) -> StoreResult<Vec<Profile>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(sql)?;
        let rows = statement
            .query_map(params_from_iter(values), ProfileRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ProfileRow::into_profile).collect()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn profile_exists(&self, actor: ActorId) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found = connection
            .query_row(
                "SELECT 1 FROM profiles WHERE actor_id = ?1",
                params![actor.0],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn get_profile(&self, actor: ActorId) -> StoreResult<Option<Profile>> {
        let connection = self.open_connection()?;
        connection
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.actor_id = ?1"),
                params![actor.0],
                ProfileRow::read,
            )
            .optional()?
            .map(ProfileRow::into_profile)
            .transpose()
    }

    async fn create_profile(&self, profile: NewProfile) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let inserted = connection.execute(
            r#"
            INSERT OR IGNORE INTO profiles (
                actor_id, name, age, gender, affiliation, description, photo, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                profile.actor_id.0,
                profile.name,
                i64::from(profile.age),
                profile.gender.as_str(),
                profile.affiliation,
                profile.description,
                profile.photo.as_str(),
                timestamp_to_db(Utc::now()),
            ],
        )?;
        if inserted == 0 {
            tracing::warn!(actor_id = %profile.actor_id, "profile already exists");
        }
        Ok(inserted > 0)
    }

    async fn update_profile(&self, actor: ActorId, update: ProfileUpdate) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let updated = match update {
            ProfileUpdate::Photo(photo) => connection.execute(
                "UPDATE profiles SET photo = ?1 WHERE actor_id = ?2",
                params![photo.as_str(), actor.0],
            )?,
            ProfileUpdate::Description(description) => connection.execute(
                "UPDATE profiles SET description = ?1 WHERE actor_id = ?2",
                params![description, actor.0],
            )?,
        };
        Ok(updated > 0)
    }

    async fn delete_profile(&self, actor: ActorId) -> StoreResult<bool> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let removed = transaction.execute(
            "DELETE FROM profiles WHERE actor_id = ?1",
            params![actor.0],
        )?;
        if removed > 0 {
            transaction.execute(
                "DELETE FROM likes WHERE from_id = ?1 OR to_id = ?1",
                params![actor.0],
            )?;
        }
        transaction.commit()?;
        Ok(removed > 0)
    }

    async fn delete_all_profiles(&self) -> StoreResult<u64> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let removed = transaction.execute("DELETE FROM profiles", [])?;
        transaction.execute("DELETE FROM likes", [])?;
        transaction.commit()?;
        Ok(removed as u64)
    }

    async fn list_candidates(&self, filter: CandidateFilter) -> StoreResult<Vec<Profile>> {
        let mut sql = format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM profiles p
            WHERE p.actor_id != ?1
            AND p.actor_id NOT IN (SELECT to_id FROM likes WHERE from_id = ?1)
            "#
        );
        let mut values = vec![SqlValue::Integer(filter.requester.0)];
        match filter.gender {
            GenderFilter::Any => {}
            GenderFilter::Only(gender) => {
                sql.push_str(" AND p.gender = ?2");
                values.push(SqlValue::Text(gender.as_str().to_string()));
            }
            GenderFilter::Except(gender) => {
                sql.push_str(" AND p.gender != ?2");
                values.push(SqlValue::Text(gender.as_str().to_string()));
            }
        }
        sql.push_str(" ORDER BY p.id");
        self.query_profiles(&sql, values)
    }

    async fn list_all_profile_ids(&self) -> StoreResult<Vec<ActorId>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare("SELECT actor_id FROM profiles ORDER BY id")?;
        let ids = statement
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(ActorId).collect())
    }

    async fn create_like(&self, edge: LikeEdge) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let inserted = connection.execute(
            "INSERT OR IGNORE INTO likes (from_id, to_id) VALUES (?1, ?2)",
            params![edge.from.0, edge.to.0],
        )?;
        if inserted == 0 {
            tracing::warn!(from = %edge.from, to = %edge.to, "like already exists");
        }
        Ok(inserted > 0)
    }

    async fn has_mutual_like(&self, left: ActorId, right: ActorId) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let count: i64 = connection.query_row(
            r#"
            SELECT COUNT(*) FROM likes
            WHERE (from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1)
            "#,
            params![left.0, right.0],
            |row| row.get(0),
        )?;
        Ok(count == 2)
    }

    async fn count_likes_received(&self, actor: ActorId) -> StoreResult<u64> {
        let connection = self.open_connection()?;
        let count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM likes WHERE to_id = ?1",
            params![actor.0],
            |row| row.get(0),
        )?;
        i64_to_u64("like_count", count)
    }

    async fn list_likers(&self, actor: ActorId) -> StoreResult<Vec<Profile>> {
        self.query_profiles(
            &format!(
                r#"
                SELECT {PROFILE_COLUMNS} FROM likes l
                JOIN profiles p ON p.actor_id = l.from_id
                WHERE l.to_id = ?1
                ORDER BY l.seq
                "#
            ),
            vec![SqlValue::Integer(actor.0)],
        )
    }

    async fn create_ticket(&self, ticket: NewTicket) -> StoreResult<TicketId> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO support_tickets (
                requester, requester_handle, body, created_at, status, reason, assigned_admin
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                ticket.requester.0,
                ticket.requester_handle,
                ticket.body,
                timestamp_to_db(Utc::now()),
                TicketStatus::Open.code(),
                ticket.reason.as_str(),
                ticket.assigned_admin.map(|admin| admin.0),
            ],
        )?;
        Ok(TicketId(connection.last_insert_rowid()))
    }

    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<SupportTicket>> {
        let connection = self.open_connection()?;
        connection
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM support_tickets WHERE id = ?1"),
                params![id.0],
                TicketRow::read,
            )
            .optional()?
            .map(TicketRow::into_ticket)
            .transpose()
    }

    async fn list_tickets(&self, query: &TicketQuery) -> StoreResult<Vec<SupportTicket>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(admin) = query.assigned_admin {
            values.push(SqlValue::Integer(admin.0));
            clauses.push(format!("assigned_admin = ?{}", values.len()));
        }
        if let Some(statuses) = query.statuses.as_ref() {
            clauses.push(in_clause("status", &mut values, statuses, |status| {
                SqlValue::Integer(status.code())
            }));
        }
        if let Some(reasons) = query.reasons.as_ref() {
            clauses.push(in_clause("reason", &mut values, reasons, |reason| {
                SqlValue::Text(reason.as_str().to_string())
            }));
        }

        let mut sql = format!("SELECT {TICKET_COLUMNS} FROM support_tickets");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&sql)?;
        let rows = statement
            .query_map(params_from_iter(values), TicketRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TicketRow::into_ticket).collect()
    }

    async fn set_ticket_status(&self, id: TicketId, status: TicketStatus) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let updated = connection.execute(
            "UPDATE support_tickets SET status = ?1 WHERE id = ?2",
            params![status.code(), id.0],
        )?;
        Ok(updated > 0)
    }

    async fn set_ticket_assignee(&self, id: TicketId, admin: ActorId) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let updated = connection.execute(
            "UPDATE support_tickets SET assigned_admin = ?1 WHERE id = ?2",
            params![admin.0, id.0],
        )?;
        Ok(updated > 0)
    }

    async fn delete_ticket(&self, id: TicketId) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let removed = connection.execute(
            "DELETE FROM support_tickets WHERE id = ?1",
            params![id.0],
        )?;
        Ok(removed > 0)
    }

    async fn delete_all_tickets(&self) -> StoreResult<u64> {
        let connection = self.open_connection()?;
        let removed = connection.execute("DELETE FROM support_tickets", [])?;
        Ok(removed as u64)
    }
}

struct ProfileRow {
    actor_id: i64,
    name: String,
    age: i64,
    gender: String,
    affiliation: String,
    description: Option<String>,
    photo: String,
    created_at: String,
}

impl ProfileRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            actor_id: row.get(0)?,
            name: row.get(1)?,
            age: row.get(2)?,
            gender: row.get(3)?,
            affiliation: row.get(4)?,
            description: row.get(5)?,
            photo: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_profile(self) -> StoreResult<Profile> {
        let gender =
            Gender::parse(&self.gender).map_err(|_| StoreError::InvalidPersistedValue {
                field: "gender",
                value: self.gender.clone(),
            })?;
        let age = u8::try_from(self.age).map_err(|_| StoreError::InvalidPersistedValue {
            field: "age",
            value: self.age.to_string(),
        })?;
        Ok(Profile {
            actor_id: ActorId(self.actor_id),
            name: self.name,
            age,
            gender,
            affiliation: self.affiliation,
            description: self.description,
            photo: MediaRef(self.photo),
            created_at: timestamp_from_db(&self.created_at)?,
        })
    }
}

struct TicketRow {
    id: i64,
    requester: i64,
    requester_handle: String,
    body: String,
    created_at: String,
    status: i64,
    reason: String,
    assigned_admin: Option<i64>,
}

impl TicketRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            requester: row.get(1)?,
            requester_handle: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
            status: row.get(5)?,
            reason: row.get(6)?,
            assigned_admin: row.get(7)?,
        })
    }

    fn into_ticket(self) -> StoreResult<SupportTicket> {
        let status =
            TicketStatus::from_code(self.status).ok_or(StoreError::InvalidPersistedValue {
                field: "ticket_status",
                value: self.status.to_string(),
            })?;
        let reason =
            ReasonCategory::parse(&self.reason).map_err(|_| StoreError::InvalidPersistedValue {
                field: "ticket_reason",
                value: self.reason.clone(),
            })?;
        Ok(SupportTicket {
            id: TicketId(self.id),
            requester: ActorId(self.requester),
            requester_handle: self.requester_handle,
            body: self.body,
            created_at: timestamp_from_db(&self.created_at)?,
            status,
            reason,
            assigned_admin: self.assigned_admin.map(ActorId),
        })
    }
}

fn in_clause<T: Copy>(
    column: &str,
    values: &mut Vec<SqlValue>,
    items: &[T],
    to_value: impl Fn(T) -> SqlValue,
) -> String {
    if items.is_empty() {
        return "0 = 1".to_string();
    }
    let placeholders = items
        .iter()
        .map(|item| {
            values.push(to_value(*item));
            format!("?{}", values.len())
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{column} IN ({placeholders})")
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn i64_to_u64(field: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}
