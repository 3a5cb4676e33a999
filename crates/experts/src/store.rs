//! SQLite-backed store for experts, chats, requests and assignments.
//!
//! All counter changes are relative updates (`count = count + 1`) executed in
//! the same transaction as the row change that causes them, so concurrent
//! transitions under one request never lose an increment.

use crate::types::{
    Assignment, AssignmentStatus, AssignmentView, Chat, Dataset, DatasetRecord, ExpertProfile,
    ExpertRequest, Message, MessageRole, RequestCounts, RequestStatus, TransitionRecord,
};
use chrono::{DateTime, Utc};
use hivemind_core::{AppError, AppResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS experts (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    expertise TEXT,
    expertise_tags TEXT NOT NULL DEFAULT '[]',
    tags_embedding BLOB,
    credits INTEGER NOT NULL DEFAULT 0,
    xp INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES experts(id),
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL REFERENCES chats(id),
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS expert_requests (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL REFERENCES chats(id),
    title TEXT NOT NULL DEFAULT 'Untitled',
    question TEXT NOT NULL,
    expertise_tags TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'in_progress', 'completed')),
    assigned_experts_count INTEGER NOT NULL DEFAULT 0,
    completed_experts_count INTEGER NOT NULL DEFAULT 0
        CHECK (completed_experts_count >= 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS expert_assignments (
    id TEXT PRIMARY KEY,
    request_id TEXT NOT NULL REFERENCES expert_requests(id),
    expert_id TEXT NOT NULL REFERENCES experts(id),
    status TEXT NOT NULL DEFAULT 'assigned'
        CHECK (status IN ('assigned', 'working', 'submitted', 'accepted', 'rejected')),
    response TEXT,
    rating INTEGER CHECK (rating BETWEEN 1 AND 5),
    credits_awarded INTEGER,
    response_embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (request_id, expert_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id);
CREATE INDEX IF NOT EXISTS idx_requests_chat ON expert_requests(chat_id);
CREATE INDEX IF NOT EXISTS idx_assignments_request ON expert_assignments(request_id, status);
CREATE INDEX IF NOT EXISTS idx_assignments_expert ON expert_assignments(expert_id);
"#;

const EXPERT_COLUMNS: &str =
    "id, email, expertise, expertise_tags, tags_embedding, credits, xp, created_at";

const REQUEST_COLUMNS: &str = "id, chat_id, title, question, expertise_tags, status, \
     assigned_experts_count, completed_experts_count, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str = "a.id, a.request_id, a.expert_id, a.status, a.response, \
     a.rating, a.credits_awarded, a.response_embedding, a.created_at, a.updated_at";

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::Storage(format!("Failed to {}: {}", context, e))
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn tags_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn embedding_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<f32>>> {
    let raw: Option<Vec<u8>> = row.get(idx)?;
    raw.map(|bytes| bytes_to_embedding(&bytes).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Convert embedding vector to little-endian bytes for storage.
pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert stored bytes back to an embedding vector.
pub(crate) fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Storage(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn row_to_expert(row: &Row<'_>) -> rusqlite::Result<ExpertProfile> {
    Ok(ExpertProfile {
        id: row.get(0)?,
        email: row.get(1)?,
        expertise: row.get(2)?,
        expertise_tags: tags_at(row, 3)?,
        tags_embedding: embedding_at(row, 4)?,
        credits: row.get(5)?,
        xp: row.get(6)?,
        created_at: time_at(row, 7)?,
    })
}

fn row_to_request(row: &Row<'_>, offset: usize) -> rusqlite::Result<ExpertRequest> {
    let status: String = row.get(offset + 5)?;
    Ok(ExpertRequest {
        id: row.get(offset)?,
        chat_id: row.get(offset + 1)?,
        title: row.get(offset + 2)?,
        question: row.get(offset + 3)?,
        expertise_tags: tags_at(row, offset + 4)?,
        status: RequestStatus::parse(&status).map_err(|e| conversion_error(offset + 5, e))?,
        assigned_experts_count: row.get(offset + 6)?,
        completed_experts_count: row.get(offset + 7)?,
        created_at: time_at(row, offset + 8)?,
        updated_at: time_at(row, offset + 9)?,
    })
}

fn row_to_assignment(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    let status: String = row.get(3)?;
    Ok(Assignment {
        id: row.get(0)?,
        request_id: row.get(1)?,
        expert_id: row.get(2)?,
        status: AssignmentStatus::parse(&status).map_err(|e| conversion_error(3, e))?,
        response: row.get(4)?,
        rating: row.get(5)?,
        credits_awarded: row.get(6)?,
        response_embedding: embedding_at(row, 7)?,
        created_at: time_at(row, 8)?,
        updated_at: time_at(row, 9)?,
    })
}

fn load_assignment(conn: &Connection, id: &str) -> AppResult<Option<Assignment>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM expert_assignments a WHERE a.id = ?1",
            ASSIGNMENT_COLUMNS
        ),
        params![id],
        row_to_assignment,
    )
    .optional()
    .map_err(db_err("load assignment"))
}

fn load_request(conn: &Connection, id: &str) -> AppResult<Option<ExpertRequest>> {
    conn.query_row(
        &format!("SELECT {} FROM expert_requests WHERE id = ?1", REQUEST_COLUMNS),
        params![id],
        |row| row_to_request(row, 0),
    )
    .optional()
    .map_err(db_err("load request"))
}

/// Transactional relational store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the database file.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err("open SQLite database"))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err("set busy timeout"))?;

        tracing::debug!("Opened store at {:?}", path);
        Self::init(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err("enable foreign keys"))?;
        conn.execute_batch(SCHEMA).map_err(db_err("create tables"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Storage("Store connection lock poisoned".to_string()))
    }

    // ---- experts -------------------------------------------------------

    pub fn insert_expert(&self, expert: &ExpertProfile) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO experts (id, email, expertise, expertise_tags, tags_embedding, credits, xp, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                expert.id,
                expert.email,
                expert.expertise,
                serde_json::to_string(&expert.expertise_tags)?,
                expert.tags_embedding.as_deref().map(embedding_to_bytes),
                expert.credits,
                expert.xp,
                expert.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("insert expert"))?;
        Ok(())
    }

    pub fn get_expert(&self, id: &str) -> AppResult<Option<ExpertProfile>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM experts WHERE id = ?1", EXPERT_COLUMNS),
            params![id],
            row_to_expert,
        )
        .optional()
        .map_err(db_err("load expert"))
    }

    pub fn get_expert_by_email(&self, email: &str) -> AppResult<Option<ExpertProfile>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM experts WHERE email = ?1", EXPERT_COLUMNS),
            params![email],
            row_to_expert,
        )
        .optional()
        .map_err(db_err("load expert by email"))
    }

    /// All experts in registration order.
    pub fn list_experts(&self) -> AppResult<Vec<ExpertProfile>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM experts ORDER BY rowid", EXPERT_COLUMNS))
            .map_err(db_err("prepare expert listing"))?;
        let experts = stmt
            .query_map([], row_to_expert)
            .map_err(db_err("list experts"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("read expert row"))?;
        Ok(experts)
    }

    /// Replace expertise and tags. The stored tag embedding is cleared.
    pub fn update_expert_profile(
        &self,
        id: &str,
        expertise: Option<&str>,
        tags: &[String],
    ) -> AppResult<ExpertProfile> {
        {
            let conn = self.lock()?;
            let changed = conn
                .execute(
                    "UPDATE experts
                     SET expertise = COALESCE(?2, expertise), expertise_tags = ?3, tags_embedding = NULL
                     WHERE id = ?1",
                    params![id, expertise, serde_json::to_string(tags)?],
                )
                .map_err(db_err("update expert profile"))?;
            if changed == 0 {
                return Err(AppError::NotFound(format!("Expert not found: {}", id)));
            }
        }

        self.get_expert(id)?
            .ok_or_else(|| AppError::NotFound(format!("Expert not found: {}", id)))
    }

    pub fn set_expert_embedding(&self, id: &str, embedding: &[f32]) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE experts SET tags_embedding = ?2 WHERE id = ?1",
            params![id, embedding_to_bytes(embedding)],
        )
        .map_err(db_err("store expert embedding"))?;
        Ok(())
    }

    // ---- chats & messages ---------------------------------------------

    pub fn insert_chat(&self, chat: &Chat) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chats (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![chat.id, chat.user_id, chat.title, chat.created_at.to_rfc3339()],
        )
        .map_err(db_err("insert chat"))?;
        Ok(())
    }

    pub fn get_chat(&self, id: &str) -> AppResult<Option<Chat>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, user_id, title, created_at FROM chats WHERE id = ?1",
            params![id],
            |row| {
                Ok(Chat {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: time_at(row, 3)?,
                })
            },
        )
        .optional()
        .map_err(db_err("load chat"))
    }

    /// Append a message to a chat.
    pub fn append_message(
        &self,
        chat_id: &str,
        role: MessageRole,
        content: &str,
    ) -> AppResult<Message> {
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (id, chat_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.chat_id,
                message.role.as_str(),
                message.content,
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("append message"))?;

        Ok(message)
    }

    pub fn list_messages(&self, chat_id: &str) -> AppResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, role, content, created_at FROM messages
                 WHERE chat_id = ?1 ORDER BY created_at, rowid",
            )
            .map_err(db_err("prepare message listing"))?;
        let messages = stmt
            .query_map(params![chat_id], |row| {
                let role: String = row.get(2)?;
                Ok(Message {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    role: MessageRole::parse(&role).map_err(|e| conversion_error(2, e))?,
                    content: row.get(3)?,
                    created_at: time_at(row, 4)?,
                })
            })
            .map_err(db_err("list messages"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("read message row"))?;
        Ok(messages)
    }

    // ---- requests -----------------------------------------------------

    pub fn insert_request(&self, request: &ExpertRequest) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO expert_requests
             (id, chat_id, title, question, expertise_tags, status,
              assigned_experts_count, completed_experts_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                request.id,
                request.chat_id,
                request.title,
                request.question,
                serde_json::to_string(&request.expertise_tags)?,
                request.status.as_str(),
                request.assigned_experts_count,
                request.completed_experts_count,
                request.created_at.to_rfc3339(),
                request.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("insert request"))?;
        Ok(())
    }

    pub fn get_request(&self, id: &str) -> AppResult<Option<ExpertRequest>> {
        let conn = self.lock()?;
        load_request(&conn, id)
    }

    pub fn list_requests_by_chat(&self, chat_id: &str) -> AppResult<Vec<ExpertRequest>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM expert_requests WHERE chat_id = ?1 ORDER BY created_at DESC, rowid DESC",
                REQUEST_COLUMNS
            ))
            .map_err(db_err("prepare request listing"))?;
        let requests = stmt
            .query_map(params![chat_id], |row| row_to_request(row, 0))
            .map_err(db_err("list requests"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("read request row"))?;
        Ok(requests)
    }

    /// Set a request's status. Returns whether the row changed.
    // ---- assignments --------------------------------------------------

    /// Create the assignment for a (request, expert) pair.
    ///
    /// In one transaction: insert the row with status `assigned`, increment
    /// `assigned_experts_count`, move a pending request to `in_progress` and
    /// backfill the title when one is given. Returns `None` when the pair
    /// already has an assignment; nothing changes in that case.
    pub fn create_assignment(
        &self,
        request_id: &str,
        expert_id: &str,
        title: Option<&str>,
    ) -> AppResult<Option<Assignment>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("begin transaction"))?;

        if load_request(&tx, request_id)?.is_none() {
            return Err(AppError::NotFound(format!(
                "Expert request not found: {}",
                request_id
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = now();
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO expert_assignments
                 (id, request_id, expert_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'assigned', ?4, ?4)",
                params![id, request_id, expert_id, timestamp],
            )
            .map_err(db_err("insert assignment"))?;

        if inserted == 0 {
            tracing::debug!(request_id, expert_id, "Assignment already exists");
            return Ok(None);
        }

        tx.execute(
            "UPDATE expert_requests
             SET assigned_experts_count = assigned_experts_count + 1,
                 status = CASE WHEN status = 'pending' THEN 'in_progress' ELSE status END,
                 title = COALESCE(?2, title),
                 updated_at = ?3
             WHERE id = ?1",
            params![request_id, title, timestamp],
        )
        .map_err(db_err("increment assigned count"))?;

        let assignment = load_assignment(&tx, &id)?
            .ok_or_else(|| AppError::Storage("Inserted assignment vanished".to_string()))?;

        tx.commit().map_err(db_err("commit assignment"))?;
        Ok(Some(assignment))
    }

    pub fn get_assignment(&self, id: &str) -> AppResult<Option<Assignment>> {
        let conn = self.lock()?;
        load_assignment(&conn, id)
    }

    /// Assignments of a request, optionally filtered by status.
    pub fn list_assignments(
        &self,
        request_id: &str,
        status: Option<AssignmentStatus>,
    ) -> AppResult<Vec<Assignment>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM expert_assignments a
                 WHERE a.request_id = ?1 AND (?2 IS NULL OR a.status = ?2)
                 ORDER BY a.created_at, a.rowid",
                ASSIGNMENT_COLUMNS
            ))
            .map_err(db_err("prepare assignment listing"))?;
        let assignments = stmt
            .query_map(
                params![request_id, status.map(|s| s.as_str())],
                row_to_assignment,
            )
            .map_err(db_err("list assignments"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("read assignment row"))?;
        Ok(assignments)
    }

    /// Assignments of an expert joined with their requests, newest first.
    pub fn list_assignments_by_expert(&self, expert_id: &str) -> AppResult<Vec<AssignmentView>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, r.chat_id, r.title, r.question, r.status,
                        r.assigned_experts_count, r.completed_experts_count
                 FROM expert_assignments a
                 JOIN expert_requests r ON r.id = a.request_id
                 WHERE a.expert_id = ?1
                 ORDER BY a.created_at DESC, a.rowid DESC",
                ASSIGNMENT_COLUMNS
            ))
            .map_err(db_err("prepare expert assignment listing"))?;
        let views = stmt
            .query_map(params![expert_id], |row| {
                let status: String = row.get(13)?;
                Ok(AssignmentView {
                    assignment: row_to_assignment(row)?,
                    chat_id: row.get(10)?,
                    title: row.get(11)?,
                    question: row.get(12)?,
                    request_status: RequestStatus::parse(&status)
                        .map_err(|e| conversion_error(13, e))?,
                    assigned_experts_count: row.get(14)?,
                    completed_experts_count: row.get(15)?,
                })
            })
            .map_err(db_err("list expert assignments"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("read expert assignment row"))?;
        Ok(views)
    }

    /// Apply a status transition and all of its counter side effects.
    ///
    /// `response` replaces the stored response when given. Statuses that
    /// require a response fail with `Validation` before anything is written
    /// if neither the new nor the stored response is non-blank.
    ///
    /// Within one transaction:
    /// - entering {submitted, accepted} increments `completed_experts_count`,
    ///   leaving it decrements (floored at 0);
    /// - entering `accepted` adds positive `credits_awarded` to the expert's
    ///   credits and xp and marks the request `completed`.
    pub fn apply_transition(
        &self,
        assignment_id: &str,
        new_status: AssignmentStatus,
        response: Option<&str>,
        credits_awarded: Option<i64>,
    ) -> AppResult<TransitionRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("begin transaction"))?;

        let current = load_assignment(&tx, assignment_id)?.ok_or_else(|| {
            AppError::NotFound(format!("Assignment not found: {}", assignment_id))
        })?;

        if new_status.requires_response() {
            let has_response = match response {
                Some(text) => !text.trim().is_empty(),
                None => current.response_text().is_some(),
            };
            if !has_response {
                return Err(AppError::Validation(format!(
                    "A non-empty response is required for status '{}'",
                    new_status
                )));
            }
        }

        let timestamp = now();
        tx.execute(
            "UPDATE expert_assignments
             SET status = ?2,
                 response = COALESCE(?3, response),
                 credits_awarded = COALESCE(?4, credits_awarded),
                 updated_at = ?5
             WHERE id = ?1",
            params![
                assignment_id,
                new_status.as_str(),
                response,
                credits_awarded,
                timestamp
            ],
        )
        .map_err(db_err("update assignment"))?;

        let was_completed = current.status.counts_as_completed();
        let is_completed = new_status.counts_as_completed();
        if !was_completed && is_completed {
            tx.execute(
                "UPDATE expert_requests
                 SET completed_experts_count = completed_experts_count + 1, updated_at = ?2
                 WHERE id = ?1",
                params![current.request_id, timestamp],
            )
            .map_err(db_err("increment completed count"))?;
        } else if was_completed && !is_completed {
            tx.execute(
                "UPDATE expert_requests
                 SET completed_experts_count = MAX(completed_experts_count - 1, 0), updated_at = ?2
                 WHERE id = ?1",
                params![current.request_id, timestamp],
            )
            .map_err(db_err("decrement completed count"))?;
        }

        if new_status == AssignmentStatus::Accepted && current.status != AssignmentStatus::Accepted
        {
            if let Some(credits) = credits_awarded.filter(|c| *c > 0) {
                tx.execute(
                    "UPDATE experts SET credits = credits + ?2, xp = xp + ?2 WHERE id = ?1",
                    params![current.expert_id, credits],
                )
                .map_err(db_err("award credits"))?;
            }

            tx.execute(
                "UPDATE expert_requests SET status = 'completed', updated_at = ?2
                 WHERE id = ?1 AND status != 'completed'",
                params![current.request_id, timestamp],
            )
            .map_err(db_err("complete request"))?;
        }

        let assignment = load_assignment(&tx, assignment_id)?.ok_or_else(|| {
            AppError::NotFound(format!("Assignment not found: {}", assignment_id))
        })?;

        tx.commit().map_err(db_err("commit transition"))?;

        Ok(TransitionRecord {
            previous: current.status,
            assignment,
        })
    }

    /// Mark a request `completed` and move every `submitted` assignment of it
    /// to `accepted`, in one transaction.
    ///
    /// Returns the assignments this call accepted; already-accepted rows are
    /// untouched. Both statuses count as completed, so counters do not move.
    pub fn complete_request(&self, request_id: &str) -> AppResult<Vec<Assignment>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("begin transaction"))?;

        let found = tx
            .execute(
                "UPDATE expert_requests SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![request_id, RequestStatus::Completed.as_str(), now()],
            )
            .map_err(db_err("complete request"))?;
        if found == 0 {
            return Err(AppError::NotFound(format!(
                "Expert request not found: {}",
                request_id
            )));
        }

        let ids: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id FROM expert_assignments
                     WHERE request_id = ?1 AND status = 'submitted'
                     ORDER BY created_at, rowid",
                )
                .map_err(db_err("prepare submitted listing"))?;
            let ids = stmt
                .query_map(params![request_id], |row| row.get(0))
                .map_err(db_err("list submitted assignments"))?
                .collect::<rusqlite::Result<Vec<String>>>()
                .map_err(db_err("read submitted assignment id"))?;
            ids
        };

        tx.execute(
            "UPDATE expert_assignments SET status = 'accepted', updated_at = ?2
             WHERE request_id = ?1 AND status = 'submitted'",
            params![request_id, now()],
        )
        .map_err(db_err("accept submitted assignments"))?;

        let mut accepted = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(assignment) = load_assignment(&tx, id)? {
                accepted.push(assignment);
            }
        }

        tx.commit().map_err(db_err("commit request completion"))?;

        tracing::info!(
            request_id,
            accepted = accepted.len(),
            "Completed request and accepted submitted assignments"
        );
        Ok(accepted)
    }

    pub fn set_response_embedding(&self, assignment_id: &str, embedding: &[f32]) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE expert_assignments SET response_embedding = ?2 WHERE id = ?1",
            params![assignment_id, embedding_to_bytes(embedding)],
        )
        .map_err(db_err("store response embedding"))?;
        Ok(())
    }

    /// Accepted assignments with a response, paired with their question.
    pub fn list_accepted_with_questions(&self) -> AppResult<Vec<(Assignment, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, r.question
                 FROM expert_assignments a
                 JOIN expert_requests r ON r.id = a.request_id
                 WHERE a.status = 'accepted' AND a.response IS NOT NULL AND TRIM(a.response) != ''
                 ORDER BY a.created_at, a.rowid",
                ASSIGNMENT_COLUMNS
            ))
            .map_err(db_err("prepare accepted listing"))?;
        let rows = stmt
            .query_map([], |row| Ok((row_to_assignment(row)?, row.get(10)?)))
            .map_err(db_err("list accepted assignments"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("read accepted assignment row"))?;
        Ok(rows)
    }

    pub fn rate_assignment(&self, assignment_id: &str, rating: u8) -> AppResult<Assignment> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE expert_assignments SET rating = ?2, updated_at = ?3 WHERE id = ?1",
                params![assignment_id, rating, now()],
            )
            .map_err(db_err("rate assignment"))?;
        if changed == 0 {
            return Err(AppError::NotFound(format!(
                "Assignment not found: {}",
                assignment_id
            )));
        }
        load_assignment(&conn, assignment_id)?.ok_or_else(|| {
            AppError::NotFound(format!("Assignment not found: {}", assignment_id))
        })
    }

    /// Stored counters plus counts derived from assignment rows.
    /// Unknown ids are skipped.
    pub fn request_counts(&self, request_ids: &[String]) -> AppResult<Vec<RequestCounts>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT r.id, r.status, r.assigned_experts_count, r.completed_experts_count,
                        COUNT(a.id),
                        COALESCE(SUM(CASE WHEN a.status = 'submitted' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN a.status = 'accepted' THEN 1 ELSE 0 END), 0)
                 FROM expert_requests r
                 LEFT JOIN expert_assignments a ON a.request_id = r.id
                 WHERE r.id = ?1
                 GROUP BY r.id",
            )
            .map_err(db_err("prepare request counts"))?;

        let mut counts = Vec::with_capacity(request_ids.len());
        for id in request_ids {
            let row = stmt
                .query_row(params![id], |row| {
                    let status: String = row.get(1)?;
                    Ok(RequestCounts {
                        request_id: row.get(0)?,
                        status: RequestStatus::parse(&status)
                            .map_err(|e| conversion_error(1, e))?,
                        assigned_experts_count: row.get(2)?,
                        completed_experts_count: row.get(3)?,
                        total_assignments: row.get(4)?,
                        submitted: row.get(5)?,
                        accepted: row.get(6)?,
                    })
                })
                .optional()
                .map_err(db_err("count request assignments"))?;
            if let Some(row) = row {
                counts.push(row);
            }
        }
        Ok(counts)
    }

    /// Accepted answers with their request and expert.
    pub fn dataset(&self) -> AppResult<Dataset> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT r.id, r.title, r.question, r.expertise_tags,
                        a.id, a.expert_id, e.email, a.response, a.rating, a.credits_awarded
                 FROM expert_assignments a
                 JOIN expert_requests r ON r.id = a.request_id
                 JOIN experts e ON e.id = a.expert_id
                 WHERE a.status = 'accepted' AND a.response IS NOT NULL
                 ORDER BY r.created_at, a.created_at, a.rowid",
            )
            .map_err(db_err("prepare dataset query"))?;

        let records = stmt
            .query_map([], |row| {
                Ok(DatasetRecord {
                    request_id: row.get(0)?,
                    title: row.get(1)?,
                    question: row.get(2)?,
                    expertise_tags: tags_at(row, 3)?,
                    assignment_id: row.get(4)?,
                    expert_id: row.get(5)?,
                    expert_email: row.get(6)?,
                    response: row.get(7)?,
                    rating: row.get(8)?,
                    credits_awarded: row.get(9)?,
                })
            })
            .map_err(db_err("query dataset"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("read dataset row"))?;

        let mut dataset = Dataset {
            records,
            ..Default::default()
        };
        for record in &dataset.records {
            *dataset
                .accepted_per_request
                .entry(record.request_id.clone())
                .or_insert(0) += 1;
        }
        Ok(dataset)
    }
}
