use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::logging;
use crate::models::{Match, Message, UserRecord};

type Result<T> = std::result::Result<T, StoreError>;

/// Persistence used by the service layer. Profiles are opaque JSON blobs.
pub trait Store: Send + Sync {
    fn create_user(&self, id: &str, name: &str, avatar: Option<&str>) -> Result<UserRecord>;
    fn get_user(&self, id: &str) -> Result<UserRecord>;
    /// Replace the stored profile and stamp its generation time in one write.
    fn update_user_profile(&self, id: &str, profile: &str) -> Result<()>;
    fn mark_user_updated(&self, id: &str) -> Result<()>;

    fn create_message(&self, sender_id: &str, receiver_id: &str, text: &str) -> Result<Message>;
    /// Messages from `sender_id` to `receiver_id`, newest first.
    fn recent_messages(&self, sender_id: &str, receiver_id: &str, limit: usize) -> Result<Vec<Message>>;
    /// Messages sent or received by `user_id` across all conversations, newest first.
    fn recent_messages_all_conversations(&self, user_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// Users with a profile, other than `user_id`, that `user_id` has not
    /// been matched with yet.
    fn non_matched_users(&self, user_id: &str) -> Result<Vec<UserRecord>>;
    /// Write both directions of a match atomically. Returns the row for `user_id`.
    fn create_match(&self, user_id: &str, match_id: &str, user_reason: &str, match_reason: &str) -> Result<Match>;
    fn user_matches(&self, user_id: &str) -> Result<Vec<Match>>;
}

fn now() -> String {
    // Sub-second precision keeps message order stable within a second
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        avatar TEXT,
        updated_at TEXT NOT NULL,
        profile TEXT,
        profile_generated_at TEXT
    );

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        sender_id TEXT NOT NULL,
        receiver_id TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS matches (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        match_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id, receiver_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_messages_receiver ON messages(receiver_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_matches_user ON matches(user_id);
";

const USER_COLUMNS: &str = "id, name, avatar, updated_at, profile, profile_generated_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, message, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar: row.get(2)?,
        updated_at: row.get(3)?,
        profile: row.get(4)?,
        profile_generated_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        message: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// SQLite-backed [`Store`] behind a single mutex-guarded connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        logging::log_store(None, &format!("Opened database at {}", path.display()));
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut *conn)?)
    }

    fn require_user(&self, id: &str, changed: usize) -> Result<()> {
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "user",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    // ============ Users ============

    fn create_user(&self, id: &str, name: &str, avatar: Option<&str>) -> Result<UserRecord> {
        let now = now();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, avatar, updated_at, profile, profile_generated_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
                params![id, name, avatar, now],
            )
        })?;
        logging::log_store(Some(id), &format!("Created user {}", name));

        Ok(UserRecord {
            id: id.to_string(),
            name: name.to_string(),
            avatar: avatar.map(str::to_string),
            updated_at: now,
            profile: None,
            profile_generated_at: None,
        })
    }

    fn get_user(&self, id: &str) -> Result<UserRecord> {
        let user = self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                user_from_row,
            )
            .optional()
        })?;

        user.ok_or_else(|| StoreError::NotFound {
            entity: "user",
            id: id.to_string(),
        })
    }

    fn update_user_profile(&self, id: &str, profile: &str) -> Result<()> {
        let now = now();
        let changed = self.with_connection(|conn| {
            conn.execute(
                "UPDATE users SET profile = ?1, profile_generated_at = ?2 WHERE id = ?3",
                params![profile, now, id],
            )
        })?;
        self.require_user(id, changed)?;
        logging::log_store(Some(id), &format!("Stored profile ({} bytes)", profile.len()));
        Ok(())
    }

    fn mark_user_updated(&self, id: &str) -> Result<()> {
        let now = now();
        let changed = self.with_connection(|conn| {
            conn.execute("UPDATE users SET updated_at = ?1 WHERE id = ?2", params![now, id])
        })?;
        self.require_user(id, changed)
    }

    // ============ Messages ============

    fn create_message(&self, sender_id: &str, receiver_id: &str, text: &str) -> Result<Message> {
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            message: text.to_string(),
            created_at: now(),
        };
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id,
                    message.sender_id,
                    message.receiver_id,
                    message.message,
                    message.created_at
                ],
            )
        })?;
        Ok(message)
    }

    fn recent_messages(&self, sender_id: &str, receiver_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages
                 WHERE sender_id = ?1 AND receiver_id = ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                MESSAGE_COLUMNS
            ))?;
            let messages = stmt.query_map(params![sender_id, receiver_id, limit], message_from_row)?;
            messages.collect()
        })
    }

    fn recent_messages_all_conversations(&self, user_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages
                 WHERE sender_id = ?1 OR receiver_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
                MESSAGE_COLUMNS
            ))?;
            let messages = stmt.query_map(params![user_id, limit], message_from_row)?;
            messages.collect()
        })
    }

    // ============ Matches ============

    fn non_matched_users(&self, user_id: &str) -> Result<Vec<UserRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users
                 WHERE id != ?1
                   AND profile IS NOT NULL
                   AND id NOT IN (SELECT match_id FROM matches WHERE user_id = ?1)
                 ORDER BY id",
                USER_COLUMNS
            ))?;
            let users = stmt.query_map(params![user_id], user_from_row)?;
            users.collect()
        })
    }

    fn create_match(&self, user_id: &str, match_id: &str, user_reason: &str, match_reason: &str) -> Result<Match> {
        let now = now();
        let forward_id = uuid::Uuid::new_v4().to_string();
        let backward_id = uuid::Uuid::new_v4().to_string();

        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO matches (id, user_id, match_id, reason, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                stmt.execute(params![forward_id, user_id, match_id, user_reason, now])?;
                stmt.execute(params![backward_id, match_id, user_id, match_reason, now])?;
            }
            tx.commit()
        })?;
        logging::log_store(Some(user_id), &format!("Stored match with {}", match_id));

        Ok(Match {
            id: forward_id,
            user_id: user_id.to_string(),
            match_id: match_id.to_string(),
            user_reason: user_reason.to_string(),
            match_reason: match_reason.to_string(),
            created_at: now,
        })
    }

    fn user_matches(&self, user_id: &str) -> Result<Vec<Match>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.user_id, m.match_id, m.reason, r.reason, m.created_at
                 FROM matches m
                 LEFT JOIN matches r ON r.user_id = m.match_id AND r.match_id = m.user_id
                 WHERE m.user_id = ?1
                 ORDER BY m.created_at DESC",
            )?;
            let matches = stmt.query_map(params![user_id], |row| {
                Ok(Match {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    match_id: row.get(2)?,
                    user_reason: row.get(3)?,
                    match_reason: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    created_at: row.get(5)?,
                })
            })?;
            matches.collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_users(ids: &[&str]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in ids {
            store.create_user(id, &id.to_uppercase(), None).unwrap();
        }
        store
    }

    #[test]
    fn users_round_trip_and_missing_is_not_found() {
        let store = store_with_users(&["ada"]);
        let user = store.get_user("ada").unwrap();
        assert_eq!(user.name, "ADA");
        assert!(user.profile.is_none() && user.profile_generated_at.is_none());

        assert!(matches!(store.get_user("nobody"), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.mark_user_updated("nobody"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn profile_and_generation_time_are_written_together() {
        let store = store_with_users(&["ada"]);
        store.update_user_profile("ada", r#"{"bio":"hi"}"#).unwrap();
        let user = store.get_user("ada").unwrap();
        assert_eq!(user.profile.as_deref(), Some(r#"{"bio":"hi"}"#));
        let generated = user.profile_generated_at.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&generated).is_ok());
    }

    #[test]
    fn messages_come_back_newest_first() {
        let store = store_with_users(&["ada", "bob", "cy"]);
        store.create_message("ada", "bob", "first").unwrap();
        store.create_message("bob", "ada", "second").unwrap();
        store.create_message("ada", "bob", "third").unwrap();
        store.create_message("cy", "bob", "unrelated").unwrap();

        let sent: Vec<String> = store
            .recent_messages("ada", "bob", 10)
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(sent, vec!["third", "first"]);

        let all = store.recent_messages_all_conversations("ada", 2).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "third");
        assert_eq!(all[1].message, "second");
    }

    #[test]
    fn match_pool_excludes_self_unprofiled_and_matched() {
        let store = store_with_users(&["ada", "bob", "cy", "dee"]);
        for id in ["ada", "bob", "cy"] {
            store.update_user_profile(id, "{}").unwrap();
        }

        let pool: Vec<String> = store.non_matched_users("ada").unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(pool, vec!["bob", "cy"]);

        store.create_match("ada", "bob", "to ada", "to bob").unwrap();
        let pool: Vec<String> = store.non_matched_users("ada").unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(pool, vec!["cy"]);
    }

    #[test]
    fn both_directions_of_a_match_are_stored() {
        let store = store_with_users(&["ada", "bob"]);
        let created = store.create_match("ada", "bob", "Bob bakes too", "Ada climbs too").unwrap();
        assert_eq!(created.user_reason, "Bob bakes too");

        let ada = store.user_matches("ada").unwrap();
        assert_eq!(ada.len(), 1);
        assert_eq!(ada[0].match_id, "bob");
        assert_eq!(ada[0].user_reason, "Bob bakes too");
        assert_eq!(ada[0].match_reason, "Ada climbs too");

        let bob = store.user_matches("bob").unwrap();
        assert_eq!(bob[0].match_id, "ada");
        assert_eq!(bob[0].user_reason, "Ada climbs too");
    }
}
