//! SQLite-backed feedback log and reflection snapshot
//!
//! The `feedback` table is append-only. The `reflection_snapshot` table holds
//! a single row with the reflection counters and the serialized rule set, so a
//! restart recovers both.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::entry::{check_rating, FeedbackEntry, NewFeedback};
use super::error::{FeedbackError, Result};
use super::rules::{EmotionProfile, GlobalRules, LearnedRules, ReflectionState};
use crate::types::{EmotionalProfile, GenerationParams, PreferredVersion};

/// Result of a committed append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Identifier assigned to the new entry
    pub id: i64,
    /// Reflection counters after the append
    pub state: ReflectionState,
}

/// Entries and the counters they were read with, taken in one read transaction
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    pub entries: Vec<FeedbackEntry>,
    pub state: ReflectionState,
}

/// Rule payload stored next to the counters
#[derive(Debug, Default, Serialize, Deserialize)]
struct RulesDocument {
    #[serde(default)]
    global_rules: GlobalRules,
    #[serde(default)]
    emotion_profiles: BTreeMap<String, EmotionProfile>,
}

/// Append-only feedback store
///
/// Several processes may open the same file. Writes take the database lock up
/// front and counters are updated relative to what is on disk.
pub struct FeedbackStore {
    conn: Arc<Mutex<Connection>>,
}

impl FeedbackStore {
    /// Open (or create) the store at the given path
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(path)?;

        // FULL sync: an append is on disk before it is acknowledged
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;

        Self::init_schema(&conn)?;
        debug!("Opened feedback store at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                rating INTEGER NOT NULL,
                would_replay INTEGER NOT NULL,
                ai_profile TEXT NOT NULL,
                final_profile TEXT NOT NULL,
                music_prompt TEXT NOT NULL,
                preferred_version TEXT NOT NULL,
                user_note TEXT,
                gen_params TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reflection_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                reflections_completed INTEGER NOT NULL DEFAULT 0,
                entries_analyzed INTEGER NOT NULL DEFAULT 0,
                entries_since_last_reflection INTEGER NOT NULL DEFAULT 0,
                rules TEXT,
                updated_at TEXT
            );

            INSERT OR IGNORE INTO reflection_snapshot (id) VALUES (1);
        "#)
    }

    /// Append an entry and bump the pending-reflection counter in one transaction
    pub async fn append(&self, entry: &NewFeedback) -> Result<AppendReceipt> {
        entry.validate()?;

        let ai_profile = serde_json::to_string(&entry.ai_profile)?;
        let final_profile = serde_json::to_string(&entry.final_profile)?;
        let preferred_version = serde_json::to_string(&entry.preferred_version)?;
        let gen_params = serde_json::to_string(&entry.gen_params)?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r#"INSERT INTO feedback
               (created_at, rating, would_replay, ai_profile, final_profile,
                music_prompt, preferred_version, user_note, gen_params)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                Utc::now().to_rfc3339(),
                entry.rating,
                entry.would_replay,
                ai_profile,
                final_profile,
                entry.music_prompt,
                preferred_version,
                entry.user_note,
                gen_params,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE reflection_snapshot
             SET entries_since_last_reflection = entries_since_last_reflection + 1
             WHERE id = 1",
            [],
        )?;
        let state = tx.query_row(
            "SELECT reflections_completed, entries_analyzed, entries_since_last_reflection
             FROM reflection_snapshot WHERE id = 1",
            [],
            read_state,
        )?;

        tx.commit()?;
        Ok(AppendReceipt { id, state })
    }

    /// Read every valid entry in append order; malformed rows are skipped
    pub async fn read_all(&self) -> Result<Vec<FeedbackEntry>> {
        let conn = self.conn.lock().await;
        read_entries(&conn)
    }

    /// Entries plus the counters as of the same moment
    pub async fn snapshot(&self) -> Result<LogSnapshot> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let state = tx.query_row(
            "SELECT reflections_completed, entries_analyzed, entries_since_last_reflection
             FROM reflection_snapshot WHERE id = 1",
            [],
            read_state,
        )?;
        let entries = read_entries(&tx)?;
        tx.commit()?;
        Ok(LogSnapshot { entries, state })
    }

    /// Number of rows in the log
    pub async fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM feedback", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Load the persisted reflection counters and rule set
    pub async fn load_rules(&self) -> Result<LearnedRules> {
        let conn = self.conn.lock().await;

        let (state, rules_json, updated_at) = conn.query_row(
            "SELECT reflections_completed, entries_analyzed, entries_since_last_reflection,
                    rules, updated_at
             FROM reflection_snapshot WHERE id = 1",
            [],
            |row| {
                let state = read_state(row)?;
                let rules: Option<String> = row.get(3)?;
                let updated_at: Option<String> = row.get(4)?;
                Ok((state, rules, updated_at))
            },
        )?;

        let document = match rules_json {
            Some(json) => serde_json::from_str::<RulesDocument>(&json).unwrap_or_else(|e| {
                warn!("Stored rule set is unreadable, starting without rules: {}", e);
                RulesDocument::default()
            }),
            None => RulesDocument::default(),
        };

        Ok(LearnedRules {
            state,
            global_rules: document.global_rules,
            emotion_profiles: document.emotion_profiles,
            updated_at: updated_at.as_deref().and_then(parse_timestamp),
        })
    }

    /// Persist a completed reflection and return the counters as committed
    ///
    /// `consumed` is the pending count the reflection's snapshot saw; entries
    /// appended since then stay pending.
    pub async fn commit_reflection(&self, rules: &LearnedRules, consumed: u64) -> Result<ReflectionState> {
        let document = serde_json::to_string(&RulesDocument {
            global_rules: rules.global_rules.clone(),
            emotion_profiles: rules.emotion_profiles.clone(),
        })?;
        let updated_at = rules.updated_at.unwrap_or_else(Utc::now).to_rfc3339();

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            r#"UPDATE reflection_snapshot
               SET reflections_completed = reflections_completed + 1,
                   entries_analyzed = ?1,
                   entries_since_last_reflection = MAX(entries_since_last_reflection - ?2, 0),
                   rules = ?3,
                   updated_at = ?4
               WHERE id = 1"#,
            params![
                rules.state.entries_analyzed as i64,
                consumed as i64,
                document,
                updated_at,
            ],
        )?;
        let state = tx.query_row(
            "SELECT reflections_completed, entries_analyzed, entries_since_last_reflection
             FROM reflection_snapshot WHERE id = 1",
            [],
            read_state,
        )?;
        tx.commit()?;
        Ok(state)
    }
}

fn read_entries(conn: &Connection) -> Result<Vec<FeedbackEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, created_at, rating, would_replay, ai_profile, final_profile,
                music_prompt, preferred_version, user_note, gen_params
         FROM feedback ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([], RawFeedbackRow::from_row)?;

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let decoded = row.map_err(FeedbackError::from).and_then(RawFeedbackRow::decode);
        match decoded {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                skipped += 1;
                warn!("Skipping feedback row: {}", e);
            }
        }
    }

    if skipped > 0 {
        debug!("Read {} entries, skipped {} malformed", entries.len(), skipped);
    }
    Ok(entries)
}

fn read_state(row: &Row<'_>) -> rusqlite::Result<ReflectionState> {
    let completed: i64 = row.get(0)?;
    let analyzed: i64 = row.get(1)?;
    let pending: i64 = row.get(2)?;
    Ok(ReflectionState {
        reflections_completed: completed.max(0) as u64,
        entries_analyzed: analyzed.max(0) as u64,
        entries_since_last_reflection: pending.max(0) as u64,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

/// Columns as stored, before any invariant checks
struct RawFeedbackRow {
    id: i64,
    created_at: String,
    rating: i64,
    would_replay: bool,
    ai_profile: String,
    final_profile: String,
    music_prompt: String,
    preferred_version: String,
    user_note: Option<String>,
    gen_params: String,
}

impl RawFeedbackRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            rating: row.get(2)?,
            would_replay: row.get(3)?,
            ai_profile: row.get(4)?,
            final_profile: row.get(5)?,
            music_prompt: row.get(6)?,
            preferred_version: row.get(7)?,
            user_note: row.get(8)?,
            gen_params: row.get(9)?,
        })
    }

    fn decode(self) -> Result<FeedbackEntry> {
        let id = self.id;
        let malformed = |reason: String| FeedbackError::MalformedEntry { id, reason };

        let rating = u8::try_from(self.rating)
            .map_err(|_| format!("rating {} is not a small integer", self.rating))
            .and_then(|r| check_rating(r).map(|_| r))
            .map_err(malformed)?;

        let created_at = parse_timestamp(&self.created_at)
            .ok_or_else(|| malformed(format!("bad timestamp '{}'", self.created_at)))?;

        let ai_profile: EmotionalProfile = serde_json::from_str(&self.ai_profile)
            .map_err(|e| malformed(format!("ai_profile: {}", e)))?;
        ai_profile
            .check_ranges()
            .map_err(|e| malformed(format!("ai_profile: {}", e)))?;

        let final_profile: EmotionalProfile = serde_json::from_str(&self.final_profile)
            .map_err(|e| malformed(format!("final_profile: {}", e)))?;
        final_profile
            .check_ranges()
            .map_err(|e| malformed(format!("final_profile: {}", e)))?;

        let preferred_version: PreferredVersion = serde_json::from_str(&self.preferred_version)
            .map_err(|e| malformed(format!("preferred_version: {}", e)))?;
        let gen_params: GenerationParams = serde_json::from_str(&self.gen_params)
            .map_err(|e| malformed(format!("gen_params: {}", e)))?;

        Ok(FeedbackEntry {
            id,
            created_at,
            rating,
            would_replay: self.would_replay,
            ai_profile,
            final_profile,
            music_prompt: self.music_prompt,
            preferred_version,
            user_note: self.user_note,
            gen_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::entry::fixtures::feedback;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let dir = tempdir().unwrap();
        let store = FeedbackStore::open(dir.path().join("feedback.db")).await.unwrap();

        let first = store.append(&feedback("calm", 4, "soft piano")).await.unwrap();
        let second = store.append(&feedback("calm", 2, "loud drums")).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.state.entries_since_last_reflection, 1);
        assert_eq!(second.state.entries_since_last_reflection, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let entries = store.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].music_prompt, "soft piano");
        assert_eq!(entries[1].rating, 2);
    }

    #[tokio::test]
    async fn test_invalid_feedback_is_not_written() {
        let dir = tempdir().unwrap();
        let store = FeedbackStore::open(dir.path().join("feedback.db")).await.unwrap();

        let result = store.append(&feedback("calm", 9, "p")).await;
        assert!(matches!(result, Err(FeedbackError::InvalidFeedback(_))));
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.load_rules().await.unwrap().state.entries_since_last_reflection, 0);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped() {
        let dir = tempdir().unwrap();
        let store = FeedbackStore::open(dir.path().join("feedback.db")).await.unwrap();
        store.append(&feedback("calm", 5, "good one")).await.unwrap();

        {
            let conn = store.conn.lock().await;
            // Out-of-range rating
            conn.execute(
                "INSERT INTO feedback (created_at, rating, would_replay, ai_profile, final_profile,
                    music_prompt, preferred_version, user_note, gen_params)
                 SELECT created_at, 9, would_replay, ai_profile, final_profile,
                    'bad rating', preferred_version, user_note, gen_params FROM feedback LIMIT 1",
                [],
            ).unwrap();
            // Unparsable profile
            conn.execute(
                "INSERT INTO feedback (created_at, rating, would_replay, ai_profile, final_profile,
                    music_prompt, preferred_version, user_note, gen_params)
                 SELECT created_at, 3, would_replay, '{not json', final_profile,
                    'bad profile', preferred_version, user_note, gen_params FROM feedback LIMIT 1",
                [],
            ).unwrap();
        }
        store.append(&feedback("calm", 1, "bad one")).await.unwrap();

        let entries = store.read_all().await.unwrap();
        let prompts: Vec<_> = entries.iter().map(|e| e.music_prompt.as_str()).collect();
        assert_eq!(prompts, vec!["good one", "bad one"]);
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_fresh_store_has_empty_rules() {
        let dir = tempdir().unwrap();
        let store = FeedbackStore::open(dir.path().join("feedback.db")).await.unwrap();

        let rules = store.load_rules().await.unwrap();
        assert_eq!(rules, LearnedRules::default());
    }

    fn rules_with(positive: &str, analyzed: u64) -> LearnedRules {
        let mut rules = LearnedRules::default();
        rules.state.entries_analyzed = analyzed;
        rules.global_rules.positive.push(positive.to_string());
        rules.emotion_profiles.insert(
            "calm".to_string(),
            EmotionProfile {
                emotion: "calm".to_string(),
                defaults: BTreeMap::from([(crate::types::Dimension::Energy, 25)]),
                prompt_principles: vec!["slow tempo".to_string()],
                anti_patterns: vec!["heavy drums".to_string()],
                sample_size: 4,
            },
        );
        rules.updated_at = Some(Utc::now());
        rules
    }

    #[tokio::test]
    async fn test_reflection_snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("feedback.db");

        {
            let store = FeedbackStore::open(&path).await.unwrap();
            store.append(&feedback("calm", 4, "p")).await.unwrap();
            let snapshot = store.snapshot().await.unwrap();
            assert_eq!(snapshot.entries.len(), 1);
            assert_eq!(snapshot.state.entries_since_last_reflection, 1);

            let committed = store
                .commit_reflection(&rules_with("name specific instruments", 1), 1)
                .await
                .unwrap();
            assert_eq!(committed.reflections_completed, 1);
            assert_eq!(committed.entries_since_last_reflection, 0);
        }

        let reopened = FeedbackStore::open(&path).await.unwrap();
        let rules = reopened.load_rules().await.unwrap();
        assert_eq!(rules.state.reflections_completed, 1);
        assert_eq!(rules.state.entries_analyzed, 1);
        assert_eq!(rules.state.entries_since_last_reflection, 0);
        assert_eq!(rules.global_rules.positive, vec!["name specific instruments".to_string()]);
        assert_eq!(rules.profile("Calm").unwrap().anti_patterns, vec!["heavy drums".to_string()]);
        assert!(rules.updated_at.is_some());
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commits_from_two_handles_keep_counters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.db");
        let first = FeedbackStore::open(&path).await.unwrap();
        let second = FeedbackStore::open(&path).await.unwrap();

        first.append(&feedback("calm", 4, "a")).await.unwrap();
        first.append(&feedback("calm", 5, "b")).await.unwrap();
        let seen = first.snapshot().await.unwrap();

        // lands after the snapshot, so it stays pending
        let receipt = second.append(&feedback("calm", 3, "c")).await.unwrap();
        assert_eq!(receipt.state.entries_since_last_reflection, 3);

        let state = first
            .commit_reflection(&rules_with("one", 2), seen.state.entries_since_last_reflection)
            .await
            .unwrap();
        assert_eq!(state.reflections_completed, 1);
        assert_eq!(state.entries_since_last_reflection, 1);

        let seen = second.snapshot().await.unwrap();
        assert_eq!(seen.entries.len(), 3);
        let state = second
            .commit_reflection(&rules_with("two", 3), seen.state.entries_since_last_reflection)
            .await
            .unwrap();
        assert_eq!(state.reflections_completed, 2);
        assert_eq!(state.entries_analyzed, 3);
        assert_eq!(state.entries_since_last_reflection, 0);

        let rules = first.load_rules().await.unwrap();
        assert_eq!(rules.state, state);
        assert_eq!(rules.global_rules.positive, vec!["two".to_string()]);
    }
}
