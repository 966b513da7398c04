// Repository pattern - isolates all database side effects
use crate::state::DbPool;
use crate::stories::domain::*;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Repository trait - every query is scoped by owner
#[async_trait]
pub trait StoryRepository: Send + Sync {
    async fn insert(&self, story: &Story) -> Result<(), RepositoryError>;

    async fn find(&self, owner_id: &str, id: &StoryId) -> Result<Option<Story>, RepositoryError>;

    /// Owned stories, newest first
    async fn list(&self, owner_id: &str) -> Result<Vec<Story>, RepositoryError>;

    /// Load, apply and write back in one transaction
    async fn apply(
        &self,
        owner_id: &str,
        id: &StoryId,
        change: StoryChange,
        now: DateTime<Utc>,
    ) -> Result<Story, RepositoryError>;

    /// Returns false when nothing owned matched
    async fn delete(&self, owner_id: &str, id: &StoryId) -> Result<bool, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteStoryRepository {
    pool: DbPool,
}

impl SqliteStoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const COLUMNS: &str = "id, user_id, title, images, image_summaries, narrative, narrative_hash, \
                       audio_path, audio_narrative_hash, is_improved, created_at, updated_at";

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Raw column values, converted to a `Story` outside the row callback so
/// JSON and timestamp failures surface as repository errors.
struct StoryRow {
    id: String,
    user_id: String,
    title: String,
    images: String,
    image_summaries: String,
    narrative: Option<String>,
    narrative_hash: Option<String>,
    audio_path: Option<String>,
    audio_narrative_hash: Option<String>,
    is_improved: bool,
    created_at: String,
    updated_at: String,
}

impl StoryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            images: row.get(3)?,
            image_summaries: row.get(4)?,
            narrative: row.get(5)?,
            narrative_hash: row.get(6)?,
            audio_path: row.get(7)?,
            audio_narrative_hash: row.get(8)?,
            is_improved: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_story(self) -> Result<Story, RepositoryError> {
        let corrupt = |reason: String| RepositoryError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let images: Vec<String> = serde_json::from_str(&self.images)?;
        let captions: Vec<String> = serde_json::from_str(&self.image_summaries)?;
        if images.len() != captions.len() {
            return Err(corrupt(format!(
                "{} images but {} captions",
                images.len(),
                captions.len()
            )));
        }
        let pages = images
            .into_iter()
            .zip(captions)
            .map(|(path, caption)| CaptionedImage { path, caption })
            .collect();

        let narrative = self.narrative.map(|text| match self.narrative_hash {
            Some(hash) => Narrative {
                text,
                hash: NarrativeHash(hash),
            },
            None => Narrative::new(text),
        });

        let audio = match (self.audio_path, self.audio_narrative_hash) {
            (Some(path), Some(source)) => Some(AudioTrack {
                path,
                source: NarrativeHash(source),
            }),
            // Audio with no recorded source is treated as stale
            (Some(path), None) => Some(AudioTrack {
                path,
                source: NarrativeHash(String::new()),
            }),
            (None, _) => None,
        };

        let parse = |value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|e| corrupt(format!("bad timestamp {:?}: {}", value, e)))
        };
        let created_at = parse(&self.created_at)?;
        let updated_at = parse(&self.updated_at)?;

        Ok(Story {
            id: StoryId(self.id),
            owner_id: self.user_id,
            title: self.title,
            pages,
            narrative,
            audio,
            is_improved: self.is_improved,
            created_at,
            updated_at,
        })
    }
}

fn load(conn: &Connection, owner_id: &str, id: &StoryId) -> Result<Option<Story>, RepositoryError> {
    let sql = format!(
        "SELECT {} FROM stories WHERE id = ?1 AND user_id = ?2",
        COLUMNS
    );
    conn.query_row(&sql, params![id.as_str(), owner_id], StoryRow::from_row)
        .optional()?
        .map(StoryRow::into_story)
        .transpose()
}

#[async_trait]
impl StoryRepository for SqliteStoryRepository {
    async fn insert(&self, story: &Story) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;

        let images = serde_json::to_string(&story.images())?;
        let captions = serde_json::to_string(&story.captions())?;

        conn.execute(
            "INSERT INTO stories (id, user_id, title, images, image_summaries, narrative,
                                  narrative_hash, audio_path, audio_narrative_hash, is_improved,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                story.id.as_str(),
                story.owner_id,
                story.title,
                images,
                captions,
                story.narrative.as_ref().map(|n| n.text.as_str()),
                story.narrative.as_ref().map(|n| n.hash.as_str()),
                story.audio.as_ref().map(|a| a.path.as_str()),
                story.audio.as_ref().map(|a| a.source.as_str()),
                story.is_improved,
                timestamp(&story.created_at),
                timestamp(&story.updated_at),
            ],
        )?;

        Ok(())
    }

    async fn find(&self, owner_id: &str, id: &StoryId) -> Result<Option<Story>, RepositoryError> {
        let conn = self.pool.get()?;
        load(&conn, owner_id, id)
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Story>, RepositoryError> {
        let conn = self.pool.get()?;

        let sql = format!(
            "SELECT {} FROM stories WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![owner_id], StoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(StoryRow::into_story).collect()
    }

    async fn apply(
        &self,
        owner_id: &str,
        id: &StoryId,
        change: StoryChange,
        now: DateTime<Utc>,
    ) -> Result<Story, RepositoryError> {
        let mut conn = self.pool.get()?;

        // Writers are serialized so no column update is lost. Dropping the
        // transaction without a successful commit rolls it back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let story = load(&tx, owner_id, id)?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .apply(change, now);

        tx.execute(
            "UPDATE stories SET narrative = ?1, narrative_hash = ?2, audio_path = ?3,
                                audio_narrative_hash = ?4, is_improved = ?5, updated_at = ?6
             WHERE id = ?7 AND user_id = ?8",
            params![
                story.narrative.as_ref().map(|n| n.text.as_str()),
                story.narrative.as_ref().map(|n| n.hash.as_str()),
                story.audio.as_ref().map(|a| a.path.as_str()),
                story.audio.as_ref().map(|a| a.source.as_str()),
                story.is_improved,
                timestamp(&story.updated_at),
                story.id.as_str(),
                owner_id,
            ],
        )?;

        tx.commit()?;
        Ok(story)
    }

    async fn delete(&self, owner_id: &str, id: &StoryId) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "DELETE FROM stories WHERE id = ?1 AND user_id = ?2",
            params![id.as_str(), owner_id],
        )?;

        Ok(rows > 0)
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynStoryRepository = Arc<dyn StoryRepository>;
