/// Bot storage
///
/// Stands in for the external bot-storage collaborator: it persists a bot's
/// HiveLang source (`hivelang_code`), its capability tags and its system
/// prompt. The pulse engine and the workforce orchestration read from it.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::now_secs;

/// Bot record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub hivelang_code: String,
    pub system_prompt: Option<String>,
    pub created_at: i64,
}

/// Fields needed to store a new bot
#[derive(Debug, Clone, Default)]
pub struct NewBot {
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub hivelang_code: String,
    pub system_prompt: Option<String>,
}

/// Bot repository for database operations
#[derive(Clone)]
pub struct BotRepository {
    pool: SqlitePool,
}

fn row_to_bot(r: &SqliteRow) -> Bot {
    let capabilities: String = r.get("capabilities");
    Bot {
        id: r.get("id"),
        user_id: r.get("user_id"),
        name: r.get("name"),
        description: r.get("description"),
        capabilities: serde_json::from_str(&capabilities).unwrap_or_default(),
        hivelang_code: r.get("hivelang_code"),
        system_prompt: r.get("system_prompt"),
        created_at: r.get("created_at"),
    }
}

const BOT_COLUMNS: &str =
    "id, user_id, name, description, capabilities, hivelang_code, system_prompt, created_at";

impl BotRepository {
    /// Create a new bot repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a bot and return it with its generated id
    pub async fn create_bot(&self, bot: NewBot) -> Result<Bot> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_secs();
        let capabilities = serde_json::to_string(&bot.capabilities)?;

        sqlx::query(
            "INSERT INTO bots (id, user_id, name, description, capabilities, hivelang_code, system_prompt, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&bot.user_id)
        .bind(&bot.name)
        .bind(&bot.description)
        .bind(capabilities)
        .bind(&bot.hivelang_code)
        .bind(&bot.system_prompt)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create bot")?;

        Ok(Bot {
            id,
            user_id: bot.user_id,
            name: bot.name,
            description: bot.description,
            capabilities: bot.capabilities,
            hivelang_code: bot.hivelang_code,
            system_prompt: bot.system_prompt,
            created_at: now,
        })
    }

    /// Get a bot by ID
    pub async fn get_bot(&self, bot_id: &str) -> Result<Option<Bot>> {
        let row = sqlx::query(&format!("SELECT {} FROM bots WHERE id = ?", BOT_COLUMNS))
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch bot")?;

        Ok(row.as_ref().map(row_to_bot))
    }

    /// All bots owned by a user, oldest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Bot>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bots WHERE user_id = ? ORDER BY created_at ASC, rowid ASC",
            BOT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list bots")?;

        Ok(rows.iter().map(row_to_bot).collect())
    }

    /// Every stored bot, oldest first
    pub async fn list_all(&self) -> Result<Vec<Bot>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bots ORDER BY created_at ASC, rowid ASC",
            BOT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list bots")?;

        Ok(rows.iter().map(row_to_bot).collect())
    }

    /// Delete a bot (cascades to its pulse jobs)
    pub async fn delete_bot(&self, bot_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bots WHERE id = ?")
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete bot")?;

        Ok(result.rows_affected() > 0)
    }
}
