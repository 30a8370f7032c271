//! Store Module
//!
//! This module defines the `DocumentStore` collaborator that holds projects,
//! chats and chat messages, plus two implementations: `PgDocumentStore` keeps
//! each document as JSONB in PostgreSQL, `MemoryStore` keeps them in process.

use crate::error::{InboxerError, Result};
use crate::models::{
    Chat, ChatMessage, ChatMetadataUpdate, EmailContent, MessageMetadata, MessageType, ModificationRecord, Project,
    ProjectWithChat,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the project only when it belongs to `user_id`.
    async fn get_project(&self, project_id: &str, user_id: &str) -> Result<Option<Project>>;

    /// Replaces the project's content, bumps its version and records the change.
    async fn update_project_content(
        &self,
        project_id: &str,
        content: EmailContent,
        modification: ModificationRecord,
    ) -> Result<Project>;

    async fn get_project_with_chat(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectWithChat>>;

    async fn get_chat_by_project(&self, project_id: &str) -> Result<Option<Chat>>;

    /// The newest `limit` messages of a chat, oldest first.
    async fn get_chat_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn create_chat_message(
        &self,
        chat_id: &str,
        message_type: MessageType,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<ChatMessage>;

    async fn update_chat_metadata(&self, chat_id: &str, update: &ChatMetadataUpdate) -> Result<()>;

    async fn ping(&self) -> bool;
}

pub fn apply_content_update(project: &mut Project, content: EmailContent, modification: ModificationRecord) {
    project.content = content;
    project.metadata.version += 1;
    project.metadata.last_modification = Some(modification);
    project.updated_at = Utc::now();
}

pub fn apply_metadata_update(chat: &mut Chat, update: &ChatMetadataUpdate) {
    let now = Utc::now();
    chat.metadata.total_messages += update.messages_added;
    if update.email_updated {
        chat.metadata.email_updates += 1;
    }
    if update.last_update_success.is_some() {
        chat.metadata.last_update_success = update.last_update_success;
    }
    chat.metadata.last_activity = now;
    chat.updated_at = now;
}

fn new_message(chat_id: &str, message_type: MessageType, content: &str, metadata: MessageMetadata) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4().to_string(),
        chat_id: chat_id.to_string(),
        message_type,
        content: content.to_string(),
        metadata,
        created_at: Utc::now(),
    }
}

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        document JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chats (
        id TEXT PRIMARY KEY,
        project_id TEXT,
        user_id TEXT NOT NULL,
        document JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id TEXT PRIMARY KEY,
        chat_id TEXT NOT NULL,
        document JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS chat_messages_chat_idx ON chat_messages (chat_id, created_at)",
];

/// PostgreSQL-backed store. Queries are checked at runtime so the crate
/// builds without a live database.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Creates the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Document store schema is up to date");
        Ok(())
    }

    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, user_id, document, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&project.id)
        .bind(&project.user_id)
        .bind(Json(project))
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_chat(&self, chat: &Chat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chats (id, project_id, user_id, document, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&chat.id)
        .bind(&chat.project_id)
        .bind(&chat.user_id)
        .bind(Json(chat))
        .bind(chat.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_project(&self, project_id: &str, user_id: &str) -> Result<Option<Project>> {
        let row: Option<(Json<Project>,)> =
            sqlx::query_as("SELECT document FROM projects WHERE id = $1 AND user_id = $2")
                .bind(project_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(project),)| project))
    }

    async fn update_project_content(
        &self,
        project_id: &str,
        content: EmailContent,
        modification: ModificationRecord,
    ) -> Result<Project> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Json<Project>,)> = sqlx::query_as("SELECT document FROM projects WHERE id = $1 FOR UPDATE")
            .bind(project_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((Json(mut project),)) = row else {
            return Err(InboxerError::NotFound(format!("project {}", project_id)));
        };

        apply_content_update(&mut project, content, modification);

        sqlx::query("UPDATE projects SET document = $2, updated_at = $3 WHERE id = $1")
            .bind(project_id)
            .bind(Json(&project))
            .bind(project.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(project_id, version = project.metadata.version, "Project content updated");
        Ok(project)
    }

    async fn get_project_with_chat(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectWithChat>> {
        let Some(project) = self.get_project(project_id, user_id).await? else {
            return Ok(None);
        };
        let chat = self.get_chat_by_project(project_id).await?;
        Ok(Some(ProjectWithChat { project, chat }))
    }

    async fn get_chat_by_project(&self, project_id: &str) -> Result<Option<Chat>> {
        let row: Option<(Json<Chat>,)> = sqlx::query_as(
            "SELECT document FROM chats WHERE project_id = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(Json(chat),)| chat))
    }

    async fn get_chat_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows: Vec<(Json<ChatMessage>,)> = sqlx::query_as(
            "SELECT document FROM chat_messages WHERE chat_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<ChatMessage> = rows.into_iter().map(|(Json(m),)| m).collect();
        messages.reverse();
        debug!(chat_id, count = messages.len(), "Loaded chat history");
        Ok(messages)
    }

    async fn create_chat_message(
        &self,
        chat_id: &str,
        message_type: MessageType,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<ChatMessage> {
        let message = new_message(chat_id, message_type, content, metadata);
        sqlx::query("INSERT INTO chat_messages (id, chat_id, document, created_at) VALUES ($1, $2, $3, $4)")
            .bind(&message.id)
            .bind(chat_id)
            .bind(Json(&message))
            .bind(message.created_at)
            .execute(&self.pool)
            .await?;
        Ok(message)
    }

    async fn update_chat_metadata(&self, chat_id: &str, update: &ChatMetadataUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Json<Chat>,)> = sqlx::query_as("SELECT document FROM chats WHERE id = $1 FOR UPDATE")
            .bind(chat_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((Json(mut chat),)) = row else {
            return Err(InboxerError::NotFound(format!("chat {}", chat_id)));
        };

        apply_metadata_update(&mut chat, update);

        sqlx::query("UPDATE chats SET document = $2, updated_at = $3 WHERE id = $1")
            .bind(chat_id)
            .bind(Json(&chat))
            .bind(chat.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[derive(Default)]
struct Documents {
    projects: HashMap<String, Project>,
    chats: HashMap<String, Chat>,
    messages: HashMap<String, Vec<ChatMessage>>,
}

/// In-process store used by the CLI and tests.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_project(&self, project: Project) {
        self.documents.write().await.projects.insert(project.id.clone(), project);
    }

    pub async fn insert_chat(&self, chat: Chat) {
        self.documents.write().await.chats.insert(chat.id.clone(), chat);
    }

    pub async fn get_chat(&self, chat_id: &str) -> Option<Chat> {
        self.documents.read().await.chats.get(chat_id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_project(&self, project_id: &str, user_id: &str) -> Result<Option<Project>> {
        let documents = self.documents.read().await;
        Ok(documents
            .projects
            .get(project_id)
            .filter(|p| p.user_id == user_id)
            .cloned())
    }

    async fn update_project_content(
        &self,
        project_id: &str,
        content: EmailContent,
        modification: ModificationRecord,
    ) -> Result<Project> {
        let mut documents = self.documents.write().await;
        let project = documents
            .projects
            .get_mut(project_id)
            .ok_or_else(|| InboxerError::NotFound(format!("project {}", project_id)))?;
        apply_content_update(project, content, modification);
        Ok(project.clone())
    }

    async fn get_project_with_chat(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectWithChat>> {
        let Some(project) = self.get_project(project_id, user_id).await? else {
            return Ok(None);
        };
        let chat = self.get_chat_by_project(project_id).await?;
        Ok(Some(ProjectWithChat { project, chat }))
    }

    async fn get_chat_by_project(&self, project_id: &str) -> Result<Option<Chat>> {
        let documents = self.documents.read().await;
        Ok(documents
            .chats
            .values()
            .filter(|c| c.project_id.as_deref() == Some(project_id))
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn get_chat_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let documents = self.documents.read().await;
        let messages = documents.messages.get(chat_id).map(Vec::as_slice).unwrap_or_default();
        let skip = messages.len().saturating_sub(limit);
        Ok(messages[skip..].to_vec())
    }

    async fn create_chat_message(
        &self,
        chat_id: &str,
        message_type: MessageType,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<ChatMessage> {
        let message = new_message(chat_id, message_type, content, metadata);
        self.documents
            .write()
            .await
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn update_chat_metadata(&self, chat_id: &str, update: &ChatMetadataUpdate) -> Result<()> {
        let mut documents = self.documents.write().await;
        let chat = documents
            .chats
            .get_mut(chat_id)
            .ok_or_else(|| InboxerError::NotFound(format!("chat {}", chat_id)))?;
        apply_metadata_update(chat, update);
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ChatMetadata, ProjectMetadata, ProjectStatus, ProjectType};

    pub(crate) fn sample_project(id: &str, user_id: &str, html: &str) -> Project {
        Project {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: "Campanha de outono".to_string(),
            description: String::new(),
            project_type: ProjectType::Campaign,
            status: ProjectStatus::Draft,
            content: EmailContent {
                html: html.to_string(),
                text: String::new(),
                subject: "Novidades".to_string(),
                preview_text: None,
            },
            metadata: ProjectMetadata { version: 1, ..Default::default() },
            tags: vec![],
            chat_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn sample_chat(id: &str, user_id: &str, project_id: &str) -> Chat {
        Chat {
            id: id.to_string(),
            user_id: user_id.to_string(),
            project_id: Some(project_id.to_string()),
            title: "Chat".to_string(),
            is_active: true,
            metadata: ChatMetadata::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn modification(instructions: &str) -> ModificationRecord {
        ModificationRecord {
            by: "user-1".to_string(),
            timestamp: Utc::now(),
            instructions: instructions.to_string(),
            confidence: 0.92,
        }
    }

    #[tokio::test]
    async fn test_project_ownership() {
        let store = MemoryStore::new();
        store.insert_project(sample_project("p1", "user-1", "<p>x</p>")).await;

        assert!(store.get_project("p1", "user-1").await.unwrap().is_some());
        assert!(store.get_project("p1", "user-2").await.unwrap().is_none());
        assert!(store.get_project_with_chat("p1", "user-2").await.unwrap().is_none());
        assert!(store.ping().await);
    }

    #[tokio::test]
    async fn test_update_project_content_bumps_version() {
        let store = MemoryStore::new();
        store.insert_project(sample_project("p1", "user-1", "<p>old</p>")).await;

        let content = EmailContent { html: "<p>new</p>".to_string(), ..Default::default() };
        let updated = store
            .update_project_content("p1", content, modification("mudar texto"))
            .await
            .unwrap();
        assert_eq!(updated.metadata.version, 2);
        assert_eq!(updated.content.html, "<p>new</p>");
        assert_eq!(
            updated.metadata.last_modification.as_ref().map(|m| m.instructions.as_str()),
            Some("mudar texto")
        );

        let missing = store
            .update_project_content("nope", EmailContent::default(), modification("x"))
            .await;
        assert!(matches!(missing, Err(InboxerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_chat_messages_window() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .create_chat_message("c1", MessageType::User, &format!("m{}", i), MessageMetadata::default())
                .await
                .unwrap();
        }

        let window = store.get_chat_messages("c1", 3).await.unwrap();
        assert_eq!(window.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), vec!["m2", "m3", "m4"]);
        assert_ne!(window[0].id, window[1].id);
        assert!(store.get_chat_messages("other", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_chat_metadata() {
        let store = MemoryStore::new();
        store.insert_project(sample_project("p1", "user-1", "")).await;
        store.insert_chat(sample_chat("c1", "user-1", "p1")).await;

        let update = ChatMetadataUpdate { messages_added: 2, email_updated: true, last_update_success: Some(true) };
        store.update_chat_metadata("c1", &update).await.unwrap();
        store.update_chat_metadata("c1", &update).await.unwrap();

        let with_chat = store.get_project_with_chat("p1", "user-1").await.unwrap().unwrap();
        let chat = with_chat.chat.unwrap();
        assert_eq!(chat.metadata.total_messages, 4);
        assert_eq!(chat.metadata.email_updates, 2);
        assert_eq!(chat.metadata.last_update_success, Some(true));

        assert!(store.update_chat_metadata("missing", &update).await.is_err());
    }
}
