//! Worker Module for Inboxer
//!
//! This worker continuously consumes tasks from a RabbitMQ queue. Each task asks
//! for a new email, a modification of a stored project, or a chat reply. Results
//! are persisted in PostgreSQL through the document store, and a notification is
//! published via Redis Pub/Sub once the task is done.
//!
//! The worker reads `AMQP_ADDR`, `DATABASE_URL` and `REDIS_URL` from the
//! environment; LLM and pipeline settings come from `Config::new()`.

use anyhow::{Context, Result};
use futures_util::stream::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, QueueDeclareOptions},
    types::FieldTable,
    Connection, ConnectionProperties,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{error, info, warn};

use inboxer::llm::LlmClient;
use inboxer::models::{ChatRequest, GenerationRequest, ModificationRequest};
use inboxer::pipeline::Pipeline;
use inboxer::renderer::Renderer;
use inboxer::service::EmailService;
use inboxer::store::{DocumentStore, PgDocumentStore};
use inboxer::{Config, InboxerError};

const QUEUE: &str = "inboxer_tasks";
const CHANNEL: &str = "inboxer_notifications";

/// Message format for tasks received from the MQ.
#[derive(Debug, Serialize, Deserialize)]
struct TaskMessage {
    task_id: String,
    #[serde(flatten)]
    task: Task,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Task {
    Generate {
        #[serde(flatten)]
        request: GenerationRequest,
        /// Stores the generated email in this project when set; requires `user_id`.
        #[serde(default)]
        project_id: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
    },
    Modify(ModificationRequest),
    Chat(ChatRequest),
}

impl Task {
    fn kind(&self) -> &'static str {
        match self {
            Task::Generate { .. } => "generate",
            Task::Modify(_) => "modify",
            Task::Chat(_) => "chat",
        }
    }
}

/// Payload published once a task finishes.
#[derive(Debug, Serialize)]
struct Notification {
    task_id: String,
    kind: &'static str,
    success: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Runs one task and returns its JSON result.
async fn process_task<S: DocumentStore>(service: &EmailService<S>, task: &Task) -> Result<serde_json::Value> {
    match task {
        Task::Generate { request, project_id, user_id } => {
            // Reject before spending tokens on an email that cannot be stored.
            let target = match (project_id, user_id) {
                (Some(project_id), Some(user_id)) => Some((project_id, user_id)),
                (Some(project_id), None) => {
                    return Err(InboxerError::InvalidRequest(format!(
                        "user_id is required to store a generated email in project {}",
                        project_id
                    ))
                    .into())
                }
                (None, _) => None,
            };
            let email = service.generate(request).await?;
            if let Some((project_id, user_id)) = target {
                service
                    .save_generated(project_id, user_id, &request.prompt, &email)
                    .await
                    .with_context(|| format!("Failed to store generated email in project {}", project_id))?;
            }
            Ok(serde_json::to_value(email)?)
        }
        Task::Modify(request) => Ok(serde_json::to_value(service.modify(request).await?)?),
        Task::Chat(request) => Ok(serde_json::to_value(service.chat(request).await?)?),
    }
}

/// Publishes a notification on Redis Pub/Sub.
///
/// Uses get_multiplexed_async_connection and explicitly annotates the publish call.
async fn publish_notification(redis_client: &redis::Client, notification: &Notification) -> Result<()> {
    let payload = serde_json::to_string(notification)?;
    let mut conn = redis_client.get_multiplexed_async_connection().await?;
    conn.publish::<&str, &str, ()>(CHANNEL, &payload).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration from environment variables.
    let amqp_addr = env::var("AMQP_ADDR").unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".into());
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
    let config = Config::new().context("Failed to load configuration")?;

    // Connect to RabbitMQ.
    let conn = Connection::connect(&amqp_addr, ConnectionProperties::default()).await?;
    let channel = conn.create_channel().await?;
    channel
        .queue_declare(QUEUE, QueueDeclareOptions::default(), FieldTable::default())
        .await?;
    let mut consumer = channel
        .basic_consume(QUEUE, "inboxer_consumer", BasicConsumeOptions::default(), FieldTable::default())
        .await?;

    // Set up the document store and make sure its tables exist.
    let store = PgDocumentStore::connect(&database_url).await?;
    store.migrate().await?;

    // Set up Redis client.
    let redis_client = redis::Client::open(redis_url)?;

    let llm = LlmClient::new(&config)?;
    if !llm.health_check().await {
        warn!("LLM provider is not reachable, generation will use the fallback template");
    }
    let service = EmailService::new(llm, Pipeline::new(&config)?, Renderer::new()?, store, config.history_limit);

    info!("Worker started, waiting for messages on {}...", QUEUE);

    // Process messages continuously.
    while let Some(delivery_result) = consumer.next().await {
        let delivery = match delivery_result {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("Error receiving message: {:?}", e);
                continue;
            }
        };

        let message: TaskMessage = match serde_json::from_slice(&delivery.data) {
            Ok(message) => message,
            Err(e) => {
                error!("Dropping malformed task: {}", e);
                delivery.nack(BasicNackOptions { requeue: false, ..Default::default() }).await?;
                continue;
            }
        };

        let kind = message.task.kind();
        info!(task_id = %message.task_id, kind, "Processing task");

        let notification = match process_task(&service, &message.task).await {
            Ok(result) => Notification {
                task_id: message.task_id.clone(),
                kind,
                success: true,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                error!(task_id = %message.task_id, "Task failed: {:#}", e);
                Notification {
                    task_id: message.task_id.clone(),
                    kind,
                    success: false,
                    result: None,
                    error: Some(format!("{:#}", e)),
                }
            }
        };

        if let Err(e) = publish_notification(&redis_client, &notification).await {
            warn!(task_id = %message.task_id, "Failed to publish notification: {:#}", e);
        }

        // Acknowledge the message.
        delivery.ack(BasicAckOptions::default()).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_message_parsing() {
        let raw = r#"{"task_id": "t1", "kind": "generate", "prompt": "Promo", "industry": "tecnologia", "project_id": "p1"}"#;
        let message: TaskMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.task_id, "t1");
        match message.task {
            Task::Generate { request, project_id, user_id } => {
                assert_eq!(request.prompt, "Promo");
                assert_eq!(project_id.as_deref(), Some("p1"));
                assert!(user_id.is_none());
            }
            other => panic!("unexpected task {:?}", other),
        }

        let raw = r#"{"task_id": "t2", "kind": "chat", "message": "oi", "chat_id": "c1", "user_id": "u1"}"#;
        let message: TaskMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.task.kind(), "chat");

        let raw = r#"{"task_id": "t3", "kind": "modify", "project_id": "p1", "user_id": "u1", "instructions": "x"}"#;
        let message: TaskMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(message.task, Task::Modify(ref r) if r.preserve_structure));

        assert!(serde_json::from_str::<TaskMessage>(r#"{"task_id": "t4", "kind": "delete"}"#).is_err());
    }

    #[tokio::test]
    async fn test_generate_task_requires_project_owner() {
        use inboxer::store::MemoryStore;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(wiremock::matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let config = Config {
            llm_api_key: Some("sk-test".to_string()),
            llm_base_url: mock_server.uri(),
            ..Config::default()
        };
        let service = EmailService::new(
            LlmClient::new(&config).unwrap(),
            Pipeline::default(),
            Renderer::new().unwrap(),
            MemoryStore::new(),
            config.history_limit,
        );

        let raw = r#"{"task_id": "t5", "kind": "generate", "prompt": "Promo", "project_id": "p1"}"#;
        let message: TaskMessage = serde_json::from_str(raw).unwrap();
        let err = process_task(&service, &message.task).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<InboxerError>(), Some(InboxerError::InvalidRequest(_))));
    }
}
