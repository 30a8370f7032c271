//! Service Module
//!
//! This module composes the LLM client, the optimization pipeline, the renderer
//! and a document store into the three user-facing flows: generating an email
//! from a prompt, modifying a stored project, and chatting about a project.

use crate::analyzer::extract_text;
use crate::clients::parse_clients;
use crate::error::{InboxerError, Result};
use crate::llm::{
    chat_prompt, generation_prompt, modification_prompt, parse_email_response, parse_modification_response,
    ChatContext, LlmClient,
};
use crate::models::{
    ChatMetadataUpdate, ChatOutcome, ChatRequest, EmailContent, GeneratedEmail, GenerationRequest, MessageMetadata,
    MessageType, ModificationOutcome, ModificationRecord, ModificationRequest, OptimizationRequest, Project,
};
use crate::pipeline::Pipeline;
use crate::renderer::{Renderer, ThemeConfig};
use crate::store::DocumentStore;
use chrono::Utc;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

const MODIFICATION_CONFIDENCE: f64 = 0.92;
const FAILED_MODIFICATION_CONFIDENCE: f64 = 0.1;
const CHAT_CONFIDENCE: f64 = 0.9;
const FALLBACK_CONFIDENCE: f64 = 0.5;
const MAX_SUGGESTIONS: usize = 5;

lazy_static! {
    static ref SUGGESTION_BLOCKS: Vec<Regex> = [
        r"(?m)Sugestões?:\s*\n((?:[-*•]\s*.+\n?)+)",
        r"(?m)Você pode:\s*\n((?:[-*•]\s*.+\n?)+)",
        r"(?m)Opções?:\s*\n((?:[-*•]\s*.+\n?)+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
    static ref BULLET: Regex = Regex::new(r"[-*•]\s*(.+)").unwrap();
    static ref QUOTED: Regex = Regex::new(r#""([^"]+)""#).unwrap();
}

const INTENT_KEYWORDS: [(&str, &[&str]); 7] = [
    ("color_change", &["cor", "color", "azul", "verde", "vermelho", "roxo"]),
    ("text_modification", &["texto", "escrever", "mudar", "alterar", "conteúdo"]),
    ("cta_change", &["botão", "cta", "call to action", "clique"]),
    ("style_change", &["estilo", "design", "layout", "aparência"]),
    ("content_addition", &["adicionar", "incluir", "acrescentar", "novo"]),
    ("general_question", &["como", "o que", "porque", "quando", "onde"]),
    ("email_generation", &["criar", "gerar", "novo email", "fazer"]),
];

/// Intents that change the email itself.
const EDITING_INTENTS: [&str; 5] = [
    "color_change",
    "text_modification",
    "cta_change",
    "style_change",
    "content_addition",
];

const COLORS: [&str; 6] = ["azul", "verde", "vermelho", "roxo", "amarelo", "laranja"];

/// What a chat message asks for, by keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub primary: &'static str,
    pub detected: Vec<&'static str>,
    pub requires_update: bool,
    pub target_color: Option<&'static str>,
    pub cta_text: Option<String>,
    pub confidence: f64,
}

pub fn detect_intent(message: &str, has_content: bool) -> Intent {
    let lower = message.to_lowercase();
    let detected: Vec<&'static str> = INTENT_KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(name, _)| *name)
        .collect();

    let primary = detected.first().copied().unwrap_or("general_conversation");
    let editing = detected.iter().any(|d| EDITING_INTENTS.contains(d));

    let target_color = if detected.contains(&"color_change") {
        COLORS.iter().find(|c| lower.contains(*c)).copied()
    } else {
        None
    };
    let cta_text = if detected.contains(&"cta_change") {
        QUOTED.captures(message).map(|c| c[1].to_string())
    } else {
        None
    };

    Intent {
        primary,
        requires_update: editing && has_content,
        confidence: if detected.is_empty() { 0.6 } else { 0.85 },
        detected,
        target_color,
        cta_text,
    }
}

/// Bullet items listed under a "Sugestões:"-style heading, at most five.
pub fn extract_suggestions(content: &str) -> Vec<String> {
    let mut suggestions = Vec::new();
    for block in SUGGESTION_BLOCKS.iter() {
        for caps in block.captures_iter(content) {
            for item in BULLET.captures_iter(&caps[1]) {
                suggestions.push(item[1].trim().to_string());
            }
        }
    }
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

/// Labels for what an instruction probably changed.
pub fn describe_modifications(instructions: &str) -> Vec<String> {
    let lower = instructions.to_lowercase();
    let mut labels = Vec::new();
    if lower.contains("cor") {
        labels.push("Cores modificadas".to_string());
    }
    if lower.contains("botão") || lower.contains("cta") {
        labels.push("CTA atualizado".to_string());
    }
    if lower.contains("texto") {
        labels.push("Texto alterado".to_string());
    }
    if lower.contains("design") {
        labels.push("Design atualizado".to_string());
    }
    if labels.is_empty() {
        labels.push("Modificação geral aplicada".to_string());
    }
    labels
}

fn fallback_reply(message: &str, project_name: &str) -> String {
    let excerpt: String = message.chars().take(50).collect();
    let ellipsis = if message.chars().count() > 50 { "..." } else { "" };
    format!(
        "Entendi sua mensagem: \"{}{}\"\n\nEstou processando sua solicitação para {}.\n\n**Sistema temporariamente indisponível** - Tente:\n• Recarregar a página\n• Aguardar alguns segundos\n• Reformular de forma mais específica\n\nPosso ajudar com modificações de cores, textos, botões e muito mais!",
        excerpt, ellipsis, project_name
    )
}

fn fallback_suggestions() -> Vec<String> {
    vec![
        "Recarregar a página".to_string(),
        "Aguardar alguns segundos".to_string(),
        "Reformular a solicitação".to_string(),
    ]
}

fn is_full_document(html: &str) -> bool {
    let lower = html.to_lowercase();
    lower.contains("<!doctype") && lower.contains("<html")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub struct EmailService<S: DocumentStore> {
    llm: LlmClient,
    pipeline: Pipeline,
    renderer: Renderer,
    store: S,
    history_limit: usize,
}

impl<S: DocumentStore> EmailService<S> {
    pub fn new(llm: LlmClient, pipeline: Pipeline, renderer: Renderer, store: S, history_limit: usize) -> Self {
        Self { llm, pipeline, renderer, store, history_limit }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    /// Generates, themes, optimizes and scores a new email.
    ///
    /// When every model fails, or the answer carries no HTML, the deterministic
    /// fallback email goes through the same optimization and scoring.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedEmail> {
        if request.prompt.trim().is_empty() {
            return Err(InboxerError::InvalidRequest("prompt must not be empty".to_string()));
        }
        if !request.target_clients.is_empty() {
            parse_clients(&request.target_clients)?;
        }

        let theme = ThemeConfig::new(request.industry, request.tone, request.urgency);
        info!("Generating email for {} / {} / {}", request.industry, request.tone, request.urgency);

        let messages = generation_prompt(&request.prompt, request.industry, request.tone, request.urgency);
        let completion = match self.llm.complete(&messages).await {
            Ok(completion) => Some(completion),
            Err(e) => {
                warn!("Generation fell back to the built-in template: {}", e);
                None
            }
        };

        let generated = completion.and_then(|completion| {
            let parsed = parse_email_response(&completion.content);
            let Some(body) = non_empty(parsed.html) else {
                warn!("Model {} answered without HTML, using the built-in template", completion.model);
                return None;
            };
            let subject = non_empty(parsed.subject).unwrap_or_else(|| "Email Ultra-Moderno".to_string());
            let html = if is_full_document(&body) {
                body
            } else {
                self.renderer.render(&body, &subject, &theme)
            };
            let content = EmailContent {
                html,
                text: parsed.text.unwrap_or_default(),
                subject,
                preview_text: Some(
                    non_empty(parsed.preview_text).unwrap_or_else(|| "Conteúdo criado com IA".to_string()),
                ),
            };
            Some((content, completion.model, completion.tokens_used))
        });

        let (content, model, tokens_used, fallback) = match generated {
            Some((content, model, tokens_used)) => (content, model, tokens_used, false),
            None => (self.renderer.fallback_email(&request.prompt, &theme), "fallback".to_string(), 0, true),
        };

        let mut optimization = OptimizationRequest::new(content.html, &[]);
        optimization.target_clients = request.target_clients.clone();
        let optimized = self.pipeline.optimize(&optimization)?;
        let validation = self.pipeline.validate(&optimized.html, &request.target_clients)?;

        let text = if content.text.trim().is_empty() {
            extract_text(&optimized.html)
        } else {
            content.text
        };

        Ok(GeneratedEmail {
            subject: content.subject,
            preview_text: content.preview_text.unwrap_or_default(),
            text,
            html: optimized.html,
            css: optimized.css,
            optimizations: optimized.optimizations,
            compatibility_score: optimized.compatibility_score,
            validation,
            model,
            tokens_used,
            fallback: fallback || optimized.fallback,
        })
    }

    /// Stores a generated email as the content of a project owned by `user_id`.
    pub async fn save_generated(
        &self,
        project_id: &str,
        user_id: &str,
        prompt: &str,
        email: &GeneratedEmail,
    ) -> Result<Project> {
        self.load_project(project_id, user_id).await?;
        let content = EmailContent {
            html: email.html.clone(),
            text: email.text.clone(),
            subject: email.subject.clone(),
            preview_text: Some(email.preview_text.clone()),
        };
        let record = ModificationRecord {
            by: user_id.to_string(),
            timestamp: Utc::now(),
            instructions: prompt.to_string(),
            confidence: 1.0,
        };
        self.store.update_project_content(project_id, content, record).await
    }

    async fn load_project(&self, project_id: &str, user_id: &str) -> Result<Project> {
        self.store
            .get_project(project_id, user_id)
            .await?
            .ok_or_else(|| InboxerError::NotFound(format!("project {}", project_id)))
    }

    /// Applies `request.instructions` to a stored project and saves the result.
    pub async fn modify(&self, request: &ModificationRequest) -> Result<ModificationOutcome> {
        if request.instructions.trim().is_empty() {
            return Err(InboxerError::InvalidRequest("instructions must not be empty".to_string()));
        }
        let project = self.load_project(&request.project_id, &request.user_id).await?;
        if project.content.html.trim().is_empty() {
            return Err(InboxerError::InvalidRequest(format!("project {} has no email content", project.id)));
        }

        let current = &project.content;
        let messages = modification_prompt(&current.html, &request.instructions, request.preserve_structure);
        let completion = match self.llm.complete(&messages).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!("Modification of project {} failed: {}", project.id, e);
                return Ok(ModificationOutcome {
                    subject: current.subject.clone(),
                    html: current.html.clone(),
                    text: current.text.clone(),
                    modifications_applied: vec!["Erro na modificação".to_string()],
                    optimizations: vec![],
                    confidence: FAILED_MODIFICATION_CONFIDENCE,
                    project_updated: false,
                });
            }
        };

        let parsed = parse_modification_response(&completion.content);
        let html = non_empty(parsed.html).unwrap_or_else(|| current.html.clone());
        let optimized = self.pipeline.optimize(&OptimizationRequest::new(html, &[]))?;

        let subject = non_empty(parsed.subject).unwrap_or_else(|| current.subject.clone());
        let text = non_empty(parsed.text).unwrap_or_else(|| extract_text(&optimized.html));

        let updated = self
            .store
            .update_project_content(
                &project.id,
                EmailContent {
                    html: optimized.html.clone(),
                    text: text.clone(),
                    subject: subject.clone(),
                    preview_text: current.preview_text.clone(),
                },
                ModificationRecord {
                    by: request.user_id.clone(),
                    timestamp: Utc::now(),
                    instructions: request.instructions.clone(),
                    confidence: MODIFICATION_CONFIDENCE,
                },
            )
            .await?;
        info!("Project {} saved at version {}", updated.id, updated.metadata.version);

        Ok(ModificationOutcome {
            subject,
            html: optimized.html,
            text,
            modifications_applied: describe_modifications(&request.instructions),
            optimizations: optimized.optimizations,
            confidence: MODIFICATION_CONFIDENCE,
            project_updated: true,
        })
    }

    /// Answers a chat message and edits the project email when asked to.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        if request.message.trim().is_empty() {
            return Err(InboxerError::InvalidRequest("message must not be empty".to_string()));
        }

        let project = match &request.project_id {
            Some(id) => Some(self.load_project(id, &request.user_id).await?),
            None => None,
        };
        let has_content = project.as_ref().is_some_and(|p| !p.content.html.trim().is_empty());
        let intent = detect_intent(&request.message, has_content);

        let history: Vec<(MessageType, String)> = self
            .store
            .get_chat_messages(&request.chat_id, self.history_limit)
            .await?
            .into_iter()
            .map(|m| (m.message_type, m.content))
            .collect();

        let user_message = self
            .store
            .create_chat_message(&request.chat_id, MessageType::User, &request.message, MessageMetadata::default())
            .await?;

        let project_name = project.as_ref().map(|p| p.name.clone()).unwrap_or_else(|| "seu projeto".to_string());
        let context = ChatContext {
            project_name: project_name.clone(),
            project_type: project.as_ref().map(|p| p.project_type).unwrap_or_default().to_string(),
            industry: project.as_ref().map(|p| p.metadata.industry).unwrap_or_default(),
            tone: project.as_ref().map(|p| p.metadata.tone).unwrap_or_default(),
            has_content,
            intent: intent.primary.to_string(),
            confidence: intent.confidence,
            requires_update: intent.requires_update,
        };

        let messages = chat_prompt(&context, &history, &request.message);
        let (suggestions, response, model, tokens, confidence, intent_label, should_update) =
            match self.llm.complete(&messages).await {
                Ok(completion) => (
                    extract_suggestions(&completion.content),
                    completion.content,
                    completion.model,
                    completion.tokens_used,
                    CHAT_CONFIDENCE,
                    intent.primary,
                    intent.requires_update,
                ),
                Err(e) => {
                    warn!("Chat {} fell back to the canned reply: {}", request.chat_id, e);
                    (
                        fallback_suggestions(),
                        fallback_reply(&request.message, &project_name),
                        "fallback-response".to_string(),
                        0,
                        FALLBACK_CONFIDENCE,
                        "fallback",
                        false,
                    )
                }
            };

        let mut project_updated = false;
        if should_update {
            if let Some(project) = &project {
                let modification = ModificationRequest {
                    project_id: project.id.clone(),
                    user_id: request.user_id.clone(),
                    instructions: request.message.clone(),
                    preserve_structure: true,
                };
                match self.modify(&modification).await {
                    Ok(outcome) => project_updated = outcome.project_updated,
                    Err(e) => warn!("Chat {} could not update project {}: {}", request.chat_id, project.id, e),
                }
            }
        }

        let ai_message = self
            .store
            .create_chat_message(
                &request.chat_id,
                MessageType::Ai,
                &response,
                MessageMetadata {
                    email_updated: project_updated,
                    suggestions: suggestions.clone(),
                    model: Some(model.clone()),
                    tokens,
                    confidence: Some(confidence),
                    intent: Some(intent_label.to_string()),
                },
            )
            .await?;

        let update = ChatMetadataUpdate {
            messages_added: 2,
            email_updated: project_updated,
            last_update_success: should_update.then_some(project_updated),
        };
        if let Err(e) = self.store.update_chat_metadata(&request.chat_id, &update).await {
            warn!("Chat {} metadata was not updated: {}", request.chat_id, e);
        }

        Ok(ChatOutcome {
            response,
            should_update_email: should_update,
            project_updated,
            user_message_id: user_message.id,
            ai_message_id: ai_message.id,
            suggestions,
            intent: intent_label.to_string(),
            model,
            confidence,
        })
    }
}
