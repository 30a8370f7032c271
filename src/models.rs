//! Data Models Module
//!
//! This module defines the core data structures used by Inboxer: email client
//! identifiers, validation findings and score reports, optimization requests and
//! responses, theme keys, and the project/chat documents kept in the store. It also
//! provides implementations for converting from strings and default values.
use crate::error::InboxerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClientId {
    Gmail,
    Outlook,
    AppleMail,
    Yahoo,
    Thunderbird,
}

impl ClientId {
    pub const ALL: [ClientId; 5] = [
        ClientId::Gmail,
        ClientId::Outlook,
        ClientId::AppleMail,
        ClientId::Yahoo,
        ClientId::Thunderbird,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientId::Gmail => "gmail",
            ClientId::Outlook => "outlook",
            ClientId::AppleMail => "apple_mail",
            ClientId::Yahoo => "yahoo",
            ClientId::Thunderbird => "thunderbird",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Issue,
    Warning,
    Suggestion,
}

/// A single finding. Findings are kept in detection order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ValidationIssue {
    pub fn issue(message: impl Into<String>) -> Self {
        Self { severity: Severity::Issue, message: message.into(), location: None }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: message.into(), location: None }
    }

    pub fn suggestion(message: impl Into<String>) -> Self {
        Self { severity: Severity::Suggestion, message: message.into(), location: None }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Messages of the given severity, in detection order.
pub fn messages_of(findings: &[ValidationIssue], severity: Severity) -> Vec<String> {
    findings
        .iter()
        .filter(|f| f.severity == severity)
        .map(|f| f.message.clone())
        .collect()
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ClientCompatibility {
    pub score: u8,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScoreReport {
    pub valid: bool,
    pub overall_score: u8,
    pub structural_score: u8,
    pub css_score: u8,
    pub accessibility_score: u8,
    pub performance_score: u8,
    pub findings: Vec<ValidationIssue>,
    pub client_compatibility: BTreeMap<ClientId, ClientCompatibility>,
}

impl ScoreReport {
    pub fn issues(&self) -> Vec<String> {
        messages_of(&self.findings, Severity::Issue)
    }

    pub fn warnings(&self) -> Vec<String> {
        messages_of(&self.findings, Severity::Warning)
    }

    pub fn suggestions(&self) -> Vec<String> {
        messages_of(&self.findings, Severity::Suggestion)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub html: String,
    #[serde(default)]
    pub target_clients: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_dark_mode: bool,
    #[serde(default = "default_true")]
    pub mobile_first: bool,
    #[serde(default)]
    pub minify: bool,
}

impl OptimizationRequest {
    pub fn new(html: impl Into<String>, target_clients: &[&str]) -> Self {
        Self {
            html: html.into(),
            target_clients: target_clients.iter().map(|c| c.to_string()).collect(),
            enable_dark_mode: true,
            mobile_first: true,
            minify: false,
        }
    }
}

/// Everything one optimization run produced. Built once per request.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub html: String,
    pub css: String,
    pub applied_optimizations: Vec<String>,
    pub report: ScoreReport,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResponse {
    pub html: String,
    pub css: String,
    pub optimizations: Vec<String>,
    pub compatibility_score: f64,
    pub per_client: BTreeMap<ClientId, ClientCompatibility>,
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeliverabilityReport {
    pub deliverability_score: u8,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpamReport {
    pub spam_score: u32,
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Industry {
    Saude,
    Tecnologia,
    Educacao,
    Ecommerce,
    Financas,
    #[default]
    Geral,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Friendly,
    Urgent,
    Luxury,
    Casual,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    Welcome,
    Newsletter,
    #[default]
    Campaign,
    Promotional,
    Announcement,
    FollowUp,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Active,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Ai,
    System,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct EmailContent {
    pub html: String,
    pub text: String,
    pub subject: String,
    pub preview_text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModificationRecord {
    pub by: String,
    pub timestamp: DateTime<Utc>,
    pub instructions: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProjectMetadata {
    pub industry: Industry,
    pub tone: Tone,
    pub target_audience: Option<String>,
    pub original_prompt: String,
    pub version: u32,
    pub last_modification: Option<ModificationRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    pub status: ProjectStatus,
    pub content: EmailContent,
    pub metadata: ProjectMetadata,
    pub tags: Vec<String>,
    pub chat_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMetadata {
    pub total_messages: u32,
    pub last_activity: DateTime<Utc>,
    pub email_updates: u32,
    pub last_update_success: Option<bool>,
}

impl Default for ChatMetadata {
    fn default() -> Self {
        Self {
            total_messages: 0,
            last_activity: Utc::now(),
            email_updates: 0,
            last_update_success: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub is_active: bool,
    pub metadata: ChatMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update merged into a chat's metadata.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ChatMetadataUpdate {
    pub messages_added: u32,
    pub email_updated: bool,
    pub last_update_success: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MessageMetadata {
    pub email_updated: bool,
    pub suggestions: Vec<String>,
    pub model: Option<String>,
    pub tokens: u32,
    pub confidence: Option<f64>,
    pub intent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    pub metadata: MessageMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProjectWithChat {
    pub project: Project,
    pub chat: Option<Chat>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub industry: Industry,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub target_clients: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneratedEmail {
    pub subject: String,
    pub preview_text: String,
    pub html: String,
    pub text: String,
    pub css: String,
    pub optimizations: Vec<String>,
    pub compatibility_score: f64,
    pub validation: ScoreReport,
    pub model: String,
    pub tokens_used: u32,
    pub fallback: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModificationRequest {
    pub project_id: String,
    pub user_id: String,
    pub instructions: String,
    #[serde(default = "default_true")]
    pub preserve_structure: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModificationOutcome {
    pub subject: String,
    pub html: String,
    pub text: String,
    pub modifications_applied: Vec<String>,
    pub optimizations: Vec<String>,
    pub confidence: f64,
    pub project_updated: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub chat_id: String,
    pub user_id: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatOutcome {
    pub response: String,
    pub should_update_email: bool,
    pub project_updated: bool,
    pub user_message_id: String,
    pub ai_message_id: String,
    pub suggestions: Vec<String>,
    pub intent: String,
    pub model: String,
    pub confidence: f64,
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Issue => write!(f, "issue"),
            Severity::Warning => write!(f, "warning"),
            Severity::Suggestion => write!(f, "suggestion"),
        }
    }
}
impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::VeryLow => write!(f, "very_low"),
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}
impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Industry::Saude => write!(f, "saude"),
            Industry::Tecnologia => write!(f, "tecnologia"),
            Industry::Educacao => write!(f, "educacao"),
            Industry::Ecommerce => write!(f, "ecommerce"),
            Industry::Financas => write!(f, "financas"),
            Industry::Geral => write!(f, "geral"),
        }
    }
}
impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::Professional => write!(f, "professional"),
            Tone::Friendly => write!(f, "friendly"),
            Tone::Urgent => write!(f, "urgent"),
            Tone::Luxury => write!(f, "luxury"),
            Tone::Casual => write!(f, "casual"),
        }
    }
}
impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Low => write!(f, "low"),
            Urgency::Medium => write!(f, "medium"),
            Urgency::High => write!(f, "high"),
        }
    }
}
impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::User => write!(f, "user"),
            MessageType::Ai => write!(f, "ai"),
            MessageType::System => write!(f, "system"),
        }
    }
}
impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectType::Welcome => write!(f, "welcome"),
            ProjectType::Newsletter => write!(f, "newsletter"),
            ProjectType::Campaign => write!(f, "campaign"),
            ProjectType::Promotional => write!(f, "promotional"),
            ProjectType::Announcement => write!(f, "announcement"),
            ProjectType::FollowUp => write!(f, "follow-up"),
        }
    }
}
impl FromStr for ClientId {
    type Err = InboxerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gmail" => Ok(ClientId::Gmail),
            "outlook" => Ok(ClientId::Outlook),
            "apple_mail" => Ok(ClientId::AppleMail),
            "yahoo" => Ok(ClientId::Yahoo),
            "thunderbird" => Ok(ClientId::Thunderbird),
            _ => Err(InboxerError::UnknownClient(s.to_string())),
        }
    }
}
impl FromStr for Industry {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "saude" | "saúde" | "health" => Ok(Industry::Saude),
            "tecnologia" | "technology" | "tech" => Ok(Industry::Tecnologia),
            "educacao" | "educação" | "education" => Ok(Industry::Educacao),
            "ecommerce" | "e-commerce" => Ok(Industry::Ecommerce),
            "financas" | "finanças" | "finance" => Ok(Industry::Financas),
            "geral" | "general" => Ok(Industry::Geral),
            _ => Err(format!("Invalid industry: {}", s)),
        }
    }
}
impl FromStr for Tone {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "professional" => Ok(Tone::Professional),
            "friendly" => Ok(Tone::Friendly),
            "urgent" => Ok(Tone::Urgent),
            "luxury" => Ok(Tone::Luxury),
            "casual" => Ok(Tone::Casual),
            _ => Err(format!("Invalid tone: {}", s)),
        }
    }
}
impl FromStr for Urgency {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            _ => Err(format!("Invalid urgency: {}", s)),
        }
    }
}
