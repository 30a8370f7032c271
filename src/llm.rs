//! LLM Module
//!
//! This module talks to an OpenAI-compatible chat-completion endpoint. Each call
//! tries the primary model first and then every fallback model in order; a
//! non-success status or a transport error moves on to the next model.
//!
//! It also builds the generation, modification and chat prompts and parses the
//! JSON answers the models are asked to return.

use crate::config::Config;
use crate::error::{InboxerError, Result};
use crate::models::{Industry, MessageType, Tone, Urgency};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

/// A successful answer and the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub tokens_used: u32,
}

/// Email fields a generation answer may carry.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ParsedEmail {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub preview_text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Fields a modification answer may carry.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ParsedModification {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub changes_made: Vec<String>,
}

/// Project facts handed to the chat prompt.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub project_name: String,
    pub project_type: String,
    pub industry: Industry,
    pub tone: Tone,
    pub has_content: bool,
    pub intent: String,
    pub confidence: f64,
    pub requires_update: bool,
}

/// LlmClient sends chat-completion requests with model fallback.
#[derive(Debug)]
pub struct LlmClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    models: Vec<String>,
    app_url: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.llm_base_url)
            .map_err(|e| InboxerError::InvalidRequest(format!("Invalid LLM base URL: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.llm_api_key.clone(),
            models: config.model_priority(),
            app_url: config.app_url.clone(),
            max_tokens: config.llm_max_tokens,
            temperature: config.llm_temperature,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Sends `messages` to each model in priority order until one answers.
    pub async fn complete(&self, messages: &[PromptMessage]) -> Result<Completion> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| InboxerError::AllModelsFailed("no API key configured".to_string()))?;

        let url = self.endpoint("chat/completions");
        let mut last_error = None;

        for (attempt, model) in self.models.iter().enumerate() {
            if attempt > 0 {
                log::info!("Falling back to model {}", model);
            }

            let body = CompletionRequest {
                model,
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                stream: false,
            };

            match self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .header("HTTP-Referer", &self.app_url)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        log::warn!("Model {} failed: HTTP {}", model, status);
                        last_error = Some(format!("{}: HTTP {}", model, status));
                        continue;
                    }
                    match response.json::<CompletionResponse>().await {
                        Ok(parsed) => {
                            let Some(choice) = parsed.choices.into_iter().next() else {
                                log::warn!("Model {} returned no choices", model);
                                last_error = Some(format!("{}: empty choices", model));
                                continue;
                            };
                            log::info!("Model {} answered (attempt {})", model, attempt + 1);
                            return Ok(Completion {
                                content: choice.message.content,
                                model: model.clone(),
                                tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
                            });
                        }
                        Err(e) => {
                            log::warn!("Model {} returned an unreadable body: {}", model, e);
                            last_error = Some(format!("{}: {}", model, e));
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Model {} encountered error: {}", model, e);
                    if e.is_timeout() {
                        last_error = Some(format!("{}: timeout", model));
                    } else {
                        last_error = Some(format!("{}: {}", model, e));
                    }
                }
            }
        }

        Err(InboxerError::AllModelsFailed(format!(
            "{} models tried, last error: {}",
            self.models.len(),
            last_error.unwrap_or_else(|| "none".to_string())
        )))
    }

    /// True when the provider lists its models for our key.
    pub async fn health_check(&self) -> bool {
        let Some(api_key) = self.api_key.as_deref() else {
            return false;
        };
        match self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(api_key)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::error!("LLM health check failed: {}", e);
                false
            }
        }
    }
}

/// Locates the outermost `{...}` in a model answer, ignoring code fences.
fn json_object(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content.trim().trim_start_matches("```json").trim_matches('`').trim(),
    }
}

pub fn parse_email_response(content: &str) -> ParsedEmail {
    match serde_json::from_str::<ParsedEmail>(json_object(content)) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("Generation answer is not JSON ({}), wrapping raw content", e);
            let html = if content.contains('<') {
                content.to_string()
            } else {
                format!("<p>{}</p>", content)
            };
            ParsedEmail {
                subject: Some("Email Gerado por IA".to_string()),
                preview_text: Some("Conteúdo criado automaticamente".to_string()),
                html: Some(html),
                text: Some(content.to_string()),
            }
        }
    }
}

pub fn parse_modification_response(content: &str) -> ParsedModification {
    match serde_json::from_str::<ParsedModification>(json_object(content)) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("Modification answer is not JSON ({}), wrapping raw content", e);
            ParsedModification {
                html: Some(content.to_string()),
                changes_made: vec!["Modificação aplicada".to_string()],
                ..Default::default()
            }
        }
    }
}

fn industry_brief(industry: Industry) -> (&'static str, &'static str, &'static str) {
    match industry {
        Industry::Saude => ("#059669, #10b981", "ícones médicos, elementos de confiança", "Cuidar da Saúde"),
        Industry::Tecnologia => ("#2563eb, #3b82f6", "gradientes modernos, ícones tech", "Experimentar Agora"),
        Industry::Ecommerce => ("#16a34a, #22c55e", "botões de compra, badges de segurança", "Comprar Agora"),
        _ => ("#6366f1, #8b5cf6", "design limpo e moderno", "Saiba Mais"),
    }
}

pub fn generation_prompt(prompt: &str, industry: Industry, tone: Tone, urgency: Urgency) -> Vec<PromptMessage> {
    let (colors, elements, cta) = industry_brief(industry);
    let system = format!(
        r#"Você é um especialista em email marketing e design moderno. Crie um email HTML ultra-moderno.

ESPECIFICAÇÕES OBRIGATÓRIAS:
- Indústria: {industry}
- Tom: {tone}
- Urgência: {urgency}
- Cores sugeridas: {colors}
- Elementos: {elements}
- CTA: {cta}

REQUISITOS TÉCNICOS:
1. HTML COMPLETO com DOCTYPE e estrutura válida
2. CSS inline para máxima compatibilidade
3. Design responsivo (mobile-first)
4. Compatível com Gmail, Outlook, Apple Mail
5. Dark mode otimizado
6. Acessibilidade (ARIA labels, alt texts)

FORMATO DE RESPOSTA (JSON):
{{
  "subject": "Assunto otimizado (máx 50 chars)",
  "preview_text": "Preview atrativo (máx 90 chars)",
  "html": "HTML COMPLETO ultra-moderno",
  "text": "Versão texto plano"
}}

Retorne APENAS JSON válido, sem explicações."#
    );
    vec![PromptMessage::system(system), PromptMessage::user(prompt)]
}

/// Coarse structure hints for the modification prompt.
fn structure_hints(html: &str) -> (Vec<&'static str>, &'static str) {
    let lower = html.to_lowercase();
    let mut elements = Vec::new();
    if lower.contains("header") {
        elements.push("header");
    }
    if lower.contains("button") || lower.contains("cta") {
        elements.push("cta");
    }
    let style = if lower.contains("gradient") {
        "modern"
    } else if lower.contains("table") {
        "table-based"
    } else {
        "desconhecido"
    };
    (elements, style)
}

pub fn modification_prompt(html: &str, instructions: &str, preserve_structure: bool) -> Vec<PromptMessage> {
    let (elements, style) = structure_hints(html);
    let system = format!(
        r#"Você é um especialista em modificação de emails HTML.

TAREFA: Modificar email existente conforme instruções específicas.

ESTRUTURA ATUAL DETECTADA:
- Elementos: {elements:?}
- Estilo: {style}
- Preservar estrutura: {preserve_structure}

INSTRUÇÕES DE MODIFICAÇÃO:
{instructions}

REGRAS:
1. Aplicar EXATAMENTE as modificações solicitadas
2. Manter compatibilidade com email clients
3. Preservar responsive design
4. Não quebrar estrutura existente

FORMATO DE RESPOSTA (JSON):
{{
  "html": "HTML modificado",
  "subject": "Novo assunto (se aplicável)",
  "text": "Versão texto (se modificada)",
  "changes_made": ["lista de modificações aplicadas"]
}}

Retorne APENAS JSON válido."#
    );

    let excerpt: String = html.chars().take(2000).collect();
    let user = format!(
        "MODIFIQUE o email com base nestas instruções: {instructions}\n\nHTML ATUAL:\n{excerpt}\n\nMantenha a estrutura se solicitado e aplique as modificações específicas."
    );
    vec![PromptMessage::system(system), PromptMessage::user(user)]
}

/// System prompt, prior turns, then the new user message.
pub fn chat_prompt(context: &ChatContext, history: &[(MessageType, String)], message: &str) -> Vec<PromptMessage> {
    let system = format!(
        r#"Você é um assistente especializado em email marketing e design.

CONTEXTO DO PROJETO:
- Nome: {}
- Tipo: {}
- Indústria: {}
- Tom: {}
- Possui conteúdo: {}

INTENÇÃO DO USUÁRIO:
- Intenção primária: {}
- Confiança: {}
- Requer atualização: {}

INSTRUÇÕES:
1. Responda de forma natural e conversacional
2. Seja específico sobre modificações
3. Ofereça sugestões quando apropriado, em uma lista iniciada por "Sugestões:"

Se o usuário solicitar modificações, confirme o que será alterado.
Se for uma pergunta geral, forneça informações úteis."#,
        context.project_name,
        context.project_type,
        context.industry,
        context.tone,
        context.has_content,
        context.intent,
        context.confidence,
        context.requires_update,
    );

    let mut messages = vec![PromptMessage::system(system)];
    for (kind, content) in history {
        match kind {
            MessageType::User => messages.push(PromptMessage::user(content.clone())),
            MessageType::Ai => messages.push(PromptMessage::assistant(content.clone())),
            MessageType::System => {}
        }
    }
    messages.push(PromptMessage::user(message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::*;
    use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "total_tokens": 42 }
        })
    }

    fn config(base_url: &str, timeout: u64) -> Config {
        Config {
            llm_api_key: Some("sk-test".to_string()),
            llm_base_url: base_url.to_string(),
            llm_model: "primary/model".to_string(),
            llm_fallback_models: vec!["backup/model".to_string()],
            llm_timeout: timeout,
            ..Config::default()
        }
    }

    /// Fails the first request with a 500 and answers every later one.
    struct CounterResponder {
        cc: Arc<AtomicUsize>,
    }

    impl Respond for CounterResponder {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            let count = self.cc.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200).set_body_json(completion("ok"))
            }
        }
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "primary/model", "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = LlmClient::new(&config(&mock_server.uri(), 5)).unwrap();
        let result = client.complete(&[PromptMessage::user("hi")]).await.unwrap();
        assert_eq!(result.content, "hello");
        assert_eq!(result.model, "primary/model");
        assert_eq!(result.tokens_used, 42);
    }

    #[tokio::test]
    async fn test_complete_falls_back_to_next_model() {
        let mock_server = MockServer::start().await;
        let call_count = Arc::new(AtomicUsize::new(0));
        Mock::given(method("POST"))
            .respond_with(CounterResponder { cc: call_count.clone() })
            .mount(&mock_server)
            .await;

        let client = LlmClient::new(&config(&mock_server.uri(), 5)).unwrap();
        let result = client.complete(&[PromptMessage::user("hi")]).await.unwrap();
        assert_eq!(result.model, "backup/model");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_complete_all_models_fail() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2) // primary + one fallback
            .mount(&mock_server)
            .await;

        let client = LlmClient::new(&config(&mock_server.uri(), 5)).unwrap();
        let result = client.complete(&[PromptMessage::user("hi")]).await;
        assert!(matches!(result, Err(InboxerError::AllModelsFailed(_))));
    }

    #[tokio::test]
    async fn test_complete_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("late"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let mut cfg = config(&mock_server.uri(), 1);
        cfg.llm_fallback_models.clear();
        let client = LlmClient::new(&cfg).unwrap();
        let result = client.complete(&[PromptMessage::user("hi")]).await;
        assert!(result.unwrap_err().to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn test_complete_without_key() {
        let mut cfg = config("http://127.0.0.1:9", 5);
        cfg.llm_api_key = None;
        let client = LlmClient::new(&cfg).unwrap();
        assert!(client.complete(&[PromptMessage::user("hi")]).await.is_err());
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&mock_server)
            .await;

        let client = LlmClient::new(&config(&mock_server.uri(), 5)).unwrap();
        assert!(client.health_check().await);
    }

    #[test]
    fn test_invalid_url() {
        let result = LlmClient::new(&config("not a url", 5));
        assert!(result.unwrap_err().to_string().contains("Invalid LLM base URL"));
    }

    #[test]
    fn test_parse_email_response_fenced() {
        let content = "Aqui está:\n```json\n{\"subject\": \"Oi\", \"html\": \"<p>x</p>\"}\n```";
        let parsed = parse_email_response(content);
        assert_eq!(parsed.subject.as_deref(), Some("Oi"));
        assert_eq!(parsed.html.as_deref(), Some("<p>x</p>"));
        assert!(parsed.text.is_none());
    }

    #[test]
    fn test_parse_email_response_raw_text() {
        let parsed = parse_email_response("Just some words");
        assert_eq!(parsed.subject.as_deref(), Some("Email Gerado por IA"));
        assert_eq!(parsed.html.as_deref(), Some("<p>Just some words</p>"));
        assert_eq!(parsed.text.as_deref(), Some("Just some words"));

        let parsed = parse_email_response("<div>{broken</div>");
        assert_eq!(parsed.html.as_deref(), Some("<div>{broken</div>"));
    }

    #[test]
    fn test_parse_modification_response() {
        let parsed = parse_modification_response(r#"{"html": "<p>new</p>", "changes_made": ["Cor"]}"#);
        assert_eq!(parsed.html.as_deref(), Some("<p>new</p>"));
        assert_eq!(parsed.changes_made, vec!["Cor"]);

        let parsed = parse_modification_response("<p>raw</p>");
        assert_eq!(parsed.html.as_deref(), Some("<p>raw</p>"));
        assert_eq!(parsed.changes_made, vec!["Modificação aplicada"]);
    }

    #[test]
    fn test_prompts() {
        let messages = generation_prompt("Lançamento", Industry::Tecnologia, Tone::Urgent, Urgency::High);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("Experimentar Agora"));
        assert_eq!(messages[1].content, "Lançamento");

        let messages = modification_prompt("<table><a class=\"cta\">x</a></table>", "mudar cor", true);
        assert!(messages[0].content.contains("table-based"));
        assert!(messages[0].content.contains("\"cta\""));

        let context = ChatContext {
            project_name: "Promo".to_string(),
            project_type: "campaign".to_string(),
            industry: Industry::Geral,
            tone: Tone::Friendly,
            has_content: true,
            intent: "color_change".to_string(),
            confidence: 0.85,
            requires_update: true,
        };
        let history = vec![
            (MessageType::User, "oi".to_string()),
            (MessageType::System, "created".to_string()),
            (MessageType::Ai, "olá".to_string()),
        ];
        let messages = chat_prompt(&context, &history, "muda a cor");
        assert_eq!(messages.iter().map(|m| m.role).collect::<Vec<_>>(), vec!["system", "user", "assistant", "user"]);
    }
}
