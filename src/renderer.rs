//! Template Renderer Module
//!
//! This module merges email content into one of the themed HTML shells. The shell,
//! palette and trust-badge copy come from the industry; font, radius, shadow and
//! letter spacing come from the tone; the urgency level picks the badge. Templates
//! are compiled once with `handlebars`, and any render error yields the minimal
//! hardcoded shell instead.

use crate::error::{InboxerError, Result};
use crate::models::{EmailContent, Industry, Tone, Urgency};
use handlebars::{html_escape, Handlebars};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde_json::json;

lazy_static! {
    static ref CSS_COMMENT: Regex = Regex::new(r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref TRAILING_SEMICOLON: Regex = Regex::new(r";\s*\}").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    UltraModern,
    MinimalPremium,
}

impl Shell {
    fn template_name(&self) -> &'static str {
        match self {
            Shell::UltraModern => "ultra_modern",
            Shell::MinimalPremium => "minimal_premium",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndustryStyle {
    pub shell: Shell,
    pub icon: &'static str,
    pub primary_color: &'static str,
    pub accent_color: &'static str,
    pub trust_elements: &'static [&'static str],
    pub cta_options: &'static [&'static str],
    pub keywords: &'static [&'static str],
}

impl IndustryStyle {
    pub fn default_cta(&self) -> &'static str {
        self.cta_options.first().copied().unwrap_or("Saiba Mais")
    }

    pub fn header_gradient(&self) -> String {
        format!(
            "linear-gradient(135deg, {p} 0%, {a} 50%, {p} 100%)",
            p = self.primary_color,
            a = self.accent_color
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToneStyle {
    pub font_family: &'static str,
    pub border_radius: &'static str,
    pub shadow_intensity: &'static str,
    pub letter_spacing: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrgencyStyle {
    pub badge: &'static str,
    pub badge_color: &'static str,
    pub countdown_text: &'static str,
    pub show_countdown: bool,
}

pub fn industry_style(industry: Industry) -> IndustryStyle {
    match industry {
        Industry::Saude => IndustryStyle {
            shell: Shell::UltraModern,
            icon: "🏥",
            primary_color: "#059669",
            accent_color: "#10b981",
            trust_elements: &[
                "Aprovado pela ANVISA",
                "Recomendado por médicos",
                "Pesquisa científica",
                "Sem efeitos colaterais",
            ],
            cta_options: &["Cuidar da Saúde", "Consultar Médico", "Ver Resultados", "Agendar Consulta"],
            keywords: &["saúde", "bem-estar", "cuidado", "qualidade de vida", "prevenção"],
        },
        Industry::Tecnologia => IndustryStyle {
            shell: Shell::UltraModern,
            icon: "💻",
            primary_color: "#2563eb",
            accent_color: "#3b82f6",
            trust_elements: &[
                "Segurança garantida",
                "Tecnologia avançada",
                "Suporte 24/7",
                "Certificação ISO",
            ],
            cta_options: &["Experimentar Agora", "Ver Demo", "Download Grátis", "Começar Teste"],
            keywords: &["inovação", "tecnologia", "eficiência", "produtividade", "automatização"],
        },
        Industry::Educacao => IndustryStyle {
            shell: Shell::MinimalPremium,
            icon: "📚",
            primary_color: "#8b5cf6",
            accent_color: "#a78bfa",
            trust_elements: &[
                "Certificado reconhecido",
                "Professores especialistas",
                "+ de 10.000 alunos",
                "Metodologia aprovada",
            ],
            cta_options: &["Começar a Aprender", "Ver Cursos", "Matricular-se", "Baixar Material"],
            keywords: &["aprendizado", "conhecimento", "desenvolvimento", "capacitação", "crescimento"],
        },
        Industry::Ecommerce => IndustryStyle {
            shell: Shell::UltraModern,
            icon: "🛍️",
            primary_color: "#16a34a",
            accent_color: "#22c55e",
            trust_elements: &["Frete grátis", "Garantia de 30 dias", "Pagamento seguro", "Entrega rápida"],
            cta_options: &["Comprar Agora", "Ver Ofertas", "Adicionar ao Carrinho", "Aproveitar Desconto"],
            keywords: &["economia", "desconto", "oferta", "qualidade", "satisfação"],
        },
        Industry::Financas => IndustryStyle {
            shell: Shell::MinimalPremium,
            icon: "💰",
            primary_color: "#1f2937",
            accent_color: "#d4af37",
            trust_elements: &["Banco Central", "Segurança máxima", "Taxa zero", "Aprovação rápida"],
            cta_options: &["Solicitar Agora", "Ver Condições", "Simular", "Contratar"],
            keywords: &["investimento", "economia", "rentabilidade", "segurança", "crescimento"],
        },
        Industry::Geral => IndustryStyle {
            shell: Shell::MinimalPremium,
            icon: "✨",
            primary_color: "#6366f1",
            accent_color: "#8b5cf6",
            trust_elements: &[
                "Qualidade garantida",
                "Atendimento premium",
                "Resultados comprovados",
                "Satisfação total",
            ],
            cta_options: &["Saiba Mais", "Experimentar", "Ver Detalhes", "Começar Agora"],
            keywords: &["qualidade", "excelência", "confiança", "resultado", "sucesso"],
        },
    }
}

pub fn tone_style(tone: Tone) -> ToneStyle {
    match tone {
        Tone::Professional => ToneStyle {
            font_family: "-apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif",
            border_radius: "12px",
            shadow_intensity: "0.25",
            letter_spacing: "normal",
        },
        Tone::Friendly => ToneStyle {
            font_family: "'Poppins', -apple-system, BlinkMacSystemFont, sans-serif",
            border_radius: "20px",
            shadow_intensity: "0.2",
            letter_spacing: "0.3px",
        },
        Tone::Urgent => ToneStyle {
            font_family: "'Source Sans Pro', -apple-system, BlinkMacSystemFont, sans-serif",
            border_radius: "8px",
            shadow_intensity: "0.35",
            letter_spacing: "0.5px",
        },
        Tone::Luxury => ToneStyle {
            font_family: "'Times New Roman', Times, serif",
            border_radius: "6px",
            shadow_intensity: "0.2",
            letter_spacing: "1px",
        },
        Tone::Casual => ToneStyle {
            font_family: "'Nunito', -apple-system, BlinkMacSystemFont, sans-serif",
            border_radius: "24px",
            shadow_intensity: "0.15",
            letter_spacing: "0.2px",
        },
    }
}

pub fn urgency_style(urgency: Urgency) -> UrgencyStyle {
    match urgency {
        Urgency::High => UrgencyStyle {
            badge: "🔥 OFERTA LIMITADA",
            badge_color: "#dc2626",
            countdown_text: "⏰ Expira em breve!",
            show_countdown: true,
        },
        Urgency::Medium => UrgencyStyle {
            badge: "⭐ OFERTA ESPECIAL",
            badge_color: "#d97706",
            countdown_text: "📅 Por tempo limitado",
            show_countdown: false,
        },
        Urgency::Low => UrgencyStyle {
            badge: "",
            badge_color: "#6b7280",
            countdown_text: "",
            show_countdown: false,
        },
    }
}

/// Theme keys and inclusion flags for one render.
#[derive(Debug, Clone)]
pub struct ThemeConfig {
    pub industry: Industry,
    pub tone: Tone,
    pub urgency: Urgency,
    pub dark_mode: bool,
    pub show_trust: bool,
    pub cta_text: Option<String>,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            industry: Industry::default(),
            tone: Tone::default(),
            urgency: Urgency::default(),
            dark_mode: true,
            show_trust: true,
            cta_text: None,
        }
    }
}

impl ThemeConfig {
    pub fn new(industry: Industry, tone: Tone, urgency: Urgency) -> Self {
        Self { industry, tone, urgency, ..Default::default() }
    }
}

pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(Shell::UltraModern.template_name(), ULTRA_MODERN_SHELL)
            .map_err(|e| InboxerError::Render(e.to_string()))?;
        registry
            .register_template_string(Shell::MinimalPremium.template_name(), MINIMAL_PREMIUM_SHELL)
            .map_err(|e| InboxerError::Render(e.to_string()))?;
        Ok(Self { registry })
    }

    /// Renders `content` into the shell picked by the theme's industry.
    pub fn render(&self, content: &str, subject: &str, theme: &ThemeConfig) -> String {
        let shell = industry_style(theme.industry).shell;
        self.render_shell(shell.template_name(), content, subject, theme)
    }

    fn render_shell(&self, template: &str, content: &str, subject: &str, theme: &ThemeConfig) -> String {
        let industry = industry_style(theme.industry);
        let tone = tone_style(theme.tone);
        let urgency = urgency_style(theme.urgency);
        let cta_text = theme
            .cta_text
            .clone()
            .unwrap_or_else(|| industry.default_cta().to_string());

        let data = json!({
            "subject": subject,
            "content": content,
            "preview_text": format!("{} - Conteúdo premium criado especialmente para você", subject),
            "icon": industry.icon,
            "primary_color": industry.primary_color,
            "accent_color": industry.accent_color,
            "header_gradient": industry.header_gradient(),
            "font_family": tone.font_family,
            "border_radius": tone.border_radius,
            "shadow_intensity": tone.shadow_intensity,
            "letter_spacing": tone.letter_spacing,
            "cta_text": cta_text,
            "cta_style": cta_style(&industry, &tone, theme.urgency),
            "urgency": {
                "badge": urgency.badge,
                "badge_color": urgency.badge_color,
                "countdown_text": urgency.countdown_text,
                "show_countdown": urgency.show_countdown,
            },
            "show_trust": theme.show_trust,
            "trust_elements": industry.trust_elements,
            "dark_mode": theme.dark_mode,
        });

        match self.registry.render(template, &data) {
            Ok(html) => {
                let html = apply_final_optimizations(&html);
                info!("Rendered {} shell for {} ({} bytes)", template, theme.industry, html.len());
                html
            }
            Err(e) => {
                warn!("Template {} failed to render, using fallback shell: {}", template, e);
                fallback_template(content, subject, &cta_text)
            }
        }
    }

    /// Deterministic email used when the LLM collaborator is unavailable.
    pub fn fallback_email(&self, prompt: &str, theme: &ThemeConfig) -> EmailContent {
        let industry = industry_style(theme.industry);
        let excerpt: String = prompt.chars().take(100).collect();
        let ellipsis = if prompt.chars().count() > 100 { "..." } else { "" };
        let subject = format!("{} Email Gerado por IA", industry.icon);

        let body = format!(
            "<h2>Conteúdo criado para você</h2>\n<p>Baseado em: <em>\"{}{}\"</em></p>\n<p>Seu email foi gerado automaticamente com nossos templates modernos.</p>",
            html_escape(&excerpt),
            ellipsis
        );

        EmailContent {
            html: self.render(&body, &subject, theme),
            text: format!("Email baseado em: {}\n\nConteúdo gerado automaticamente.", prompt),
            subject,
            preview_text: Some("Conteúdo criado automaticamente".to_string()),
        }
    }
}

fn cta_style(industry: &IndustryStyle, tone: &ToneStyle, urgency: Urgency) -> String {
    let mut style = format!(
        "display: inline-block; background: linear-gradient(135deg, {} 0%, {} 100%); color: #ffffff !important; text-decoration: none; padding: 18px 36px; border-radius: {}; font-family: {}; font-weight: 700; font-size: 16px; box-shadow: 0 8px 25px rgba(0,0,0,{}); border: none; text-align: center; min-width: 200px; letter-spacing: {};",
        industry.primary_color,
        industry.accent_color,
        tone.border_radius,
        tone.font_family,
        tone.shadow_intensity,
        tone.letter_spacing
    );
    if urgency == Urgency::High {
        style.push_str(" animation: pulse 2s infinite; box-shadow: 0 0 20px rgba(220, 38, 38, 0.4);");
    }
    style
}

/// Strips CSS comments and collapses whitespace.
pub fn apply_final_optimizations(html: &str) -> String {
    let html = CSS_COMMENT.replace_all(html, "");
    let html = WHITESPACE.replace_all(&html, " ");
    TRAILING_SEMICOLON.replace_all(&html, "}").trim().to_string()
}

/// Minimal shell with no template engine involved.
pub fn fallback_template(content: &str, subject: &str, cta_text: &str) -> String {
    let subject = html_escape(subject);
    let cta_text = html_escape(cta_text);
    format!(
        r##"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{subject}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 0; padding: 20px; background: #f4f6f8; }}
        .container {{ max-width: 600px; margin: 0 auto; background: #ffffff; border-radius: 8px; overflow: hidden; }}
        .header {{ background: #667eea; color: #ffffff; padding: 30px; text-align: center; }}
        .content {{ padding: 30px; line-height: 1.6; }}
        .cta {{ display: inline-block; background: #667eea; color: #ffffff; padding: 12px 24px; text-decoration: none; border-radius: 6px; }}
        .footer {{ background: #f8f9fa; padding: 20px; text-align: center; color: #666; }}
    </style>
</head>
<body>
    <table role="presentation" class="container" width="100%">
        <tr><td class="header"><h1>{subject}</h1></td></tr>
        <tr><td class="content">
            {content}
            <p style="text-align: center;"><a href="#" class="cta">{cta_text}</a></p>
        </td></tr>
        <tr><td class="footer"><p>Email criado com MailTrendz</p></td></tr>
    </table>
</body>
</html>"##
    )
}

const ULTRA_MODERN_SHELL: &str = r##"<!DOCTYPE html>
<html lang="pt-BR" xmlns="http://www.w3.org/1999/xhtml">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta http-equiv="X-UA-Compatible" content="IE=edge">
    <meta name="format-detection" content="telephone=no,address=no,email=no,date=no,url=no">
    <meta name="color-scheme" content="light dark">
    <meta name="supported-color-schemes" content="light dark">
    <title>{{subject}}</title>
    <style>
        /* reset */
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body, table, td, p, a, li, blockquote {
            -webkit-text-size-adjust: 100%;
            -ms-text-size-adjust: 100%;
            font-family: {{{font_family}}};
            -webkit-font-smoothing: antialiased;
        }
        table, td {
            mso-table-lspace: 0pt;
            mso-table-rspace: 0pt;
            border-collapse: collapse;
        }
        img {
            -ms-interpolation-mode: bicubic;
            border: 0;
            max-width: 100%;
            height: auto;
            display: block;
        }
        .email-container {
            max-width: 600px;
            margin: 0 auto;
            background: #ffffff;
            border-radius: {{border_radius}};
            overflow: hidden;
            box-shadow: 0 25px 50px -12px rgba(0,0,0,{{shadow_intensity}});
        }
        .email-header {
            background: {{header_gradient}};
            padding: 40px 30px;
            text-align: center;
        }
        .email-header h1 {
            color: #ffffff;
            font-size: 32px;
            font-weight: 800;
            margin: 0;
            line-height: 1.2;
            letter-spacing: {{letter_spacing}};
        }
        .header-icon {
            font-size: 48px;
            margin-bottom: 10px;
        }
        .email-content {
            padding: 40px 30px;
            background: #ffffff;
            line-height: 1.8;
            color: #1e293b;
        }
        .email-content h2 {
            color: {{primary_color}};
            font-size: 26px;
            font-weight: 700;
            margin: 0 0 25px 0;
        }
        .email-content p {
            margin: 0 0 20px 0;
            font-size: 16px;
        }
        .cta-container {
            text-align: center;
            margin: 40px 0;
        }
        .cta-button {
            {{{cta_style}}}
        }
        {{#if urgency.show_countdown}}
        .urgency-badge {
            animation: pulse 2s infinite;
        }
        @keyframes pulse {
            0%, 100% { opacity: 1; }
            50% { opacity: 0.8; }
        }
        {{/if}}
        .urgency-badge {
            background: {{urgency.badge_color}};
            color: #ffffff;
            padding: 8px 16px;
            border-radius: 20px;
            font-size: 12px;
            font-weight: 700;
            display: inline-block;
            margin-bottom: 20px;
        }
        .trust-section {
            margin: 35px 0;
            padding: 30px;
            background: #f8fafc;
            border-radius: {{border_radius}};
            border: 1px solid {{primary_color}}1a;
        }
        .trust-badge {
            padding: 12px 16px;
            margin: 8px 0;
            background: #ffffff;
            border: 1px solid {{primary_color}}30;
            border-radius: {{border_radius}};
            font-size: 14px;
            color: {{primary_color}};
            font-weight: 500;
        }
        .email-footer {
            background: #f1f5f9;
            padding: 40px 30px;
            text-align: center;
        }
        .email-footer p {
            color: #64748b;
            font-size: 14px;
            margin: 8px 0;
        }
        .email-footer a {
            color: {{primary_color}};
            text-decoration: none;
        }
        @media only screen and (max-width: 600px) {
            .email-container {
                margin: 0 !important;
                border-radius: 0 !important;
                width: 100% !important;
            }
            .email-header, .email-content, .email-footer {
                padding: 20px 15px !important;
            }
            .cta-button {
                display: block !important;
                max-width: 280px !important;
                margin: 25px auto !important;
            }
        }
        {{#if dark_mode}}
        @media (prefers-color-scheme: dark) {
            .email-container, .email-content {
                background: #1f2937 !important;
                color: #f3f4f6 !important;
            }
            .email-content h2 {
                color: #f3f4f6 !important;
            }
            .email-footer {
                background: #111827 !important;
            }
        }
        {{/if}}
    </style>
</head>
<body style="margin: 0; padding: 15px; background: #f8fafc;">
    <span style="display: none; max-height: 0; overflow: hidden;">{{preview_text}}</span>
    <table role="presentation" class="email-container" width="100%" cellpadding="0" cellspacing="0" border="0">
        <tr>
            <td class="email-header">
                <div class="header-icon">{{icon}}</div>
                <h1>{{subject}}</h1>
            </td>
        </tr>
        <tr>
            <td class="email-content">
                {{#if urgency.badge}}
                <div class="urgency-badge">{{urgency.badge}}</div>
                {{/if}}
                {{#if urgency.show_countdown}}
                <p><strong>{{urgency.countdown_text}}</strong></p>
                {{/if}}
                {{{content}}}
                <div class="cta-container">
                    <a href="#" class="cta-button">{{cta_text}}</a>
                </div>
                {{#if show_trust}}
                <div class="trust-section">
                    <h3 style="text-align: center; margin-bottom: 20px; color: {{primary_color}};">{{icon}} Por que confiar?</h3>
                    {{#each trust_elements}}
                    <div class="trust-badge">{{this}}</div>
                    {{/each}}
                </div>
                {{/if}}
            </td>
        </tr>
        <tr>
            <td class="email-footer">
                <p><strong>MailTrendz</strong></p>
                <p>Emails modernos de alta conversão</p>
                <p style="font-size: 12px;"><a href="#">Descadastrar</a> | <a href="#">Política de Privacidade</a></p>
            </td>
        </tr>
    </table>
</body>
</html>"##;

const MINIMAL_PREMIUM_SHELL: &str = r##"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{subject}}</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            font-family: {{{font_family}}};
            background: #fafafa;
            color: #333333;
        }
        .container {
            max-width: 600px;
            margin: 0 auto;
            background: #ffffff;
            border-radius: {{border_radius}};
            overflow: hidden;
        }
        .header {
            background: {{primary_color}};
            color: #ffffff;
            padding: 40px 30px;
            text-align: center;
            letter-spacing: {{letter_spacing}};
        }
        .header h1 {
            margin: 0;
            font-size: 28px;
            font-weight: 300;
        }
        .content {
            padding: 40px 30px;
            line-height: 1.6;
        }
        .urgency-badge {
            background: {{urgency.badge_color}};
            color: #ffffff;
            padding: 6px 12px;
            font-size: 12px;
            display: inline-block;
        }
        .cta-button {
            {{{cta_style}}}
        }
        .trust-badge {
            color: {{primary_color}};
            font-size: 14px;
            margin: 6px 0;
        }
        .footer {
            background: #f8f9fa;
            padding: 30px;
            text-align: center;
            color: #666666;
        }
        {{#if dark_mode}}
        @media (prefers-color-scheme: dark) {
            .container, .content {
                background: #1f2937 !important;
                color: #f3f4f6 !important;
            }
        }
        {{/if}}
    </style>
</head>
<body>
    <table role="presentation" class="container" width="100%" cellpadding="0" cellspacing="0" border="0">
        <tr>
            <td class="header"><h1>{{icon}} {{subject}}</h1></td>
        </tr>
        <tr>
            <td class="content">
                {{#if urgency.badge}}
                <div class="urgency-badge">{{urgency.badge}}</div>
                {{/if}}
                {{#if urgency.show_countdown}}
                <p><strong>{{urgency.countdown_text}}</strong></p>
                {{/if}}
                {{{content}}}
                <p style="text-align: center; margin: 30px 0;">
                    <a href="#" class="cta-button">{{cta_text}}</a>
                </p>
                {{#if show_trust}}
                {{#each trust_elements}}
                <div class="trust-badge">✓ {{this}}</div>
                {{/each}}
                {{/if}}
            </td>
        </tr>
        <tr>
            <td class="footer"><p>Email criado com MailTrendz</p></td>
        </tr>
    </table>
</body>
</html>"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_ultra_modern_shell() {
        let renderer = Renderer::new().unwrap();
        let theme = ThemeConfig::new(Industry::Saude, Tone::Friendly, Urgency::High);
        let html = renderer.render("<p>Cuide-se</p>", "Check-up anual", &theme);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<p>Cuide-se</p>"));
        assert!(html.contains("#059669"));
        assert!(html.contains("'Poppins'"));
        assert!(html.contains("🔥 OFERTA LIMITADA"));
        assert!(html.contains("⏰ Expira em breve!"));
        assert!(html.contains("animation: pulse 2s infinite"));
        assert!(html.contains("Aprovado pela ANVISA"));
        assert!(html.contains("Cuidar da Saúde"));
        assert!(html.contains("@media (prefers-color-scheme: dark)"));
        assert!(!html.contains("/* reset */"));
    }

    #[test]
    fn test_render_minimal_shell_flags() {
        let renderer = Renderer::new().unwrap();
        let theme = ThemeConfig {
            dark_mode: false,
            show_trust: false,
            cta_text: Some("Abrir conta".to_string()),
            ..ThemeConfig::new(Industry::Financas, Tone::Luxury, Urgency::Low)
        };
        let html = renderer.render("<p>Olá</p>", "Sua conta", &theme);

        assert!(html.contains("Times New Roman"));
        assert!(html.contains("Abrir conta"));
        assert!(!html.contains("urgency-badge\">"));
        assert!(!html.contains("prefers-color-scheme"));
        assert!(!html.contains("Banco Central"));
    }

    #[test]
    fn test_subject_is_escaped_content_is_not() {
        let renderer = Renderer::new().unwrap();
        let html = renderer.render("<b>bold</b>", "A <script>", &ThemeConfig::default());
        assert!(html.contains("<b>bold</b>"));
        assert!(html.contains("A &lt;script&gt;"));
    }

    #[test]
    fn test_missing_template_uses_fallback() {
        let renderer = Renderer::new().unwrap();
        let html = renderer.render_shell("corporate_elegant", "<p>x</p>", "Hi", &ThemeConfig::default());
        assert!(html.contains("#667eea"));
        assert!(html.contains("<p>x</p>"));
        assert!(html.contains("Saiba Mais"));
    }

    #[test]
    fn test_final_optimizations() {
        let out = apply_final_optimizations("<style>/* c */ p {\n  color: red;\n}</style>");
        assert_eq!(out, "<style> p { color: red}</style>");
    }

    #[test]
    fn test_fallback_email() {
        let renderer = Renderer::new().unwrap();
        let email = renderer.fallback_email(
            &"promo <b> ".repeat(20),
            &ThemeConfig::new(Industry::Tecnologia, Tone::Professional, Urgency::Medium),
        );
        assert_eq!(email.subject, "💻 Email Gerado por IA");
        assert!(email.html.contains("promo &lt;b&gt;"));
        assert!(email.html.contains("...\""));
        assert!(email.text.starts_with("Email baseado em: promo"));
    }
}
