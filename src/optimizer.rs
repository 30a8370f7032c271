//! Optimizer Module
//!
//! This module applies the deterministic rewrites that make an email render across
//! clients: automatic structural fixes, per-client CSS/HTML passes applied in the
//! caller's order, the dark-mode and mobile enhancements, and optional minification.
//!
//! Every pass works on the cumulative output of the previous one, so the order of
//! the target clients changes the result.

use crate::analyzer::{has_alt, strip_style_blocks, HtmlDocument};
use crate::clients::ClientProfile;
use crate::models::ClientId;
use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};

pub const DARK_MODE_MARKER: &str = "@media (prefers-color-scheme: dark)";
pub const MOBILE_MARKER: &str = "@media only screen and (max-width: 600px)";
pub const YAHOO_CSS_LIMIT: usize = 30_000;
pub const ALT_PLACEHOLDER: &str = "Imagem";

const MSO_CONDITIONAL: &str = r#"<!--[if mso]>
<noscript>
<xml>
<o:OfficeDocumentSettings>
<o:AllowPNG/>
<o:PixelsPerInch>96</o:PixelsPerInch>
</o:OfficeDocumentSettings>
</xml>
</noscript>
<![endif]-->"#;

const OUTLOOK_CSS: &str = r#"
/* Outlook */
.outlook-container {
    font-family: Arial, sans-serif !important;
}

table {
    mso-table-lspace: 0pt;
    mso-table-rspace: 0pt;
    border-collapse: collapse;
}

img {
    -ms-interpolation-mode: bicubic;
    border: 0;
    height: auto;
    line-height: 100%;
    outline: none;
    text-decoration: none;
}
"#;

const GMAIL_CSS: &str = r#"
/* Gmail */
.gmail-container {
    font-family: Arial, Helvetica, sans-serif;
}

u + .body .gmail-container {
    font-family: Arial, Helvetica, sans-serif;
}

.gmail-container img {
    max-width: 100%;
    height: auto;
}
"#;

const DARK_MODE_CSS: &str = r#"
@media (prefers-color-scheme: dark) {
    .email-container {
        background: linear-gradient(180deg, #1f2937 0%, #111827 100%) !important;
    }
    .email-content {
        background: linear-gradient(180deg, #1f2937 0%, #111827 100%) !important;
        color: #f3f4f6 !important;
    }
    .email-content h1, .email-content h2, .email-content h3 {
        color: #f3f4f6 !important;
    }
    .email-content p {
        color: #e5e7eb !important;
    }
}"#;

const MOBILE_CSS: &str = r#"
@media only screen and (max-width: 600px) {
    .email-container {
        margin: 0 !important;
        border-radius: 0 !important;
        width: 100% !important;
    }
    .email-header, .email-content, .email-footer {
        padding: 30px 20px !important;
    }
    .cta-button {
        padding: 16px 32px !important;
        display: block !important;
        max-width: 280px !important;
        margin: 25px auto !important;
    }
}"#;

lazy_static! {
    static ref OUTLOOK_DECLARATION: Regex = Regex::new(
        r#"(?i)(^|[{;\s"'])(?:-(?:webkit|moz|ms|o)-)?(?:border-radius|box-shadow|text-shadow|transform|transition|animation)\s*:[^;}"]*;?"#
    )
    .unwrap();
    static ref STYLE_ATTR: Regex = Regex::new(r#"(?i)(\sstyle\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap();
    static ref HEAD_OPEN: Regex = Regex::new(r"(?i)<head\b[^>]*>").unwrap();
    static ref TABLE_OPEN: Regex = Regex::new(r"(?i)<table\b[^>]*>").unwrap();
    static ref IMG_OPEN: Regex = Regex::new(r"(?i)<img\b([^>]*?)(\s*/?)>").unwrap();
    static ref DECLARATION: Regex = Regex::new(
        r#"(?i)([a-z-]+\s*:\s*(?:[^;{}()"']|\([^)]*\)|"[^"]*"|'[^']*')+?)\s*(;|\})"#
    )
    .unwrap();
    static ref HTML_COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref BETWEEN_TAGS: Regex = Regex::new(r">\s+<").unwrap();
    static ref EMPTY_ATTR: Regex = Regex::new(r#"\s+[a-zA-Z-]+="""#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhancementOptions {
    pub enable_dark_mode: bool,
    pub mobile_first: bool,
}

impl Default for EnhancementOptions {
    fn default() -> Self {
        Self { enable_dark_mode: true, mobile_first: true }
    }
}

/// HTML (without style blocks), CSS and the labels of every rewrite applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Optimized {
    pub html: String,
    pub css: String,
    pub applied: Vec<String>,
}

/// Structural fixes applied before any client pass.
pub fn apply_automatic_fixes(html: &str) -> (String, Vec<String>) {
    let mut fixed = html.to_string();
    let mut applied = Vec::new();
    let lower = fixed.to_lowercase();

    if !lower.contains("<!doctype") {
        fixed = format!("<!DOCTYPE html>\n{}", fixed);
        applied.push("Added DOCTYPE declaration".to_string());
    }

    if !lower.contains("charset") && insert_after_head(&mut fixed, "\n    <meta charset=\"UTF-8\">") {
        applied.push("Added charset meta tag".to_string());
    }

    if !lower.contains("viewport")
        && insert_after_head(
            &mut fixed,
            "\n    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">",
        )
    {
        applied.push("Added viewport meta tag".to_string());
    }

    let (with_alt, added) = add_missing_alt(&fixed);
    if added > 0 {
        fixed = with_alt;
        applied.push(format!("Added alt text to {} images", added));
    }

    (fixed, applied)
}

/// Gives every `<img>` lacking an `alt` attribute the generic placeholder.
pub fn add_missing_alt(html: &str) -> (String, usize) {
    let mut added = 0;
    let out = IMG_OPEN.replace_all(html, |caps: &Captures| {
        let whole = &caps[0];
        if has_alt(whole) {
            whole.to_string()
        } else {
            added += 1;
            format!("<img{} alt=\"{}\"{}>", &caps[1], ALT_PLACEHOLDER, &caps[2])
        }
    });
    let out = out.into_owned();
    (out, added)
}

fn insert_after_head(html: &mut String, snippet: &str) -> bool {
    match HEAD_OPEN.find(html) {
        Some(m) => {
            html.insert_str(m.end(), snippet);
            true
        }
        None => false,
    }
}

/// Runs each client's pass over the cumulative output, in the order given.
pub fn optimize_for_clients(doc: &HtmlDocument, css: &str, clients: &[&ClientProfile]) -> Optimized {
    let mut current = Optimized {
        html: strip_style_blocks(&doc.raw),
        css: css.to_string(),
        applied: Vec::new(),
    };

    for profile in clients {
        debug!("Applying {} pass", profile.id);
        current = match profile.id {
            ClientId::Outlook => optimize_for_outlook(current),
            ClientId::Gmail => optimize_for_gmail(current),
            ClientId::AppleMail => {
                current.applied.push("Full CSS3 support enabled".to_string());
                current
            }
            ClientId::Yahoo => optimize_for_yahoo(current),
            ClientId::Thunderbird => current,
        };
    }

    current
}

/// Removes the declarations Outlook's Word engine ignores.
pub fn strip_outlook_unsupported(css: &str) -> String {
    OUTLOOK_DECLARATION.replace_all(css, "$1").into_owned()
}

fn optimize_for_outlook(mut current: Optimized) -> Optimized {
    current.css = strip_outlook_unsupported(&current.css);
    current.css.push_str(OUTLOOK_CSS);
    current.html = STYLE_ATTR
        .replace_all(&current.html, |caps: &Captures| {
            let (quote, body) = style_attr_body(caps);
            format!("{}{}{}{}", &caps[1], quote, strip_outlook_unsupported(body).trim(), quote)
        })
        .into_owned();
    current.applied.push("Outlook VML compatibility".to_string());
    current.applied.push("Table-based layout".to_string());

    if !current.html.to_lowercase().contains("<!--[if mso")
        && insert_after_head(&mut current.html, &format!("\n{}", MSO_CONDITIONAL))
    {
        current.applied.push("Added MSO conditionals".to_string());
    }

    let mut patched = 0;
    current.html = TABLE_OPEN
        .replace_all(&current.html, |caps: &Captures| {
            let tag = &caps[0];
            let lower = tag.to_lowercase();
            if lower.contains("cellpadding") || lower.contains("cellspacing") {
                tag.to_string()
            } else {
                patched += 1;
                format!("<table cellpadding=\"0\" cellspacing=\"0\" border=\"0\"{}", &tag[6..])
            }
        })
        .into_owned();
    if patched > 0 {
        current.applied.push("Added Outlook table attributes".to_string());
    }

    current
}

fn optimize_for_gmail(mut current: Optimized) -> Optimized {
    if !current.css.trim().is_empty() && !current.css.contains("!important") {
        current.css = DECLARATION.replace_all(&current.css, "$1 !important$2").into_owned();
        current.applied.push("Added !important for Gmail".to_string());
    }
    current.css.push_str(GMAIL_CSS);
    current.applied.push("Gmail CSS reset".to_string());
    current.applied.push("Inline styles prioritized".to_string());
    current
}

fn optimize_for_yahoo(mut current: Optimized) -> Optimized {
    if current.css.len() > YAHOO_CSS_LIMIT {
        debug!("Truncating CSS from {} to {} bytes for Yahoo", current.css.len(), YAHOO_CSS_LIMIT);
        truncate_at_char_boundary(&mut current.css, YAHOO_CSS_LIMIT);
    }
    current.applied.push("Yahoo CSS size optimized".to_string());
    current
}

/// Byte cut that can land mid-rule; only backs off to keep valid UTF-8.
fn truncate_at_char_boundary(s: &mut String, max: usize) {
    let mut cut = max.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// Appends the dark-mode and mobile blocks unless their markers are already present.
pub fn apply_enhancements(css: &str, options: EnhancementOptions) -> (String, Vec<String>) {
    let mut css = css.to_string();
    let mut applied = Vec::new();

    if options.enable_dark_mode && !css.contains(DARK_MODE_MARKER) {
        css.push_str(DARK_MODE_CSS);
        applied.push("Dark mode support".to_string());
    }

    if options.mobile_first && !css.contains(MOBILE_MARKER) {
        css.push_str(MOBILE_CSS);
        applied.push("Mobile-first responsive".to_string());
    }

    (css, applied)
}

/// Size reductions; each label is only emitted when the step actually shrank the markup.
pub fn optimize_for_size(html: &str) -> (String, Vec<String>) {
    let mut applied = Vec::new();

    let before = html.len();
    let mut out = HTML_COMMENT
        .replace_all(html, |caps: &Captures| {
            let comment = &caps[0];
            if comment.starts_with("<!--[if") || comment.contains("[endif]") {
                comment.to_string()
            } else {
                String::new()
            }
        })
        .into_owned();
    if out.len() < before {
        applied.push("Removed HTML comments".to_string());
    }

    let before = out.len();
    out = WHITESPACE.replace_all(&out, " ").into_owned();
    out = BETWEEN_TAGS.replace_all(&out, "><").into_owned();
    if out.len() < before {
        applied.push("Minified whitespace".to_string());
    }

    let before = out.len();
    out = EMPTY_ATTR.replace_all(&out, "").into_owned();
    if out.len() < before {
        applied.push("Removed empty attributes".to_string());
    }

    let before = out.len();
    out = dedupe_inline_styles(&out);
    if out.len() < before {
        applied.push("Optimized inline CSS".to_string());
    }

    (out, applied)
}

/// Collapses repeated properties in `style` attributes; the last value wins.
fn dedupe_inline_styles(html: &str) -> String {
    STYLE_ATTR
        .replace_all(html, |caps: &Captures| {
            let mut props: Vec<(String, String)> = Vec::new();
            let (quote, body) = style_attr_body(caps);
            for decl in body.split(';') {
                if let Some((key, value)) = decl.split_once(':') {
                    let key = key.trim().to_string();
                    let value = value.trim().to_string();
                    match props.iter_mut().find(|(k, _)| *k == key) {
                        Some(existing) => existing.1 = value,
                        None => props.push((key, value)),
                    }
                }
            }
            let joined = props
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            format!("{}{}{}{}", &caps[1], quote, joined, quote)
        })
        .into_owned()
}

/// Quote character and body of a `STYLE_ATTR` match.
fn style_attr_body<'h>(caps: &Captures<'h>) -> (char, &'h str) {
    match caps.get(2) {
        Some(body) => ('"', body.as_str()),
        None => ('\'', caps.get(3).map_or("", |m| m.as_str())),
    }
}

/// Heuristic 0..1 score rewarding hard targets and broad coverage.
pub fn compatibility_score(clients: &[ClientId]) -> f64 {
    let mut score: f64 = 0.8;
    for bonus in [ClientId::Outlook, ClientId::Gmail, ClientId::AppleMail] {
        if clients.contains(&bonus) {
            score += 0.05;
        }
    }
    if clients.len() >= 3 {
        score += 0.05;
    }
    // Keep two decimals so repeated float additions don't leak noise.
    (score.min(1.0) * 100.0).round() / 100.0
}

/// Self-contained CSS framework used when the pipeline has to fall back.
pub fn fallback_css() -> String {
    FALLBACK_CSS.trim().to_string()
}

const FALLBACK_CSS: &str = r#"
* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
}

body, table, td, p, a, li, blockquote {
    -webkit-text-size-adjust: 100%;
    -ms-text-size-adjust: 100%;
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Inter', 'Roboto', sans-serif;
}

.email-container {
    max-width: 600px;
    margin: 0 auto;
    background: #ffffff;
    border-radius: 16px;
    overflow: hidden;
}

.email-header {
    background: linear-gradient(135deg, #2563eb 0%, #3b82f6 50%, #8b5cf6 100%);
    padding: 40px 30px;
    text-align: center;
}

.email-header h1 {
    color: #ffffff;
    font-size: 32px;
    font-weight: 700;
    margin: 0;
    line-height: 1.2;
}

.email-content {
    padding: 40px 30px;
    background: #f8fafc;
    line-height: 1.7;
    color: #1e293b;
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
    display: inline-block;
    background: #2563eb;
    color: #ffffff !important;
    text-decoration: none;
    padding: 18px 40px;
    border-radius: 50px;
    font-size: 16px;
    font-weight: 600;
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

.outlook-fix {
    mso-table-lspace: 0pt;
    mso-table-rspace: 0pt;
    border-collapse: collapse;
}

@media only screen and (max-width: 600px) {
    .email-container {
        margin: 0 !important;
        border-radius: 0 !important;
        width: 100% !important;
    }
    .email-header, .email-content, .email-footer {
        padding: 30px 20px !important;
    }
}

@media (prefers-color-scheme: dark) {
    .email-container, .email-content {
        background: #111827 !important;
        color: #f3f4f6 !important;
    }
    .email-footer p {
        color: #9ca3af !important;
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::clients::profile;

    fn run(html: &str, css: &str, ids: &[ClientId]) -> Optimized {
        let profiles: Vec<_> = ids.iter().map(|id| profile(*id)).collect();
        optimize_for_clients(&analyze(html), css, &profiles)
    }

    #[test]
    fn test_automatic_fixes() {
        let (fixed, applied) = apply_automatic_fixes("<html><head></head><body><img src=\"x.png\"></body></html>");
        assert!(fixed.starts_with("<!DOCTYPE html>\n"));
        assert!(fixed.contains("<meta charset=\"UTF-8\">"));
        assert!(fixed.contains("name=\"viewport\""));
        assert!(fixed.contains("<img src=\"x.png\" alt=\"Imagem\">"));
        assert_eq!(applied.len(), 4);

        let (again, applied) = apply_automatic_fixes(&fixed);
        assert_eq!(again, fixed);
        assert!(applied.is_empty());
    }

    #[test]
    fn test_alt_fix_keeps_self_closing_and_existing_alt() {
        let (out, added) = add_missing_alt("<img src=\"a.png\" /><img alt=\"logo\" src=\"b.png\">");
        assert_eq!(added, 1);
        assert!(out.contains("<img src=\"a.png\" alt=\"Imagem\" />"));
        assert!(out.contains("<img alt=\"logo\" src=\"b.png\">"));
    }

    #[test]
    fn test_outlook_pass() {
        let html = "<html><head></head><body><table><tr><td style=\"border-radius: 4px; color: red\">x</td></tr></table></body></html>";
        let css = ".btn { border-radius: 8px; -webkit-box-shadow: 0 1px 2px #000; color: red; transition: all 1s }";
        let out = run(html, css, &[ClientId::Outlook]);

        assert!(!out.css.contains("border-radius"));
        assert!(!out.css.contains("box-shadow"));
        assert!(!out.css.contains("transition"));
        assert!(out.css.contains("color: red;"));
        assert!(out.css.contains("mso-table-lspace: 0pt;"));
        assert!(out.html.contains("<!--[if mso]>"));
        assert!(out.html.contains("<table cellpadding=\"0\" cellspacing=\"0\" border=\"0\">"));
        assert!(out.html.contains("style=\"color: red\""));
        assert_eq!(
            out.applied,
            vec![
                "Outlook VML compatibility",
                "Table-based layout",
                "Added MSO conditionals",
                "Added Outlook table attributes"
            ]
        );
    }

    #[test]
    fn test_outlook_keeps_text_transform_and_existing_mso() {
        let html = "<head><!--[if mso]><x/><![endif]--></head><table cellpadding=\"4\">";
        let out = run(html, "h1 { text-transform: uppercase; }", &[ClientId::Outlook]);
        assert!(out.css.contains("text-transform: uppercase;"));
        assert_eq!(out.html.matches("<!--[if mso").count(), 1);
        assert!(!out.applied.contains(&"Added Outlook table attributes".to_string()));
    }

    #[test]
    fn test_gmail_important_injection() {
        let out = run("<p>x</p>", "p { color: red; margin: 0 }", &[ClientId::Gmail]);
        assert!(out.css.starts_with("p { color: red !important; margin: 0 !important}"));
        assert!(out.css.contains("u + .body .gmail-container"));
        assert_eq!(out.applied[0], "Added !important for Gmail");

        let out = run("<p>x</p>", "p { color: red !important; margin: 0; }", &[ClientId::Gmail]);
        assert!(out.css.starts_with("p { color: red !important; margin: 0; }"));
        assert_eq!(out.applied, vec!["Gmail CSS reset", "Inline styles prioritized"]);
    }

    #[test]
    fn test_gmail_injection_ignores_selectors_and_media_queries() {
        let css = "a:hover { color: blue; }\n@media (max-width: 600px) { p { margin: 0; } }";
        let out = run("", css, &[ClientId::Gmail]);
        assert!(out.css.contains("a:hover { color: blue !important; }"));
        assert!(out.css.contains("@media (max-width: 600px) { p { margin: 0 !important; } }"));
    }

    #[test]
    fn test_gmail_injection_keeps_data_uris_intact() {
        let css = ".a{background:url(data:image/png;base64,AAAA);color:red}";
        let out = run("", css, &[ClientId::Gmail]);
        assert!(out
            .css
            .starts_with(".a{background:url(data:image/png;base64,AAAA) !important;color:red !important}"));

        let css = ".b { font-family: 'A;B', serif; }";
        let out = run("", css, &[ClientId::Gmail]);
        assert!(out.css.starts_with(".b { font-family: 'A;B', serif !important; }"));
    }

    #[test]
    fn test_outlook_strips_single_quoted_inline_styles() {
        let html = "<table><tr><td style='border-radius: 4px; color: red'>x</td></tr></table>";
        let out = run(html, "", &[ClientId::Outlook]);
        assert!(out.html.contains("<td style='color: red'>x</td>"));
        assert!(!out.html.contains("border-radius"));
    }

    #[test]
    fn test_dedupe_keeps_quote_style() {
        let html = "<p style='color: red; color: blue'>a</p><p style=\"margin: 0; margin: 1px\">b</p>";
        let out = dedupe_inline_styles(html);
        assert_eq!(out, "<p style='color: blue'>a</p><p style=\"margin: 1px\">b</p>");
    }

    #[test]
    fn test_yahoo_hard_cut() {
        let css = format!("{}é", "a".repeat(YAHOO_CSS_LIMIT - 1));
        let out = run("", &css, &[ClientId::Yahoo]);
        assert_eq!(out.css.len(), YAHOO_CSS_LIMIT - 1);
        assert_eq!(out.applied, vec!["Yahoo CSS size optimized"]);

        let out = run("", "p{}", &[ClientId::Yahoo, ClientId::Thunderbird, ClientId::AppleMail]);
        assert_eq!(out.css, "p{}");
        assert_eq!(out.applied, vec!["Yahoo CSS size optimized", "Full CSS3 support enabled"]);
    }

    #[test]
    fn test_client_order_matters() {
        let css = ".card { border-radius: 8px; color: #333; }";
        let a = run("<head></head>", css, &[ClientId::Outlook, ClientId::Gmail]);
        let b = run("<head></head>", css, &[ClientId::Gmail, ClientId::Outlook]);
        assert_ne!(a.css.len(), b.css.len());
    }

    #[test]
    fn test_enhancements_are_idempotent() {
        let (once, applied) = apply_enhancements("p{}", EnhancementOptions::default());
        assert_eq!(applied, vec!["Dark mode support", "Mobile-first responsive"]);
        let (twice, applied) = apply_enhancements(&once, EnhancementOptions::default());
        assert!(applied.is_empty());
        assert_eq!(twice.matches(DARK_MODE_MARKER).count(), 1);
        assert_eq!(twice.matches(MOBILE_MARKER).count(), 1);

        let (plain, applied) =
            apply_enhancements("p{}", EnhancementOptions { enable_dark_mode: false, mobile_first: false });
        assert_eq!(plain, "p{}");
        assert!(applied.is_empty());
    }

    #[test]
    fn test_optimize_for_size() {
        let html = "<div>\n  <!-- note -->\n  <!--[if mso]><b>x</b><![endif]-->\n  <p class=\"\" style=\"color: red; margin: 0; color: blue\">Hi</p>\n</div>";
        let (out, applied) = optimize_for_size(html);
        assert!(!out.contains("note"));
        assert!(out.contains("<!--[if mso]>"));
        assert!(!out.contains("class=\"\""));
        assert!(out.contains("style=\"color: blue; margin: 0\""));
        assert_eq!(
            applied,
            vec!["Removed HTML comments", "Minified whitespace", "Removed empty attributes", "Optimized inline CSS"]
        );

        let (same, applied) = optimize_for_size("<p>x</p>");
        assert_eq!(same, "<p>x</p>");
        assert!(applied.is_empty());
    }

    #[test]
    fn test_compatibility_score() {
        assert_eq!(compatibility_score(&[]), 0.8);
        assert_eq!(compatibility_score(&[ClientId::Gmail, ClientId::Outlook]), 0.9);
        assert_eq!(compatibility_score(&[ClientId::Yahoo, ClientId::Thunderbird]), 0.8);
        assert_eq!(
            compatibility_score(&[ClientId::Gmail, ClientId::Outlook, ClientId::AppleMail, ClientId::Yahoo]),
            1.0
        );
    }

    #[test]
    fn test_fallback_css_has_markers() {
        let css = fallback_css();
        assert!(css.contains(DARK_MODE_MARKER));
        assert!(css.contains(MOBILE_MARKER));
    }
}
