//! Scorer Module
//!
//! This module computes the structural, CSS, accessibility, performance and
//! per-client scores for an email and combines them into a `ScoreReport`.
//! Scores are informational: a report is `valid` as long as no hard structural
//! issue was found, whatever the numbers say.

use crate::analyzer::{has_alt, HtmlDocument};
use crate::clients::{profile, ClientProfile, OUTLOOK_UNSUPPORTED};
use crate::models::{
    messages_of, ClientCompatibility, ClientId, ScoreReport, Severity, ValidationIssue,
};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref INLINE_STYLE_VALUE: Regex = Regex::new(r#"style="([^"]*)""#).unwrap();
    static ref TABLE_OPEN: Regex = Regex::new(r"(?i)<table\b[^>]*>").unwrap();
}

const WEIGHT_STRUCTURE: f64 = 0.25;
const WEIGHT_CSS: f64 = 0.20;
const WEIGHT_ACCESSIBILITY: f64 = 0.20;
const WEIGHT_PERFORMANCE: f64 = 0.15;
const WEIGHT_COMPATIBILITY: f64 = 0.20;

const HTML_SIZE_WARNING: usize = 50_000;
const HTML_SIZE_CRITICAL: usize = 102_400;
const IMAGE_COUNT_WARNING: usize = 5;
const IMAGE_COUNT_CRITICAL: usize = 10;
const EXTERNAL_WARNING: usize = 3;
const EXTERNAL_CRITICAL: usize = 6;

/// Running score for one validator, starting at 100.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentScore {
    pub score: u8,
    pub findings: Vec<ValidationIssue>,
}

struct Tally {
    score: i32,
    findings: Vec<ValidationIssue>,
}

impl Tally {
    fn new() -> Self {
        Self { score: 100, findings: Vec::new() }
    }

    fn deduct(&mut self, points: i32, finding: ValidationIssue) {
        self.score -= points;
        self.findings.push(finding);
    }

    fn finish(self) -> ComponentScore {
        ComponentScore { score: clamp_score(self.score), findings: self.findings }
    }
}

fn clamp_score(score: i32) -> u8 {
    score.clamp(0, 100) as u8
}

pub fn structural_score(doc: &HtmlDocument) -> ComponentScore {
    let mut t = Tally::new();

    if !doc.has_doctype {
        t.deduct(20, ValidationIssue::issue("Missing DOCTYPE declaration"));
    }
    if !doc.has_html_tag {
        t.deduct(20, ValidationIssue::issue("Missing <html> tag"));
    }
    if !doc.has_head {
        t.deduct(20, ValidationIssue::issue("Missing <head> section"));
    }
    if !doc.has_body {
        t.deduct(20, ValidationIssue::issue("Missing <body> tag"));
    }
    if !doc.has_meta_charset {
        t.deduct(5, ValidationIssue::warning("Missing charset meta tag"));
    }
    if !doc.has_meta_viewport {
        t.deduct(5, ValidationIssue::warning("Missing viewport meta tag"));
    }
    if !doc.raw.to_lowercase().contains("max-width") {
        t.deduct(10, ValidationIssue::warning("No max-width specified for email container"));
    }
    if doc.table_count == 0 {
        t.deduct(
            5,
            ValidationIssue::warning("Consider using tables for better email client compatibility"),
        );
    }

    t.finish()
}

pub fn css_score(doc: &HtmlDocument, clients: &[ClientId]) -> ComponentScore {
    let mut t = Tally::new();

    let mut parts: Vec<&str> = doc.css_blocks.iter().map(String::as_str).collect();
    parts.extend(
        INLINE_STYLE_VALUE
            .captures_iter(&doc.raw)
            .filter_map(|c| c.get(1).map(|m| m.as_str())),
    );
    let total_css = parts.join("\n");

    if total_css.len() > 50_000 {
        t.deduct(20, ValidationIssue::warning("CSS size exceeds 50KB (may be stripped)"));
    } else if total_css.len() > 30_000 {
        t.deduct(10, ValidationIssue::warning("CSS size exceeds 30KB"));
    }

    if clients.contains(&ClientId::Outlook) {
        for prop in OUTLOOK_UNSUPPORTED {
            if total_css.contains(prop) {
                t.deduct(
                    5,
                    ValidationIssue::warning(format!("Property '{}' not supported in Outlook", prop)),
                );
            }
        }
    }

    let important_count = total_css.matches("!important").count();
    if important_count == 0 && clients.contains(&ClientId::Gmail) {
        t.deduct(5, ValidationIssue::warning("Consider using !important for Gmail compatibility"));
    } else if important_count > 20 {
        t.deduct(10, ValidationIssue::warning("Excessive use of !important"));
    }

    t.finish()
}

pub fn accessibility_score(doc: &HtmlDocument) -> ComponentScore {
    let mut t = Tally::new();

    let missing: Vec<&String> = doc.image_tags.iter().filter(|tag| !has_alt(tag)).collect();
    if let Some(first) = missing.first() {
        let snippet: String = first.chars().take(50).collect();
        t.deduct(
            (missing.len() as i32 * 5).min(30),
            ValidationIssue::warning(format!("{} images missing alt attributes", missing.len()))
                .at(snippet),
        );
        t.findings.push(ValidationIssue::suggestion("Add descriptive alt text to all images"));
    }

    match doc.heading_levels.first() {
        None => t.deduct(
            10,
            ValidationIssue::suggestion("Consider using heading tags for better structure"),
        ),
        Some(level) if *level != 1 => t.deduct(
            5,
            ValidationIssue::suggestion("Start with <h1> for proper heading hierarchy"),
        ),
        Some(_) => {}
    }

    if doc.raw.contains("color:") {
        let lower = doc.raw.to_lowercase();
        let has_light = ["#fff", "#ffffff", "white"].iter().any(|c| lower.contains(c));
        let has_dark = ["#000", "#000000", "black"].iter().any(|c| lower.contains(c));
        if !(has_light && has_dark) {
            t.deduct(5, ValidationIssue::suggestion("Ensure sufficient color contrast"));
        }
    }

    let generic = doc.anchor_texts.iter().any(|text| {
        let text = text.trim().to_lowercase();
        text == "click here" || text == "clique aqui"
    });
    if generic {
        t.deduct(
            10,
            ValidationIssue::suggestion("Use descriptive link text instead of 'click here'"),
        );
    }

    let tables_without_role = TABLE_OPEN
        .find_iter(&doc.raw)
        .any(|m| !m.as_str().to_lowercase().contains("role="));
    if tables_without_role {
        t.deduct(
            5,
            ValidationIssue::suggestion("Add role attributes to tables for screen readers"),
        );
    }

    t.finish()
}

pub fn performance_score(doc: &HtmlDocument) -> ComponentScore {
    let mut t = Tally::new();

    let size = doc.byte_len;
    if size > HTML_SIZE_CRITICAL {
        t.deduct(30, ValidationIssue::warning(format!("HTML size ({} bytes) is very large", size)));
    } else if size > HTML_SIZE_WARNING {
        t.deduct(15, ValidationIssue::warning(format!("HTML size ({} bytes) is large", size)));
    }

    let images = doc.image_tags.len();
    if images > IMAGE_COUNT_CRITICAL {
        t.deduct(20, ValidationIssue::warning(format!("Too many images ({})", images)));
    } else if images > IMAGE_COUNT_WARNING {
        t.deduct(10, ValidationIssue::warning(format!("Many images ({}) may slow loading", images)));
    }

    let external = doc.external_url_count;
    if external > EXTERNAL_CRITICAL {
        t.deduct(20, ValidationIssue::warning(format!("Too many external requests ({})", external)));
    } else if external > EXTERNAL_WARNING {
        t.deduct(10, ValidationIssue::warning(format!("Several external requests ({})", external)));
    }

    let complexity = ["gradient", "shadow", "transform"]
        .iter()
        .map(|needle| doc.raw.matches(needle).count())
        .sum::<usize>();
    if complexity > 10 {
        t.deduct(10, ValidationIssue::warning("Complex CSS may affect rendering performance"));
    }

    t.finish()
}

/// Scores the document against one client's profile.
pub fn client_compatibility(doc: &HtmlDocument, profile: &ClientProfile) -> ClientCompatibility {
    let mut t = Tally::new();
    let client = profile.id;

    if let Some(max) = profile.max_css_size {
        let css_size: usize = doc.css_blocks.iter().map(String::len).sum();
        if css_size > max {
            t.deduct(
                20,
                ValidationIssue::issue(format!(
                    "CSS size ({}) exceeds {} limit ({})",
                    css_size, client, max
                )),
            );
        }
    }

    for prop in profile.blocked_css_properties {
        if doc.raw.contains(prop) {
            t.deduct(
                5,
                ValidationIssue::warning(format!("Property '{}' not supported in {}", prop, client)),
            );
        }
    }

    match client {
        ClientId::Outlook => {
            if doc.table_count == 0 {
                t.deduct(10, ValidationIssue::warning("Outlook prefers table-based layouts"));
            }
            if !doc.raw.to_lowercase().contains("mso") {
                t.deduct(5, ValidationIssue::warning("Consider adding MSO conditionals for Outlook"));
            }
        }
        ClientId::Gmail => {
            if doc.raw.contains("<style") {
                t.deduct(
                    5,
                    ValidationIssue::warning("Gmail may strip <style> tags - prefer inline styles"),
                );
            }
        }
        _ => {}
    }

    let result = t.finish();
    ClientCompatibility {
        score: result.score,
        issues: messages_of(&result.findings, Severity::Issue),
        warnings: messages_of(&result.findings, Severity::Warning),
        features: profile.features.iter().map(|f| f.to_string()).collect(),
    }
}

/// Fixed-weight combination of the component scores; no clients averages to 80.
pub fn overall_score(
    structural: u8,
    css: u8,
    accessibility: u8,
    performance: u8,
    client_scores: &[u8],
) -> u8 {
    let avg_client = if client_scores.is_empty() {
        80.0
    } else {
        client_scores.iter().map(|s| *s as f64).sum::<f64>() / client_scores.len() as f64
    };

    let overall = structural as f64 * WEIGHT_STRUCTURE
        + css as f64 * WEIGHT_CSS
        + accessibility as f64 * WEIGHT_ACCESSIBILITY
        + performance as f64 * WEIGHT_PERFORMANCE
        + avg_client * WEIGHT_COMPATIBILITY;

    clamp_score(overall as i32)
}

/// Full report for `doc` against the given clients.
pub fn score(doc: &HtmlDocument, clients: &[ClientId]) -> ScoreReport {
    let structural = structural_score(doc);
    let css = css_score(doc, clients);
    let accessibility = accessibility_score(doc);
    let performance = performance_score(doc);

    let mut client_compat = BTreeMap::new();
    let mut client_scores = Vec::with_capacity(clients.len());
    let mut low_compat = Vec::new();
    for id in clients {
        let result = client_compatibility(doc, profile(*id));
        if result.score < 70 {
            low_compat.push(ValidationIssue::warning(format!("Low compatibility with {}", id)));
        }
        client_scores.push(result.score);
        client_compat.insert(*id, result);
    }

    let overall = overall_score(
        structural.score,
        css.score,
        accessibility.score,
        performance.score,
        &client_scores,
    );

    let valid = !structural.findings.iter().any(|f| f.severity == Severity::Issue);

    let mut findings = structural.findings;
    findings.extend(css.findings);
    findings.extend(low_compat);
    findings.extend(accessibility.findings);
    findings.extend(performance.findings);

    debug!(
        "Scored document: overall {} (structure {}, css {}, a11y {}, perf {})",
        overall, structural.score, css.score, accessibility.score, performance.score
    );

    ScoreReport {
        valid,
        overall_score: overall,
        structural_score: structural.score,
        css_score: css.score,
        accessibility_score: accessibility.score,
        performance_score: performance.score,
        findings,
        client_compatibility: client_compat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;

    const COMPLETE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body>
<table role="presentation" style="max-width: 600px"><tr><td><h1>Hello</h1></td></tr></table>
</body>
</html>"#;

    #[test]
    fn test_structural_complete_document() {
        let result = structural_score(&analyze(COMPLETE));
        assert_eq!(result.score, 100);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_structural_bare_fragment() {
        let result = structural_score(&analyze("<p>hello</p>"));
        // 4 issues, 2 meta warnings, max-width, table.
        assert_eq!(result.score, 0);
        assert_eq!(messages_of(&result.findings, Severity::Issue).len(), 4);
        assert_eq!(messages_of(&result.findings, Severity::Warning).len(), 4);

        let report = score(&analyze("<p>hello</p>"), &[]);
        assert!(!report.valid);
    }

    #[test]
    fn test_css_score_outlook_and_gmail() {
        let html = "<style>.a { border-radius: 4px; box-shadow: none; }</style>";
        let doc = analyze(html);
        assert_eq!(css_score(&doc, &[]).score, 100);
        assert_eq!(css_score(&doc, &[ClientId::Outlook]).score, 90);
        assert_eq!(css_score(&doc, &[ClientId::Outlook, ClientId::Gmail]).score, 85);

        let heavy = format!("<style>{}</style>", "p{color:red !important}".repeat(21));
        assert_eq!(css_score(&analyze(&heavy), &[ClientId::Gmail]).score, 90);
    }

    #[test]
    fn test_css_size_bands() {
        let big = format!("<style>{}</style>", "a".repeat(30_001));
        assert_eq!(css_score(&analyze(&big), &[]).score, 90);
        let huge = format!("<div style=\"{}\"></div>", "a".repeat(50_001));
        assert_eq!(css_score(&analyze(&huge), &[]).score, 80);
    }

    #[test]
    fn test_accessibility_alt_penalty_is_capped() {
        let one = analyze("<h1>x</h1><img src=\"a.png\">");
        let with_alt = analyze("<h1>x</h1><img src=\"a.png\" alt=\"a\">");
        assert_eq!(accessibility_score(&with_alt).score - accessibility_score(&one).score, 5);

        let many = analyze(&format!("<h1>x</h1>{}", "<img src=\"a.png\">".repeat(8)));
        let result = accessibility_score(&many);
        assert_eq!(result.score, 70);
        assert_eq!(result.findings[0].location.as_deref(), Some("<img src=\"a.png\">"));
    }

    #[test]
    fn test_accessibility_headings_links_tables() {
        assert_eq!(accessibility_score(&analyze("<p>x</p>")).score, 90);
        assert_eq!(accessibility_score(&analyze("<h2>x</h2>")).score, 95);
        assert_eq!(
            accessibility_score(&analyze("<h1>x</h1><a href=\"#\"> Clique Aqui </a>")).score,
            90
        );
        assert_eq!(accessibility_score(&analyze("<h1>x</h1><table><tr></tr></table>")).score, 95);
        assert_eq!(
            accessibility_score(&analyze("<h1 style=\"color: #333\">x</h1>")).score,
            95
        );
        assert_eq!(
            accessibility_score(&analyze("<h1 style=\"color: #000; background: #fff\">x</h1>")).score,
            100
        );
    }

    #[test]
    fn test_performance_thresholds() {
        let big = analyze(&"a".repeat(110_000));
        assert_eq!(performance_score(&big).score, 70);

        let medium = analyze(&"a".repeat(60_000));
        assert_eq!(performance_score(&medium).score, 85);

        let images = analyze(&"<img src=\"https://cdn.example.com/x.png\" alt=\"x\">".repeat(11));
        // -20 images, -20 external requests
        assert_eq!(performance_score(&images).score, 60);

        let complex = analyze(&"shadow gradient ".repeat(6));
        assert_eq!(performance_score(&complex).score, 90);
    }

    #[test]
    fn test_client_compatibility() {
        let doc = analyze("<div style=\"position: absolute; float: left\">x</div>");
        let gmail = client_compatibility(&doc, profile(ClientId::Gmail));
        assert_eq!(gmail.score, 90);
        assert_eq!(gmail.warnings.len(), 2);
        assert_eq!(gmail.features, vec!["media_queries", "inline_styles", "basic_css"]);

        let outlook = client_compatibility(&doc, profile(ClientId::Outlook));
        assert_eq!(outlook.score, 85);

        let css = format!("<style>{}</style>", "a".repeat(30_001));
        let yahoo = client_compatibility(&analyze(&css), profile(ClientId::Yahoo));
        assert_eq!(yahoo.score, 80);
        assert_eq!(yahoo.issues, vec!["CSS size (30001) exceeds yahoo limit (30000)"]);
    }

    #[test]
    fn test_overall_score_weights() {
        assert_eq!(overall_score(100, 100, 100, 100, &[100]), 100);
        assert_eq!(overall_score(100, 100, 100, 100, &[]), 96);
        assert_eq!(overall_score(0, 0, 0, 0, &[50, 70]), 12);
    }

    #[test]
    fn test_low_compatibility_warning() {
        let doc = analyze("<p style=\"border-radius: 2px; box-shadow: 0; text-shadow: 0; transform: none\">x</p>");
        let report = score(&doc, &[ClientId::Outlook, ClientId::AppleMail]);
        assert!(report.warnings().contains(&"Low compatibility with outlook".to_string()));
        assert_eq!(report.client_compatibility[&ClientId::AppleMail].score, 100);
        assert!(!report.valid);
    }
}
