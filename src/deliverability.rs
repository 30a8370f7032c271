//! Deliverability Module
//!
//! Subject and body heuristics that estimate whether a message lands in the inbox:
//! a 0-100 deliverability score and an additive spam score with a risk tier.

use crate::models::{DeliverabilityReport, RiskLevel, SpamReport};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref HREF: Regex = Regex::new(r#"href=["']([^"']+)["']"#).unwrap();
    static ref IMG: Regex = Regex::new(r"<img[^>]+>").unwrap();
}

/// Promotional words that hurt inbox placement when piled into a subject.
const DELIVERABILITY_TRIGGERS: [&str; 10] = [
    "grátis",
    "free",
    "urgent",
    "urgente",
    "promoção",
    "desconto",
    "oferta",
    "limitado",
    "agora",
    "clique aqui",
];

const SUBJECT_SPAM_WORDS: [&str; 14] = [
    "free",
    "grátis",
    "urgent",
    "urgente",
    "guaranteed",
    "garantido",
    "act now",
    "agora",
    "limited time",
    "tempo limitado",
    "click here",
    "clique aqui",
    "buy now",
    "compre agora",
];

const CONTENT_SPAM_WORDS: [&str; 9] = [
    "viagra",
    "casino",
    "lottery",
    "million",
    "millionaire",
    "inheritance",
    "nigerian",
    "prince",
    "diplomat",
];

const SHORTENER_DOMAINS: [&str; 3] = ["bit.ly", "tinyurl.com", "t.co"];

pub fn deliverability_report(html: &str, subject: &str) -> DeliverabilityReport {
    let mut score: i32 = 100;
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    let subject_lower = subject.to_lowercase();
    let trigger_count = DELIVERABILITY_TRIGGERS
        .iter()
        .filter(|t| subject_lower.contains(*t))
        .count();
    if trigger_count > 2 {
        score -= 20;
        warnings.push("Assunto contém muitas palavras de spam".to_string());
    }

    if subject.chars().count() > 50 {
        score -= 10;
        warnings.push("Assunto muito longo (recomendado: até 50 caracteres)".to_string());
    }

    let html_len = html.chars().count();
    let text_len = TAG.replace_all(html, "").trim().chars().count();
    if text_len == 0 {
        score -= 30;
        issues.push("Email sem conteúdo de texto".to_string());
    } else if (text_len as f64) < html_len as f64 * 0.1 {
        score -= 15;
        warnings.push("Muito pouco texto em relação ao HTML".to_string());
    }

    let external_links = HREF
        .captures_iter(html)
        .filter(|c| c[1].starts_with("http://") || c[1].starts_with("https://"))
        .count();
    if external_links > 10 {
        score -= 10;
        warnings.push("Muitos links externos".to_string());
    }

    let images: Vec<&str> = IMG.find_iter(html).map(|m| m.as_str()).collect();
    if images.len() > 5 {
        score -= 5;
        warnings.push("Muitas imagens podem afetar deliverability".to_string());
    }

    let without_alt = images
        .iter()
        .filter(|img| !img.to_lowercase().contains("alt="))
        .count();
    if without_alt > 0 {
        score -= 10;
        warnings.push(format!("{} imagens sem alt text", without_alt));
    }

    let recommendations = deliverability_recommendations(score, &issues, &warnings);

    DeliverabilityReport {
        deliverability_score: score.clamp(0, 100) as u8,
        issues,
        warnings,
        recommendations,
    }
}

fn deliverability_recommendations(score: i32, issues: &[String], warnings: &[String]) -> Vec<String> {
    let mut recs = Vec::new();
    let all: Vec<String> = issues.iter().chain(warnings).map(|m| m.to_lowercase()).collect();

    if score < 70 {
        recs.push("Revise o conteúdo para melhorar deliverability");
    }
    if all.iter().any(|m| m.contains("spam")) {
        recs.push("Reduza palavras que podem ser consideradas spam");
    }
    if warnings.iter().any(|w| w.to_lowercase().contains("texto")) {
        recs.push("Aumente a proporção de texto em relação ao HTML");
    }
    if warnings.iter().any(|w| w.to_lowercase().contains("imagens sem alt")) {
        recs.push("Adicione alt text a todas as imagens");
    }
    recs.extend([
        "Use um assunto claro e direto",
        "Mantenha uma boa proporção texto/HTML",
        "Evite muitos links externos",
        "Teste em diferentes provedores de email",
    ]);

    recs.into_iter().take(5).map(String::from).collect()
}

pub fn spam_report(html: &str, subject: &str) -> SpamReport {
    let mut spam_score: u32 = 0;
    let mut factors = Vec::new();

    let subject_lower = subject.to_lowercase();
    for word in SUBJECT_SPAM_WORDS {
        if subject_lower.contains(word) {
            spam_score += 2;
            factors.push(format!("Palavra spam no assunto: '{}'", word));
        }
    }

    let total_chars = subject.chars().count();
    if total_chars > 0 {
        let upper = subject.chars().filter(|c| c.is_uppercase()).count();
        if upper as f64 / total_chars as f64 > 0.5 {
            spam_score += 2;
            factors.push("Muitas letras maiúsculas no assunto".to_string());
        }
    }

    let html_lower = html.to_lowercase();
    for word in CONTENT_SPAM_WORDS {
        if html_lower.contains(word) {
            spam_score += 3;
            factors.push(format!("Palavra spam no conteúdo: '{}'", word));
        }
    }

    let exclamations = subject.matches('!').count() + html.matches('!').count();
    if exclamations > 5 {
        spam_score += 1;
        factors.push("Muitos pontos de exclamação".to_string());
    }

    for domain in SHORTENER_DOMAINS {
        if html_lower.contains(domain) {
            spam_score += 2;
            factors.push(format!("Link encurtado detectado: {}", domain));
        }
    }

    let risk_level = risk_level(spam_score);
    let recommendations = spam_recommendations(spam_score, &factors);

    SpamReport { spam_score, risk_level, factors, recommendations }
}

pub fn risk_level(spam_score: u32) -> RiskLevel {
    match spam_score {
        s if s >= 8 => RiskLevel::High,
        s if s >= 4 => RiskLevel::Medium,
        s if s >= 1 => RiskLevel::Low,
        _ => RiskLevel::VeryLow,
    }
}

fn spam_recommendations(spam_score: u32, factors: &[String]) -> Vec<String> {
    let mut recs: Vec<&str> = Vec::new();
    let lowered: Vec<String> = factors.iter().map(|f| f.to_lowercase()).collect();

    if spam_score >= 5 {
        recs.push("CRÍTICO: Revise completamente o conteúdo");
    } else if spam_score >= 3 {
        recs.push("ATENÇÃO: Reduza elementos que podem gerar spam");
    }
    if lowered.iter().any(|f| f.contains("assunto")) {
        recs.push("Revise o assunto do email");
    }
    if lowered.iter().any(|f| f.contains("maiúscula")) {
        recs.push("Reduza o uso de letras maiúsculas");
    }
    if lowered.iter().any(|f| f.contains("exclamação")) {
        recs.push("Use pontos de exclamação com moderação");
    }
    recs.extend([
        "Use linguagem natural e profissional",
        "Evite promessas exageradas",
        "Mantenha equilíbrio entre texto e imagens",
        "Teste o email antes de enviar",
    ]);

    let mut unique: Vec<String> = Vec::new();
    for rec in recs {
        if !unique.iter().any(|u| u == rec) {
            unique.push(rec.to_string());
        }
    }
    unique.truncate(6);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spam_high_risk_subject() {
        let report = spam_report("<p>Oferta imperdível</p>", "GRÁTIS AGORA!!! CLIQUE AQUI");
        assert!(report.spam_score >= 8);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert!(report.factors.contains(&"Muitas letras maiúsculas no assunto".to_string()));
        assert_eq!(report.recommendations[0], "CRÍTICO: Revise completamente o conteúdo");
        assert!(report.recommendations.len() <= 6);
    }

    #[test]
    fn test_spam_clean_message() {
        let report = spam_report("<p>Olá, segue o relatório mensal.</p>", "Relatório de outubro");
        assert_eq!(report.spam_score, 0);
        assert_eq!(report.risk_level, RiskLevel::VeryLow);
        assert!(report.factors.is_empty());
    }

    #[test]
    fn test_spam_body_words_and_shorteners() {
        let html = "<p>You won the lottery! Claim at https://bit.ly/x</p>";
        let report = spam_report(html, "Hello");
        // lottery +3, bit.ly +2
        assert_eq!(report.spam_score, 5);
        assert_eq!(report.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_risk_bands() {
        assert_eq!(risk_level(0), RiskLevel::VeryLow);
        assert_eq!(risk_level(1), RiskLevel::Low);
        assert_eq!(risk_level(4), RiskLevel::Medium);
        assert_eq!(risk_level(8), RiskLevel::High);
    }

    #[test]
    fn test_deliverability_clean() {
        let html = "<p>Olá Maria, obrigado por participar do nosso evento de ontem.</p>";
        let report = deliverability_report(html, "Obrigado pela presença");
        assert_eq!(report.deliverability_score, 100);
        assert!(report.issues.is_empty());
        assert_eq!(report.recommendations.len(), 4);
    }

    #[test]
    fn test_deliverability_penalties() {
        let html = "<div><img src=\"a.png\"></div>";
        let subject = "Grátis: oferta com desconto por tempo limitado, aproveite agora mesmo";
        let report = deliverability_report(html, subject);
        // -20 triggers, -10 long subject, -30 no text, -10 missing alt
        assert_eq!(report.deliverability_score, 30);
        assert_eq!(report.issues, vec!["Email sem conteúdo de texto"]);
        assert_eq!(report.recommendations.len(), 5);
        assert_eq!(report.recommendations[0], "Revise o conteúdo para melhorar deliverability");
    }
}
