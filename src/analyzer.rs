//! Structural Analyzer Module
//!
//! This module turns raw email HTML into a shallow feature descriptor. It relies on
//! tag-presence regex checks rather than a full parser: email HTML is often not
//! well-formed and only feature presence matters to the optimizer and scorer.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"(?i)<html\b").unwrap();
    static ref HEAD_TAG: Regex = Regex::new(r"(?i)<head\b[^>]*>").unwrap();
    static ref BODY_TAG: Regex = Regex::new(r"(?i)<body\b").unwrap();
    static ref TITLE_TAG: Regex = Regex::new(r"(?i)<title\b").unwrap();
    static ref META_CHARSET: Regex = Regex::new(r"(?i)<meta\b[^>]*charset").unwrap();
    static ref META_VIEWPORT: Regex =
        Regex::new(r#"(?i)<meta\b[^>]*name\s*=\s*["']?viewport"#).unwrap();
    static ref STYLE_BLOCK: Regex = Regex::new(r"(?is)<style\b[^>]*>(.*?)</style>").unwrap();
    static ref INLINE_STYLE: Regex = Regex::new(r"(?i)\sstyle\s*=").unwrap();
    static ref IMG_TAG: Regex = Regex::new(r"(?i)<img\b[^>]*>").unwrap();
    static ref ANCHOR: Regex = Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").unwrap();
    static ref TABLE_TAG: Regex = Regex::new(r"(?i)<table\b").unwrap();
    static ref HEADING: Regex = Regex::new(r"(?i)<h([1-6])\b").unwrap();
    static ref EXTERNAL_URL: Regex = Regex::new(r"https?://").unwrap();
    static ref HTML_COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref SCRIPT_BLOCK: Regex = Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Feature snapshot of one HTML string. Recomputed per call, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HtmlDocument {
    pub raw: String,
    pub has_doctype: bool,
    pub has_html_tag: bool,
    pub has_head: bool,
    pub has_body: bool,
    pub has_title: bool,
    pub has_meta_charset: bool,
    pub has_meta_viewport: bool,
    pub has_mso_conditional: bool,
    pub css_blocks: Vec<String>,
    pub inline_style_count: usize,
    pub image_tags: Vec<String>,
    pub link_tags: Vec<String>,
    pub anchor_texts: Vec<String>,
    pub table_count: usize,
    pub heading_levels: Vec<u8>,
    pub external_url_count: usize,
    pub byte_len: usize,
}

impl HtmlDocument {
    /// All `<style>` contents joined in document order.
    pub fn css(&self) -> String {
        self.css_blocks.join("\n")
    }

    pub fn images_without_alt(&self) -> usize {
        self.image_tags.iter().filter(|tag| !has_alt(tag)).count()
    }
}

/// Builds the descriptor. Empty or whitespace-only input yields the zero-valued
/// descriptor, `byte_len` included; `raw` still holds the input.
pub fn analyze(html: &str) -> HtmlDocument {
    if html.trim().is_empty() {
        return HtmlDocument { raw: html.to_string(), ..Default::default() };
    }

    let lower = html.to_lowercase();

    HtmlDocument {
        raw: html.to_string(),
        has_doctype: lower.contains("<!doctype"),
        has_html_tag: HTML_TAG.is_match(html),
        has_head: HEAD_TAG.is_match(html),
        has_body: BODY_TAG.is_match(html),
        has_title: TITLE_TAG.is_match(html),
        has_meta_charset: META_CHARSET.is_match(html),
        has_meta_viewport: META_VIEWPORT.is_match(html),
        has_mso_conditional: lower.contains("<!--[if mso"),
        css_blocks: STYLE_BLOCK
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        inline_style_count: INLINE_STYLE.find_iter(html).count(),
        image_tags: IMG_TAG.find_iter(html).map(|m| m.as_str().to_string()).collect(),
        link_tags: ANCHOR.find_iter(html).map(|m| m.as_str().to_string()).collect(),
        anchor_texts: ANCHOR
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| extract_text(m.as_str())))
            .collect(),
        table_count: TABLE_TAG.find_iter(html).count(),
        heading_levels: HEADING
            .captures_iter(html)
            .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<u8>().ok()))
            .collect(),
        external_url_count: EXTERNAL_URL.find_iter(html).count(),
        byte_len: html.len(),
    }
}

pub(crate) fn has_alt(img_tag: &str) -> bool {
    lazy_static! {
        static ref ALT_ATTR: Regex = Regex::new(r"(?i)\salt\s*=").unwrap();
    }
    ALT_ATTR.is_match(img_tag)
}

/// Contents of every `<style>` block, joined with a newline.
pub fn extract_css(html: &str) -> String {
    analyze_css_blocks(html).join("\n")
}

fn analyze_css_blocks(html: &str) -> Vec<String> {
    STYLE_BLOCK
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

pub fn strip_style_blocks(html: &str) -> String {
    STYLE_BLOCK.replace_all(html, "").into_owned()
}

/// Puts `css` back into the document as a single `<style>` block.
///
/// The first existing block is replaced and any others removed; without one the
/// block goes right after `<head>`, and without a head it is prepended.
pub fn combine_html_with_css(html: &str, css: &str) -> String {
    let block = format!("<style>\n{}\n</style>", css);

    if let Some(m) = STYLE_BLOCK.find(html) {
        return format!(
            "{}{}{}",
            &html[..m.start()],
            block,
            strip_style_blocks(&html[m.end()..])
        );
    }

    if let Some(m) = HEAD_TAG.find(html) {
        return format!("{}\n{}{}", &html[..m.end()], block, &html[m.end()..]);
    }

    format!("{}\n{}", block, html)
}

/// Visible text: comments, styles, scripts and tags removed, whitespace collapsed.
pub fn extract_text(html: &str) -> String {
    let without_comments = HTML_COMMENT.replace_all(html, " ");
    let without_style = STYLE_BLOCK.replace_all(&without_comments, " ");
    let without_script = SCRIPT_BLOCK.replace_all(&without_style, " ");
    let without_tags = ANY_TAG.replace_all(&without_script, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}
