/// Security tests for Inboxer.
///
/// This module verifies that the pipeline holds up against hostile input:
/// - Oversized documents (rejected, answered with the fallback payload)
/// - Pathological markup (processed in bounded time)
/// - Script injection through prompts (escaped in rendered shells)
use anyhow::Result;
use std::time::Instant;

#[cfg(test)]
mod tests {
    use super::*;
    use inboxer::analyze;
    use inboxer::models::{OptimizationRequest, ScoreReport};
    use inboxer::renderer::{Renderer, ThemeConfig};
    use inboxer::{Config, Pipeline};

    const MAX_PROCESSING_TIME_MS: u128 = 2000; // 2 seconds for test
    const TEST_BOMB_SIZE: usize = 2 * 1024 * 1024; // 2MB document for test

    /// Documents over the configured limit never reach the transforms.
    #[test]
    fn test_oversized_document_protection() -> Result<()> {
        let mut config = Config::default();
        config.max_html_size = 1024 * 1024; // 1MB
        let pipeline = Pipeline::new(&config)?;

        let html = format!("<html><body>{}</body></html>", "A".repeat(TEST_BOMB_SIZE));
        let start = Instant::now();
        let response = pipeline.optimize(&OptimizationRequest::new(html.clone(), &["gmail"]))?;
        let duration = start.elapsed();

        assert!(
            duration.as_millis() < MAX_PROCESSING_TIME_MS,
            "Oversized document processing too slow: {:?}",
            duration
        );
        assert!(response.fallback, "Oversized document should be rejected");
        assert_eq!(response.html.len(), html.len());
        assert_eq!(response.optimizations, vec!["Fallback optimization applied"]);
        Ok(())
    }

    /// Deeply nested and unterminated markup is analyzed in linear time.
    #[test]
    fn test_pathological_markup_protection() -> Result<()> {
        let inputs = [
            "<".repeat(50_000),
            "<style>".repeat(10_000),
            format!("<img src=\"{}", "x".repeat(50_000)),
            "<table>".repeat(5_000) + &"</table>".repeat(5_000),
            format!("<style>.a {{ {} }}</style>", "border-radius: 1px; ".repeat(5_000)),
        ];

        let pipeline = Pipeline::default();
        for input in &inputs {
            let start = Instant::now();
            let doc = analyze(input);
            let report: ScoreReport = pipeline.validate(input, &["outlook".to_string()])?;
            let duration = start.elapsed();

            assert!(
                duration.as_millis() < MAX_PROCESSING_TIME_MS,
                "Pathological markup was not handled in time ({} bytes): {:?}",
                input.len(),
                duration
            );
            assert!(doc.byte_len <= input.len());
            assert!(report.overall_score <= 100);
        }
        Ok(())
    }

    /// Prompt text lands in the fallback shell escaped, never as live markup.
    #[test]
    fn test_script_injection_in_fallback_email() -> Result<()> {
        let renderer = Renderer::new()?;
        let email = renderer.fallback_email("<script>alert('x')</script>", &ThemeConfig::default());

        assert!(!email.html.contains("<script>"), "Prompt injected a live script tag");
        assert!(email.html.contains("&lt;script&gt;"));
        Ok(())
    }
}
