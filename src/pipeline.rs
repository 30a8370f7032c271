//! Pipeline Module
//!
//! This module runs one optimization request end to end:
//! analyze, fix, client passes, enhancements, optional minify, recombine, score.
//!
//! Unknown client identifiers are the only error a caller ever sees. Any fault
//! inside the run is logged and replaced by the fallback response.

use crate::analyzer::{analyze, combine_html_with_css};
use crate::clients::{parse_clients, profiles_for};
use crate::config::Config;
use crate::error::{InboxerError, Result};
use crate::metrics::MetricsSink;
use crate::models::{ClientId, OptimizationRequest, OptimizationResponse, OptimizationResult, ScoreReport};
use crate::optimizer::{
    apply_automatic_fixes, apply_enhancements, compatibility_score, fallback_css, optimize_for_clients,
    optimize_for_size, EnhancementOptions,
};
use crate::scorer;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub const FALLBACK_LABEL: &str = "Fallback optimization applied";
pub const FALLBACK_SCORE: f64 = 0.8;

pub struct Pipeline {
    max_html_size: usize,
    default_clients: Vec<ClientId>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            max_html_size: 1024 * 1024,
            default_clients: vec![ClientId::Gmail, ClientId::Outlook],
            metrics: None,
        }
    }
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            max_html_size: config.max_html_size,
            default_clients: parse_clients(&config.default_clients)?,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn with_max_html_size(mut self, max_html_size: usize) -> Self {
        self.max_html_size = max_html_size;
        self
    }

    fn resolve_clients(&self, ids: &[String]) -> Result<Vec<ClientId>> {
        if ids.is_empty() {
            return Ok(self.default_clients.clone());
        }
        parse_clients(ids)
    }

    /// Optimizes the request's HTML for its target clients.
    ///
    /// Returns `UnknownClient` for an invalid target; every other failure yields
    /// the fallback response.
    pub fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizationResponse> {
        let clients = self.resolve_clients(&request.target_clients)?;

        let request_id = self.metrics.as_ref().map(|m| {
            m.record_metric("html_size", request.html.len() as f64);
            m.record_request_start("optimize")
        });
        let started = Instant::now();

        let outcome = self.try_optimize(request, &clients);

        if let (Some(sink), Some(id)) = (self.metrics.as_ref(), request_id.as_deref()) {
            sink.record_metric("optimize_ms", started.elapsed().as_secs_f64() * 1000.0);
            match &outcome {
                Ok(_) => sink.record_request_end(id, true, None),
                Err(e) => sink.record_request_end(id, false, Some(&e.to_string())),
            }
        }

        match outcome {
            Ok(result) => Ok(OptimizationResponse {
                html: result.html,
                css: result.css,
                optimizations: result.applied_optimizations,
                compatibility_score: compatibility_score(&clients),
                per_client: result.report.client_compatibility,
                fallback: false,
            }),
            Err(e) => {
                warn!("Optimization failed, returning fallback: {}", e);
                Ok(fallback_response(&request.html))
            }
        }
    }

    /// The full run with internal faults surfaced instead of replaced.
    pub fn try_optimize(&self, request: &OptimizationRequest, clients: &[ClientId]) -> Result<OptimizationResult> {
        if request.html.len() > self.max_html_size {
            return Err(InboxerError::InputTooLarge(format!(
                "HTML is {} bytes, limit is {}",
                request.html.len(),
                self.max_html_size
            )));
        }

        info!(
            "Optimizing {} bytes for {}",
            request.html.len(),
            clients.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
        );

        let (fixed, mut applied) = apply_automatic_fixes(&request.html);
        let doc = analyze(&fixed);
        let css = doc.css();

        let profiles = profiles_for(clients);
        let optimized = optimize_for_clients(&doc, &css, &profiles);
        applied.extend(optimized.applied);

        let (css, enhancements) = apply_enhancements(
            &optimized.css,
            EnhancementOptions { enable_dark_mode: request.enable_dark_mode, mobile_first: request.mobile_first },
        );
        applied.extend(enhancements);

        let mut html = optimized.html;
        if request.minify {
            let (minified, size_labels) = optimize_for_size(&html);
            html = minified;
            applied.extend(size_labels);
        }

        let html = combine_html_with_css(&html, &css);
        if html.trim().is_empty() {
            return Err(InboxerError::Pipeline("optimization produced empty HTML".to_string()));
        }

        let report = scorer::score(&analyze(&html), clients);
        debug!("Applied {} optimizations, overall score {}", applied.len(), report.overall_score);

        Ok(OptimizationResult { html, css, applied_optimizations: applied, report })
    }

    /// Scores `html` as-is against the given clients.
    pub fn validate(&self, html: &str, client_ids: &[String]) -> Result<ScoreReport> {
        let clients = self.resolve_clients(client_ids)?;
        Ok(scorer::score(&analyze(html), &clients))
    }
}

/// The all-or-nothing result returned when a run fails internally.
pub fn fallback_response(html: &str) -> OptimizationResponse {
    OptimizationResponse {
        html: html.to_string(),
        css: fallback_css(),
        optimizations: vec![FALLBACK_LABEL.to_string()],
        compatibility_score: FALLBACK_SCORE,
        per_client: BTreeMap::new(),
        fallback: true,
    }
}
