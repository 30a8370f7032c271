//! Inboxer - Email HTML compatibility toolkit
//!
//! This tool optimizes email HTML for specific email clients, validates it,
//! checks its spam and deliverability signals, renders content into themed
//! shells, and generates new emails through an LLM.
//!
//! Every subcommand prints its results in one of three formats: Table, CSV, or JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use inboxer::config::Config;
use inboxer::deliverability::{deliverability_report, spam_report};
use inboxer::llm::LlmClient;
use inboxer::metrics::InMemoryMetrics;
use inboxer::models::{
    ClientCompatibility, ClientId, GenerationRequest, Industry, OptimizationRequest, RiskLevel, ScoreReport, Tone,
    Urgency,
};
use inboxer::pipeline::Pipeline;
use inboxer::renderer::{Renderer, ThemeConfig};
use inboxer::service::EmailService;
use inboxer::store::MemoryStore;
use prettytable::{row, Cell, Row, Table};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// CLI arguments for Inboxer.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Email HTML/CSS compatibility toolkit in Rust",
    long_about = "Inboxer optimizes email HTML for Gmail, Outlook, Apple Mail, Yahoo and Thunderbird, \
                  scores structure, CSS support, accessibility and size, and checks spam signals.\n\n\
                  USAGE:\n  inboxer <COMMAND> [--output <table|csv|json>] [--verbose]"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output format: table, csv, json
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Optimize an HTML file for the given clients
    Optimize {
        file: PathBuf,
        /// Comma-separated client ids (gmail, outlook, apple_mail, yahoo, thunderbird)
        #[arg(short, long, value_delimiter = ',')]
        clients: Vec<String>,
        #[arg(long)]
        no_dark_mode: bool,
        #[arg(long)]
        no_mobile: bool,
        #[arg(long)]
        minify: bool,
        /// Where to write the optimized HTML (default: <file>.optimized.html)
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
    /// Score one or more HTML files without changing them
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, value_delimiter = ',')]
        clients: Vec<String>,
    },
    /// Spam and deliverability check for an HTML file and subject line
    Spam {
        file: PathBuf,
        #[arg(short, long)]
        subject: String,
    },
    /// Render an HTML fragment into a themed email shell
    Render {
        file: PathBuf,
        #[arg(short, long)]
        subject: String,
        #[arg(long, default_value = "geral")]
        industry: Industry,
        #[arg(long, default_value = "professional")]
        tone: Tone,
        #[arg(long, default_value = "medium")]
        urgency: Urgency,
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
    /// Generate a new email from a prompt through the configured LLM
    Generate {
        prompt: String,
        #[arg(long, default_value = "geral")]
        industry: Industry,
        #[arg(long, default_value = "professional")]
        tone: Tone,
        #[arg(long, default_value = "medium")]
        urgency: Urgency,
        #[arg(short, long, value_delimiter = ',')]
        clients: Vec<String>,
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
}

/// Supported output formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

/// One CSV line of a validation run.
#[derive(Debug, Serialize)]
struct ValidationRow {
    file: String,
    valid: bool,
    overall: u8,
    structural: u8,
    css: u8,
    accessibility: u8,
    performance: u8,
    issues: usize,
    warnings: usize,
}

impl ValidationRow {
    fn new(file: &Path, report: &ScoreReport) -> Self {
        Self {
            file: file.display().to_string(),
            valid: report.valid,
            overall: report.overall_score,
            structural: report.structural_score,
            css: report.css_score,
            accessibility: report.accessibility_score,
            performance: report.performance_score,
            issues: report.issues().len(),
            warnings: report.warnings().len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ClientRow<'a> {
    client: &'a str,
    score: u8,
    issues: String,
    warnings: String,
}

/// Reads an HTML file, refusing anything over `max_size` bytes.
fn read_html(path: &Path, max_size: usize) -> Result<String> {
    let metadata = std::fs::metadata(path).with_context(|| format!("Cannot access {}", path.display()))?;
    if metadata.len() as usize > max_size {
        anyhow::bail!(
            "{} is {} bytes, exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            max_size
        );
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// `news.html` becomes `news.optimized.html` next to the input.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("email");
    input.with_file_name(format!("{}.optimized.html", stem))
}

fn write_html(path: &Path, html: &str) -> Result<()> {
    std::fs::write(path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {} bytes to {}", html.len(), path.display());
    Ok(())
}

/// Colors a 0-100 score: green from 80, yellow from 60, red below.
fn paint_score(score: u8) -> ColoredString {
    let text = score.to_string();
    match score {
        80..=100 => text.green(),
        60..=79 => text.yellow(),
        _ => text.red(),
    }
}

fn paint_risk(risk: RiskLevel) -> ColoredString {
    let text = risk.to_string();
    match risk {
        RiskLevel::VeryLow | RiskLevel::Low => text.green(),
        RiskLevel::Medium => text.yellow(),
        RiskLevel::High => text.red().bold(),
    }
}

fn print_clients_table(per_client: &BTreeMap<ClientId, ClientCompatibility>) {
    if per_client.is_empty() {
        println!("{}", "No per-client results.".yellow());
        return;
    }
    let mut table = Table::new();
    table.add_row(row!["Client", "Score", "Issues", "Warnings"]);
    for (client, compat) in per_client {
        table.add_row(Row::new(vec![
            Cell::new(client.as_str()),
            Cell::new(&paint_score(compat.score).to_string()),
            Cell::new(&compat.issues.join("\n")),
            Cell::new(&compat.warnings.join("\n")),
        ]));
    }
    table.printstd();
}

fn write_client_csv(per_client: &BTreeMap<ClientId, ClientCompatibility>) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for (client, compat) in per_client {
        wtr.serialize(ClientRow {
            client: client.as_str(),
            score: compat.score,
            issues: compat.issues.join("; "),
            warnings: compat.warnings.join("; "),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}", title.bold());
    for item in items {
        println!("  - {}", item);
    }
}

fn run_optimize(
    config: &Config,
    output: &OutputFormat,
    file: &Path,
    request: OptimizationRequest,
    write: Option<PathBuf>,
) -> Result<()> {
    let metrics = Arc::new(InMemoryMetrics::new());
    let pipeline = Pipeline::new(config)?.with_metrics(metrics.clone());
    let response = pipeline.optimize(&request).context("Optimization failed")?;

    let target = write.unwrap_or_else(|| default_output_path(file));
    write_html(&target, &response.html)?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Csv => write_client_csv(&response.per_client)?,
        OutputFormat::Table => {
            if response.fallback {
                println!("{}", "Optimization failed internally, fallback output written.".yellow().bold());
            }
            println!("{}: {}", "Output".bold(), target.display());
            println!("{}: {:.2}\n", "Compatibility".bold(), response.compatibility_score);
            print_list("Applied optimizations", &response.optimizations);
            println!();
            print_clients_table(&response.per_client);
        }
    }

    log::debug!("Metrics: {:?}", metrics.summary());
    Ok(())
}

fn run_validate(config: &Config, output: &OutputFormat, files: &[PathBuf], clients: &[String]) -> Result<()> {
    let pipeline = Pipeline::new(config)?;

    let results: Vec<(PathBuf, Result<ScoreReport>)> = files
        .par_iter()
        .map(|path| {
            let report = read_html(path, config.max_html_size)
                .and_then(|html| pipeline.validate(&html, clients).map_err(anyhow::Error::from));
            (path.clone(), report)
        })
        .collect();

    let mut reports = Vec::new();
    for (path, result) in results {
        match result {
            Ok(report) => reports.push((path, report)),
            Err(e) => log::error!("{}: {:#}", path.display(), e),
        }
    }

    match output {
        OutputFormat::Json => {
            let by_file: BTreeMap<String, &ScoreReport> =
                reports.iter().map(|(p, r)| (p.display().to_string(), r)).collect();
            println!("{}", serde_json::to_string_pretty(&by_file)?);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            for (path, report) in &reports {
                wtr.serialize(ValidationRow::new(path, report))?;
            }
            wtr.flush()?;
        }
        OutputFormat::Table => {
            if reports.is_empty() {
                println!("{}", "No files validated.".yellow());
            }
            for (path, report) in &reports {
                let verdict = if report.valid { "valid".green() } else { "invalid".red() };
                println!("{} ({})", path.display().to_string().bold().blue(), verdict);
                let mut table = Table::new();
                table.add_row(row!["Overall", "Structure", "CSS", "Accessibility", "Performance"]);
                table.add_row(Row::new(vec![
                    Cell::new(&paint_score(report.overall_score).to_string()),
                    Cell::new(&report.structural_score.to_string()),
                    Cell::new(&report.css_score.to_string()),
                    Cell::new(&report.accessibility_score.to_string()),
                    Cell::new(&report.performance_score.to_string()),
                ]));
                table.printstd();
                print_list("Issues", &report.issues());
                print_list("Warnings", &report.warnings());
                print_list("Suggestions", &report.suggestions());
                print_clients_table(&report.client_compatibility);
                println!();
            }
        }
    }

    if reports.len() < files.len() {
        anyhow::bail!("{} of {} files could not be validated", files.len() - reports.len(), files.len());
    }
    Ok(())
}

fn run_spam(config: &Config, output: &OutputFormat, file: &Path, subject: &str) -> Result<()> {
    let html = read_html(file, config.max_html_size)?;
    let spam = spam_report(&html, subject);
    let deliverability = deliverability_report(&html, subject);

    match output {
        OutputFormat::Json => {
            let combined = serde_json::json!({ "spam": spam, "deliverability": deliverability });
            println!("{}", serde_json::to_string_pretty(&combined)?);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record(["spam_score", "risk_level", "deliverability_score", "factors"])?;
            wtr.write_record([
                spam.spam_score.to_string(),
                spam.risk_level.to_string(),
                deliverability.deliverability_score.to_string(),
                spam.factors.join("; "),
            ])?;
            wtr.flush()?;
        }
        OutputFormat::Table => {
            println!("{}", "Spam Check".bold().blue());
            println!("{}", "----------------------------".dimmed());
            println!("{}: {}", "Spam score".bold(), spam.spam_score);
            println!("{}: {}", "Risk level".bold(), paint_risk(spam.risk_level));
            println!(
                "{}: {}\n",
                "Deliverability".bold(),
                paint_score(deliverability.deliverability_score)
            );
            print_list("Factors", &spam.factors);
            print_list("Issues", &deliverability.issues);
            print_list("Warnings", &deliverability.warnings);
            print_list("Recommendations", &spam.recommendations);
        }
    }
    Ok(())
}

async fn run_generate(config: &Config, output: &OutputFormat, request: GenerationRequest, write: Option<PathBuf>) -> Result<()> {
    let llm = LlmClient::new(config)?;
    if !llm.health_check().await {
        log::warn!("LLM provider is not reachable, the fallback template will be used");
    }
    let service = EmailService::new(
        llm,
        Pipeline::new(config)?,
        Renderer::new()?,
        MemoryStore::new(),
        config.history_limit,
    );
    let email = service.generate(&request).await.context("Generation failed")?;

    if let Some(path) = &write {
        write_html(path, &email.html)?;
    }

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&email)?),
        OutputFormat::Csv => write_client_csv(&email.validation.client_compatibility)?,
        OutputFormat::Table => {
            if email.fallback {
                println!("{}", "LLM unavailable, fallback template used.".yellow().bold());
            }
            println!("{}: {}", "Subject".bold(), email.subject);
            println!("{}: {}", "Preview".bold(), email.preview_text);
            println!("{}: {} ({} tokens)", "Model".bold(), email.model, email.tokens_used);
            println!("{}: {}\n", "Overall score".bold(), paint_score(email.validation.overall_score));
            print_list("Applied optimizations", &email.optimizations);
            println!();
            print_clients_table(&email.validation.client_compatibility);
            if write.is_none() {
                println!("\n{}", email.html);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity.
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    if matches!(cli.output, OutputFormat::Table) {
        println!(
            "{}\n{}\n",
            "Inboxer - Email Compatibility Toolkit".bold().green(),
            "Optimizing, validating & scoring email HTML".dimmed()
        );
    }

    let config = Config::new().context("Failed to load configuration")?;

    match cli.command {
        Command::Optimize { file, clients, no_dark_mode, no_mobile, minify, write } => {
            log::info!("Processing file: {}", file.display());
            let html = read_html(&file, config.max_html_size)?;
            let mut request = OptimizationRequest::new(html, &[]);
            request.target_clients = clients;
            request.enable_dark_mode = !no_dark_mode;
            request.mobile_first = !no_mobile;
            request.minify = minify;
            run_optimize(&config, &cli.output, &file, request, write)?;
        }
        Command::Validate { files, clients } => run_validate(&config, &cli.output, &files, &clients)?,
        Command::Spam { file, subject } => run_spam(&config, &cli.output, &file, &subject)?,
        Command::Render { file, subject, industry, tone, urgency, write } => {
            let content = read_html(&file, config.max_html_size)?;
            let renderer = Renderer::new()?;
            let html = renderer.render(&content, &subject, &ThemeConfig::new(industry, tone, urgency));
            match write {
                Some(path) => write_html(&path, &html)?,
                None => println!("{}", html),
            }
        }
        Command::Generate { prompt, industry, tone, urgency, clients, write } => {
            let request = GenerationRequest { prompt, industry, tone, urgency, target_clients: clients };
            run_generate(&config, &cli.output, request, write).await?;
        }
    }

    log::info!("{}", "Done!".bold().cyan());
    Ok(())
}
