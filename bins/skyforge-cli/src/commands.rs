// CLI commands for running code and inspecting the sandbox
use anyhow::{bail, Context, Result};
use skyforge_common::config::Config;
use skyforge_common::types::{ExecutionRequest, Language, MAX_SOURCE_BYTES};
use skyforge_engine::registry::{Recipe, LANGUAGES};
use skyforge_engine::{Orchestrator, Sandbox};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Read and check a source file the same way the HTTP gate checks a body
fn load_request(language: &str, path: &Path) -> Result<ExecutionRequest> {
    let Some(language) = Language::parse_id(language) else {
        bail!(
            "Unsupported language '{}'. Supported: {}",
            language,
            Language::supported_list()
        );
    };

    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if source.is_empty() {
        bail!("{} is empty", path.display());
    }
    if source.len() > MAX_SOURCE_BYTES {
        bail!(
            "{} is {} bytes; the limit is {} bytes",
            path.display(),
            source.len(),
            MAX_SOURCE_BYTES
        );
    }

    debug!(language = %language, path = %path.display(), bytes = source.len(), "Loaded source");
    Ok(ExecutionRequest::new(language, source))
}

/// Program exit codes outside 0..=255 cannot be mirrored by a process
fn process_exit_code(exit_code: i64) -> i32 {
    if (0..=255).contains(&exit_code) {
        exit_code as i32
    } else {
        1
    }
}

/// Execute a file through the full cascade. Returns the exit code to mirror.
pub async fn run_file(language: &str, path: &Path, timeout_ms: Option<u64>) -> Result<i32> {
    let config = Config::from_env().context("Invalid configuration")?;
    let request = load_request(language, path)?
        .with_timeout_ms(timeout_ms.unwrap_or(config.execution_timeout_ms));

    let sandbox = Arc::new(Sandbox::local());
    let orchestrator =
        Orchestrator::from_config(&config, sandbox).context("Failed to build HTTP client")?;

    println!("🚀 Running {} ({})", path.display(), request.language);
    let result = orchestrator.execute(&request).await;
    info!(
        tier = %result.tier_used,
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
        timed_out = result.timed_out,
        "Run finished"
    );

    if !result.stdout.is_empty() {
        println!("\n📤 stdout:\n{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        println!("\n⚠️  stderr:\n{}", result.stderr);
    }

    let marker = if result.success() { "✅" } else { "❌" };
    println!(
        "\n{} exit code {} via {} in {} ms",
        marker, result.exit_code, result.tier_used, result.duration_ms
    );

    Ok(process_exit_code(result.exit_code))
}

/// Print per-language image availability. Returns whether every image is present.
pub async fn image_status() -> Result<bool> {
    let sandbox = Sandbox::local();
    let images = sandbox.image_availability().await;

    println!("🐳 Sandbox images:");
    for (language, present) in &images {
        let mark = if *present { "✅" } else { "❌" };
        println!("  {} {:<12} {}", mark, language.as_str(), spec_image(*language));
    }

    let missing = images.values().filter(|present| !**present).count();
    debug!(missing, total = images.len(), "Checked sandbox images");
    if missing == 0 {
        println!("\nAll {} images ready", images.len());
    } else {
        println!(
            "\n{} of {} images missing; requests for those languages will fail in the local sandbox",
            missing,
            images.len()
        );
    }
    Ok(missing == 0)
}

fn spec_image(language: Language) -> &'static str {
    skyforge_engine::registry::spec_for(language).image
}

fn describe_recipe(recipe: &Recipe) -> String {
    match recipe {
        Recipe::Inline { program, flag } => format!("{} {} <source>", program, flag),
        Recipe::Script { file, command, .. } => format!("{} → {}", file, command),
    }
}

/// Print the language registry
pub fn list_languages() {
    println!(
        "{:<12} {:<28} {:<12} {:<7} RUN",
        "LANGUAGE", "IMAGE", "PISTON", "JUDGE0"
    );
    for spec in LANGUAGES.iter() {
        println!(
            "{:<12} {:<28} {:<12} {:<7} {}",
            spec.language.as_str(),
            spec.image,
            spec.piston_runtime.unwrap_or("-"),
            spec.judge0_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            describe_recipe(&spec.recipe)
        );
    }
}
