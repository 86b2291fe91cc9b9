use clap::{Parser, Subcommand};
use judge::{
    AnswerEvaluationAgent, EvaluationInput, GenerationGuidance, JudgeConfig, JudgeOrchestrator,
    QuestionCache, QuestionGenerationAgent,
};
use model::prelude::*;
use serde::Deserialize;
use snapshot::CommandRenderer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "slide-judge")]
#[command(about = "Score automated slide edits with a vision model")]
struct Cli {
    /// Gemini model to use (defaults to the provider default)
    #[arg(long, global = true)]
    model: Option<String>,
    /// Judge configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one page edit and print the result as JSON
    Evaluate {
        /// Case description (TOML)
        #[arg(long)]
        case: PathBuf,
        /// Program that renders a page to PNG on stdout
        #[arg(long)]
        render_cmd: String,
        /// Argument for the render program; `{artifact}` and `{page}` are substituted
        #[arg(long = "render-arg", allow_hyphen_values = true)]
        render_args: Vec<String>,
        /// Ignore cached questions and generate new ones
        #[arg(long)]
        force_regenerate: bool,
        /// Fail when the overall score is below this percentage
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Print the cached questions of a test-context directory
    Questions {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Delete the cached questions of a test-context directory
    ClearCache {
        #[arg(long)]
        dir: PathBuf,
    },
    /// List available models
    Models,
    /// Health check
    Health,
}

/// Case file layout; relative paths resolve against the file's directory
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseFile {
    case_id: String,
    page_id: String,
    task_prompt: String,
    before_artifact: PathBuf,
    after_artifact: PathBuf,
    before_summary: PathBuf,
    after_summary: PathBuf,
    test_context_dir: PathBuf,
    #[serde(default)]
    guidance: GenerationGuidance,
}

impl CaseFile {
    fn load(path: &Path, force_regenerate: bool) -> Result<EvaluationInput, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        let case: CaseFile = toml::from_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let read_summary = |file: &Path| -> Result<serde_json::Value, Box<dyn std::error::Error>> {
            let text = std::fs::read_to_string(base.join(file))?;
            Ok(serde_json::from_str(&text)?)
        };

        Ok(EvaluationInput {
            before_summary: read_summary(&case.before_summary)?,
            after_summary: read_summary(&case.after_summary)?,
            before_artifact: base.join(case.before_artifact),
            after_artifact: base.join(case.after_artifact),
            test_context_dir: base.join(case.test_context_dir),
            case_id: case.case_id,
            page_id: case.page_id,
            task_prompt: case.task_prompt,
            force_regenerate,
            guidance: case.guidance,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => JudgeConfig::from_toml_file(path)?,
        None => JudgeConfig::default(),
    };
    let cache = QuestionCache::new(config.cache_file_name.clone());

    match cli.command {
        Commands::Evaluate {
            case,
            render_cmd,
            render_args,
            force_regenerate,
            threshold,
        } => {
            let provider = build_provider(cli.model.as_deref())?;
            let input = CaseFile::load(&case, force_regenerate)?;
            let renderer = CommandRenderer::new(render_cmd, render_args)?;
            evaluate(provider, &config, cache, renderer, &input, threshold).await?;
        }
        Commands::Questions { dir } => {
            show_questions(&cache, &dir).await?;
        }
        Commands::ClearCache { dir } => {
            if cache.delete(&dir).await {
                println!("Removed {}", cache.path(&dir).display());
            } else {
                println!("No question cache in {}", dir.display());
            }
        }
        Commands::Models => {
            let provider = build_provider(cli.model.as_deref())?;
            list_models(&provider).await?;
        }
        Commands::Health => {
            let provider = build_provider(cli.model.as_deref())?;
            health_check(&provider).await?;
        }
    }

    Ok(())
}

fn build_provider(model: Option<&str>) -> Result<GeminiProvider, Box<dyn std::error::Error>> {
    let mut config = GeminiConfig::from_env()?;
    if let Some(model) = model {
        config = config.with_model(model);
    }
    Ok(GeminiProvider::new(config)?)
}

async fn evaluate(
    provider: GeminiProvider,
    config: &JudgeConfig,
    cache: QuestionCache,
    renderer: CommandRenderer,
    input: &EvaluationInput,
    threshold: Option<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = provider.model().to_string();
    let provider: Arc<dyn ModelProvider> = Arc::new(provider);

    let generator = Arc::new(QuestionGenerationAgent::new(provider.clone(), &model, config));
    let evaluator = Arc::new(AnswerEvaluationAgent::new(provider, &model, config));
    let mut orchestrator =
        JudgeOrchestrator::new(generator, evaluator, renderer).with_question_cache(cache);

    let result = orchestrator.run_evaluation(input).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(threshold) = threshold {
        if !result.passed(threshold) {
            error!(
                "Score {:.2}% is below the threshold of {:.2}%",
                result.overall_score, threshold
            );
            return Err(format!("{} is below {:.2}%", result, threshold).into());
        }
        info!("Score meets the threshold of {:.2}%", threshold);
    }

    Ok(())
}

async fn show_questions(cache: &QuestionCache, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let Some(cached) = cache.load(dir).await? else {
        println!("No question cache in {}", dir.display());
        return Ok(());
    };

    let meta = &cached.metadata;
    println!(
        "{} / {} ({} questions, generated {})",
        meta.case_id, meta.page_id, meta.question_count, meta.generated_at
    );
    println!("Task: {}", meta.task_prompt);
    for question in &cached.questions {
        let category = question
            .category
            .map(|c| c.to_string())
            .unwrap_or_else(|| "general".to_string());
        println!(
            "  - [{}] ({}, weight {}) {}",
            question.id, category, question.weight, question.text
        );
    }

    Ok(())
}

async fn list_models(provider: &GeminiProvider) -> Result<(), Box<dyn std::error::Error>> {
    println!("Available models:");
    let models = provider.list_models().await?;

    if models.is_empty() {
        println!("  No models found.");
    } else {
        for model in models {
            println!(
                "  - {} ({})",
                model.name,
                model
                    .input_token_limit
                    .map(|limit| format!("{} input tokens", limit))
                    .unwrap_or_else(|| "unknown limit".to_string())
            );
        }
    }

    Ok(())
}

async fn health_check(provider: &GeminiProvider) -> Result<(), Box<dyn std::error::Error>> {
    println!("Performing health check...");

    match provider.health_check().await {
        Ok(()) => {
            println!(
                "✓ Health check passed. Model {} is available.",
                provider.model()
            );
            info!("Health check successful");
        }
        Err(e) => {
            println!("✗ Health check failed: {}", e);
            error!("Health check failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
