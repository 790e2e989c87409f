mod report;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use resume_fit_core::prompts::build_query;
use resume_fit_core::{
    available_prompt_sets, load_resume, prompt_set, retrieve, AnswerComposer, CharacterNgramEmbedder,
    ChunkingConfig, Credential, Embedder, IndexStore, LanguageModel, OpenAiChatModel, OpenAiEmbedder,
    RagConfig, RetryPolicy, DEFAULT_PROMPT_SET, SCORE_QUESTION_KEY,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "resume-fit", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding persisted resume indices.
    #[arg(long, env = "RESUME_FIT_INDEX_DIR", default_value = "vector_db")]
    index_dir: PathBuf,

    /// Maximum characters per chunk.
    #[arg(long, default_value_t = resume_fit_core::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, default_value_t = resume_fit_core::DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Number of resume chunks retrieved per question.
    #[arg(long, default_value_t = resume_fit_core::DEFAULT_TOP_K)]
    top_k: usize,

    /// Embedding backend.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Openai)]
    embedder: EmbedderKind,

    /// API key for embeddings and chat completions.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, default_value = resume_fit_core::config::DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    #[arg(long, default_value = resume_fit_core::config::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    #[arg(long, default_value = resume_fit_core::config::DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Attempts per provider call before giving up.
    #[arg(long, default_value_t = resume_fit_core::retry::DEFAULT_MAX_ATTEMPTS)]
    max_retries: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// OpenAI-compatible embeddings endpoint.
    Openai,
    /// Offline character trigram embeddings.
    Local,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct JobDescriptionArgs {
    /// File containing the job description.
    #[arg(long)]
    jd_file: Option<PathBuf>,

    /// Job description text.
    #[arg(long)]
    jd_text: Option<String>,
}

impl JobDescriptionArgs {
    async fn read(&self) -> anyhow::Result<String> {
        let text = match (&self.jd_file, &self.jd_text) {
            (Some(path), _) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read job description {}", path.display()))?,
            (None, Some(text)) => text.clone(),
            (None, None) => anyhow::bail!("a job description is required"),
        };
        if text.trim().is_empty() {
            anyhow::bail!("job description is empty");
        }
        Ok(text)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build or load the vector index for a resume.
    Index {
        /// Resume file (.pdf, .txt or .md).
        #[arg(long)]
        resume: PathBuf,
    },
    /// Run the full question set against a resume and write a markdown report.
    Analyze {
        #[arg(long)]
        resume: PathBuf,
        #[command(flatten)]
        job_description: JobDescriptionArgs,
        /// Question set version.
        #[arg(long, default_value = DEFAULT_PROMPT_SET)]
        prompt_set: String,
        /// Where the markdown report is written.
        #[arg(long, default_value = "report.md")]
        output: PathBuf,
    },
    /// Ask one question against an already indexed resume.
    Ask {
        /// Resume identifier used when it was indexed, e.g. `jane.pdf`.
        #[arg(long)]
        document_id: String,
        #[command(flatten)]
        job_description: JobDescriptionArgs,
        #[arg(long)]
        question: String,
        /// Print the retrieved context without calling the model.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

impl Cli {
    fn rag_config(&self) -> anyhow::Result<RagConfig> {
        let mut config = RagConfig {
            index_dir: self.index_dir.clone(),
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            },
            top_k: self.top_k,
            retry: RetryPolicy {
                max_attempts: self.max_retries,
                ..RetryPolicy::default()
            },
            ..RagConfig::default()
        };
        config.embedding.base_url = self.openai_base_url.clone();
        config.embedding.model = self.embedding_model.clone();
        config.generation.base_url = self.openai_base_url.clone();
        config.generation.model = self.chat_model.clone();
        config.validate()?;
        Ok(config)
    }

    fn credential(&self) -> anyhow::Result<Credential> {
        let key = self
            .openai_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .context("OPENAI_API_KEY is not set; pass --openai-api-key or use --embedder local for indexing")?;
        Ok(Credential::new(key))
    }

    fn embedder(&self, config: &RagConfig) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderKind::Openai => Arc::new(OpenAiEmbedder::new(
                &self.credential()?,
                &config.embedding,
                config.retry,
            )?),
            EmbedderKind::Local => Arc::new(CharacterNgramEmbedder::default()),
        };
        Ok(embedder)
    }

    fn language_model(&self, config: &RagConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
        Ok(Arc::new(OpenAiChatModel::new(
            &self.credential()?,
            &config.generation,
            config.retry,
        )?))
    }
}

/// Conventional status for a process ended by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Handler could not be installed; nothing was cancelled.
    Unavailable,
    /// One interrupt: the batch stops after the current question.
    Cancelled,
    /// Two interrupts: the process should exit now.
    Abort,
}

async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancel: &AtomicBool) -> Interrupt
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return Interrupt::Unavailable;
    }
    warn!("interrupt received, stopping after the current question; press Ctrl-C again to abort");
    cancel.store(true, Ordering::Release);

    match next_interrupt().await {
        Ok(()) => {
            warn!("second interrupt received, aborting");
            Interrupt::Abort
        }
        Err(_) => Interrupt::Cancelled,
    }
}

/// First Ctrl-C requests cancellation between questions; a second one exits.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, &flag).await == Interrupt::Abort {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.rag_config()?;
    let embedder = cli.embedder(&config)?;
    let store = IndexStore::new(config.index_dir.clone(), embedder.clone(), &config);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index_dir = %config.index_dir.display(),
        embedder = %embedder.model_id(),
        "resume-fit boot"
    );

    match &cli.command {
        Command::Index { resume } => {
            let document = load_resume(resume)?;
            let index = store.get_or_build(&document).await?;
            println!(
                "{} chunks indexed for {} (key {}, model {})",
                index.len(),
                index.document_id,
                index.key,
                index.model_id
            );
        }
        Command::Analyze {
            resume,
            job_description,
            prompt_set: version,
            output,
        } => {
            let questions = prompt_set(version).with_context(|| {
                format!(
                    "unknown prompt set {version}; available: {}",
                    available_prompt_sets().join(", ")
                )
            })?;
            let job_description = job_description.read().await?;
            let model = cli.language_model(&config)?;

            let document = load_resume(resume)?;
            let index = store.get_or_build(&document).await?;
            let composer = AnswerComposer::new(embedder, model, &config);
            let cancel = cancel_on_ctrl_c();

            let report = composer
                .answer_all(&index, &job_description, &questions, &cancel)
                .await;

            for outcome in &report.outcomes {
                println!("=== {} ===", outcome.key);
                match &outcome.result {
                    Ok(answer) => println!("{}", answer.text.trim()),
                    Err(error) => println!("failed: {error}"),
                }
                println!();
            }
            if let Some(score) = report.score() {
                let flag = if score.reliable { "" } else { " (unreliable)" };
                println!("{SCORE_QUESTION_KEY} match score: {}%{flag}", score.value);
            }

            let markdown = report::render_markdown(&report, Utc::now());
            tokio::fs::write(output, markdown)
                .await
                .with_context(|| format!("failed to write report {}", output.display()))?;
            info!(
                path = %output.display(),
                answered = report.outcomes.len() - report.failures().count(),
                failed = report.failures().count(),
                skipped = report.skipped.len(),
                "report written"
            );
        }
        Command::Ask {
            document_id,
            job_description,
            question,
            dry_run,
        } => {
            let job_description = job_description.read().await?;
            let index = store.open(document_id).await?;

            if *dry_run {
                let query = build_query(&job_description, question);
                let context = retrieve(embedder.as_ref(), &index, &query, config.top_k).await?;
                for hit in &context.hits {
                    println!("[chunk {}] score={:.4}", hit.chunk.index, hit.score);
                    println!("{}", hit.chunk.text);
                    println!();
                }
                return Ok(());
            }

            let model = cli.language_model(&config)?;
            let composer = AnswerComposer::new(embedder, model, &config);
            let answer = composer.answer(&index, &job_description, question).await?;
            println!("{}", answer.text.trim());
            for hit in &answer.sources.hits {
                println!("  source: chunk {} score={:.4}", hit.chunk.index, hit.score);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    fn scripted(
        signals: Vec<io::Result<()>>,
    ) -> impl FnMut() -> std::future::Ready<io::Result<()>> {
        let mut signals = signals.into_iter();
        move || {
            std::future::ready(
                signals
                    .next()
                    .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "no more signals"))),
            )
        }
    }

    #[tokio::test]
    async fn second_interrupt_aborts() {
        let cancel = AtomicBool::new(false);
        let outcome = watch_interrupts(scripted(vec![Ok(()), Ok(())]), &cancel).await;
        assert_eq!(outcome, Interrupt::Abort);
        assert!(cancel.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn first_interrupt_only_cancels() {
        let cancel = AtomicBool::new(false);
        let mut calls = 0;
        let watcher = watch_interrupts(
            || {
                calls += 1;
                let first = calls == 1;
                async move {
                    if first {
                        Ok(())
                    } else {
                        std::future::pending::<io::Result<()>>().await
                    }
                }
            },
            &cancel,
        );

        let waited = tokio::time::timeout(Duration::from_millis(50), watcher).await;
        assert!(waited.is_err());
        assert!(cancel.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn missing_handler_cancels_nothing() {
        let cancel = AtomicBool::new(false);
        let outcome = watch_interrupts(
            scripted(vec![Err(io::Error::new(io::ErrorKind::Other, "no handler"))]),
            &cancel,
        )
        .await;
        assert_eq!(outcome, Interrupt::Unavailable);
        assert!(!cancel.load(Ordering::Acquire));
    }
}
