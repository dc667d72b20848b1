use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use text_insight::{
    config::{Config, LogFormat},
    context::ContextSettings,
    delta,
    history::DEFAULT_PAGE_SIZE,
    library::PromptLibrary,
    pipeline::PipelineStage,
    provider,
    storage::{HistoryEntry, SqliteStorage, Storage, MAIN_TEXT_KEY},
    AnalysisPipeline, ChangeSignificanceMonitor, HistoryGraph,
};

/// Staged LLM text analysis with a branching history.
#[derive(Debug, Parser)]
#[command(name = "text-insight", version, about)]
struct Cli {
    #[command(flatten)]
    context: ContextArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the configured context composition.
#[derive(Debug, Args)]
struct ContextArgs {
    /// Include ancestor prompts in the context
    #[arg(long, global = true)]
    include_prompt: bool,

    /// Include ancestor texts in the context
    #[arg(long, global = true)]
    include_text: bool,

    /// Include ancestor analyses in the context
    #[arg(long, global = true)]
    include_results: bool,

    /// Maximum number of ancestors to walk
    #[arg(long, global = true)]
    max_history: Option<usize>,
}

impl ContextArgs {
    fn apply(&self, base: ContextSettings) -> ContextSettings {
        ContextSettings {
            include_prompt: base.include_prompt || self.include_prompt,
            include_text: base.include_text || self.include_text,
            include_past_results: base.include_past_results || self.include_results,
            max_history: self.max_history.unwrap_or(base.max_history),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze a piece of text
    Analyze {
        /// Instruction for the analysis, defaults to the selected base prompt
        #[arg(long)]
        prompt: Option<String>,

        /// Entry this analysis follows up on
        #[arg(long)]
        parent: Option<String>,

        #[command(flatten)]
        input: InputArgs,
    },
    /// Run the N-th generated follow-up question of an entry
    FollowUp {
        entry_id: String,
        /// 1-based question number
        number: usize,
    },
    /// Ask a free-form question about an entry
    Ask { entry_id: String, question: String },
    /// List analyses, newest first
    History {
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        per_page: usize,
    },
    /// Show one analysis and its follow-ups
    Show { entry_id: String },
    /// Print the words added between two revisions
    Diff { old: String, new: String },
    /// Read revisions from stdin, one per line, and analyze significant changes
    Watch,
    /// Manage the base prompt library
    Prompts {
        #[command(subcommand)]
        action: PromptAction,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct InputArgs {
    /// Text to analyze
    #[arg(long)]
    text: Option<String>,

    /// File whose contents to analyze
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum PromptAction {
    /// List base prompts, marking the selected one
    List,
    /// Append a base prompt
    Add { text: String },
    /// Select the base prompt used by default
    Select { id: String },
    /// Replace a base prompt's text
    Update { id: String, text: String },
    /// Delete a base prompt
    Delete { id: String },
}

/// Everything a command needs, wired from configuration.
struct App {
    config: Config,
    store: Arc<dyn Storage>,
    pipeline: Arc<AnalysisPipeline>,
    library: PromptLibrary,
}

impl App {
    async fn init(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Storage> = match SqliteStorage::new(&config.database).await {
            Ok(s) => {
                info!(path = %config.database.path.display(), "Database initialized");
                Arc::new(s)
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize database");
                return Err(e.into());
            }
        };

        let graph = Arc::new(HistoryGraph::load(store.clone()).await?);

        let provider = match provider::from_config(&config.provider, &config.request) {
            Ok(p) => {
                info!(
                    provider = %config.provider.kind,
                    base_url = %config.provider.active().base_url,
                    model = %config.provider.active_model(),
                    "Inference provider initialized"
                );
                p
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize inference provider");
                return Err(e.into());
            }
        };

        let pipeline = Arc::new(AnalysisPipeline::new(
            provider,
            config.provider.active_model(),
            graph,
        ));
        let library = PromptLibrary::new(store.clone());

        Ok(Self {
            config,
            store,
            pipeline,
            library,
        })
    }

    /// Configured base prompt, else the library selection.
    async fn base_prompt(&self) -> anyhow::Result<Option<String>> {
        if let Some(prompt) = &self.config.analysis.base_prompt {
            return Ok(Some(prompt.clone()));
        }
        Ok(self.library.selected().await?.map(|p| p.text))
    }

    async fn entry(&self, id: &str) -> anyhow::Result<HistoryEntry> {
        match self.pipeline.graph().get(id).await {
            Some(entry) => Ok(entry),
            None => bail!("No history entry with id {id}"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Pure text operation, no configuration needed
    if let Command::Diff { old, new } = &cli.command {
        for addition in delta::diff(old, new) {
            println!("{addition}");
        }
        return Ok(());
    }

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "text-insight starting");

    let settings = cli.context.apply(config.analysis.context);
    let app = App::init(config).await?;

    match cli.command {
        Command::Analyze {
            prompt,
            parent,
            input,
        } => {
            let text = match (input.text, input.file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Either --text or --file is required"),
            };
            let prompt = match prompt {
                Some(p) => Some(p),
                None => app.base_prompt().await?,
            };

            let entry = app
                .pipeline
                .run(prompt.as_deref(), &text, parent.as_deref(), &settings)
                .await?;
            print_entry(&entry);
        }
        Command::FollowUp { entry_id, number } => {
            let entry = app.entry(&entry_id).await?;
            let Some(question) = number
                .checked_sub(1)
                .and_then(|i| entry.follow_up_questions.get(i))
            else {
                bail!(
                    "Entry {} has {} follow-up questions",
                    entry.id,
                    entry.follow_up_questions.len()
                );
            };

            let child = app.pipeline.ask_follow_up(&entry, question, &settings).await?;
            print_entry(&child);
        }
        Command::Ask { entry_id, question } => {
            let entry = app.entry(&entry_id).await?;
            let child = app
                .pipeline
                .ask_user_follow_up(&entry, &question, &settings)
                .await?;
            print_entry(&child);
        }
        Command::History { page, per_page } => {
            let graph = app.pipeline.graph();
            let pages = graph.page_count(per_page).await;
            for entry in graph.recent(page, per_page).await {
                println!(
                    "{}  {}  {}",
                    entry.id,
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    one_line(&entry.summary)
                );
            }
            println!("page {page} of {pages}");
        }
        Command::Show { entry_id } => {
            let entry = app.entry(&entry_id).await?;
            print_entry(&entry);
            for child in app.pipeline.graph().children(&entry.id).await {
                println!("  child {}  {}", child.id, one_line(&child.summary));
            }
        }
        Command::Watch => watch(&app).await?,
        Command::Prompts { action } => prompts(&app.library, action).await?,
        // Handled before configuration is loaded
        Command::Diff { .. } => {}
    }

    Ok(())
}

async fn watch(app: &App) -> anyhow::Result<()> {
    if let Some(doc) = app.store.get_document(MAIN_TEXT_KEY).await? {
        info!(updated_at = %doc.updated_at, "Restored saved text");
        println!("{}", doc.content);
    }

    let monitor = ChangeSignificanceMonitor::new(
        app.pipeline.clone(),
        app.store.clone(),
        app.base_prompt().await?,
        app.config.analysis.debounce(),
    );

    // Print each analysis the monitor triggers
    let pipeline = app.pipeline.clone();
    let mut stages = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        while stages.changed().await.is_ok() {
            let stage = *stages.borrow_and_update();
            eprintln!("{}", stage.label());
            if stage == PipelineStage::Finished {
                if let Some(entry) = pipeline.graph().recent(1, 1).await.first() {
                    print_entry(entry);
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) => monitor.on_edit(text).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    monitor.shutdown().await;
    printer.abort();
    Ok(())
}

async fn prompts(library: &PromptLibrary, action: PromptAction) -> anyhow::Result<()> {
    match action {
        PromptAction::List => {
            let selected = library.selected().await?.map(|p| p.id);
            for prompt in library.list().await? {
                let marker = if selected.as_deref() == Some(prompt.id.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!("{marker} {}  {}", prompt.id, prompt.text);
            }
        }
        PromptAction::Add { text } => {
            let prompt = library.add(&text).await?;
            println!("{}", prompt.id);
        }
        PromptAction::Select { id } => {
            let prompt = library.select(&id).await?;
            println!("Selected: {}", prompt.text);
        }
        PromptAction::Update { id, text } => {
            library.update(&id, &text).await?;
        }
        PromptAction::Delete { id } => {
            library.delete(&id).await?;
        }
    }
    Ok(())
}

fn print_entry(entry: &HistoryEntry) {
    println!("id:       {}", entry.id);
    if let Some(parent) = &entry.parent_id {
        println!("parent:   {parent}");
    }
    if let Some(prompt) = &entry.prompt {
        println!("prompt:   {prompt}");
    }
    println!("model:    {} / {}", entry.provider, entry.model);
    println!("summary:  {}", entry.summary);
    println!();
    println!("{}", entry.full_analysis);
    if !entry.follow_up_questions.is_empty() {
        println!();
        for (i, question) in entry.follow_up_questions.iter().enumerate() {
            println!("{:>2}. {question}", i + 1);
        }
    }
}

fn one_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(77).collect::<String>())
    } else {
        line.to_string()
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
