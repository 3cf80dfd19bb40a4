use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use formflow::catalog::{InMemoryCatalog, PgQuestionCatalog, QuestionCatalog};
use formflow::config::Config;
use formflow::diagnostics;
use formflow::store::PgWorkflowStore;
use formflow::validate::{self, Mode};
use formflow::WorkflowService;

#[derive(Parser)]
#[command(author, version, about = "Validate and publish form workflows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Draft,
    Activation,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Draft => Mode::Draft,
            ModeArg::Activation => Mode::Activation,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow file and print its diagnostics as JSON
    Validate {
        /// Path to the workflow JSON file
        file: PathBuf,
        /// Form the workflow belongs to
        #[arg(long)]
        form: Uuid,
        #[arg(long, value_enum, default_value = "activation")]
        mode: ModeArg,
        /// JSON array of `{ id, formId, type }` question descriptors
        #[arg(long)]
        questions: Option<PathBuf>,
    },
    /// Apply database migrations
    Migrate,
    /// Validate a workflow file and publish it as the form's active version
    Activate {
        file: PathBuf,
        #[arg(long)]
        form: Uuid,
        #[arg(long)]
        editor: Uuid,
    },
    /// Print the latest workflow content of a form
    Show {
        #[arg(long)]
        form: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            file,
            form,
            mode,
            questions,
        } => {
            let raw = std::fs::read(&file).with_context(|| format!("reading {:?}", file))?;
            let catalog = match questions {
                Some(path) => Some(InMemoryCatalog::from_file(&path)?),
                None => None,
            };
            let catalog = catalog.as_ref().map(|c| c as &dyn QuestionCatalog);

            let errors = validate::collect_errors(&raw, form, catalog, mode.into()).await?;
            let report = diagnostics::from_errors(&errors);
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !errors.is_empty() {
                info!("{} defect(s) found in {:?}", errors.len(), file);
                std::process::exit(1);
            }
        }
        Commands::Migrate => {
            let pool = Config::from_env()?.connect().await?;
            PgWorkflowStore::new(pool).migrate().await?;
            info!("Migrations applied.");
        }
        Commands::Activate { file, form, editor } => {
            let raw = std::fs::read(&file).with_context(|| format!("reading {:?}", file))?;
            let service = connect_service().await?;
            let version = service.activate(form, &raw, editor).await?;
            info!("Activated version {} of form {}", version.id, form);
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        Commands::Show { form } => {
            let service = connect_service().await?;
            let content = service.get(form).await?;
            println!("{}", serde_json::to_string_pretty(&content)?);
        }
    }

    Ok(())
}

async fn connect_service() -> anyhow::Result<WorkflowService> {
    let pool = Config::from_env()?.connect().await?;
    let store = Arc::new(PgWorkflowStore::new(pool.clone()));
    let catalog = Arc::new(PgQuestionCatalog::new(pool));
    Ok(WorkflowService::new(store).with_catalog(catalog))
}
