use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use repair_orchestrator::{
    adapters::{LocalFilesystemAccess, NoopBuildExecutor, NoopManifestExecutor, StubLanguageModelClient},
    external::{BuildExecutor, ManifestExecutor},
    EngineConfig, JobExecutor, Orchestrator, RunState, Stage, StageArgs, StageConfig,
};
use repair_types::{EngineError, ErrorKind, StageKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "repairctl")]
#[command(version, about = "Iterative repair orchestrator for AI-assisted containerization workflows")]
struct Cli {
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo build-then-deploy stage graph end to end.
    Run {
        /// Directory the run report is written under.
        #[arg(long, default_value = ".")]
        target_dir: PathBuf,
        #[arg(long, default_value = "registry.example.com")]
        registry_host: String,
        #[arg(long, default_value = "demo-app")]
        image_name: String,
    },
    /// Configuration subcommands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Job executor status.
    Jobs,
    /// List the tool-schema surface exposed to an LLM tool-use layer.
    Tools,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration.
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let _log_guard = init_logging(cli.verbose, &project_dir);

    match &cli.command {
        Commands::Run {
            target_dir,
            registry_host,
            image_name,
        } => cmd_run(&project_dir, target_dir, registry_host, image_name).await?,
        Commands::Config { command } => cmd_config(&project_dir, command)?,
        Commands::Jobs => cmd_jobs(&project_dir).await?,
        Commands::Tools => cmd_tools(),
    }

    Ok(())
}

/// Installs stdout and rolling-file logging layers. The returned guard must
/// be held for the process lifetime or the non-blocking file writer drops
/// its background flush thread early.
fn init_logging(verbose: bool, project_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = fmt::layer().with_target(false);

    let log_dir = project_dir.join("forge-report").join("logs");
    let file_appender = tracing_appender::rolling::daily(log_dir, "repairctl.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(false);

    #[cfg(feature = "otlp")]
    {
        let otel_layer = init_otel_layer();
        Registry::default().with(filter).with(fmt_layer).with(file_layer).with(otel_layer).init();
        return guard;
    }

    #[cfg(not(feature = "otlp"))]
    Registry::default().with(filter).with(fmt_layer).with(file_layer).init();

    guard
}

#[cfg(feature = "otlp")]
fn init_otel_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::SdkTracerProvider;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .expect("failed to build the OTLP span exporter");
    let provider = SdkTracerProvider::builder().with_batch_exporter(exporter).build();
    let tracer = provider.tracer("repairctl");
    tracing_opentelemetry::layer().with_tracer(tracer)
}

fn cmd_config(project_dir: &Path, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = EngineConfig::load(project_dir).context("failed to load configuration")?;
            println!("{}", style("engine configuration").bold());
            println!("  worker_count: {}", config.worker_count);
            println!("  job_deadline_secs: {}", config.job_deadline_secs);
            println!("  job_ttl_secs: {}", config.job_ttl_secs);
            println!("  cleanup_tick_secs: {}", config.cleanup_tick_secs);
            println!("  report_root: {}", config.report_root);
            println!("  snapshot_enabled: {}", config.snapshot_enabled);
            println!("  completion_capture_enabled: {}", config.completion_capture_enabled);
            if let Some(path) = &config.persistence_path {
                println!("  persistence_path: {}", path.display());
            }
        }
    }
    Ok(())
}

fn cmd_tools() {
    println!("{}", style("tool catalog").bold());
    for tool in repair_orchestrator::tool_catalog() {
        println!("  {} [{:?}] - {}", tool.name, tool.category, tool.description);
    }
}

async fn cmd_jobs(project_dir: &Path) -> Result<()> {
    let config = EngineConfig::load(project_dir).context("failed to load configuration")?;
    let executor = JobExecutor::new(&config);
    let stats = executor.stats().await;
    println!("{}", style("job executor").bold());
    println!("  pending: {}", stats.pending);
    println!("  running: {}", stats.running);
    println!("  available_workers: {}/{}", stats.available_workers, stats.max_workers);
    executor.stop().await;
    Ok(())
}

async fn cmd_run(project_dir: &Path, target_dir: &Path, registry_host: &str, image_name: &str) -> Result<()> {
    let config = EngineConfig::load(project_dir).context("failed to load configuration")?;

    let build_executor: Arc<dyn BuildExecutor> = Arc::new(NoopBuildExecutor::new());
    let manifest_executor: Arc<dyn ManifestExecutor> = Arc::new(NoopManifestExecutor::new());
    let _language_model = StubLanguageModelClient::new(vec!["FROM alpine:latest\nCMD [\"true\"]".to_string()]);
    let _filesystem = LocalFilesystemAccess::new(project_dir);

    let stages = vec![
        StageConfig::new("build", Arc::new(BuildStage::new(build_executor)) as Arc<dyn Stage>, 2, project_dir)
            .with_on_success_goto("deploy"),
        StageConfig::new("deploy", Arc::new(DeployStage::new(manifest_executor)) as Arc<dyn Stage>, 1, project_dir)
            .with_on_success_goto(""),
    ];

    let orchestrator = Orchestrator::new(stages, &config).context("failed to construct the stage orchestrator")?;
    let mut state = RunState::new(registry_host, image_name);

    println!("{}", style(format!("running {registry_host}/{image_name}")).cyan());
    match orchestrator.run(&mut state, target_dir, CancellationToken::new()).await {
        Ok(report) => {
            println!("{} after {} iteration(s): {:?}", style("finished").green().bold(), report.iteration_count, report.outcome);
        }
        Err(error) => {
            println!("{} {}", style("run did not complete").red().bold(), error);
        }
    }
    Ok(())
}

/// Minimal demo stage wired to the injected `BuildExecutor`, standing in for
/// the host application's real Dockerfile-generator stage.
struct BuildStage {
    executor: Arc<dyn BuildExecutor>,
}

impl BuildStage {
    fn new(executor: Arc<dyn BuildExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait::async_trait]
impl Stage for BuildStage {
    fn id(&self) -> &str {
        "build"
    }

    fn kind(&self) -> StageKind {
        StageKind::DockerfileGenerator
    }

    async fn initialize(&self, _path: &Path) -> Result<(), EngineError> {
        Ok(())
    }

    async fn generate(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn run(&self, state: &mut RunState, _args: &StageArgs) -> Result<(), EngineError> {
        let output = self.executor.build("FROM alpine:latest", Path::new("."), state.registry_host(), state.image_name()).await?;
        if output.errors_text.is_empty() {
            state.set_build_content("FROM alpine:latest\nCMD [\"true\"]", PathBuf::from("Dockerfile"));
            Ok(())
        } else {
            state.set_build_error(output.errors_text.clone());
            Err(EngineError::new(ErrorKind::Execution, "build_failed", output.errors_text))
        }
    }

    async fn deploy(&self, _state: &mut RunState) -> Result<(), EngineError> {
        Ok(())
    }

    fn write_successful_files(&self, _state: &RunState) -> Result<(), EngineError> {
        Ok(())
    }

    fn error_report(&self) -> Option<String> {
        None
    }
}

/// Minimal demo stage wired to the injected `ManifestExecutor`, standing in
/// for the host application's real manifest-generator stage.
struct DeployStage {
    executor: Arc<dyn ManifestExecutor>,
}

impl DeployStage {
    fn new(executor: Arc<dyn ManifestExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait::async_trait]
impl Stage for DeployStage {
    fn id(&self) -> &str {
        "deploy"
    }

    fn kind(&self) -> StageKind {
        StageKind::ManifestGenerator
    }

    async fn initialize(&self, _path: &Path) -> Result<(), EngineError> {
        Ok(())
    }

    async fn generate(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn run(&self, _state: &mut RunState, _args: &StageArgs) -> Result<(), EngineError> {
        Ok(())
    }

    async fn deploy(&self, state: &mut RunState) -> Result<(), EngineError> {
        let result = self.executor.deploy_and_verify(Path::new("manifests/deployment.yaml"), true).await?;
        if !result.ok {
            return Err(EngineError::new(ErrorKind::Execution, "deployment_error", "deployment failed verification"));
        }
        let _ = state;
        Ok(())
    }

    fn write_successful_files(&self, _state: &RunState) -> Result<(), EngineError> {
        Ok(())
    }

    fn error_report(&self) -> Option<String> {
        None
    }
}
