use crate::config::configuration::Configuration;
use crate::config::host_config::HostConfig;
use crate::core::registry::Registry;
use crate::core::task::{run_task, TaskType};
use crate::framework::dsl::ConfigurationDefinition;
use crate::framework::errors::{FerrumConduitError, Result};
use crate::framework::host::StreamingHost;
use crate::framework::runner::JobRunner;
use crate::framework::setup_file::SetupFile;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// A job setup defined in code, used when `run` is not given `--setup`.
pub type SetupFn = Box<dyn FnOnce(&mut ConfigurationDefinition) -> Result<()>>;

/// Run MapReduce jobs on Hadoop Streaming
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a job setup and run its jobs
    Run {
        /// YAML setup file
        #[arg(short, long)]
        setup: Option<PathBuf>,

        /// Host settings (conduit.xml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Hadoop style configuration file every job starts from
        #[arg(long)]
        job_conf: Option<PathBuf>,

        /// Log the host command lines instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Positional arguments available to the setup as $1, $2, …
        args: Vec<String>,
    },
    /// Run one task inside the host (invoked by Hadoop Streaming)
    Task {
        #[arg(value_enum)]
        task_type: TaskArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum TaskArg {
    Map,
    Combine,
    Reduce,
}

impl From<TaskArg> for TaskType {
    fn from(arg: TaskArg) -> Self {
        match arg {
            TaskArg::Map => TaskType::Map,
            TaskArg::Combine => TaskType::Combine,
            TaskArg::Reduce => TaskType::Reduce,
        }
    }
}

/// Logs always go to stderr, stdout belongs to task records.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

fn path_str(path: &std::path::Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| FerrumConduitError::ArgumentError(format!("non utf-8 path {:?}", path)))
}

/// Everything `run` needs besides the registry.
#[derive(Debug, Default)]
struct RunOptions {
    setup: Option<PathBuf>,
    config: Option<PathBuf>,
    job_conf: Option<PathBuf>,
    dry_run: bool,
    args: Vec<String>,
    verbose: bool,
}

async fn run_jobs(
    registry: Arc<Registry>,
    options: RunOptions,
    code_setup: Option<(&str, SetupFn)>,
) -> Result<bool> {
    let RunOptions {
        setup,
        config,
        job_conf,
        dry_run,
        args,
        verbose,
    } = options;
    let mut host_config = match &config {
        Some(path) => HostConfig::from_xml_file(path_str(path)?)?,
        None => HostConfig::default(),
    };
    host_config.dry_run |= dry_run;
    let base = match &job_conf {
        Some(path) => Configuration::from_xml_file(path_str(path)?)?,
        None => Configuration::new(),
    };

    let host = StreamingHost::new(host_config, registry.clone());
    let runner = JobRunner::new(base, &registry, Arc::new(host)).verbose(verbose);
    match (setup, code_setup) {
        (Some(path), _) => {
            let script = path.to_string_lossy().into_owned();
            runner
                .run(&script, args, |definition| {
                    SetupFile::from_yaml_file(&path)?.apply(definition)
                })
                .await
        }
        (None, Some((name, setup))) => runner.run(name, args, setup).await,
        (None, None) => Err(FerrumConduitError::ArgumentError(
            "no job setup given, pass --setup".to_string(),
        )),
    }
}

fn task(registry: &Registry, task_type: TaskType) -> Result<()> {
    let configuration = Configuration::from_task_environment(std::env::vars());
    debug!("{:?} task with {} settings", task_type, configuration.len());
    let stdin = std::io::stdin().lock();
    let stdout = BufWriter::new(std::io::stdout());
    run_task(task_type, registry, &configuration, stdin, stdout, std::io::stderr())
}

/// Entry point shared by `conduit` and job binaries carrying their own
/// registry. `code_setup` names and defines the jobs when no setup file is
/// passed.
pub fn main_with(registry: Registry, code_setup: Option<(&str, SetupFn)>) -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let registry = Arc::new(registry);

    let outcome = match cli.command {
        Commands::Task { task_type } => task(&registry, task_type.into()).map(|_| true),
        Commands::Run {
            setup,
            config,
            job_conf,
            dry_run,
            args,
        } => {
            let options = RunOptions {
                setup,
                config,
                job_conf,
                dry_run,
                args,
                verbose: cli.verbose > 0,
            };
            tokio::runtime::Runtime::new()
                .map_err(FerrumConduitError::from)
                .and_then(|runtime| runtime.block_on(run_jobs(registry, options, code_setup)))
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
