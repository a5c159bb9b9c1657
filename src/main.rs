//! distup - version sync and ordered release for multi-repository distributions
//!
//! Subcommands:
//! - ensure / status: working copy management
//! - validate: configuration consistency
//! - updatecfg: sync pinned versions with the index
//! - update: set maintainer-chosen versions
//! - autopush: commit, tag and push in repository order
//! - requirements: raise project requirements to the minimum versions

use clap::Parser;
use distup::cli::{Cli, Command, GlobalArgs};
use distup::config::Config;
use distup::domain::{ResolveStrategy, VersionTuple};
use distup::error::AppError;
use distup::logging::setup_logging;
use distup::orchestrator::{OrchestratorOptions, ReleaseOrchestrator, WaitPolicy};
use distup::output::{create_formatter, OutputConfig, OutputFormatter, StateResult};
use distup::planner::{compute_publish_plan, compute_release_plan, Mode, UpdatePlanner};
use distup::progress::Progress;
use distup::registry::{HttpClient, PyPIIndex, VersionSource};
use distup::repo::{RepoRegistry, SystemGit};
use distup::requirements::propagate_requirements;
use distup::resolver::ResolverSet;
use indexmap::IndexMap;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Exit code when a sync completed but some packages could not be resolved
const EXIT_RESOLUTION_FAILURES: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.global.verbose);

    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Main application logic
async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::from_path(&cli.global.config)?;
    debug!(
        config = %cli.global.config.display(),
        packages = config.packages.len(),
        repos = config.params.repos.len(),
        "configuration loaded"
    );

    let output = OutputConfig::from_cli(cli.global.json, cli.global.verbose, cli.global.quiet);
    let app = App {
        formatter: create_formatter(output),
        global: cli.global,
        config,
    };

    if !matches!(cli.command, Command::Validate) {
        for problem in app.config.validate() {
            warn!(%problem, "configuration inconsistency");
        }
    }

    let exit_code = match cli.command {
        Command::Validate => app.validate()?,
        Command::Status => app.status().await?,
        Command::Ensure => app.ensure().await?,
        Command::UpdateCfg { doit } => app.sync(Mode::from_flag(doit)).await?,
        Command::Update {
            targets,
            commit,
            until,
        } => app.update(targets, Mode::from_flag(commit), until.as_deref())?,
        Command::Autopush {
            doit,
            wait,
            until,
            retries,
        } => app.autopush(doit, wait, until.as_deref(), retries).await?,
        Command::Requirements { commit, until } => {
            app.requirements(Mode::from_flag(commit), until.as_deref())
                .await?
        }
    };
    Ok(exit_code)
}

struct App {
    global: GlobalArgs,
    config: Config,
    formatter: Box<dyn OutputFormatter>,
}

impl App {
    fn with_stdout(
        &self,
        f: impl FnOnce(&dyn OutputFormatter, &mut dyn Write) -> io::Result<()>,
    ) -> Result<(), AppError> {
        let mut stdout = io::stdout().lock();
        f(self.formatter.as_ref(), &mut stdout)?;
        stdout.flush()?;
        Ok(())
    }

    fn registry(&self) -> Arc<RepoRegistry> {
        let store = Arc::new(SystemGit::with_timeout(self.global.timeout));
        Arc::new(RepoRegistry::new(store, self.global.repo_root(), &self.config))
    }

    fn source(&self) -> Result<Arc<dyn VersionSource>, AppError> {
        let client = HttpClient::with_timeout(self.global.timeout)?;
        let index = PyPIIndex::new(client).with_min_files(self.config.params.min_release_files());
        Ok(Arc::new(index))
    }

    fn progress(&self) -> Progress {
        Progress::for_terminal(self.global.quiet, self.global.json)
    }

    fn validate(&self) -> Result<ExitCode, AppError> {
        let problems = self.config.validate();
        self.with_stdout(|f, out| f.format_validation(&problems, out))?;
        Ok(if problems.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    async fn status(&self) -> Result<ExitCode, AppError> {
        let registry = self.registry();
        let mut states: Vec<StateResult> = Vec::new();
        for package in self.config.repo_order() {
            let state = registry.status(&package).await;
            states.push((package, state));
        }
        self.with_stdout(|f, out| f.format_states(&states, out))?;
        Ok(exit_for_states(&states))
    }

    async fn ensure(&self) -> Result<ExitCode, AppError> {
        let states = self.ensure_all(&self.registry()).await;
        self.with_stdout(|f, out| f.format_states(&states, out))?;
        Ok(exit_for_states(&states))
    }

    async fn ensure_all(&self, registry: &Arc<RepoRegistry>) -> Vec<StateResult> {
        let packages = self.config.repo_order();
        let mut progress = self.progress();
        progress.start(packages.len() as u64, "Ensuring repositories");
        let states = Arc::clone(registry)
            .ensure_all(&packages, self.global.jobs(), &progress)
            .await;
        progress.finish_and_clear();
        states
    }

    async fn sync(mut self, mode: Mode) -> Result<ExitCode, AppError> {
        let resolvers = ResolverSet::new(self.source()?).with_registry(self.registry());
        let planner = UpdatePlanner::new(Arc::new(resolvers), self.global.jobs());

        let mut progress = self.progress();
        progress.spinner("Resolving versions");
        let outcome = planner.compute_sync_plan(&self.config).await;
        progress.finish_and_clear();

        UpdatePlanner::apply(&mut self.config, &outcome.plan, mode, &self.global.config)?;
        self.with_stdout(|f, out| f.format_sync(&outcome, mode, out))?;

        Ok(if outcome.failures.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_RESOLUTION_FAILURES)
        })
    }

    fn update(
        mut self,
        targets: Vec<(String, VersionTuple)>,
        mode: Mode,
        until: Option<&str>,
    ) -> Result<ExitCode, AppError> {
        let desired: IndexMap<String, VersionTuple> = targets.into_iter().collect();
        let plan = compute_release_plan(&self.config, &desired, until)?;
        UpdatePlanner::apply(&mut self.config, &plan, mode, &self.global.config)?;
        self.with_stdout(|f, out| f.format_plan(&plan, mode, out))?;
        Ok(ExitCode::SUCCESS)
    }

    async fn autopush(
        &self,
        doit: bool,
        wait: bool,
        until: Option<&str>,
        retries: u32,
    ) -> Result<ExitCode, AppError> {
        let registry = self.registry();
        let source = self.source()?;

        // Tags are read from the working copies, so they must be current
        let states = self.ensure_all(&registry).await;
        let failed: Vec<StateResult> = states.into_iter().filter(|(_, r)| r.is_err()).collect();
        if !failed.is_empty() {
            self.with_stdout(|f, out| f.format_states(&failed, out))?;
            return Ok(ExitCode::FAILURE);
        }

        let artifact_url = self.config.params.artifact_url.clone();
        let mut released = IndexMap::new();
        let mut unpublished = Vec::new();
        for package in self.config.repo_order() {
            let tag = registry.last_release(&package).await?;
            if let (Some(tag), Some(pkg)) = (&tag, self.config.package(&package)) {
                if *tag == pkg.pinned
                    && pkg.strategy == ResolveStrategy::Index
                    && !self.is_published(&source, &artifact_url, &package, tag).await
                {
                    unpublished.push(package.clone());
                }
            }
            released.insert(package, tag);
        }

        let plan = compute_publish_plan(&self.config, &released, &unpublished, until)?;

        let options = OrchestratorOptions {
            jobs: self.global.jobs(),
            retries,
            ..Default::default()
        };
        let mut orchestrator = ReleaseOrchestrator::new(registry, options);
        if wait {
            orchestrator = orchestrator.with_wait(source, artifact_url, WaitPolicy::default());
        }

        if !doit {
            let preview = orchestrator.preview(&plan).await;
            self.with_stdout(|f, out| f.format_preview(&plan, &preview, out))?;
            return Ok(if preview.is_ready() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }

        let cancel = orchestrator.cancel_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping after the current package");
                cancel.store(true, Ordering::SeqCst);
            }
        });

        let mut progress = self.progress();
        let report = orchestrator.execute(&plan, &mut progress).await;
        self.with_stdout(|f, out| f.format_report(&report, out))?;
        Ok(if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    async fn requirements(&self, mode: Mode, until: Option<&str>) -> Result<ExitCode, AppError> {
        let registry = self.registry();
        let report = propagate_requirements(&self.config, &registry, mode, until).await?;
        self.with_stdout(|f, out| f.format_requirements(&report, mode, out))?;
        Ok(if report.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    /// Whether a tagged version reached the index; lookup errors count as published
    async fn is_published(
        &self,
        source: &Arc<dyn VersionSource>,
        base_url: &str,
        package: &str,
        version: &VersionTuple,
    ) -> bool {
        match source.is_published(base_url, package, version).await {
            Ok(published) => published,
            Err(e) => {
                warn!(package, %version, error = %e, "could not check publication");
                true
            }
        }
    }
}

fn exit_for_states(states: &[StateResult]) -> ExitCode {
    if states.iter().all(|(_, r)| r.is_ok()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
