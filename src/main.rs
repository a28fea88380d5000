#![allow(clippy::result_large_err)]

use std::process::ExitCode;

use clap::Parser;
use miette::Diagnostic;
use miette::Result;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use apiprobe::asserter::Asserter;
use apiprobe::asserter::ProbeReport;
use apiprobe::cli::Cli;
use apiprobe::outputter::OutPutter;
use apiprobe::outputter::Summary;
use apiprobe::parser::Auth;
use apiprobe::parser::ProbeFile;
use apiprobe::probe::ApiProbe;
use apiprobe::runner::RunnerError;
use apiprobe::runner::RunnerResult;
use apiprobe::runner::resolve_token;
use apiprobe::runner::run_probes;
use apiprobe::transport::ReqwestTransport;
use apiprobe::transport::TransportError;
use apiprobe::validator::RunSetup;
use apiprobe::validator::ValidatedSuite;
use apiprobe::validator::ValidationError;
use apiprobe::validator::Validator;

#[derive(Error, Debug, Diagnostic)]
pub enum ApiProbeError {
    #[error("Failed to read probe file")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse probe file")]
    TomlParsing(#[from] toml::de::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ValidationError(#[from] ValidationError),

    #[error("Failed to build the HTTP client")]
    Transport(#[from] TransportError),
}

/// Loads the probe file, applies the command line overrides and validates
/// the result.
///
/// # Errors
/// Returns an `ApiProbeError` if the file cannot be read, the TOML fails to
/// parse, or validation fails.
fn load_and_validate_config(
    cli: &Cli,
) -> Result<(Vec<ValidatedSuite>, RunSetup, usize), ApiProbeError> {
    let contents = std::fs::read_to_string(&cli.path).map_err(ApiProbeError::FileError)?;
    let mut probe_file: ProbeFile =
        toml::from_str(&contents).map_err(ApiProbeError::TomlParsing)?;

    if let Some(base_url) = &cli.base_url {
        probe_file.setup.base_url = base_url.clone();
    }
    if let Some(timeout) = cli.timeout {
        probe_file.setup.timeout_secs = Some(timeout);
    }
    if let Some(token) = &cli.token {
        probe_file.auth = Some(Auth {
            token: Some(token.clone()),
            token_env: None,
            login: None,
        });
    }

    let mut validator = Validator::new(&probe_file, contents.as_str(), cli.path.as_str());
    let (suites, setup) = validator
        .validate(&cli.suites)
        .map_err(ApiProbeError::ValidationError)?;
    let n_probes = suites.iter().map(|s| s.probes.len()).sum();

    Ok((suites, setup, n_probes))
}

/// Spawns the runner, asserter and outputter tasks, connected by unbounded
/// flume channels. The runner sends one request at a time; the other two
/// stages only consume what it produces.
async fn run_pipeline_tasks(
    suites: Vec<ValidatedSuite>,
    setup: RunSetup,
    n_probes: usize,
    cli: &Cli,
) -> Result<
    (
        JoinHandle<Result<(), RunnerError>>,
        JoinHandle<Result<(), flume::SendError<ProbeReport>>>,
        JoinHandle<Summary>,
    ),
    ApiProbeError,
> {
    let (runner_tx, asserter_rx) = flume::unbounded::<RunnerResult>();
    let (asserter_tx, outputter_rx) = flume::unbounded::<ProbeReport>();

    let transport = ReqwestTransport::new(setup.timeout)?;
    let probe = ApiProbe::new(setup.root, transport);

    // Outputter Task
    let outputter_path = cli.path.clone();
    let verbose = cli.verbose;
    let outputter_jh = tokio::spawn(async move {
        OutPutter::start(outputter_rx, &outputter_path, n_probes, verbose).await
    });

    // Runner Task
    let auth = setup.auth;
    let runner_jh = tokio::spawn(async move {
        let token = resolve_token(auth.as_ref(), &probe).await;
        run_probes(suites, &probe, token.as_deref(), runner_tx).await
    });

    // Asserter Task
    let asserter_jh = tokio::spawn(async move { Asserter::run(asserter_rx, asserter_tx).await });

    Ok((runner_jh, asserter_jh, outputter_jh))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();

    // Read the probe file, apply overrides and validate it. Only a broken
    // configuration ends the process here; failing probes never do.
    let (suites, setup, n_probes) = load_and_validate_config(&cli)?;
    tracing::debug!(
        root = %setup.root,
        timeout = ?setup.timeout,
        n_probes,
        "configuration loaded"
    );

    let (runner_jh, asserter_jh, outputter_jh) =
        run_pipeline_tasks(suites, setup, n_probes, &cli).await?;

    let (runner, asserter, outputter) = futures::join!(runner_jh, asserter_jh, outputter_jh);

    let mut stages_ok = true;
    match runner {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(%err, "runner stopped early");
            stages_ok = false;
        }
        Err(err) => {
            tracing::error!(%err, "runner task failed");
            stages_ok = false;
        }
    }
    match asserter {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(%err, "asserter stopped early");
            stages_ok = false;
        }
        Err(err) => {
            tracing::error!(%err, "asserter task failed");
            stages_ok = false;
        }
    }

    let summary = match outputter {
        Ok(summary) => summary,
        Err(err) => {
            tracing::error!(%err, "outputter task failed");
            return Ok(ExitCode::FAILURE);
        }
    };

    if stages_ok && summary.all_passed(n_probes) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
