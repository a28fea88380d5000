use flume::SendError;
use flume::Sender;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::auth::Authenticator;
use crate::probe::ApiProbe;
use crate::probe::ProbeError;
use crate::probe::ProbeResult;
use crate::transport::Transport;
use crate::validator::ValidatedSuite;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("channel error")]
    ChannelError(#[from] SendError<RunnerResult>),
}

#[derive(Debug)]
pub struct RunnerResult {
    pub suite: String,
    pub description: String,
    pub method: String,
    pub path: String,
    pub expected: i64,
    pub outcome: Result<ProbeResult, ProbeError>,
}

/// Fetches the bearer token once for the whole run. A failed login is only
/// logged: protected probes then go out without the header and fail on
/// their own.
pub async fn resolve_token<T: Transport>(
    auth: Option<&Authenticator>,
    probe: &ApiProbe<T>,
) -> Option<String> {
    let auth = auth?;

    match auth.bearer_token(probe).await {
        Ok(token) => {
            info!("bearer token acquired");
            Some(token)
        }
        Err(err) => {
            warn!(%err, "could not obtain a bearer token, protected probes run without one");
            None
        }
    }
}

/// Runs every probe in declaration order. Each probe is awaited before the
/// next one starts since later probes may depend on state earlier ones
/// left on the backend.
pub async fn run_probes<T: Transport>(
    suites: Vec<ValidatedSuite>,
    probe: &ApiProbe<T>,
    token: Option<&str>,
    tx: Sender<RunnerResult>,
) -> Result<(), RunnerError> {
    for suite in suites {
        info!(suite = %suite.name, probes = suite.probes.len(), "running suite");

        for test in suite.probes {
            let spec = match (test.protected, token) {
                (true, Some(token)) => test.spec.with_bearer(token),
                _ => test.spec,
            };

            let outcome = probe.execute(&spec).await;

            tx.send_async(RunnerResult {
                suite: suite.name.clone(),
                description: spec.description,
                method: spec.method,
                path: spec.path,
                expected: test.expected,
                outcome,
            })
            .await?;
        }
    }

    Ok(())
}
