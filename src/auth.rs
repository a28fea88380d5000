use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::probe::ApiProbe;
use crate::probe::ProbeError;
use crate::probe::ProbeSpec;
use crate::transport::Transport;

pub const DEFAULT_TOKEN_FIELD: &str = "token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Request(#[from] ProbeError),

    #[error("login was rejected with error_code {code}: {body}")]
    Rejected { code: i64, body: String },

    #[error("login response has no string field `{0}`")]
    MissingToken(String),

    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub path: String,
    pub email: String,
    pub pass: String,
    pub token_field: String,
}

/// Where the bearer token for protected probes comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Authenticator {
    Static(String),
    Env(String),
    Login(Credentials),
}

impl Authenticator {
    /// Obtains the bearer token. Login goes through the same probe and
    /// transport as the suite itself, so it honours the configured root and
    /// timeout.
    pub async fn bearer_token<T: Transport>(&self, probe: &ApiProbe<T>) -> Result<String, AuthError> {
        match self {
            Authenticator::Static(token) => Ok(token.clone()),
            Authenticator::Env(var) => {
                std::env::var(var).map_err(|_| AuthError::MissingEnv(var.clone()))
            }
            Authenticator::Login(creds) => login(probe, creds).await,
        }
    }
}

async fn login<T: Transport>(probe: &ApiProbe<T>, creds: &Credentials) -> Result<String, AuthError> {
    let spec = ProbeSpec::post(creds.path.as_str())
        .with_json(json!({ "email": creds.email, "pass": creds.pass }))
        .with_description("login");

    let result = probe.execute(&spec).await?;
    debug!(email = %creds.email, status = %result.status, "login answered");

    if result.result_code != 0 {
        return Err(AuthError::Rejected {
            code: result.result_code,
            body: result.body,
        });
    }

    serde_json::from_str::<serde_json::Value>(&result.body)
        .ok()
        .and_then(|json| {
            json.get(&creds.token_field)
                .and_then(|t| t.as_str())
                .map(str::to_string)
        })
        .ok_or_else(|| AuthError::MissingToken(creds.token_field.clone()))
}
