use std::time::Duration;

use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::auth::Authenticator;
use crate::auth::Credentials;
use crate::auth::DEFAULT_TOKEN_FIELD;
use crate::parser;
use crate::parser::ProbeFile;
use crate::probe::ProbeSpec;
use crate::transport::DEFAULT_TIMEOUT;

const DEFAULT_LOGIN_PATH: &str = "login";

// Error messages
const BASE_URL_NOT_HTTP: &str = "The base URL from setup must be an absolute http:// or https:// URL";
const AUTH_AMBIGUOUS: &str = "Exactly one of `token`, `token_env` or `login` must be set in [auth]";
const TIMEOUT_ZERO: &str = "The timeout must be at least one second";
const PATH_EMPTY: &str = "The path of a probe can't be empty";
const BODY_CONFLICT: &str = "A probe can have either `body` or `raw_body`, not both";

pub struct Validator {
    probe_file: ProbeFile,
    toml_src: String,
    file_name: String,
}

pub struct RunSetup {
    pub root: Url,
    pub timeout: Duration,
    pub auth: Option<Authenticator>,
}

pub struct ValidatedSuite {
    pub name: String,
    pub probes: Vec<Probe>,
}

/// A probe ready to run. `protected` probes get the run's bearer token
/// attached right before they are executed.
#[derive(Debug, Clone)]
pub struct Probe {
    pub spec: ProbeSpec,
    pub expected: i64,
    pub protected: bool,
}

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid field `{field}`: {message}")]
pub struct ValidationError {
    field: String,
    message: String,
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("invalid value here")]
    span: Option<SourceSpan>,
}

macro_rules! validation_err {
    ($field:expr, $msg:expr, $self:expr, $snippet:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
            src: Some(NamedSource::new(
                $self.file_name.clone(),
                $self.toml_src.clone(),
            )),
            span: find_span($snippet, &$self.toml_src),
        }
    };
}

impl Validator {
    pub fn new(probe_file: &ProbeFile, toml_src: &str, file_name: &str) -> Self {
        Self {
            probe_file: probe_file.clone(),
            toml_src: toml_src.into(),
            file_name: file_name.into(),
        }
    }

    /// Validates the whole file. When `only` is non-empty just the suites
    /// named there are kept, in file order.
    pub fn validate(
        &mut self,
        only: &[String],
    ) -> miette::Result<(Vec<ValidatedSuite>, RunSetup), ValidationError> {
        let suites = self.validate_suites(only)?;
        let setup = self.validate_setup()?;

        Ok((suites, setup))
    }

    fn validate_setup(&self) -> Result<RunSetup, ValidationError> {
        let base_url = &self.probe_file.setup.base_url;

        let root = Url::parse(base_url)
            .map_err(|e| validation_err!("setup.base_url", e, self, base_url))?;

        if !matches!(root.scheme(), "http" | "https") {
            return Err(validation_err!(
                "setup.base_url",
                BASE_URL_NOT_HTTP,
                self,
                base_url
            ));
        }

        let timeout = self
            .probe_file
            .setup
            .timeout_secs
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

        if timeout.is_zero() {
            return Err(ValidationError {
                field: "setup.timeout_secs".into(),
                message: TIMEOUT_ZERO.into(),
                src: Some(NamedSource::new(
                    self.file_name.clone(),
                    self.toml_src.clone(),
                )),
                span: find_key_span("timeout_secs", &self.toml_src),
            });
        }

        let auth = match &self.probe_file.auth {
            Some(auth) => Some(self.create_authenticator(auth)?),
            None => None,
        };

        Ok(RunSetup {
            root,
            timeout,
            auth,
        })
    }

    fn create_authenticator(&self, auth: &parser::Auth) -> Result<Authenticator, ValidationError> {
        match (&auth.token, &auth.token_env, &auth.login) {
            (Some(token), None, None) => Ok(Authenticator::Static(token.clone())),
            (None, Some(var), None) => Ok(Authenticator::Env(var.clone())),
            (None, None, Some(login)) => Ok(Authenticator::Login(Credentials {
                path: login
                    .path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LOGIN_PATH.into()),
                email: login.email.clone(),
                pass: login.pass.clone(),
                token_field: login
                    .token_field
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TOKEN_FIELD.into()),
            })),
            _ => Err(ValidationError {
                field: "auth".into(),
                message: AUTH_AMBIGUOUS.into(),
                src: Some(NamedSource::new(
                    self.file_name.clone(),
                    self.toml_src.clone(),
                )),
                span: find_key_span("[auth]", &self.toml_src),
            }),
        }
    }

    fn validate_suites(&self, only: &[String]) -> Result<Vec<ValidatedSuite>, ValidationError> {
        for name in only {
            if !self.probe_file.suites.iter().any(|s| &s.name == name) {
                return Err(ValidationError {
                    field: "suites".into(),
                    message: format!("No suite named `{name}` in this file"),
                    src: None,
                    span: None,
                });
            }
        }

        // `ordinal` counts probes across the whole file, skipped suites
        // included, so it lines up with the `[[suites.probes]]` headers.
        let mut ordinal = 0;
        let mut suites = vec![];

        for suite in &self.probe_file.suites {
            let first = ordinal;
            ordinal += suite.probes.len();

            if !only.is_empty() && !only.contains(&suite.name) {
                continue;
            }

            let probes = suite
                .probes
                .iter()
                .enumerate()
                .map(|(i, probe)| self.create_probe(&suite.name, i, first + i, probe))
                .collect::<Result<Vec<_>, ValidationError>>()?;

            suites.push(ValidatedSuite {
                name: suite.name.clone(),
                probes,
            });
        }

        Ok(suites)
    }

    fn create_probe(
        &self,
        suite: &str,
        index: usize,
        ordinal: usize,
        probe: &parser::Probe,
    ) -> Result<Probe, ValidationError> {
        let field = format!("{suite}.probes[{index}]");

        if probe.path.trim().is_empty() {
            // An empty path has no text of its own to point at, so the
            // label goes on the `path` line of this probe's table.
            return Err(ValidationError {
                field: format!("{field}.path"),
                message: PATH_EMPTY.into(),
                src: Some(NamedSource::new(
                    self.file_name.clone(),
                    self.toml_src.clone(),
                )),
                span: find_probe_key_span(ordinal, "path", &self.toml_src),
            });
        }

        // The method is kept as written. Anything other than GET or POST
        // fails when the probe runs, so it can't take the rest of the batch
        // down with it.
        let mut spec = ProbeSpec::new(probe.path.as_str(), probe.method.as_str())
            .with_description(probe.desc.clone().unwrap_or_default());

        if let Some(headers) = &probe.headers {
            for (name, value) in headers {
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    validation_err!(
                        format!("{field}.headers"),
                        format!("Invalid header name `{name}`: {e}"),
                        self,
                        name
                    )
                })?;
                HeaderValue::from_str(value).map_err(|e| {
                    validation_err!(
                        format!("{field}.headers"),
                        format!("Invalid header value for `{name}`: {e}"),
                        self,
                        value
                    )
                })?;
            }
            spec = spec.with_headers(headers.clone());
        }

        spec = match (&probe.body, &probe.raw_body) {
            (Some(_), Some(raw)) => {
                return Err(validation_err!(
                    format!("{field}.raw_body"),
                    BODY_CONFLICT,
                    self,
                    raw
                ));
            }
            (Some(body), None) => spec.with_json(body.clone()),
            (None, Some(raw)) => spec.with_raw(raw.as_str()),
            (None, None) => spec,
        };

        Ok(Probe {
            spec,
            expected: probe.expect,
            protected: probe.protected,
        })
    }
}

fn find_span(needle: &str, toml_src: &str) -> Option<SourceSpan> {
    let pattern = format!("\"{}\"", needle);
    toml_src
        .find(&pattern)
        .map(|start| SourceSpan::new(start.into(), pattern.len()))
}

fn find_key_span(key: &str, toml_src: &str) -> Option<SourceSpan> {
    toml_src
        .find(key)
        .map(|start| SourceSpan::new(start.into(), key.len()))
}

/// Span of the `key = ...` line inside the `ordinal`th `[[suites.probes]]`
/// table of the file.
fn find_probe_key_span(ordinal: usize, key: &str, toml_src: &str) -> Option<SourceSpan> {
    let (start, _) = toml_src.match_indices("[[suites.probes]]").nth(ordinal)?;
    let table = &toml_src[start..];
    let end = table[1..].find("[[").map_or(table.len(), |i| i + 1);

    let mut offset = start;
    for line in table[..end].split_inclusive('\n') {
        let trimmed = line.trim_start();
        let is_key = trimmed
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with('='));

        if is_key {
            let lead = line.len() - trimmed.len();
            return Some(SourceSpan::new(
                (offset + lead).into(),
                trimmed.trim_end().len(),
            ));
        }
        offset += line.len();
    }

    None
}
