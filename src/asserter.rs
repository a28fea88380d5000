use core::fmt;
use std::fmt::Display;

use flume::Receiver;
use flume::SendError;
use flume::Sender;
use reqwest::StatusCode;

use crate::probe::ProbeError;
use crate::probe::ProbeResult;
use crate::probe::matches;
use crate::runner::RunnerResult;

pub struct Asserter {}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TestResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone)]
pub struct AssertResult {
    pub status: TestResult,
    pub expected: i64,
    pub actual: Actual,
}

#[derive(Debug, Clone)]
pub enum Actual {
    Code {
        code: i64,
        status: StatusCode,
        body: String,
    },
    UnsupportedMethod(String),
    RequestFailed(String),
}

/// What the outputter gets for every probe.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub suite: String,
    pub description: String,
    pub method: String,
    pub path: String,
    pub result: AssertResult,
}

impl Display for AssertResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.actual) {
            (TestResult::Pass, actual) => {
                write!(
                    f,
                    "{} {} {}",
                    console::style("✔").green().bold(),
                    console::style("PASS!").green().bold(),
                    actual
                )
            }

            (TestResult::Fail, Actual::Code { code, status, body }) => {
                writeln!(
                    f,
                    "{} {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                )?;
                writeln!(
                    f,
                    "  {}",
                    console::style(format!("Expected error_code {}", self.expected)).green()
                )?;
                writeln!(
                    f,
                    "  {}",
                    console::style(format!("Got error_code {} (status {})", code, status)).red()
                )?;
                writeln!(f, "  {}", console::style("Response body:").yellow().bold())?;
                writeln!(f, "    {}", console::style(body).dim())
            }

            (TestResult::Fail, Actual::UnsupportedMethod(method)) => {
                writeln!(
                    f,
                    "{} {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                )?;
                writeln!(
                    f,
                    "  {} {}",
                    console::style("Unsupported HTTP method:").red(),
                    console::style(method).red().bold()
                )
            }

            (TestResult::Fail, Actual::RequestFailed(err)) => {
                writeln!(
                    f,
                    "{} {}",
                    console::style("✘").red().bold(),
                    console::style("FAIL!").red().bold(),
                )?;
                writeln!(
                    f,
                    "  {} {}",
                    console::style("Request failed with error:").red(),
                    console::style(err).red().bold()
                )
            }
        }
    }
}

impl Display for Actual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actual::Code { code, status, .. } => {
                write!(f, "Got error_code {code} (status {status})")
            }
            Actual::UnsupportedMethod(method) => write!(f, "Unsupported method {method}"),
            Actual::RequestFailed(_) => write!(f, "Request failed"),
        }
    }
}

pub trait Assert {
    fn assert(&self) -> AssertResult;
}

impl Assert for RunnerResult {
    fn assert(&self) -> AssertResult {
        let status = if matches(&self.outcome, self.expected) {
            TestResult::Pass
        } else {
            TestResult::Fail
        };

        let actual = match &self.outcome {
            Ok(ProbeResult {
                status,
                body,
                result_code,
            }) => Actual::Code {
                code: *result_code,
                status: *status,
                body: body.clone(),
            },
            Err(ProbeError::UnsupportedMethod(method)) => {
                Actual::UnsupportedMethod(method.clone())
            }
            Err(err) => Actual::RequestFailed(err.to_string()),
        };

        AssertResult {
            status,
            expected: self.expected,
            actual,
        }
    }
}

impl Asserter {
    pub async fn run(
        rx: Receiver<RunnerResult>,
        output_tx: Sender<ProbeReport>,
    ) -> Result<(), SendError<ProbeReport>> {
        while let Ok(msg) = rx.recv_async().await {
            let result = msg.assert();

            output_tx
                .send_async(ProbeReport {
                    suite: msg.suite,
                    description: msg.description,
                    method: msg.method,
                    path: msg.path,
                    result,
                })
                .await?;
        }

        Ok(())
    }
}
