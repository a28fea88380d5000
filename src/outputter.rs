use console::Style;
use flume::Receiver;

use crate::asserter::Actual;
use crate::asserter::ProbeReport;
use crate::asserter::TestResult;

pub struct OutPutter;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    /// True only when every one of the `n_probes` planned probes was
    /// reported and passed. A run cut short counts as a failure.
    pub fn all_passed(&self, n_probes: usize) -> bool {
        self.failed == 0 && self.passed == n_probes
    }
}

impl OutPutter {
    pub async fn start(
        rx: Receiver<ProbeReport>,
        probe_path: &str,
        n_probes: usize,
        verbose: bool,
    ) -> Summary {
        let style = Style::new().bold().cyan();
        let open_text =
            &format!("Running probe file: {probe_path} Found {n_probes} probes: Running...");
        let open_text = style.apply_to(open_text);

        println!("{open_text}");
        let mut i = 1;
        let mut summary = Summary::default();
        let mut failed_probes: Vec<ProbeReport> = vec![];
        let mut current_suite = String::new();

        while let Ok(report) = rx.recv_async().await {
            if report.suite != current_suite {
                println!("{}", console::style(format!("[{}]", report.suite)).bold());
                current_suite = report.suite.clone();
            }

            let name = label(&report);

            match report.result.status {
                TestResult::Pass => {
                    summary.passed += 1;
                    println!(
                        "[{i}/{n_probes}] {}  {name}: {} {}",
                        console::style("✔").green().bold(),
                        report.result.actual,
                        console::style("PASS!").green().bold(),
                    );
                    if verbose && let Actual::Code { body, .. } = &report.result.actual {
                        println!("    {}", console::style(body).dim());
                    }
                }
                TestResult::Fail => {
                    summary.failed += 1;
                    println!(
                        "[{i}/{n_probes}] {}  {name}: {} {}",
                        console::style("╳").red().bold(),
                        report.result.actual,
                        console::style("FAILED!").red().bold(),
                    );
                    failed_probes.push(report);
                }
            }

            i += 1;
        }

        println!();
        if !failed_probes.is_empty() {
            println!(
                "{}",
                console::style("Summary of Failed Probes:").bold().red()
            );
            for (idx, report) in failed_probes.iter().enumerate() {
                println!("\n{} {}. {}", idx + 1, label(report), report.result);
            }
        } else {
            println!("{}", console::style("All probes passed! 🎉").bold().green());
        }

        println!(
            "{} passed, {} failed",
            console::style(summary.passed).green().bold(),
            console::style(summary.failed).red().bold()
        );

        summary
    }
}

/// The description when there is one, otherwise `METHOD path`.
fn label(report: &ProbeReport) -> String {
    if report.description.is_empty() {
        format!("{} {}", report.method.to_uppercase(), report.path)
    } else {
        report.description.clone()
    }
}
