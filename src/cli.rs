use clap::Parser;

/// Run declarative HTTP probes against a backend and check the `error_code`
/// each response carries
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the probe file
    #[arg(short, long, default_value = "apiprobe.toml")]
    pub path: String,

    /// Server root to probe, overrides `setup.base_url`
    #[arg(long)]
    pub base_url: Option<String>,

    /// Request timeout in seconds, overrides `setup.timeout_secs`
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Bearer token for protected probes, overrides `[auth]`
    #[arg(long, env = "APIPROBE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Only run the named suite, can be given more than once
    #[arg(short, long = "suite")]
    pub suites: Vec<String>,

    /// Print the response body of passing probes too
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "apiprobe",
            "-p",
            "probes/user.toml",
            "--base-url",
            "http://127.0.0.1:3000/api/",
            "--timeout",
            "3",
            "-s",
            "otp",
            "-s",
            "cert",
        ])
        .unwrap();

        assert_eq!(cli.path, "probes/user.toml");
        assert_eq!(cli.base_url.as_deref(), Some("http://127.0.0.1:3000/api/"));
        assert_eq!(cli.timeout, Some(3));
        assert_eq!(cli.suites, vec!["otp".to_string(), "cert".to_string()]);
        assert!(!cli.verbose);
    }
}
