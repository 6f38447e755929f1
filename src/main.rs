//! Fixture Mock Server - CLI Entry Point

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;
use fixture_mock_server::{MockServer, RuleSet, ServerSettings};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "fixture-mock-server",
    about = "File-backed HTTP mock server - JSON fixtures with per-path delay, status and content-type overrides",
    version
)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SERVER_PORT", default_value_t = 8888)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "SERVER_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Path to the override rule file (JSON, or YAML by extension)
    #[arg(short, long, env = "RESPONSE_CONFIG", default_value = "responseConfig.json")]
    config: PathBuf,

    /// Root of the <method>/<path>.json fixture tree
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Comma-separated directory names served as static assets
    #[arg(long, env = "STATIC_DIRS", value_delimiter = ',', default_value = "html")]
    static_dirs: Vec<String>,

    /// Directory containing the static asset directories
    #[arg(long, env = "STATIC_ROOT", default_value = ".")]
    static_root: PathBuf,

    /// Delay in milliseconds added to every non-static request (ignored if not a number)
    #[arg(long = "delay-ms", env = "API_REQUEST_DELAY_MS", default_value = "0")]
    delay_ms: String,

    /// Answer CORS preflights and add CORS headers to fixture responses
    #[arg(long, env = "CORS", value_parser = FalseyValueParser::new())]
    cors: bool,

    /// Log request headers and body with every request
    #[arg(long, env = "DETAILED_LOGGING", value_parser = FalseyValueParser::new())]
    detailed_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Validate the override rule file and exit
    #[arg(long)]
    validate: bool,
}

impl Args {
    /// The uniform delay; a value that is not a number disables it.
    fn uniform_delay_ms(&self) -> u64 {
        match self.delay_ms.trim().parse() {
            Ok(ms) => ms,
            Err(e) => {
                warn!(value = %self.delay_ms, error = %e, "Ignoring invalid request delay");
                0
            }
        }
    }

    fn settings(&self) -> ServerSettings {
        ServerSettings {
            cors_enabled: self.cors,
            static_root: self.static_root.clone(),
            data_dir: self.data_dir.clone(),
            uniform_delay_ms: self.uniform_delay_ms(),
            detailed_logging: self.detailed_logging,
            ..ServerSettings::default()
        }
        .with_static_prefixes(&self.static_dirs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.validate {
        let rules = RuleSet::from_file(&args.config)?;
        let problems = rules.validate();
        if !problems.is_empty() {
            for problem in &problems {
                eprintln!("{}", problem);
            }
            anyhow::bail!(
                "{} problem(s) found in {}",
                problems.len(),
                args.config.display()
            );
        }
        println!("Configuration is valid ({} rules defined)", rules.len());
        return Ok(());
    }

    let rules = RuleSet::load_or_empty(&args.config);
    let server = MockServer::new(args.settings(), &rules);

    let addr = SocketAddr::new(args.bind, args.port);
    info!(port = args.port, "Starting server");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    server.run(listener).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Environment variables read by `Args`. Tests touching them hold `ENV_LOCK`.
    const ENV_VARS: &[&str] = &[
        "SERVER_PORT",
        "SERVER_BIND",
        "RESPONSE_CONFIG",
        "DATA_DIR",
        "STATIC_DIRS",
        "STATIC_ROOT",
        "API_REQUEST_DELAY_MS",
        "CORS",
        "DETAILED_LOGGING",
    ];

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Parse `argv` with exactly the given environment variables set.
    fn parse_with_env(vars: &[(&str, &str)], argv: &[&str]) -> Result<Args, clap::Error> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            std::env::set_var(name, value);
        }

        let mut full = vec!["fixture-mock-server"];
        full.extend_from_slice(argv);
        let parsed = Args::try_parse_from(full);

        for (name, _) in vars {
            std::env::remove_var(name);
        }
        parsed
    }

    #[test]
    fn test_defaults() {
        let args = parse_with_env(&[], &[]).unwrap();
        assert_eq!(args.port, 8888);
        assert_eq!(args.config, PathBuf::from("responseConfig.json"));
        assert!(!args.cors);
        assert!(!args.detailed_logging);

        let settings = args.settings();
        assert_eq!(settings.static_prefixes, vec!["html"]);
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.uniform_delay_ms, 0);
    }

    #[test]
    fn test_numeric_toggles_from_env() {
        let args = parse_with_env(&[("CORS", "1"), ("DETAILED_LOGGING", "1")], &[]).unwrap();
        assert!(args.cors);
        assert!(args.detailed_logging);
        assert!(args.settings().cors_enabled);
    }

    #[test]
    fn test_falsey_toggles_from_env() {
        for value in ["0", "false", "no", "off", ""] {
            let args = parse_with_env(&[("CORS", value), ("DETAILED_LOGGING", value)], &[]).unwrap();
            assert!(!args.cors, "CORS={:?} should disable CORS", value);
            assert!(!args.detailed_logging);
        }

        let args = parse_with_env(&[("CORS", "true")], &[]).unwrap();
        assert!(args.cors);
    }

    #[test]
    fn test_cli_flags() {
        let args = parse_with_env(
            &[],
            &["--cors", "--static-dirs", "html,assets", "-p", "9000", "--delay-ms", "75"],
        )
        .unwrap();
        assert!(args.cors);
        assert_eq!(args.port, 9000);

        let settings = args.settings();
        assert_eq!(settings.static_prefixes, vec!["html", "assets"]);
        assert_eq!(settings.uniform_delay_ms, 75);
    }

    #[test]
    fn test_delay_from_env() {
        let args = parse_with_env(&[("API_REQUEST_DELAY_MS", "250")], &[]).unwrap();
        assert_eq!(args.uniform_delay_ms(), 250);
    }

    #[test]
    fn test_invalid_delay_is_ignored() {
        let args = parse_with_env(&[("API_REQUEST_DELAY_MS", "abc")], &[]).unwrap();
        assert_eq!(args.uniform_delay_ms(), 0);
        assert_eq!(args.settings().uniform_delay_ms, 0);

        let args = parse_with_env(&[("API_REQUEST_DELAY_MS", "-5")], &[]).unwrap();
        assert_eq!(args.uniform_delay_ms(), 0);
    }
}
