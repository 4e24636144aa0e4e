//! test-cascade - dependency-aware concurrent test runner
//!
//! Runs the bundled sample suites on the test-cascade engine. Every test gets
//! its own thread as soon as the tests it depends on have passed.
//!
//! ## Usage
//!
//! ```bash
//! # Run everything and print a table when the suite settles
//! test-cascade run
//!
//! # Live console view, exit with Enter or Ctrl-C
//! test-cascade run --interactive
//!
//! # Only some tests (dependencies are pulled in automatically)
//! test-cascade run --filter sample.fixtures. --format json-pretty
//!
//! # Fail dependents of failed tests instead of leaving them waiting
//! test-cascade run --profile failures --policy fail
//!
//! # List registered tests
//! test-cascade list --detailed
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tracing::{debug, info};

mod cli;
mod samples;

use cli::{Args, Command, ConfigAction};
use test_cascade::config::{env::print_env_help, AppConfig, ConfigFile, EnvConfig, TestProfile};
use test_cascade::output::{write_results_to_file, ConsoleObserver, ResultFormatter};
use test_cascade::test_case::DEFAULT_TIMEOUT;
use test_cascade::utils::{init_logger, LogLevel, Timer};
use test_cascade::{RunSummary, Suite, Test};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run(run_args) => {
            let code = run_tests(run_args, args.verbose).await?;
            std::process::exit(code);
        }
        Command::List(list_args) => {
            init_logger(log_level(args.verbose, LogLevel::Warn));
            list_tests(list_args);
        }
        Command::Config(config_args) => {
            init_logger(log_level(args.verbose, LogLevel::Warn));
            manage_config(config_args)?;
        }
    }

    Ok(())
}

fn log_level(verbose: bool, configured: LogLevel) -> LogLevel {
    if verbose {
        LogLevel::Debug
    } else {
        configured
    }
}

/// Config file from an explicit path, `TEST_CASCADE_CONFIG`, or the
/// standard locations.
fn load_config_file(path: Option<&str>, env: &EnvConfig) -> Result<ConfigFile> {
    match path.or(env.config_file.as_deref()) {
        Some(path) => ConfigFile::load(path),
        None => ConfigFile::load_default(),
    }
}

async fn run_tests(args: cli::RunArgs, verbose: bool) -> Result<i32> {
    let env = EnvConfig::load();
    let file = load_config_file(args.config.as_deref(), &env)?;
    let mut app = file.app.clone().merge_env(&env);

    let profile = match &args.profile {
        Some(name) => Some(
            file.profile(name)
                .with_context(|| format!("Unknown profile: {name}"))?,
        ),
        None => None,
    };
    if let Some(profile) = &profile {
        if let Some(timeout) = profile.timeout_secs {
            app.default_timeout_secs = timeout;
        }
        if let Some(policy) = profile.policy {
            app.dependency_policy = policy;
        }
    }

    if let Some(timeout) = args.timeout {
        app.default_timeout_secs = timeout;
    }
    if let Some(policy) = &args.policy {
        app.dependency_policy = policy.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = &args.format {
        app.format = format.clone();
    }
    if args.no_color {
        app.colorize = false;
    }

    init_logger(log_level(verbose, app.log_level));
    let format = app.output_format()?;

    let mut filters = profile.map(|p| p.include).unwrap_or_default();
    filters.extend(args.filters);

    let registry = samples::registry(app.default_timeout()).select(&filters);
    if registry.is_empty() {
        anyhow::bail!("No tests match the selection: {}", filters.join(", "));
    }

    let suite = Suite::with_policy(app.dependency_policy);
    suite.register_all(registry)?;
    info!(
        tests = suite.len(),
        policy = %app.dependency_policy,
        "Registered tests"
    );

    let timer = Timer::start("Suite run");
    let summary = if args.interactive {
        run_interactive(&suite, &app).await?
    } else {
        suite.run()?;
        suite.settled().await;
        suite.summary()
    };
    timer.stop();

    let mut formatter = ResultFormatter::new(format);
    if !app.colorize {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_summary(&summary));

    if let Some(path) = &args.output {
        write_results_to_file(path, &summary, format)?;
        println!("Results saved to: {path}");
    }

    Ok(summary.exit_code())
}

/// Attach the live console, start the run, then block on host input.
async fn run_interactive(suite: &Suite, app: &AppConfig) -> Result<RunSummary> {
    let observer = ConsoleObserver::attach(suite, Handle::current(), app.console_options());
    suite.run()?;
    observer.request_repaint();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        line = lines.next_line() => {
            debug!("Input received: {:?}", line.ok().flatten());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            debug!("Interrupted");
        }
    }

    drop(observer);
    Ok(suite.summary())
}

fn list_tests(args: cli::ListArgs) {
    let tests: Vec<Test> = samples::registry(DEFAULT_TIMEOUT).into_iter().collect();

    let mut namespaces: BTreeMap<&str, Vec<&Test>> = BTreeMap::new();
    for test in &tests {
        namespaces.entry(test.namespace()).or_default().push(test);
    }

    println!("\nRegistered tests ({} total)\n", tests.len());
    for (namespace, members) in namespaces {
        println!("{namespace}");
        println!("{:━<60}", "");
        for test in members {
            if args.detailed {
                let kind = if test.is_async() { "async" } else { "sync" };
                println!(
                    "  {:28} {:5} timeout {}s",
                    test.id(),
                    kind,
                    test.timeout().as_secs()
                );
                if let Some(description) = test.description() {
                    println!("      {description}");
                }
                if !test.dependencies().is_empty() {
                    println!("      depends on: {}", test.dependencies().join(", "));
                }
            } else {
                println!("  {}", test.id());
            }
        }
        println!();
    }

    println!("Profiles:");
    for profile in TestProfile::predefined() {
        println!("  {:10} - {}", profile.name, profile.description);
    }
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let target = Path::new(&path);
            if target.exists() && !force {
                anyhow::bail!("Configuration file already exists: {path}. Use --force to overwrite.");
            }

            ConfigFile::example().save(target)?;
            println!("✓ Configuration file created: {path}");
        }

        ConfigAction::Show { config, json, env } => {
            if env {
                print_env_help();
                return Ok(());
            }

            let env_config = EnvConfig::load();
            let mut file = load_config_file(config.as_deref(), &env_config)?;
            file.app = file.app.merge_env(&env_config);

            let output = if json {
                serde_json::to_string_pretty(&file)?
            } else {
                serde_yaml::to_string(&file)?
            };
            println!("{output}");
        }
    }

    Ok(())
}
