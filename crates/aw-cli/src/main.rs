use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;

use anyhow::Result;
use aw::config::ConfigOverrides;
use aw_types::error::{Diagnostic, ExitCode};
use clap::{Parser, Subcommand};

use aw_cli::CompileCliOptions;

#[derive(Parser, Debug)]
#[command(name = "aw", version)]
#[command(about = "Compiler and audit engine for agentic CI workflows")]
struct Cli {
    /// Workspace root Workflow Source paths are resolved relative to.
    #[arg(long, default_value = ".")]
    workspace_root: PathBuf,

    /// Emit JSON instead of human-readable text where applicable.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile Workflow Source files into deterministic lock files.
    Compile {
        /// Glob patterns (relative to --workspace-root) for sources to compile.
        paths: Vec<String>,
        /// Fail on action-version mismatches and wildcard-domain grants
        /// instead of only warning.
        #[arg(long)]
        strict: bool,
        /// Disable falling back to the built-in action-sha table when the
        /// resolver is unreachable.
        #[arg(long)]
        no_fallback: bool,
        /// Directory lock files are written under (relative to workspace root).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Check sources for validation errors without emitting lock files.
    Status {
        /// Glob pattern (relative to --workspace-root) for sources to check.
        pattern: String,
    },
    /// Build a structured report from a run's downloaded artifacts.
    Audit {
        /// The CI run id the artifacts under `output_dir` belong to.
        run_id: String,
        /// Directory holding the run's downloaded (or already flattened) artifacts.
        output_dir: PathBuf,
    },
    /// Extract per-run metrics from a run's downloaded artifacts.
    Logs {
        /// Substring filter over tool/server names; empty matches everything.
        #[arg(default_value = "")]
        query: String,
        /// Directory holding the run's downloaded (or already flattened) artifacts.
        output_dir: PathBuf,
    },
}

fn main() -> ProcessExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => to_process_exit_code(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ProcessExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.cmd {
        Commands::Compile {
            paths,
            strict,
            no_fallback,
            output_dir,
        } => runtime.block_on(run_compile(&cli.workspace_root, paths, strict, no_fallback, output_dir, cli.json)),
        Commands::Status { pattern } => run_status(&cli.workspace_root, &pattern, cli.json),
        Commands::Audit { run_id, output_dir } => run_audit(&run_id, &output_dir, cli.json),
        Commands::Logs { query, output_dir } => run_logs(&query, &output_dir, cli.json),
    }
}

async fn run_compile(
    workspace_root: &std::path::Path,
    path_patterns: Vec<String>,
    strict: bool,
    no_fallback: bool,
    output_dir: Option<PathBuf>,
    json: bool,
) -> Result<ExitCode> {
    let mut paths = Vec::new();
    for pattern in &path_patterns {
        let full = workspace_root.join(pattern);
        for entry in glob::glob(&full.to_string_lossy())? {
            paths.push(entry?);
        }
    }
    paths.sort();

    let options = CompileCliOptions {
        workspace_root: workspace_root.to_path_buf(),
        overrides: ConfigOverrides {
            strict: Some(strict),
            allow_fallback_pins: Some(!no_fallback),
            output_dir,
            ..Default::default()
        },
        pin_cache_path: Some(workspace_root.join(".aw-compiler/pin-cache.json")),
    };

    let diagnostics = aw_cli::compile(&paths, &options).await?;
    print_diagnostics(&diagnostics, json);
    Ok(ExitCode::from_diagnostics(&diagnostics))
}

fn run_status(workspace_root: &std::path::Path, pattern: &str, json: bool) -> Result<ExitCode> {
    let diagnostics = aw_cli::status(pattern, workspace_root)?;
    print_diagnostics(&diagnostics, json);
    Ok(ExitCode::from_diagnostics(&diagnostics))
}

fn run_audit(run_id: &str, output_dir: &std::path::Path, json: bool) -> Result<ExitCode> {
    let report = aw_cli::audit(run_id, output_dir)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", aw::audit::render_text(&report));
    }
    Ok(ExitCode::Success)
}

fn run_logs(query: &str, output_dir: &std::path::Path, json: bool) -> Result<ExitCode> {
    let metrics = aw_cli::logs(query, output_dir)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        for (name, stats) in &metrics.by_tool {
            println!("{name}: {} calls, {} errors", stats.call_count, stats.error_count);
        }
    }
    Ok(ExitCode::Success)
}

fn print_diagnostics(diagnostics: &[Diagnostic], json: bool) {
    if json {
        let rendered: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
        if let Ok(text) = serde_json::to_string_pretty(&rendered) {
            println!("{text}");
        }
        return;
    }
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
}

fn to_process_exit_code(code: ExitCode) -> ProcessExitCode {
    ProcessExitCode::from(code as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_numbered_per_the_severity_ladder() {
        assert_eq!(ExitCode::Success as u8, 0);
        assert_eq!(ExitCode::UserError as u8, 1);
        assert_eq!(ExitCode::ValidationError as u8, 2);
        assert_eq!(ExitCode::ExternalError as u8, 3);
        // Smoke-test the conversion path doesn't panic for every variant.
        let _ = to_process_exit_code(ExitCode::ExternalError);
    }
}
