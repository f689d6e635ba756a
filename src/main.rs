use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracehint::classifier::ArtifactError;
use tracehint::config::Config;
use tracehint::display;
use tracehint::interrupt::{Interrupts, EXIT_INTERRUPTED};
use tracehint::pipeline::{AnalysisOutcome, Analyzer, PipelineError};
use tracehint::sandbox::{ProcessSandbox, SandboxError};

const EXIT_FAILURE_OUTCOME: i32 = 1;
/// The submission never produced an outcome: empty input or a sandbox failure.
const EXIT_NOT_ANALYZED: i32 = 2;

#[derive(Parser)]
#[command(name = "tracehint")]
#[command(about = "Run a Python snippet, classify its traceback and suggest a fix.")]
struct Cli {
    /// Path to config file (default: ~/.tracehint/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session: type code, submit with an empty line
    Repl {
        /// Execution timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Analyze a source file (or stdin with `-`)
    Run {
        file: Option<PathBuf>,
        /// Execution timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify an already captured traceback (file or stdin)
    Explain {
        file: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the remediation rules
    Rules,
    /// Show configuration
    Config,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn load_config(path: Option<&Path>, timeout: Option<u64>) -> Config {
    let mut cfg = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(secs) = timeout {
        cfg.sandbox.timeout_secs = secs;
    }
    cfg
}

fn build_analyzer(cfg: &Config) -> Result<Analyzer, ArtifactError> {
    let classifier = Arc::new(cfg.load_classifier()?);
    let sandbox = ProcessSandbox::new(cfg.sandbox_config());
    Ok(Analyzer::new(Box::new(sandbox), classifier))
}

fn install_interrupts() -> Interrupts {
    let interrupts = Interrupts::new();
    if let Err(e) = interrupts.install() {
        log::warn!("Ctrl+C will not cancel running code: {}", e);
    }
    interrupts
}

fn analyze(
    analyzer: &Analyzer,
    interrupts: &Interrupts,
    code: &str,
) -> Result<AnalysisOutcome, PipelineError> {
    let cancel = interrupts.begin();
    let result = analyzer.analyze_with_cancel(code, &cancel);
    interrupts.finish();
    result
}

fn read_input(file: Option<&Path>) -> std::io::Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn fatal_artifact(err: ArtifactError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);
    eprintln!("The classifier model could not be loaded; nothing can be analyzed.");
    std::process::exit(1);
}

/// Print the result of one submission and return the process exit code it maps to.
fn report(result: Result<AnalysisOutcome, PipelineError>, json: bool) -> i32 {
    match result {
        Ok(outcome) => {
            if json {
                match serde_json::to_string_pretty(&outcome) {
                    Ok(s) => println!("{}", s),
                    Err(e) => eprintln!("Error serializing outcome: {}", e),
                }
            } else {
                println!("{}", display::render_outcome(&outcome));
            }
            if outcome.is_success() {
                0
            } else {
                EXIT_FAILURE_OUTCOME
            }
        }
        Err(e) if e.is_validation() => {
            println!("{} {}", "Warning:".yellow(), e);
            EXIT_NOT_ANALYZED
        }
        Err(PipelineError::Sandbox(SandboxError::Cancelled)) => {
            println!("{}", "Cancelled.".yellow());
            EXIT_INTERRUPTED
        }
        Err(e) => {
            eprintln!("{} {}", "Sandbox error:".red().bold(), e);
            EXIT_NOT_ANALYZED
        }
    }
}

fn run_repl(cfg: &Config) {
    let analyzer = match build_analyzer(cfg) {
        Ok(a) => a,
        Err(e) => fatal_artifact(e),
    };
    let interrupts = install_interrupts();

    println!("{}", "tracehint".bold());
    println!(
        "Interpreter: {} (timeout {}s)",
        cfg.sandbox.interpreter.green(),
        cfg.sandbox.timeout_secs
    );
    println!(
        "Enter code, then an empty line to run it. {} clears, {} stops a run, {} exits.\n",
        ":clear".dimmed(),
        "Ctrl+C".dimmed(),
        "Ctrl+D".dimmed()
    );

    let mut rl = match rustyline::DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("{} Failed to initialize readline: {}", "Error:".red(), e);
            return;
        }
    };

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            format!("{} ", "code>".blue().bold())
        } else {
            format!("{} ", "  ...".blue())
        };
        match rl.readline(&prompt) {
            Ok(line) => {
                match line.trim() {
                    ":quit" | ":q" if buffer.is_empty() => break,
                    ":clear" => {
                        buffer.clear();
                        continue;
                    }
                    "" => {}
                    _ => {
                        buffer.push_str(&line);
                        buffer.push('\n');
                        continue;
                    }
                }

                if !buffer.trim().is_empty() {
                    let _ = rl.add_history_entry(buffer.trim_end());
                }
                let start = std::time::Instant::now();
                report(analyze(&analyzer, &interrupts, &buffer), false);
                println!(
                    "{}\n",
                    format!("({:.1}s)", start.elapsed().as_secs_f64()).dimmed()
                );
                buffer.clear();
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                buffer.clear();
                println!("Input discarded. Use Ctrl+D to exit.");
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                if !buffer.trim().is_empty() {
                    report(analyze(&analyzer, &interrupts, &buffer), false);
                }
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }
}

fn run_file(cfg: &Config, file: Option<&Path>, json: bool) -> i32 {
    let code = match read_input(file) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} Failed to read input: {}", "Error:".red().bold(), e);
            return EXIT_NOT_ANALYZED;
        }
    };
    let analyzer = match build_analyzer(cfg) {
        Ok(a) => a,
        Err(e) => fatal_artifact(e),
    };
    let interrupts = install_interrupts();
    report(analyze(&analyzer, &interrupts, &code), json)
}

fn run_explain(cfg: &Config, file: Option<&Path>, json: bool) -> i32 {
    let text = match read_input(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{} Failed to read input: {}", "Error:".red().bold(), e);
            return EXIT_NOT_ANALYZED;
        }
    };
    let analyzer = match build_analyzer(cfg) {
        Ok(a) => a,
        Err(e) => fatal_artifact(e),
    };
    report(analyzer.explain(&text).map(AnalysisOutcome::Failure), json)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Repl { timeout } => {
            let cfg = load_config(config_path, timeout);
            run_repl(&cfg);
        }
        Commands::Run {
            file,
            timeout,
            json,
        } => {
            let cfg = load_config(config_path, timeout);
            std::process::exit(run_file(&cfg, file.as_deref(), json));
        }
        Commands::Explain { file, json } => {
            let cfg = load_config(config_path, None);
            std::process::exit(run_explain(&cfg, file.as_deref(), json));
        }
        Commands::Rules => {
            print!("{}", display::render_rules());
        }
        Commands::Config => {
            let cfg = load_config(config_path, None);
            println!("{}", "Current configuration:".bold());
            println!();
            match cfg.to_toml() {
                Ok(s) => println!("{}", s),
                Err(e) => eprintln!("Error serializing config: {}", e),
            }
        }
    }
}
