//! flowmine CLI - learn workflows from command history and run them
//!
//! Usage:
//!   flowmine init                      Write default config and storage dirs
//!   flowmine track <command> [args]    Record one command execution
//!   flowmine discover                  Mine patterns from history
//!   flowmine recommend --phase 02      Suggest patterns for the current context
//!   flowmine templates generate        Turn good patterns into templates
//!   flowmine workflow run <chain>      Execute a workflow chain

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use flowmine_core::{
    CommandExecution, CommandSequence, DiscoveredPattern, FailureStrategy, FlowConfig,
    SequenceSource,
};
use flowmine_engine::{
    CommandExecutor, ResumeMode, RunOptions, ShellExecutor, WorkflowEngine, WorkflowResult,
};
use flowmine_mining::{MiningOptions, PatternMiner, RecommendationContext};
use flowmine_templates::{export_pattern, TemplateRegistry, TemplateSynthesizer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "flowmine")]
#[command(author, version, about = "Mine command history into runnable workflows")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write default configuration and storage directories
    Init {
        /// Repository path (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Record a single command execution
    Track {
        /// Command that ran
        command: String,

        /// Arguments it ran with
        args: Option<String>,

        /// How long it took
        #[arg(long, default_value = "0")]
        duration_ms: f64,

        /// Mark the execution as failed
        #[arg(long)]
        failed: bool,

        /// JSON object stored alongside the execution
        #[arg(long, value_name = "JSON")]
        context: Option<String>,

        /// Append to an open sequence instead of the raw execution log
        #[arg(long, value_name = "ID")]
        sequence: Option<String>,
    },

    /// Manage recorded command sequences
    Record {
        #[command(subcommand)]
        action: RecordCommands,
    },

    /// Mine recurring command sequences into patterns
    Discover {
        #[arg(long)]
        min_frequency: Option<u64>,

        #[arg(long)]
        min_success_rate: Option<f64>,

        #[arg(long)]
        min_length: Option<usize>,

        #[arg(long)]
        max_length: Option<usize>,
    },

    /// Recommend patterns for the current context
    Recommend {
        /// Current phase, e.g. 02
        #[arg(long)]
        phase: Option<String>,

        /// Recently run commands, oldest first
        #[arg(long = "recent", value_name = "COMMAND")]
        recent: Vec<String>,

        /// What the workflow is trying to achieve
        #[arg(long)]
        goal: Option<String>,
    },

    /// Suggest optimizations for a named workflow
    Optimize {
        /// Workflow name the sequences were recorded under
        workflow: String,

        /// Store parallel suggestions on matching patterns
        #[arg(long)]
        attach: bool,
    },

    /// Summarize patterns, optimizations and history stats
    Analyze,

    /// Query discovered patterns
    Patterns {
        #[command(subcommand)]
        action: PatternCommands,
    },

    /// Print the template synthesized from a pattern
    Export {
        /// Pattern ID
        id: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Workflow template management
    Templates {
        #[command(subcommand)]
        action: TemplateCommands,
    },

    /// Run and control workflow chains
    Workflow {
        #[command(subcommand)]
        action: WorkflowCommands,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Open a new sequence and print its ID
    Start {
        /// Workflow the sequence belongs to
        #[arg(long)]
        workflow: Option<String>,
    },

    /// Seal an open sequence
    Complete {
        /// Sequence ID
        id: String,
    },

    /// Import a sequence from a JSON file
    Import {
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum PatternCommands {
    /// List patterns by quality
    List {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show one pattern as JSON
    Show {
        /// Pattern ID
        id: String,
    },

    /// Search names, descriptions and commands
    Search {
        query: String,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List built-in and discovered templates
    List,

    /// Generate templates for the given patterns, or every good one
    Generate {
        /// Pattern IDs (omit to use the quality threshold)
        ids: Vec<String>,

        /// Override the configured quality threshold
        #[arg(long)]
        min_quality: Option<f64>,
    },
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// Run a chain from the top
    Run {
        /// Chain name
        chain: String,

        /// Variable binding, e.g. phase=02
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Failure strategy (defaults to the configured one)
        #[arg(short, long)]
        strategy: Option<CliStrategy>,

        /// Skip interactive confirmation in steps
        #[arg(long)]
        yolo: bool,

        /// Working directory for steps
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Show run state for one chain or all of them
    Status {
        chain: Option<String>,
    },

    /// Mark a chain's stored run state as paused
    Pause {
        chain: String,
    },

    /// Resume a paused chain
    Resume {
        chain: String,

        /// Run only the steps still pending instead of restarting
        #[arg(long)]
        from_pending: bool,

        /// Working directory for steps
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Restore a chain's state to its latest checkpoint
    Rollback {
        chain: String,
    },

    /// Drop finished runs, or one chain's state
    Clear {
        chain: Option<String>,
    },
}

/// CLI-friendly failure strategy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStrategy {
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl From<CliStrategy> for FailureStrategy {
    fn from(s: CliStrategy) -> Self {
        match s {
            CliStrategy::StopOnError => FailureStrategy::StopOnError,
            CliStrategy::ContinueOnError => FailureStrategy::ContinueOnError,
            CliStrategy::RollbackOnError => FailureStrategy::RollbackOnError,
        }
    }
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path } => cmd_init(path).await,
        Commands::Track {
            command,
            args,
            duration_ms,
            failed,
            context,
            sequence,
        } => cmd_track(command, args, duration_ms, failed, context, sequence).await,
        Commands::Record { action } => cmd_record(action).await,
        Commands::Discover {
            min_frequency,
            min_success_rate,
            min_length,
            max_length,
        } => cmd_discover(min_frequency, min_success_rate, min_length, max_length).await,
        Commands::Recommend {
            phase,
            recent,
            goal,
        } => cmd_recommend(phase, recent, goal).await,
        Commands::Optimize { workflow, attach } => cmd_optimize(workflow, attach).await,
        Commands::Analyze => cmd_analyze().await,
        Commands::Patterns { action } => cmd_patterns(action).await,
        Commands::Export { id, output } => cmd_export(id, output).await,
        Commands::Templates { action } => cmd_templates(action).await,
        Commands::Workflow { action } => cmd_workflow(action).await,
    }
}

fn load_config() -> Result<FlowConfig> {
    let root = std::env::current_dir().context("Failed to read current directory")?;
    let config = FlowConfig::load_or_default(&root).context("Failed to load config")?;
    Ok(config.rooted(&root))
}

async fn open_miner(config: &FlowConfig) -> PatternMiner {
    PatternMiner::open(config).await
}

async fn open_engine(config: &FlowConfig, dir: &Path) -> Result<WorkflowEngine> {
    let executor: Arc<dyn CommandExecutor> = Arc::new(ShellExecutor::new(dir));
    WorkflowEngine::open(config, executor)
        .await
        .context("Failed to load workflow templates")
}

fn print_pattern_line(p: &DiscoveredPattern) {
    println!(
        "  {} - {} (quality {:.1}, seen {}x, {:.0}% success)",
        p.id,
        p.name,
        p.quality_score,
        p.frequency,
        p.success_rate * 100.0
    );
    println!("    {}", p.sequence.join(" -> "));
}

async fn cmd_init(path: PathBuf) -> Result<()> {
    info!("Initializing flowmine in {:?}", path);

    let config_path = FlowConfig::write_default(&path).context("Failed to write config")?;
    let config = FlowConfig::default().rooted(&path);
    tokio::fs::create_dir_all(config.templates_path()).await?;

    println!("Initialized flowmine in {:?}", path);
    println!("Created:");
    println!("  {}", config_path.display());
    println!("  {}", config.templates_path().display());
    println!("\nNext steps:");
    println!("  1. Record commands with 'flowmine track <command> [args]'");
    println!("  2. Run 'flowmine discover' once history accumulates");
    println!("  3. Use 'flowmine templates generate' to turn patterns into chains");

    Ok(())
}

async fn cmd_track(
    command: String,
    args: Option<String>,
    duration_ms: f64,
    failed: bool,
    context: Option<String>,
    sequence: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let mut miner = open_miner(&config).await;

    let mut execution = CommandExecution::new(command, !failed, duration_ms);
    if let Some(args) = args {
        execution = execution.with_args(args);
    }
    if let Some(context) = context {
        let value: serde_json::Value =
            serde_json::from_str(&context).context("Failed to parse --context JSON")?;
        execution = execution.with_context(value);
    }
    let line = execution.full_command();

    match sequence {
        Some(id) => {
            miner
                .store_mut()
                .add_to_sequence(&id, execution)
                .await
                .with_context(|| format!("Failed to add to sequence {}", id))?;
            println!("Added '{}' to {}", line, id);
        }
        None => {
            miner.track_execution(execution).await?;
            println!("Tracked '{}'", line);
        }
    }

    Ok(())
}

async fn cmd_record(action: RecordCommands) -> Result<()> {
    let config = load_config()?;
    let mut miner = open_miner(&config).await;

    match action {
        RecordCommands::Start { workflow } => {
            let id = miner
                .store_mut()
                .start_sequence(SequenceSource::Manual, workflow)
                .await?;
            println!("{}", id);
        }

        RecordCommands::Complete { id } => {
            let sealed = miner
                .store_mut()
                .complete_sequence(&id)
                .await
                .with_context(|| format!("Failed to complete sequence {}", id))?;
            println!(
                "Sealed {}: {} commands, {:.0}% success, {:.0}ms",
                sealed.id,
                sealed.commands.len(),
                sealed.success_rate * 100.0,
                sealed.total_duration
            );
        }

        RecordCommands::Import { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .context("Failed to read sequence file")?;
            let sequence: CommandSequence =
                serde_json::from_str(&content).context("Failed to parse sequence JSON")?;
            let id = sequence.id.clone();
            miner.track_sequence(sequence).await?;
            println!("Imported sequence {}", id);
        }
    }

    Ok(())
}

async fn cmd_discover(
    min_frequency: Option<u64>,
    min_success_rate: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
) -> Result<()> {
    let config = load_config()?;
    let mut miner = open_miner(&config).await;

    let mut options = MiningOptions::from(&config.mining);
    if let Some(v) = min_frequency {
        options.min_frequency = v;
    }
    if let Some(v) = min_success_rate {
        options.min_success_rate = v;
    }
    if let Some(v) = min_length {
        options.min_length = v;
    }
    if let Some(v) = max_length {
        options.max_length = v;
    }

    let patterns = miner.mine_patterns(&options).await?;
    if patterns.is_empty() {
        println!("No patterns found");
        return Ok(());
    }

    println!("Discovered {} patterns:", patterns.len());
    for p in &patterns {
        print_pattern_line(p);
    }
    println!("\nStore now holds {} patterns", miner.patterns().len());

    Ok(())
}

async fn cmd_recommend(phase: Option<String>, recent: Vec<String>, goal: Option<String>) -> Result<()> {
    let config = load_config()?;
    let miner = open_miner(&config).await;

    let mut context = RecommendationContext::default().with_recent(recent);
    if let Some(phase) = phase {
        context = context.with_phase(phase);
    }
    context.workflow_goal = goal;

    let recommendations = miner.get_recommendations(&context);
    if recommendations.is_empty() {
        println!("No recommendations for this context");
        return Ok(());
    }

    println!("Recommendations:");
    for r in &recommendations {
        println!(
            "  {} ({:.0}% relevant)",
            r.pattern.name,
            r.relevance_score * 100.0
        );
        println!("    {}", r.reason);
        println!("    {}", r.pattern.sequence.join(" -> "));
        for (name, value) in &r.suggested_variables {
            println!("    {} = {}", name, value);
        }
    }

    Ok(())
}

async fn cmd_optimize(workflow: String, attach: bool) -> Result<()> {
    let config = load_config()?;
    let mut miner = open_miner(&config).await;

    let suggestions = miner.analyze_optimizations(&workflow);
    if suggestions.is_empty() {
        println!("No optimizations found for {}", workflow);
        return Ok(());
    }

    println!("Optimizations for {}:", workflow);
    for s in &suggestions {
        println!(
            "  [{:?}] {} (saves ~{:.0}ms, {:?} risk)",
            s.kind, s.description, s.estimated_time_savings, s.risk_level
        );
    }

    if attach {
        let updated = miner.attach_optimizations(&workflow).await?;
        println!("\nAttached parallel suggestions to {} patterns", updated);
    }

    Ok(())
}

async fn cmd_analyze() -> Result<()> {
    let config = load_config()?;
    let miner = open_miner(&config).await;

    let analysis = miner.analyze_workflows();
    let stats = miner.store().stats();

    println!("flowmine Analysis");
    println!("=================");
    println!("History: {}", miner.store().path().display());
    println!("\nExecutions: {}", stats.total_executions);
    println!("  Succeeded: {}", stats.successful_executions);
    println!("  Failed: {}", stats.failed_executions);
    println!("  Average time: {:.0}ms", stats.avg_execution_time);
    println!("Sequences: {}", stats.total_sequences);
    println!("Templates generated: {}", stats.templates_generated);

    if !stats.most_used_commands.is_empty() {
        println!("\nMost used commands:");
        for c in &stats.most_used_commands {
            println!("  {:>5}  {}", c.count, c.command);
        }
    }

    println!("\nPatterns: {}", analysis.total_patterns);
    for p in &analysis.top_patterns {
        print_pattern_line(p);
    }
    println!(
        "\nOptimization opportunities: {}",
        analysis.optimization_opportunities
    );
    if !analysis.recommendations.is_empty() {
        println!("Recommendations: {}", analysis.recommendations.len());
    }

    Ok(())
}

async fn cmd_patterns(action: PatternCommands) -> Result<()> {
    let config = load_config()?;
    let miner = open_miner(&config).await;

    match action {
        PatternCommands::List { limit } => {
            let mut patterns: Vec<&DiscoveredPattern> = miner.patterns().iter().collect();
            if patterns.is_empty() {
                println!("No patterns found");
                return Ok(());
            }

            patterns.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
            println!("Patterns:");
            for p in patterns.into_iter().take(limit) {
                print_pattern_line(p);
            }
        }

        PatternCommands::Show { id } => {
            let pattern = miner
                .get_pattern(&id)
                .with_context(|| format!("Pattern not found: {}", id))?;
            println!("{}", serde_json::to_string_pretty(pattern)?);
        }

        PatternCommands::Search { query } => {
            let found = miner.search_patterns(&query);
            if found.is_empty() {
                println!("No patterns match: {}", query);
                return Ok(());
            }

            println!("Matching patterns ({}):", found.len());
            for p in found {
                print_pattern_line(p);
            }
        }
    }

    Ok(())
}

async fn cmd_export(id: String, output: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let miner = open_miner(&config).await;

    let json = export_pattern(miner.patterns(), &id)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            println!("Exported {} to {:?}", id, path);
        }
        None => println!("{}", json),
    }

    Ok(())
}

async fn cmd_templates(action: TemplateCommands) -> Result<()> {
    let config = load_config()?;

    match action {
        TemplateCommands::List => {
            let mut registry = TemplateRegistry::new();
            let discovered = registry.load_dir(&config.templates_path()).await?;

            println!("Templates ({} discovered):", discovered);
            for chain in registry.list() {
                let marker = if chain.metadata.is_some() { "*" } else { " " };
                println!(
                    " {}{} - {} ({} steps, {})",
                    marker,
                    chain.name,
                    chain.description,
                    chain.all_steps().count(),
                    chain.checkpoint_strategy
                );
            }
        }

        TemplateCommands::Generate { ids, min_quality } => {
            let mut miner = open_miner(&config).await;
            let mut synthesizer = TemplateSynthesizer::from_config(&config);
            if let Some(min_quality) = min_quality {
                synthesizer = synthesizer.with_min_quality(min_quality);
            }

            let report = if ids.is_empty() {
                synthesizer.generate_all_templates(miner.patterns()).await
            } else {
                synthesizer.batch_generate(miner.patterns(), &ids).await
            };

            for path in &report.written {
                println!("Wrote {}", path.display());
            }
            for failure in &report.failures {
                warn!("Skipped {}: {}", failure.id, failure.error);
            }
            miner
                .store_mut()
                .record_templates_generated(report.written.len() as u64)
                .await?;

            println!(
                "Generated {} templates ({} failed)",
                report.written.len(),
                report.failures.len()
            );
        }
    }

    Ok(())
}

fn print_result(result: &WorkflowResult) {
    println!();
    println!("Workflow {}: {}", result.chain, result.status);
    println!("  Completed: {}", result.completed_steps.len());
    for step in &result.completed_steps {
        println!("    {}", step);
    }
    if let Some(step) = &result.failed_step {
        println!("  Failed step: {}", step);
    }
    for failure in &result.failures {
        println!("  ! {}: {}", failure.step, failure.error);
    }
    println!("  Checkpoints: {}", result.checkpoints.len());
    println!("  Duration: {:.0}ms", result.duration);
}

/// Feed the executions of a run back into history
async fn track_run(config: &FlowConfig, result: &WorkflowResult) -> Result<()> {
    if result.sequence.commands.is_empty() {
        return Ok(());
    }
    let mut miner = open_miner(config).await;
    miner
        .track_sequence(result.sequence.clone())
        .await
        .context("Failed to record workflow run in history")
}

async fn cmd_workflow(action: WorkflowCommands) -> Result<()> {
    let config = load_config()?;

    match action {
        WorkflowCommands::Run {
            chain,
            vars,
            strategy,
            yolo,
            dir,
        } => {
            let engine = open_engine(&config, &dir).await?;
            let mut options = RunOptions::from(&config.engine);
            if let Some(strategy) = strategy {
                options.failure_strategy = strategy.into();
            }
            options.yolo_mode |= yolo;

            let variables: BTreeMap<String, String> = vars.into_iter().collect();
            let result = engine.run(&chain, variables, options).await?;
            print_result(&result);
            track_run(&config, &result).await?;
        }

        WorkflowCommands::Status { chain } => {
            let engine = open_engine(&config, Path::new(".")).await?;
            let states = match chain {
                Some(name) => vec![engine.status(&name).await?],
                None => engine.statuses().await,
            };

            if states.is_empty() {
                println!("No workflow runs recorded in {}", engine.state_path().display());
                return Ok(());
            }

            for state in states {
                println!("{} - {}", state.chain, state.status);
                println!("  Started: {}", state.start_time);
                println!(
                    "  Completed: {}, pending: {}",
                    state.completed.len(),
                    state.pending.len()
                );
                if let Some(current) = &state.current {
                    println!("  Current: {}", current);
                }
                println!("  Checkpoints: {}", state.checkpoints.len());
            }
        }

        WorkflowCommands::Pause { chain } => {
            let engine = open_engine(&config, Path::new(".")).await?;
            // Runs live in another process never read this file mid-run
            if engine.pause(&chain).await? {
                println!("Paused {}", chain);
            } else {
                println!("Marked stored state of {} as paused", chain);
                println!("A run still live in another process is not interrupted");
            }
        }

        WorkflowCommands::Resume {
            chain,
            from_pending,
            dir,
        } => {
            let engine = open_engine(&config, &dir).await?;
            let mode = if from_pending {
                ResumeMode::FromPending
            } else {
                ResumeMode::FromScratch
            };
            let result = engine.resume(&chain, mode).await?;
            print_result(&result);
            track_run(&config, &result).await?;
        }

        WorkflowCommands::Rollback { chain } => {
            let engine = open_engine(&config, Path::new(".")).await?;
            let checkpoint = engine.rollback(&chain).await?;
            println!(
                "Rolled back {} to {} ({} steps completed)",
                chain,
                checkpoint.timestamp,
                checkpoint.snapshot.completed.len()
            );
        }

        WorkflowCommands::Clear { chain } => {
            let engine = open_engine(&config, Path::new(".")).await?;
            match chain {
                Some(name) => {
                    if engine.cleanup(&name).await? {
                        println!("Removed state for {}", name);
                    } else {
                        println!("No state for {}", name);
                    }
                }
                None => {
                    let dropped = engine.clear_completed().await?;
                    println!("Cleared {} finished runs", dropped);
                }
            }
        }
    }

    Ok(())
}
