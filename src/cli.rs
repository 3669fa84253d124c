//! CLI argument parsing for the analysis workflow.
//!
//! The CLI stays thin: it resolves selections and configuration, then hands
//! off to the controller so the same pipeline can back other front ends.
use crate::inference::ModelId;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "sleec-report",
    version,
    about = "Plain-language reports for SLEEC rule verification output",
    after_help = "Commands:\n  list                         Show discovered artifacts and the current selections\n  show ruleset|system          Print the selected ruleset or system model\n  check                        Run the checker on the selected assertions\n  prompt                       Compile the analysis prompt without sending it\n  analyze --rule-rule          Run the checker and ask the LM for a report\n  models                       List the supported models\n\nExamples:\n  sleec-report list --root ./robot\n  sleec-report check --assertions robot-assertions.csp\n  sleec-report analyze --rule-rule --model o3-mini --out report.txt",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project directory holding .sleec/.rct files, src-gen and LLM Resources
    #[arg(long, value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Config file (defaults to <root>/sleec-report.json, then the user config dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Emit debug logs on stderr
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    List(ListArgs),
    Show(ShowArgs),
    Check(CheckArgs),
    Prompt(PromptArgs),
    Analyze(AnalyzeArgs),
    /// List the supported models
    Models,
}

/// Overrides for the default selections. Each accepts a file name or a
/// zero-based index into the sorted catalog.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Rule specification (*.sleec)
    #[arg(long, value_name = "NAME|INDEX")]
    pub ruleset: Option<String>,

    /// Generated assertions (src-gen/*-assertions.csp)
    #[arg(long, value_name = "NAME|INDEX")]
    pub assertions: Option<String>,

    /// System model (*.rct)
    #[arg(long, value_name = "NAME|INDEX")]
    pub system: Option<String>,

    /// Reference specification document
    #[arg(long, value_name = "NAME|INDEX")]
    pub reference_spec: Option<String>,

    /// Agent specification document
    #[arg(long, value_name = "NAME|INDEX")]
    pub agent_spec: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Show discovered artifacts and the current selections")]
pub struct ListArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShowKind {
    Ruleset,
    System,
}

#[derive(Parser, Debug)]
#[command(about = "Print the selected ruleset or system model")]
pub struct ShowArgs {
    pub kind: ShowKind,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Run the checker on the selected assertions file")]
pub struct CheckArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Compile the rule-rule analysis prompt without sending it")]
pub struct PromptArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Write the prompt here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Verify the selected ruleset and ask the LM for a report")]
pub struct AnalyzeArgs {
    /// Analyse rule-rule conflicts and redundancies
    #[arg(long)]
    pub rule_rule: bool,

    /// Analyse model-rule conflicts
    #[arg(long)]
    pub model_rule: bool,

    /// Model to ask (defaults to the configured model)
    #[arg(long, value_enum)]
    pub model: Option<ModelId>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Write the report here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}
