use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod app;
mod catalog;
mod checker;
mod cli;
mod config;
mod extract;
mod inference;
mod job;
mod prompt;
mod templates;
mod util;

use app::AppState;
use catalog::{display_location, ArtifactKind, Catalog, DiscoveryLayout};
use cli::{
    AnalyzeArgs, CheckArgs, Command, ListArgs, PromptArgs, RootArgs, SelectionArgs, ShowArgs,
    ShowKind,
};
use config::Config;
use extract::PdfTextExtractor;
use inference::{CommandClient, CompletionClient, ModelId, OpenAiClient};
use job::{assemble_prompt, JobServices, JobStatus};
use prompt::AnalysisScope;

fn main() -> Result<()> {
    let args = RootArgs::parse();

    let default_level = if args.global.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Command::Models = args.command {
        return cmd_models();
    }

    let root = resolve_root(args.global.root.as_deref())?;
    let config = config::load_config(args.global.config.as_deref(), &root)?;
    let mut state = AppState::discover(DiscoveryLayout {
        root,
        resources_dir: config.resources_dir.clone(),
        reference_spec_name: config.reference_spec_name.clone(),
    });

    match args.command {
        Command::List(args) => cmd_list(&state, &config, &args),
        Command::Show(args) => cmd_show(&mut state, &args),
        Command::Check(args) => cmd_check(&mut state, &config, &args),
        Command::Prompt(args) => cmd_prompt(&mut state, &config, &args),
        Command::Analyze(args) => cmd_analyze(&mut state, &config, &args),
        Command::Models => cmd_models(),
    }
}

fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let root = match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("resolve working directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("resolve project root {}", root.display()))
}

fn build_services(config: &Config) -> JobServices {
    let checker = checker::for_host(
        &config.checker_binary,
        &config.windows_checker_path,
        &config.checker_locale,
    );
    let completion: Arc<dyn CompletionClient> = match &config.lm_command {
        Some(command) => Arc::new(CommandClient::new(command.clone())),
        None => Arc::new(OpenAiClient::from_env(&config.api_base, &config.api_key_env)),
    };
    JobServices {
        checker,
        extractor: Arc::new(PdfTextExtractor),
        completion,
    }
}

fn apply_selections(state: &mut AppState, selection: &SelectionArgs) -> Result<()> {
    let requested = [
        (ArtifactKind::RuleSpec, &selection.ruleset),
        (ArtifactKind::GeneratedAssertions, &selection.assertions),
        (ArtifactKind::SystemModel, &selection.system),
        (ArtifactKind::ReferenceSpec, &selection.reference_spec),
        (ArtifactKind::AgentSpec, &selection.agent_spec),
    ];
    for (kind, value) in requested {
        if let Some(value) = value {
            let index = resolve_selector(state.catalog(kind), value)?;
            state.select(kind, Some(index));
        }
    }
    Ok(())
}

/// Match a file name first, then a zero-based index.
fn resolve_selector(catalog: &Catalog, value: &str) -> Result<usize> {
    if let Some(index) = catalog.position(value) {
        return Ok(index);
    }
    if let Ok(index) = value.parse::<usize>() {
        if index < catalog.len() {
            return Ok(index);
        }
        return Err(anyhow!(
            "{} index {index} out of range ({} available)",
            catalog.kind.label(),
            catalog.len()
        ));
    }
    if catalog.is_empty() {
        return Err(anyhow!("no {} found", catalog.kind.label()));
    }
    let available = catalog
        .entries()
        .iter()
        .map(|entry| entry.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(anyhow!(
        "no {} named {value:?} (available: {available})",
        catalog.kind.label()
    ))
}

#[derive(Serialize)]
struct ListReport {
    root: PathBuf,
    checker: String,
    catalogs: Vec<CatalogReport>,
}

#[derive(Serialize)]
struct CatalogReport {
    kind: ArtifactKind,
    label: &'static str,
    selected: Option<usize>,
    entries: Vec<EntryReport>,
}

#[derive(Serialize)]
struct EntryReport {
    name: String,
    path: PathBuf,
    location: String,
}

fn cmd_list(state: &AppState, config: &Config, args: &ListArgs) -> Result<()> {
    let layout = state.layout();
    let report = ListReport {
        root: layout.root.clone(),
        checker: build_services(config).checker.describe(),
        catalogs: state
            .catalogs()
            .map(|catalog| CatalogReport {
                kind: catalog.kind,
                label: catalog.kind.label(),
                selected: catalog.selection(),
                entries: catalog
                    .entries()
                    .iter()
                    .map(|entry| EntryReport {
                        name: entry.name.clone(),
                        path: entry.path.clone(),
                        location: display_location(entry, catalog.kind, layout),
                    })
                    .collect(),
            })
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Root: {}", report.root.display());
    println!("Checker: {}", report.checker);
    for catalog in &report.catalogs {
        println!();
        println!("{}:", catalog.label);
        if catalog.entries.is_empty() {
            println!("  (none)");
        }
        for (index, entry) in catalog.entries.iter().enumerate() {
            let marker = if catalog.selected == Some(index) { '*' } else { ' ' };
            println!("  {marker} [{index}] {:<32} {}", entry.name, entry.location);
        }
    }
    Ok(())
}

fn cmd_show(state: &mut AppState, args: &ShowArgs) -> Result<()> {
    apply_selections(state, &args.selection)?;
    let kind = match args.kind {
        ShowKind::Ruleset => ArtifactKind::RuleSpec,
        ShowKind::System => ArtifactKind::SystemModel,
    };
    let content = state.selected_content(kind).ok_or_else(|| {
        anyhow!(
            "no {} found in {}",
            kind.label(),
            state.layout().root.display()
        )
    })?;
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn cmd_check(state: &mut AppState, config: &Config, args: &CheckArgs) -> Result<()> {
    apply_selections(state, &args.selection)?;
    let artifact = state
        .catalog(ArtifactKind::GeneratedAssertions)
        .selected()
        .ok_or_else(|| {
            anyhow!(
                "no generated assertions found under {}",
                state.layout().root.join(catalog::ASSERTIONS_DIR).display()
            )
        })?;
    let result = build_services(config).checker.invoke(&artifact.path);
    println!("{}", result.text);
    if !result.success {
        return Err(anyhow!("checker failed for {}", artifact.name));
    }
    Ok(())
}

fn cmd_prompt(state: &mut AppState, config: &Config, args: &PromptArgs) -> Result<()> {
    apply_selections(state, &args.selection)?;
    let services = build_services(config);
    let prompt = assemble_prompt(&state.snapshot(), &services, &mut |phase| {
        tracing::info!(%phase, "prompt phase");
    });
    write_output(args.out.as_deref(), &prompt.into_string(), "prompt")
}

fn cmd_analyze(state: &mut AppState, config: &Config, args: &AnalyzeArgs) -> Result<()> {
    apply_selections(state, &args.selection)?;
    let scope = AnalysisScope::from_toggles(args.rule_rule, args.model_rule);
    let model = args.model.unwrap_or(config.default_model);
    eprintln!("{}", scope.describe());

    state.start_analysis(model, scope, build_services(config));
    state.job_mut().wait(|status| eprintln!("{status}"));
    if state.job().status() != JobStatus::Complete {
        return Err(anyhow!("analysis ended without a result"));
    }

    write_output(args.out.as_deref(), state.job().result_text(), "report")
}

fn cmd_models() -> Result<()> {
    for model in ModelId::ALL {
        if model.is_recommended() {
            println!("{model} (recommended)");
        } else {
            println!("{model}");
        }
    }
    Ok(())
}

fn write_output(out: Option<&Path>, text: &str, what: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("write {what} {}", path.display()))?;
            eprintln!("Wrote {what} to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
