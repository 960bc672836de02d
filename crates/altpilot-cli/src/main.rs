use std::fs;
use std::path::{Path, PathBuf};

use altpilot_contracts::config::{ServiceConfig, Settings};
use altpilot_contracts::dom::{Document, NodeId, NodeSpec};
use altpilot_contracts::events::EventLog;
use altpilot_contracts::remote::ActionKind;
use altpilot_engine::overlay::{
    ALT_STATUS_ID, BOTH_STATUS_ID, DUPLICATE_STATUS_ID, KEYWORDS_INPUT_ID, OVERLAY_ID,
    RENAME_STATUS_ID, TITLE_STATUS_ID,
};
use altpilot_engine::resolver::FieldResolver;
use altpilot_engine::service::{HttpMetadataService, MetadataService, ScriptedService};
use altpilot_engine::workflow::RenameState;
use altpilot_engine::OverlayEngine;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "altpilot", version, about = "Altpilot media overlay CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan a host document snapshot for media regions.
    Scan(ScanArgs),
    /// Open the overlay for an asset and print its rendered outline.
    Open(OpenArgs),
    /// Generate a title, alt text, or both for an asset.
    Generate(GenerateArgs),
    /// Duplicate an asset with freshly generated metadata.
    Duplicate(DuplicateArgs),
    /// Drive the filename workflow: propose, scan usage, rename.
    Rename(RenameArgs),
}

#[derive(Debug, Parser)]
struct ScanArgs {
    #[arg(long)]
    doc: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct OpenArgs {
    #[arg(long)]
    doc: PathBuf,
    #[arg(long)]
    asset: String,
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    doc: PathBuf,
    #[arg(long)]
    asset: String,
    /// title, alt, or both.
    #[arg(long, default_value = "title")]
    field: String,
    #[arg(long, default_value = "")]
    keywords: String,
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct DuplicateArgs {
    #[arg(long)]
    doc: PathBuf,
    #[arg(long)]
    asset: String,
    #[arg(long, default_value = "")]
    keywords: String,
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct RenameArgs {
    #[arg(long)]
    doc: PathBuf,
    #[arg(long)]
    asset: String,
    #[arg(long, default_value = "")]
    keywords: String,
    /// Accept the proposed filename without stopping at the proposal.
    #[arg(long)]
    yes: bool,
    /// Override the usage warning when live references exist.
    #[arg(long)]
    force: bool,
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("altpilot error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Scan(args) => run_scan(args),
        Command::Open(args) => run_open(args),
        Command::Generate(args) => run_generate(args),
        Command::Duplicate(args) => run_duplicate(args),
        Command::Rename(args) => run_rename(args),
    }
}

fn run_scan(args: ScanArgs) -> Result<i32> {
    let mut doc = load_document(&args.doc)?;
    let mut engine = build_engine(Settings::default(), None, None, args.events)?;

    let bindings = engine.poll(&mut doc);
    if bindings.is_empty() {
        println!("No media regions found.");
        return Ok(1);
    }
    for binding in &bindings {
        let tag = doc
            .get(binding.node)
            .map(|node| node.tag().to_string())
            .unwrap_or_default();
        println!("{} matched by {}", tag, binding.strategy);
    }
    println!("{} region(s) enhanced.", bindings.len());
    Ok(0)
}

fn run_open(args: OpenArgs) -> Result<i32> {
    let mut doc = load_document(&args.doc)?;
    let settings = load_settings(args.settings.as_deref())?;
    let mut engine = build_engine(settings, None, None, args.events)?;

    engine.open_overlay(&mut doc, &args.asset);
    print_overlay(&doc)?;
    Ok(0)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let kind = match args.field.as_str() {
        "title" => ActionKind::Title,
        "alt" => ActionKind::Alt,
        "both" => ActionKind::Both,
        other => bail!("unknown field {other:?}; expected title, alt, or both"),
    };
    let mut doc = load_document(&args.doc)?;
    let settings = load_settings(args.settings.as_deref())?;
    let mut engine = build_engine(settings, args.endpoint, args.token, args.events)?;

    engine.open_overlay(&mut doc, &args.asset);
    apply_keywords(&mut doc, &args.keywords);
    engine.trigger(&mut doc, kind);

    print_statuses(&doc);
    let resolver = FieldResolver::new();
    println!("title: {}", display_or_none(&resolver.resolve_title(&doc, &args.asset)));
    println!("alt: {}", display_or_none(&resolver.resolve_alt(&doc, &args.asset)));
    Ok(exit_code_from_statuses(&doc))
}

fn run_duplicate(args: DuplicateArgs) -> Result<i32> {
    let mut doc = load_document(&args.doc)?;
    let settings = load_settings(args.settings.as_deref())?;
    let mut engine = build_engine(settings, args.endpoint, args.token, args.events)?;

    engine.open_overlay(&mut doc, &args.asset);
    apply_keywords(&mut doc, &args.keywords);
    engine.trigger(&mut doc, ActionKind::Duplicate);

    print_statuses(&doc);
    Ok(exit_code_from_statuses(&doc))
}

fn run_rename(args: RenameArgs) -> Result<i32> {
    let mut doc = load_document(&args.doc)?;
    let mut settings = load_settings(args.settings.as_deref())?;
    if !settings.features.dangerous_rename_enabled {
        // The flag gates the whole workflow, not just the button.
        if args.settings.is_some() {
            bail!("renaming requires dangerous_rename_enabled in the settings file");
        }
        settings.features.dangerous_rename_enabled = true;
    }
    let mut engine = build_engine(settings, args.endpoint, args.token, args.events)?;

    engine.open_overlay(&mut doc, &args.asset);
    apply_keywords(&mut doc, &args.keywords);
    engine.trigger(&mut doc, ActionKind::Rename);

    let candidate = match rename_state(&engine) {
        RenameState::Proposed { candidate } => candidate,
        _ => {
            print_statuses(&doc);
            return Ok(1);
        }
    };
    println!("Proposed filename: {candidate}");
    if !args.yes {
        println!("Pass --yes to accept the proposal.");
        engine.cancel_rename(&mut doc);
        return Ok(0);
    }

    engine.confirm_rename(&mut doc);
    if let RenameState::BlockedOnWarning { report, .. } = rename_state(&engine) {
        println!(
            "Warning: referenced in {} place(s):",
            report.usage_count
        );
        for line in report.reference_lines() {
            println!("  {line}");
        }
        if !args.force {
            engine.cancel_rename(&mut doc);
            println!("Rename cancelled; pass --force to override.");
            return Ok(2);
        }
        engine.force_rename(&mut doc);
    }

    match rename_state(&engine) {
        RenameState::Done { new_filename } => {
            println!("Renamed to {new_filename}.");
            println!("Existing references to the old filename are not updated automatically.");
            Ok(0)
        }
        _ => {
            print_statuses(&doc);
            Ok(1)
        }
    }
}

fn load_document(path: &Path) -> Result<Document> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read document snapshot {}", path.display()))?;
    let specs: Vec<NodeSpec> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse document snapshot {}", path.display()))?;
    Ok(Document::from_snapshot(&specs))
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(path),
        None => Ok(Settings::default()),
    }
}

fn build_engine(
    settings: Settings,
    endpoint: Option<String>,
    token: Option<String>,
    events: Option<PathBuf>,
) -> Result<OverlayEngine> {
    let service_config = match (endpoint, token) {
        (Some(endpoint), Some(auth_token)) => Some(ServiceConfig {
            endpoint,
            auth_token,
        }),
        (Some(_), None) => bail!("--endpoint requires --token"),
        (None, Some(_)) => bail!("--token requires --endpoint"),
        (None, None) => settings.service.clone(),
    };
    let service: Box<dyn MetadataService> = match service_config {
        Some(config) => Box::new(HttpMetadataService::new(config)),
        None => Box::new(ScriptedService::new()),
    };

    let mut engine = OverlayEngine::new(service, settings.features);
    if let Some(path) = events {
        engine = engine.with_events(EventLog::new(path, Uuid::new_v4().to_string()));
    }
    Ok(engine)
}

fn apply_keywords(doc: &mut Document, keywords: &str) {
    if keywords.is_empty() {
        return;
    }
    if let Some(input) = doc.find_by_element_id(KEYWORDS_INPUT_ID) {
        doc.set_value(input, keywords);
    } else {
        println!("Keywords ignored: enable show_keywords in the settings file.");
    }
}

fn rename_state(engine: &OverlayEngine) -> RenameState {
    engine
        .session()
        .map(|session| session.rename_state().clone())
        .unwrap_or(RenameState::Idle)
}

const STATUS_IDS: &[&str] = &[
    TITLE_STATUS_ID,
    ALT_STATUS_ID,
    BOTH_STATUS_ID,
    DUPLICATE_STATUS_ID,
    RENAME_STATUS_ID,
];

fn print_statuses(doc: &Document) {
    for status_id in STATUS_IDS {
        if let Some(text) = status_line(doc, status_id) {
            println!("{text}");
        }
    }
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() {
        "(none)"
    } else {
        value
    }
}

fn exit_code_from_statuses(doc: &Document) -> i32 {
    let failed = STATUS_IDS.iter().any(|status_id| {
        doc.find_by_element_id(status_id)
            .and_then(|id| doc.get(id))
            .and_then(|node| node.attr("data-status"))
            .is_some_and(|status| status == "error")
    });
    if failed {
        1
    } else {
        0
    }
}

fn status_line(doc: &Document, status_id: &str) -> Option<String> {
    let node = doc.get(doc.find_by_element_id(status_id)?)?;
    if node.attr("data-visible") != Some("true") || node.text().is_empty() {
        return None;
    }
    Some(node.text().to_string())
}

fn print_overlay(doc: &Document) -> Result<()> {
    let Some(overlay) = doc.find_by_element_id(OVERLAY_ID) else {
        bail!("overlay did not open");
    };
    print_outline(doc, overlay, 0);
    Ok(())
}

fn print_outline(doc: &Document, node: NodeId, depth: usize) {
    let Some(current) = doc.get(node) else {
        return;
    };
    let mut line = format!("{}{}", "  ".repeat(depth), current.tag());
    if let Some(element_id) = current.element_id() {
        line.push('#');
        line.push_str(element_id);
    }
    for class in current.classes() {
        line.push('.');
        line.push_str(class);
    }
    if current.attr("disabled").is_some() {
        line.push_str(" [disabled]");
    }
    if let Some(value) = current.value().filter(|value| !value.is_empty()) {
        line.push_str(&format!(" value={value:?}"));
    }
    if !current.text().is_empty() {
        line.push_str(&format!(" {:?}", current.text()));
    }
    println!("{line}");
    for child in current.children() {
        print_outline(doc, *child, depth + 1);
    }
}
