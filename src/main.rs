//! CLI entry point for `htmedit`.
//!
//! The CLI stands in for the rich-text host: it loads a document, optionally
//! takes an edited serialization from a file, and saves it through the same
//! pipeline an interactive editor would drive.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};

use htmedit::assets::{manifest, resolver};
use htmedit::codec::{body, charset};
use htmedit::config::Config;
use htmedit::html::dom::HtmlTree;
use htmedit::pipeline::{EditPipeline, PipelineOptions, SaveReport};

#[derive(Parser)]
#[command(
    name = "htmedit",
    version,
    about = "Round-trip editor core for Outlook HTML emails",
    long_about = "Opens an Outlook-exported .htm email and its _files folder, and saves \
edited bodies back without disturbing the Office markup around them."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show subject, asset folder and image references of a document
    Inspect {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Replace the subject line and save
    Subject {
        file: PathBuf,
        text: String,
        /// Write to this file instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Save a document (optionally with an edited body) to a new location
    SaveAs {
        file: PathBuf,
        target: PathBuf,
        /// Full editor serialization to save instead of the unchanged document
        #[arg(long, value_name = "HTML_FILE")]
        edited: Option<PathBuf>,
        /// New subject text
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Answer a virtual resource request the editing host would make
    Resource { file: PathBuf, url: String },
    /// Write the current configuration to the config file
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = htmedit::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let options = PipelineOptions::from(&config);
    match cli.command {
        Commands::Inspect { file, json } => cmd_inspect(&file, json, options),
        Commands::Subject { file, text, output } => {
            cmd_subject(&file, &text, output.as_deref(), options)
        }
        Commands::SaveAs {
            file,
            target,
            edited,
            subject,
            json,
        } => cmd_save_as(
            &file,
            &target,
            edited.as_deref(),
            subject.as_deref(),
            json,
            options,
        ),
        Commands::Resource { file, url } => cmd_resource(&file, &url, options),
        Commands::InitConfig { force } => cmd_init_config(&config, force),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = htmedit::config::log_file_path(config);
    let log_dir = htmedit::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_name = log_file
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "htmedit.log".into());
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "htmedit", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn open(file: &Path, options: PipelineOptions) -> anyhow::Result<EditPipeline> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let mut pipeline = EditPipeline::new(options);
    pipeline.load(file)?;
    Ok(pipeline)
}

/// Print what the pipeline sees in a document.
fn cmd_inspect(file: &Path, json: bool, options: PipelineOptions) -> anyhow::Result<()> {
    let pipeline = open(file, options)?;
    let Some(doc) = pipeline.document() else {
        anyhow::bail!("No document loaded");
    };

    let fragment = HtmlTree::parse_body_fragment(&body::extract_edited(doc.servable_html()));
    let references: Vec<(String, String)> = resolver::discover(&fragment)
        .into_iter()
        .map(|r| (r.attribute.as_str().to_string(), r.original_value))
        .collect();
    let manifest_images = manifest::read_referenced_images(&doc.asset_dir());
    let declared = charset::declared_charset(doc.original_raw());

    if json {
        let refs: Vec<serde_json::Value> = references
            .iter()
            .map(|(attr, value)| {
                serde_json::json!({
                    "attribute": attr,
                    "value": truncate(value, 120),
                })
            })
            .collect();
        let out = serde_json::json!({
            "file": doc.file_path().to_string_lossy(),
            "subject": doc.subject().plain_text,
            "subject_found": doc.subject().is_found(),
            "asset_dir": doc.asset_dir().to_string_lossy(),
            "asset_dir_exists": doc.asset_dir().is_dir(),
            "declared_charset": declared,
            "images": refs,
            "manifest_images": manifest_images,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {:<18} {}", "File:", doc.file_path().display());
    println!("  {:<18} {}", "Subject:", pipeline.subject());
    println!(
        "  {:<18} {}{}",
        "Asset folder:",
        doc.asset_dir().display(),
        if doc.asset_dir().is_dir() { "" } else { " (missing)" }
    );
    println!(
        "  {:<18} {}",
        "Declared charset:",
        declared.as_deref().unwrap_or("(none)")
    );
    println!("  {:<18} {}", "Image references:", references.len());
    for (attr, value) in &references {
        println!("    {attr:<8} {}", truncate(value, 100));
    }
    if !manifest_images.is_empty() {
        println!("  {:<18} {}", "Manifest images:", manifest_images.join(", "));
    }
    println!();
    Ok(())
}

/// Replace the subject and save.
fn cmd_subject(
    file: &Path,
    text: &str,
    output: Option<&Path>,
    options: PipelineOptions,
) -> anyhow::Result<()> {
    let mut pipeline = open(file, options)?;
    pipeline.set_subject(text);
    let edited = servable(&pipeline)?;
    let target = output.unwrap_or(file);
    let report = pipeline.save_html(target, &edited)?;
    print_report_table(&report, None);
    Ok(())
}

/// Save to a new location, optionally with an edited serialization.
fn cmd_save_as(
    file: &Path,
    target: &Path,
    edited: Option<&Path>,
    subject: Option<&str>,
    json: bool,
    options: PipelineOptions,
) -> anyhow::Result<()> {
    let mut pipeline = open(file, options)?;
    if let Some(subject) = subject {
        pipeline.set_subject(subject);
    }
    let edited_html = match edited {
        Some(path) => {
            let bytes = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
            charset::decode_document_bytes(&bytes)
        }
        None => servable(&pipeline)?,
    };

    let start = Instant::now();
    let report = pipeline.save_html(target, &edited_html)?;
    let elapsed = start.elapsed();

    if json {
        print_report_json(&report, elapsed)?;
    } else {
        print_report_table(&report, Some(elapsed));
    }
    Ok(())
}

/// Serve one virtual resource and describe the response.
fn cmd_resource(file: &Path, url: &str, options: PipelineOptions) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let pipeline = open(file, options)?;
    match pipeline.respond(url) {
        Some(resp) => {
            println!("{}  {}", resp.content_type, format_size(resp.body.len(), BINARY));
            Ok(())
        }
        None => anyhow::bail!("Not found: {url}"),
    }
}

/// Write the effective configuration so it can be edited by hand.
fn cmd_init_config(config: &Config, force: bool) -> anyhow::Result<()> {
    if let Some(path) = htmedit::config::config_file_path() {
        if path.exists() && !force {
            anyhow::bail!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            );
        }
    }
    let path = htmedit::config::save_config(config)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn servable(pipeline: &EditPipeline) -> anyhow::Result<String> {
    pipeline
        .document()
        .map(|d| d.servable_html().to_string())
        .ok_or_else(|| anyhow::anyhow!("No document loaded"))
}

fn print_report_table(report: &SaveReport, elapsed: Option<std::time::Duration>) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<16} {}", "Saved:", report.path.display());
    println!(
        "  {:<16} {}",
        "Size:",
        format_size(report.bytes_written, BINARY)
    );
    println!("  {:<16} {}", "Asset folder:", report.asset_dir.display());
    println!("  {:<16} {}", "Images found:", report.image_count);
    println!("  {:<16} {}", "Files used:", report.used_files.len());
    if let Some(elapsed) = elapsed {
        println!("  {:<16} {:.2?}", "Time:", elapsed);
    }
    if report.used_fallback_shell() {
        println!("  Body could not be merged; a minimal document was written.");
    }
    if !report.warnings.is_empty() {
        println!("  Warnings:");
        for w in &report.warnings {
            println!("    - {w}");
        }
    }
    println!();
}

fn print_report_json(report: &SaveReport, elapsed: std::time::Duration) -> anyhow::Result<()> {
    let out = serde_json::json!({
        "path": report.path.to_string_lossy(),
        "asset_dir": report.asset_dir.to_string_lossy(),
        "bytes_written": report.bytes_written,
        "image_count": report.image_count,
        "used_files": report.used_files.iter().collect::<Vec<_>>(),
        "fallback_shell": report.used_fallback_shell(),
        "warnings": report.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        "save_time_ms": elapsed.as_millis(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut s: String = value.chars().take(max).collect();
    s.push('…');
    s
}
