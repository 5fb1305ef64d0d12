mod convert;
mod ecosystem;
mod locate;
mod manifest;
mod purl;
mod report;
mod results;
mod rules;
mod severity;
mod telemetry;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_sarif::sarif::Sarif;
use tracing::{info, warn};

use crate::convert::convert;
use crate::ecosystem::{Ecosystem, SUPPORTED_MANIFESTS};
use crate::report::parse_report;
use crate::severity::VulnerabilitySeverity;
use crate::telemetry::{init_logging, with_span};

/// Exit code when the aggregate severity violates `--fail-on`.
const POLICY_FAILURE: u8 = 2;

/// CLI arguments for rhda-sarif execution.
#[derive(Parser, Debug)]
#[command(
    name = "rhda-sarif",
    about = "Convert Red Hat Dependency Analytics reports into SARIF pointing at manifest lines.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "Dependency analysis report (JSON).")]
    report: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "Manifest the report was produced for. Detected in the working directory when omitted."
    )]
    manifest: Option<PathBuf>,
    #[arg(
        long,
        value_enum,
        help = "Manifest ecosystem. Derived from the manifest file name when omitted."
    )]
    ecosystem: Option<Ecosystem>,
    #[arg(long, value_name = "PATH", help = "SARIF destination; `-` writes to stdout.")]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = FailOn::Error)]
    fail_on: FailOn,
}

/// Aggregate severity that makes the run fail.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FailOn {
    Error,
    Warning,
    Never,
}

impl FailOn {
    fn fails(self, severity: VulnerabilitySeverity) -> bool {
        match self {
            FailOn::Error => severity == VulnerabilitySeverity::Error,
            FailOn::Warning => severity >= VulnerabilitySeverity::Warning,
            FailOn::Never => false,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    init_logging();
    let manifest = match cli.manifest {
        Some(path) => path,
        None => detect_manifest(Path::new("."))?,
    };
    let ecosystem = resolve_ecosystem(cli.ecosystem, &manifest)?;
    info!("converting {} as {ecosystem}", manifest.display());

    let text = fs::read_to_string(&cli.report)
        .with_context(|| format!("failed to read report {}", cli.report.display()))?;
    let report = with_span("report", || parse_report(&text, ecosystem))
        .with_context(|| format!("failed to load report {}", cli.report.display()))?;
    let conversion = convert(&report, &manifest, ecosystem)?;
    if should_validate_sarif() {
        validate_sarif(&conversion.sarif)?;
    }
    with_span("sarif.write", || -> Result<()> {
        let mut writer = output_writer(cli.output.as_deref())?;
        serde_json::to_writer(&mut writer, &conversion.sarif)
            .context("failed to serialize SARIF output")?;
        writer
            .write_all(b"\n")
            .context("failed to write SARIF output")?;
        writer.flush().context("failed to flush SARIF output")?;
        Ok(())
    })?;

    let severity = conversion.severity;
    eprintln!("severity={severity}");
    if cli.fail_on.fails(severity) {
        return Ok(ExitCode::from(POLICY_FAILURE));
    }
    if severity != VulnerabilitySeverity::None {
        warn!("vulnerabilities found with {severity} severity");
    }
    Ok(ExitCode::SUCCESS)
}

/// First supported manifest present in `dir`.
fn detect_manifest(dir: &Path) -> Result<PathBuf> {
    SUPPORTED_MANIFESTS
        .iter()
        .map(|(name, _)| dir.join(name))
        .find(|path| path.is_file())
        .with_context(|| {
            let names: Vec<&str> = SUPPORTED_MANIFESTS.iter().map(|(name, _)| *name).collect();
            format!(
                "no supported manifest found in {}; expected one of {}",
                dir.display(),
                names.join(", ")
            )
        })
}

fn resolve_ecosystem(explicit: Option<Ecosystem>, manifest: &Path) -> Result<Ecosystem> {
    if let Some(ecosystem) = explicit {
        return Ok(ecosystem);
    }
    Ecosystem::from_manifest_path(manifest)
        .with_context(|| format!("unsupported manifest {}", manifest.display()))
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => {
            Ok(Box::new(File::create(path).with_context(|| {
                format!("failed to open {}", path.display())
            })?))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

fn should_validate_sarif() -> bool {
    is_enabled(std::env::var("RHDA_VALIDATE_SARIF").ok().as_deref())
}

fn is_enabled(value: Option<&str>) -> bool {
    value.is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true"))
}

fn validate_sarif(sarif: &Sarif) -> Result<()> {
    let schema = serde_json::from_str(include_str!("assets/sarif-shape.schema.json"))
        .context("load SARIF schema")?;
    let compiled = jsonschema::validator_for(&schema)
        .map_err(|err| anyhow::anyhow!("compile SARIF schema: {err}"))?;
    let value = serde_json::to_value(sarif).context("serialize SARIF")?;
    let errors: Vec<String> = compiled
        .iter_errors(&value)
        .map(|error| error.to_string())
        .collect();
    if !errors.is_empty() {
        let message = errors.join("\n");
        anyhow::bail!("SARIF schema validation failed:\n{message}");
    }
    Ok(())
}
