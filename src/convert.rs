use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use serde_json::json;
use serde_sarif::sarif::{
    ReportingDescriptor, Result as SarifResult, Run, SCHEMA_URL, Sarif, Tool, ToolComponent,
};
use tracing::{debug, warn};

use crate::ecosystem::Ecosystem;
use crate::locate::find_line;
use crate::manifest::load_manifest_lines;
use crate::report::{AnalysisReport, ReportInput, flatten};
use crate::results::{Findings, build_findings};
use crate::severity::{SeverityAggregator, VulnerabilitySeverity};
use crate::telemetry::with_span;

pub(crate) const DRIVER_NAME: &str = "Red Hat Dependency Analytics";

/// A finished SARIF document and the worst severity seen while building it.
#[derive(Debug)]
pub(crate) struct Conversion {
    pub(crate) sarif: Sarif,
    pub(crate) severity: VulnerabilitySeverity,
}

/// Convert a parsed report into SARIF anchored at lines of `manifest_path`.
///
/// Image reports are converted one image at a time against the same manifest
/// and their findings concatenated in image order.
pub(crate) fn convert(
    report: &ReportInput,
    manifest_path: &Path,
    ecosystem: Ecosystem,
) -> Result<Conversion> {
    let lines = with_span("manifest", || load_manifest_lines(manifest_path, ecosystem))?;
    let uri = manifest_uri(manifest_path);
    let mut findings = Findings::default();
    let mut aggregator = SeverityAggregator::default();
    match report {
        ReportInput::Single(report) => {
            let (converted, severity) = convert_report(report, ecosystem, None, &lines, &uri);
            findings.extend(converted);
            aggregator.observe(severity);
        }
        ReportInput::Images(images) => {
            for (image_ref, report) in images {
                let (converted, severity) = with_span("image", || {
                    convert_report(report, ecosystem, Some(image_ref.as_str()), &lines, &uri)
                });
                findings.extend(converted);
                aggregator.observe(severity);
            }
        }
    }
    debug!(
        "built {} results and {} rules for {}",
        findings.results.len(),
        findings.rules.len(),
        uri
    );
    let sarif = with_span("sarif", || build_sarif(findings.rules, findings.results));
    ensure_schema(&sarif)?;
    Ok(Conversion {
        sarif,
        severity: aggregator.current(),
    })
}

fn convert_report(
    report: &AnalysisReport,
    ecosystem: Ecosystem,
    image_ref: Option<&str>,
    lines: &[String],
    uri: &str,
) -> (Findings, VulnerabilitySeverity) {
    let flattened = with_span("flatten", || flatten(report, ecosystem, image_ref));
    if !flattened.failed_providers.is_empty() {
        warn!(
            "The component analysis couldn't fetch data from the following providers: [{}]",
            flattened.failed_providers.join(", ")
        );
    }
    let mut findings = Findings::default();
    for group in &flattened.groups {
        let ref_has_issues = group.ref_has_issues();
        for record in &group.records {
            let Some(start_line) = find_line(record, record.ecosystem, lines) else {
                debug!("no manifest line declares {} in group {}", record.dep_ref, group.key);
                continue;
            };
            findings.extend(build_findings(record, uri, start_line, ref_has_issues));
        }
    }
    (findings, flattened.severity)
}

fn build_sarif(rules: Vec<ReportingDescriptor>, results: Vec<SarifResult>) -> Sarif {
    let driver = ToolComponent::builder()
        .name(DRIVER_NAME)
        .rules(rules)
        .build();
    let tool = Tool::builder().driver(driver).build();
    let run = Run::builder().tool(tool).results(results).build();
    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

fn ensure_schema(sarif: &Sarif) -> Result<()> {
    match sarif.schema.as_deref() {
        Some(schema) if !schema.is_empty() => Ok(()),
        _ => bail!("No $schema key for SARIF file, cannot proceed."),
    }
}

/// Manifest path relative to the working directory, with `/` separators.
pub(crate) fn manifest_uri(path: &Path) -> String {
    let relative = match std::env::current_dir() {
        Ok(cwd) if path.is_absolute() => relative_to(path, &cwd),
        _ => path.to_path_buf(),
    };
    if relative.is_absolute() {
        return relative.to_string_lossy().replace('\\', "/");
    }
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(left, right)| left == right)
        .count();
    if common == 0 {
        return path.to_path_buf();
    }
    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part);
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::parse_report;
    use std::fs;

    fn write_manifest(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("write manifest");
        path
    }

    fn to_value(conversion: &Conversion) -> serde_json::Value {
        serde_json::to_value(&conversion.sarif).expect("serialize SARIF")
    }

    const NPM_REPORT: &str = r#"{
        "providers": {
            "p1": {
                "status": { "ok": true },
                "sources": {
                    "s1": {
                        "summary": { "critical": 1, "high": 0, "medium": 0, "low": 0 },
                        "dependencies": [{
                            "ref": "pkg:npm/lodash@4.17.20",
                            "issues": [{
                                "id": "CVE-123",
                                "title": "T",
                                "severity": "CRITICAL",
                                "cves": ["CVE-123"],
                                "cvss": { "cvss": "9.8" },
                                "remediation": { "trustedContent": null }
                            }],
                            "transitive": null
                        }]
                    }
                }
            }
        }
    }"#;

    #[test]
    fn npm_issue_becomes_located_result() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = write_manifest(
            dir.path(),
            "package.json",
            "{\n  \"dependencies\": {\n    \"lodash\": \"4.17.20\"\n  }\n}\n",
        );
        let report = parse_report(NPM_REPORT, Ecosystem::Npm).expect("parse report");

        let conversion = convert(&report, &manifest, Ecosystem::Npm).expect("convert");
        let value = to_value(&conversion);

        assert_eq!(conversion.severity, VulnerabilitySeverity::Error);
        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        let run = &value["runs"][0];
        assert_eq!(run["tool"]["driver"]["name"], DRIVER_NAME);
        assert_eq!(run["results"].as_array().map(Vec::len), Some(1));
        assert_eq!(run["results"][0]["ruleId"], "CVE-123");
        assert_eq!(
            run["results"][0]["locations"][0]["physicalLocation"]["region"]["startLine"],
            3
        );
        let uri = run["results"][0]["locations"][0]["physicalLocation"]["artifactLocation"]
            ["uri"]
            .as_str()
            .expect("uri");
        assert!(uri.ends_with("/package.json"), "unexpected uri {uri}");
        assert!(!uri.contains('\\'));
        assert_eq!(run["tool"]["driver"]["rules"][0]["id"], "CVE-123");
    }

    #[test]
    fn conversion_is_deterministic() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = write_manifest(dir.path(), "package.json", "{\"lodash\": \"4.17.20\"}\n");
        let report = parse_report(NPM_REPORT, Ecosystem::Npm).expect("parse report");

        let first = convert(&report, &manifest, Ecosystem::Npm).expect("convert");
        let second = convert(&report, &manifest, Ecosystem::Npm).expect("convert");

        assert_eq!(
            serde_json::to_string(&first.sarif).expect("serialize"),
            serde_json::to_string(&second.sarif).expect("serialize")
        );
    }

    #[test]
    fn unlocated_dependency_is_skipped_but_counts_for_severity() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = write_manifest(dir.path(), "package.json", "{}\n");
        let report = parse_report(NPM_REPORT, Ecosystem::Npm).expect("parse report");

        let conversion = convert(&report, &manifest, Ecosystem::Npm).expect("convert");
        let value = to_value(&conversion);

        assert_eq!(value["runs"][0]["results"].as_array().map(Vec::len), Some(0));
        assert_eq!(
            value["runs"][0]["tool"]["driver"]["rules"]
                .as_array()
                .map(Vec::len),
            Some(0)
        );
        assert_eq!(conversion.severity, VulnerabilitySeverity::Error);
    }

    #[test]
    fn images_are_converted_separately_and_severity_is_max() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = write_manifest(
            dir.path(),
            "Dockerfile",
            "ARG NODE=14\nFROM node:${NODE} AS build\nFROM registry.access.redhat.com/ubi9\n",
        );
        let report = r#"{
            "node:14": {
                "providers": {
                    "p": {
                        "status": { "ok": true },
                        "sources": {
                            "s": {
                                "summary": { "critical": 0, "high": 0, "medium": 1, "low": 0 },
                                "dependencies": [{
                                    "ref": "pkg:npm/minimist@1.2.5",
                                    "issues": [{ "id": "CVE-A", "title": "A", "severity": "MEDIUM" }]
                                }]
                            }
                        }
                    }
                }
            },
            "registry.access.redhat.com/ubi9:latest": {
                "providers": {
                    "p": {
                        "status": { "ok": true },
                        "sources": {
                            "s": {
                                "summary": { "critical": 0, "high": 1, "medium": 0, "low": 0 },
                                "dependencies": [{
                                    "ref": "pkg:rpm/openssl@3.0.1",
                                    "issues": [{ "id": "CVE-B", "title": "B", "severity": "HIGH" }]
                                }]
                            }
                        }
                    }
                }
            }
        }"#;
        let report = parse_report(report, Ecosystem::Docker).expect("parse report");

        let conversion = convert(&report, &manifest, Ecosystem::Docker).expect("convert");
        let value = to_value(&conversion);

        assert_eq!(conversion.severity, VulnerabilitySeverity::Error);
        let results = value["runs"][0]["results"].as_array().expect("results");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["ruleId"], "CVE-A");
        assert_eq!(
            results[0]["locations"][0]["physicalLocation"]["region"]["startLine"],
            2
        );
        assert_eq!(results[1]["ruleId"], "CVE-B");
        assert_eq!(
            results[1]["locations"][0]["physicalLocation"]["region"]["startLine"],
            3
        );
        let rules = value["runs"][0]["tool"]["driver"]["rules"]
            .as_array()
            .expect("rules");
        assert_eq!(rules[0]["help"]["text"], "Introduced through node:14");
        assert_eq!(
            rules[1]["help"]["text"],
            "Introduced through registry.access.redhat.com/ubi9:latest"
        );
    }

    #[test]
    fn maven_recommendation_becomes_note() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = write_manifest(
            dir.path(),
            "pom.xml",
            "<project>\n<dependencies>\n<dependency>\n<groupId>log4j</groupId>\n<artifactId>log4j</artifactId>\n<version>1.2.17</version>\n</dependency>\n</dependencies>\n</project>\n",
        );
        let report = r#"{
            "providers": {
                "rhtpa": {
                    "status": { "ok": true },
                    "sources": {
                        "osv": {
                            "summary": { "critical": 0, "high": 0, "medium": 0, "low": 0 },
                            "dependencies": [{
                                "ref": "pkg:maven/log4j/log4j@1.2.17?type=jar",
                                "recommendation": "pkg:maven/log4j/log4j@1.2.17.redhat-00008?type=jar"
                            }]
                        }
                    }
                }
            }
        }"#;
        let report = parse_report(report, Ecosystem::Maven).expect("parse report");

        let conversion = convert(&report, &manifest, Ecosystem::Maven).expect("convert");
        let value = to_value(&conversion);

        assert_eq!(conversion.severity, VulnerabilitySeverity::None);
        let result = &value["runs"][0]["results"][0];
        assert_eq!(result["ruleId"], "1.2.17.redhat-00008");
        assert_eq!(
            result["locations"][0]["physicalLocation"]["region"]["startLine"],
            6
        );
        assert_eq!(
            value["runs"][0]["tool"]["driver"]["rules"][0]["defaultConfiguration"]["level"],
            "note"
        );
    }

    #[test]
    fn missing_manifest_is_fatal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let report = parse_report(NPM_REPORT, Ecosystem::Npm).expect("parse report");

        let err = convert(&report, &dir.path().join("package.json"), Ecosystem::Npm)
            .expect_err("missing manifest");

        assert!(format!("{err:?}").contains("failed to read manifest"));
    }

    #[test]
    fn schema_marker_is_required() {
        let mut sarif = build_sarif(Vec::new(), Vec::new());
        assert!(ensure_schema(&sarif).is_ok());

        sarif.schema = None;
        assert!(ensure_schema(&sarif).is_err());
    }

    #[test]
    fn uri_is_relative_with_forward_slashes() {
        assert_eq!(manifest_uri(Path::new("./app/pom.xml")), "app/pom.xml");

        let cwd = std::env::current_dir().expect("cwd");
        assert_eq!(manifest_uri(&cwd.join("sub").join("go.mod")), "sub/go.mod");
    }

    #[test]
    fn relative_path_walks_up_from_base() {
        assert_eq!(
            relative_to(Path::new("/a/b/c.txt"), Path::new("/a/d")),
            PathBuf::from("../b/c.txt")
        );
    }
}
