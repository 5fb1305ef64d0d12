use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::ecosystem::Ecosystem;
use crate::purl::{resolve_coordinates, resolve_version};
use crate::severity::{SeverityAggregator, VulnerabilitySeverity};

/// Raw analysis report for one manifest (or one container image).
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnalysisReport {
    pub(crate) providers: Option<BTreeMap<String, RawProvider>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawProvider {
    pub(crate) status: Option<ProviderStatus>,
    pub(crate) sources: Option<BTreeMap<String, RawSource>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProviderStatus {
    pub(crate) ok: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSource {
    pub(crate) summary: Option<SourceSummary>,
    pub(crate) dependencies: Option<Vec<RawDependency>>,
}

/// Issue counts per severity for one provider source.
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct SourceSummary {
    #[serde(default)]
    pub(crate) critical: u64,
    #[serde(default)]
    pub(crate) high: u64,
    #[serde(default)]
    pub(crate) medium: u64,
    #[serde(default)]
    pub(crate) low: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDependency {
    #[serde(rename = "ref")]
    pub(crate) reference: Option<String>,
    pub(crate) issues: Option<Vec<Issue>>,
    pub(crate) transitive: Option<Vec<RawDependency>>,
    pub(crate) recommendation: Option<String>,
}

/// One vulnerability reported against a dependency.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub(crate) struct Issue {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) severity: String,
    pub(crate) cves: Option<Vec<String>>,
    pub(crate) cvss: Option<Cvss>,
    pub(crate) remediation: Option<Remediation>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub(crate) struct Cvss {
    pub(crate) cvss: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Remediation {
    pub(crate) trusted_content: Option<TrustedContent>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub(crate) struct TrustedContent {
    #[serde(rename = "ref")]
    pub(crate) reference: String,
}

impl Issue {
    pub(crate) fn cves(&self) -> &[String] {
        self.cves.as_deref().unwrap_or_default()
    }

    pub(crate) fn cvss_score(&self) -> Option<&str> {
        self.cvss.as_ref().and_then(|cvss| cvss.cvss.as_deref())
    }

    /// Reference of the trusted-content replacement, when the provider offers one.
    pub(crate) fn trusted_content_ref(&self) -> Option<&str> {
        self.remediation
            .as_ref()
            .and_then(|remediation| remediation.trusted_content.as_ref())
            .map(|content| content.reference.as_str())
    }
}

/// Report as handed to the converter. Container images are analyzed one report per image.
#[derive(Debug)]
pub(crate) enum ReportInput {
    Single(AnalysisReport),
    Images(BTreeMap<String, AnalysisReport>),
}

/// Parse a raw report; the docker ecosystem expects reports keyed by image reference.
pub(crate) fn parse_report(text: &str, ecosystem: Ecosystem) -> Result<ReportInput> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    let report = match ecosystem {
        Ecosystem::Docker => ReportInput::Images(
            serde_path_to_error::deserialize(&mut deserializer)
                .context("failed to parse image analysis report")?,
        ),
        _ => ReportInput::Single(
            serde_path_to_error::deserialize(&mut deserializer)
                .context("failed to parse analysis report")?,
        ),
    };
    deserializer
        .end()
        .context("unexpected trailing data after analysis report")?;
    Ok(report)
}

/// Flattened, enriched view of one raw dependency entry.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DependencyRecord {
    pub(crate) image_ref: Option<String>,
    pub(crate) dep_ref: String,
    pub(crate) dep_group: Option<String>,
    pub(crate) dep_name: String,
    pub(crate) dep_version: String,
    pub(crate) ecosystem: Ecosystem,
    pub(crate) provider_id: String,
    pub(crate) source_id: String,
    /// `Some` only when the entry reported at least one issue.
    pub(crate) issues: Option<Vec<Issue>>,
    pub(crate) transitives: Option<Vec<DependencyRecord>>,
    /// Recommended version; never set alongside `issues`.
    pub(crate) recommendation_ref: Option<String>,
}

impl DependencyRecord {
    pub(crate) fn own_issues(&self) -> &[Issue] {
        self.issues.as_deref().unwrap_or_default()
    }

    pub(crate) fn transitive_records(&self) -> &[DependencyRecord] {
        self.transitives.as_deref().unwrap_or_default()
    }

    pub(crate) fn has_issues(&self) -> bool {
        !self.own_issues().is_empty()
    }

    /// Issues on the record itself or on its direct transitives. Deeper levels are not searched.
    pub(crate) fn subtree_has_issues(&self) -> bool {
        self.has_issues()
            || self
                .transitive_records()
                .iter()
                .any(DependencyRecord::has_issues)
    }
}

/// Records sharing one reference key (the dependency reference, or the image reference).
#[derive(Debug)]
pub(crate) struct DependencyGroup {
    pub(crate) key: String,
    pub(crate) records: Vec<DependencyRecord>,
}

impl DependencyGroup {
    pub(crate) fn ref_has_issues(&self) -> bool {
        self.records.iter().any(DependencyRecord::subtree_has_issues)
    }
}

/// Output of walking one raw report. Providers that reported a failure are
/// listed in `failed_providers` and contribute no records.
#[derive(Debug)]
pub(crate) struct Flattened {
    pub(crate) groups: Vec<DependencyGroup>,
    pub(crate) failed_providers: Vec<String>,
    pub(crate) severity: VulnerabilitySeverity,
}

struct Source<'a> {
    provider_id: &'a str,
    source_id: &'a str,
    data: &'a RawSource,
}

/// Walk providers, sources and dependencies into groups of records keyed by
/// `image_ref` when present, otherwise by each dependency's own reference.
pub(crate) fn flatten(
    report: &AnalysisReport,
    ecosystem: Ecosystem,
    image_ref: Option<&str>,
) -> Flattened {
    let mut failed_providers = Vec::new();
    let mut sources = Vec::new();
    for (provider_id, provider) in report.providers.iter().flatten() {
        let ok = provider
            .status
            .as_ref()
            .and_then(|status| status.ok)
            .unwrap_or(false);
        if !ok {
            failed_providers.push(provider_id.clone());
            continue;
        }
        for (source_id, data) in provider.sources.iter().flatten() {
            sources.push(Source {
                provider_id,
                source_id,
                data,
            });
        }
    }

    let mut aggregator = SeverityAggregator::default();
    let mut groups: Vec<DependencyGroup> = Vec::new();
    let mut group_index: BTreeMap<String, usize> = BTreeMap::new();
    for source in &sources {
        if let Some(summary) = &source.data.summary {
            aggregator.observe_summary(summary);
        }
        for dependency in source.data.dependencies.iter().flatten() {
            let Some(record) = build_record(dependency, source, ecosystem, image_ref) else {
                continue;
            };
            let key = image_ref.map_or_else(|| record.dep_ref.clone(), str::to_string);
            match group_index.get(&key) {
                Some(&index) => groups[index].records.push(record),
                None => {
                    group_index.insert(key.clone(), groups.len());
                    groups.push(DependencyGroup {
                        key,
                        records: vec![record],
                    });
                }
            }
        }
    }
    debug!(
        "flattened {} dependency groups from {} sources",
        groups.len(),
        sources.len()
    );

    Flattened {
        groups,
        failed_providers,
        severity: aggregator.current(),
    }
}

// Nesting depth is bounded by serde_json's recursion limit on the input.
fn build_record(
    raw: &RawDependency,
    source: &Source<'_>,
    ecosystem: Ecosystem,
    image_ref: Option<&str>,
) -> Option<DependencyRecord> {
    let reference = raw
        .reference
        .as_deref()
        .filter(|reference| !reference.is_empty())?;
    let issues = raw.issues.clone().filter(|issues| !issues.is_empty());
    let transitives = raw.transitive.as_ref().map(|transitives| {
        transitives
            .iter()
            .filter_map(|transitive| build_record(transitive, source, ecosystem, image_ref))
            .collect()
    });
    let recommendation_ref = match issues {
        Some(_) => None,
        None => raw
            .recommendation
            .as_deref()
            .map(resolve_version)
            .filter(|version| !version.is_empty()),
    };
    let coordinates = resolve_coordinates(reference);

    Some(DependencyRecord {
        image_ref: image_ref.map(str::to_string),
        dep_ref: reference.to_string(),
        dep_group: coordinates.group,
        dep_name: coordinates.name,
        dep_version: coordinates.version,
        ecosystem,
        provider_id: source.provider_id.to_string(),
        source_id: source.source_id.to_string(),
        issues,
        transitives,
        recommendation_ref,
    })
}
