use serde_sarif::sarif::{
    ArtifactLocation, Location, Message, PhysicalLocation, Region, ReportingDescriptor,
    Result as SarifResult,
};

use crate::purl::{resolve_dependency, resolve_version};
use crate::report::{DependencyRecord, Issue};
use crate::rules::{CONTAINER_CATALOG_URL, issue_rule, recommendation_rule};

/// Results and the rules they reference, in emission order.
#[derive(Debug, Default)]
pub(crate) struct Findings {
    pub(crate) results: Vec<SarifResult>,
    pub(crate) rules: Vec<ReportingDescriptor>,
}

impl Findings {
    pub(crate) fn extend(&mut self, other: Findings) {
        self.results.extend(other.results);
        self.rules.extend(other.rules);
    }

    fn push(&mut self, result: SarifResult, rule: ReportingDescriptor) {
        self.results.push(result);
        self.rules.push(rule);
    }
}

/// Emit findings for one record located at `start_line` of the manifest.
///
/// When the record's group has issues, every issue of the record and of its
/// direct transitives becomes a result. Otherwise a recommendation, if any,
/// becomes a single `note`. Rules are not deduplicated across records.
pub(crate) fn build_findings(
    record: &DependencyRecord,
    manifest_uri: &str,
    start_line: usize,
    ref_has_issues: bool,
) -> Findings {
    let mut findings = Findings::default();
    if ref_has_issues {
        let direct_ref = record
            .image_ref
            .clone()
            .unwrap_or_else(|| resolve_dependency(&record.dep_ref));
        for issue in record.own_issues() {
            findings.push(
                result(&issue.id, issue_message(issue, record, true), manifest_uri, start_line),
                issue_rule(issue, &direct_ref),
            );
        }
        for transitive in record.transitive_records() {
            for issue in transitive.own_issues() {
                findings.push(
                    result(
                        &issue.id,
                        issue_message(issue, transitive, false),
                        manifest_uri,
                        start_line,
                    ),
                    issue_rule(issue, &direct_ref),
                );
            }
        }
    } else if let Some(recommendation) = record.recommendation_ref.as_deref() {
        let image_based = record.image_ref.is_some();
        findings.push(
            result(
                recommendation,
                recommendation_message(recommendation, image_based),
                manifest_uri,
                start_line,
            ),
            recommendation_rule(recommendation, image_based),
        );
    }
    findings
}

fn issue_message(issue: &Issue, dependency: &DependencyRecord, direct: bool) -> String {
    let kind = if direct { "" } else { " transitive" };
    let group = dependency
        .dep_group
        .as_deref()
        .filter(|group| !group.is_empty())
        .map(|group| format!("{group}/"))
        .unwrap_or_default();
    let version = if dependency.dep_version.is_empty() {
        String::new()
    } else {
        format!(" version {}", dependency.dep_version)
    };
    let mut message = format!(
        "This line introduces a \"{}\" vulnerability with {} severity.\n\
         Vulnerability data provider is {}.\n\
         Vulnerability data source is {}.\n\
         Vulnerable{kind} dependency is {group}{}{version}.",
        issue.title,
        issue.severity,
        dependency.provider_id,
        dependency.source_id,
        dependency.dep_name,
    );
    if let Some(reference) = issue.trusted_content_ref() {
        message.push_str(&format!(
            "\nRecommended remediation version: {}",
            resolve_version(reference)
        ));
    }
    message
}

fn recommendation_message(recommendation: &str, image_based: bool) -> String {
    if image_based {
        format!(
            "Switch to a Red Hat verified base image such as {recommendation}. Browse {CONTAINER_CATALOG_URL} for alternatives."
        )
    } else {
        format!("Recommended Red Hat verified version: {recommendation}.")
    }
}

fn result(rule_id: &str, text: String, manifest_uri: &str, start_line: usize) -> SarifResult {
    let location = Location::builder()
        .physical_location(
            PhysicalLocation::builder()
                .artifact_location(ArtifactLocation::builder().uri(manifest_uri).build())
                .region(Region::builder().start_line(start_line as i64).build())
                .build(),
        )
        .build();
    SarifResult::builder()
        .rule_id(rule_id)
        .message(Message::builder().text(text).build())
        .locations(vec![location])
        .build()
}
