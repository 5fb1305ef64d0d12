use serde_json::json;
use serde_sarif::sarif::{
    MultiformatMessageString, PropertyBag, ReportingConfiguration, ReportingDescriptor,
};

use crate::report::Issue;

pub(crate) const CONTAINER_CATALOG_URL: &str = "https://catalog.redhat.com/software/containers/search";

/// SARIF level implied by an issue severity.
pub(crate) fn issue_level(severity: &str) -> &'static str {
    match severity {
        "LOW" | "MEDIUM" => "warning",
        "HIGH" | "CRITICAL" => "error",
        _ => "none",
    }
}

/// Rule describing one vulnerability. `direct_ref` names the direct dependency
/// (or image) that pulls the vulnerable package in.
pub(crate) fn issue_rule(issue: &Issue, direct_ref: &str) -> ReportingDescriptor {
    let mut rule = ReportingDescriptor::builder()
        .id(issue.id.clone())
        .short_description(text(format!(
            "{} severity - {} vulnerability",
            issue.severity, issue.title
        )))
        .default_configuration(
            ReportingConfiguration::builder()
                .level(json!(issue_level(&issue.severity)))
                .build(),
        )
        .help(text(format!("Introduced through {direct_ref}")))
        .build();

    let cves = issue.cves();
    if !cves.is_empty() {
        rule.full_description = Some(text(cves.join(", ")));
    }
    let mut tags = Vec::new();
    tags.extend(cves.iter().cloned());
    if let Some(score) = issue.cvss_score() {
        tags.push(format!("cvss:{score}"));
    }
    if !tags.is_empty() {
        tags.insert(0, "security".to_string());
        rule.properties = Some(PropertyBag::builder().tags(tags).build());
    }
    rule
}

/// Rule for a Red Hat verified replacement, identified by the recommendation itself.
pub(crate) fn recommendation_rule(reference: &str, image_based: bool) -> ReportingDescriptor {
    let description = if image_based {
        format!("Switch to a Red Hat verified base image from {CONTAINER_CATALOG_URL}")
    } else {
        "Red Hat recommendation".to_string()
    };
    ReportingDescriptor::builder()
        .id(reference.to_string())
        .short_description(text(description))
        .default_configuration(ReportingConfiguration::builder().level(json!("note")).build())
        .build()
}

fn text(value: String) -> MultiformatMessageString {
    MultiformatMessageString::builder().text(value).build()
}
