use std::sync::LazyLock;

use regex::Regex;

static ECOSYSTEM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pkg:(.*?)/").expect("ecosystem pattern is valid"));

/// Ecosystem segment of a package URL, e.g. `npm` for `pkg:npm/lodash@4.17.20`.
pub(crate) fn resolve_ecosystem(reference: &str) -> Option<&str> {
    ECOSYSTEM_PATTERN
        .captures(reference)
        .and_then(|captures| captures.get(1))
        .map(|segment| segment.as_str())
        .filter(|segment| !segment.is_empty())
}

/// Reference without its `pkg:<ecosystem>/` prefix and without `?` qualifiers.
///
/// The prefix is rebuilt from the resolved ecosystem, so a reference without an
/// ecosystem segment is left untouched apart from qualifier truncation.
pub(crate) fn resolve_dependency(reference: &str) -> String {
    let stripped = match resolve_ecosystem(reference) {
        Some(ecosystem) => reference.replacen(&format!("pkg:{ecosystem}/"), "", 1),
        None => reference.to_string(),
    };
    match stripped.split_once('?') {
        Some((dependency, _qualifiers)) => dependency.to_string(),
        None => stripped,
    }
}

/// Version part of a reference, or an empty string when it carries none.
pub(crate) fn resolve_version(reference: &str) -> String {
    resolve_dependency(reference)
        .split_once('@')
        .map(|(_, version)| version.to_string())
        .unwrap_or_default()
}

/// Coordinates decoded from a dependency reference.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Coordinates {
    pub(crate) group: Option<String>,
    pub(crate) name: String,
    pub(crate) version: String,
}

/// Decode group, name and version. Only maven and gradle references split
/// `<group>/<name>`; every other ecosystem keeps the namespace in the name.
pub(crate) fn resolve_coordinates(reference: &str) -> Coordinates {
    let dependency = resolve_dependency(reference);
    let name = dependency
        .split_once('@')
        .map_or(dependency.as_str(), |(name, _)| name);
    let version = resolve_version(reference);
    let splits_group = matches!(resolve_ecosystem(reference), Some("maven" | "gradle"));
    match name.split_once('/') {
        Some((group, name)) if splits_group => Coordinates {
            group: Some(group.to_string()),
            name: name.to_string(),
            version,
        },
        _ => Coordinates {
            group: None,
            name: name.to_string(),
            version,
        },
    }
}
