use std::sync::LazyLock;

use regex::Regex;

use crate::ecosystem::Ecosystem;
use crate::report::DependencyRecord;

static FROM_INSTRUCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*FROM\s+(.*)").expect("FROM pattern is valid"));

/// 1-based manifest line that declares `record`, or `None` when no line matches.
///
/// The first matching line wins. Maven matches land on `<artifactId>`, so the
/// reported line is shifted one further down.
pub(crate) fn find_line(
    record: &DependencyRecord,
    ecosystem: Ecosystem,
    lines: &[String],
) -> Option<usize> {
    match ecosystem {
        Ecosystem::Maven => {
            let needle = format!("<artifactId>{}</artifactId>", record.dep_name);
            first_index(lines, |line| line.contains(&needle)).map(|index| index + 2)
        }
        Ecosystem::Gradle => find_gradle_line(record, lines).map(|index| index + 1),
        Ecosystem::Docker => {
            let image_ref = record.image_ref.as_deref()?;
            let untagged = image_ref.replacen(":latest", "", 1);
            first_index(lines, |line| {
                FROM_INSTRUCTION.captures(line).is_some_and(|captures| {
                    captures[1].contains(image_ref) || captures[1].contains(untagged.as_str())
                })
            })
            .map(|index| index + 1)
        }
        _ => first_index(lines, |line| line.contains(record.dep_name.as_str()))
            .map(|index| index + 1),
    }
}

fn first_index(lines: &[String], matches: impl Fn(&str) -> bool) -> Option<usize> {
    lines.iter().position(|line| matches(line))
}

/// Map notation (`group: 'g', name: 'n', version: 'v'`) or string notation (`g:n:v`).
fn find_gradle_line(record: &DependencyRecord, lines: &[String]) -> Option<usize> {
    let group = record.dep_group.as_deref().unwrap_or_default();
    let name = record.dep_name.as_str();
    let version = record.dep_version.as_str();
    if version.is_empty() {
        let coordinates = format!("{group}:{name}");
        return first_index(lines, |line| {
            (has_quoted_attribute(line, "name", name) && has_quoted_attribute(line, "group", group))
                || line.contains(&coordinates)
        });
    }
    let coordinates = format!("{group}:{name}:{version}");
    first_index(lines, |line| {
        (has_quoted_attribute(line, "name", name)
            && has_quoted_attribute(line, "group", group)
            && has_quoted_attribute(line, "version", version))
            || line.contains(&coordinates)
    })
}

/// True when `line` contains `key:` followed by optional whitespace and `value`
/// enclosed in matching single or double quotes.
fn has_quoted_attribute(line: &str, key: &str, value: &str) -> bool {
    let marker = format!("{key}:");
    line.match_indices(&marker).any(|(start, _)| {
        let rest = line[start + marker.len()..].trim_start();
        let mut chars = rest.chars();
        let Some(quote) = chars.next().filter(|c| *c == '\'' || *c == '"') else {
            return false;
        };
        chars
            .as_str()
            .strip_prefix(value)
            .is_some_and(|tail| tail.starts_with(quote))
    })
}
