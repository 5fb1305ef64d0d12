use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{NoExpand, Regex};

use crate::ecosystem::Ecosystem;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment pattern is valid"));
static EXT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bext\b").expect("ext pattern is valid"));
static EXT_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(\w+)\s*=\s*(?:'([^']*)'|"([^"]*)")"#).expect("assignment pattern is valid")
});
static DOCKER_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*ARG\s+(.*)").expect("ARG pattern is valid"));

/// Read a manifest and return its lines after ecosystem-specific variable substitution.
pub(crate) fn load_manifest_lines(path: &Path, ecosystem: Ecosystem) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    preprocess(&content, ecosystem)
}

pub(crate) fn preprocess(content: &str, ecosystem: Ecosystem) -> Result<Vec<String>> {
    let symbols = match ecosystem {
        Ecosystem::Gradle => gradle_ext_symbols(content),
        Ecosystem::Docker => docker_arg_symbols(content),
        _ => return Ok(split_lines(content)),
    };
    let substituted = symbols.substitute(content)?;
    Ok(split_lines(&substituted))
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Ordered name to value table collected from a manifest.
#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct Symbols {
    entries: Vec<(String, String)>,
}

impl Symbols {
    /// Later definitions replace the value but keep the first definition's position.
    fn define(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replace `${name}` and `$name` references. `$name` only matches on a word
    /// boundary, so `$PREFIX` leaves `$PREFIXLONGER` alone.
    pub(crate) fn substitute(&self, text: &str) -> Result<String> {
        let mut text = text.to_string();
        for (name, value) in &self.entries {
            let escaped = regex::escape(name);
            let braced = Regex::new(&format!(r"\$\{{{escaped}\}}"))
                .with_context(|| format!("invalid variable name {name}"))?;
            let bare = Regex::new(&format!(r"\${escaped}\b"))
                .with_context(|| format!("invalid variable name {name}"))?;
            text = braced.replace_all(&text, NoExpand(value)).into_owned();
            text = bare.replace_all(&text, NoExpand(value)).into_owned();
        }
        Ok(text)
    }
}

/// Collect `ext` properties from single statements (`ext name = 'v'`) and from
/// brace-delimited blocks (`ext { name = 'v' }`), which may nest braces.
fn gradle_ext_symbols(content: &str) -> Symbols {
    let mut symbols = Symbols::default();
    let mut single_statement = false;
    let mut block_depth: i64 = 0;
    for line in content.lines() {
        let clean = strip_comments(line);
        let clean = clean.trim();
        let mut in_block = block_depth > 0;
        if single_statement {
            // `ext` followed by its block on the next line.
            if clean.starts_with('{') {
                in_block = true;
            }
            single_statement = false;
        }
        if !in_block && EXT_KEYWORD.is_match(clean) {
            if clean.contains('{') {
                in_block = true;
            } else {
                single_statement = true;
            }
        }
        if in_block {
            block_depth += brace_balance(clean);
            if block_depth <= 0 {
                block_depth = 0;
            }
        }
        if single_statement || in_block {
            if let Some(captures) = EXT_ASSIGNMENT.captures(clean) {
                let value = captures
                    .get(2)
                    .or_else(|| captures.get(3))
                    .map_or("", |value| value.as_str());
                symbols.define(captures[1].trim(), value.trim());
            }
        }
    }
    symbols
}

fn strip_comments(line: &str) -> String {
    let code = line.split("//").next().unwrap_or_default();
    BLOCK_COMMENT.replace_all(code, "").into_owned()
}

fn brace_balance(line: &str) -> i64 {
    line.chars().fold(0, |balance, c| match c {
        '{' => balance + 1,
        '}' => balance - 1,
        _ => balance,
    })
}

/// Collect `ARG name=value` declarations. Declarations without a default are skipped.
fn docker_arg_symbols(content: &str) -> Symbols {
    let mut symbols = Symbols::default();
    for line in content.lines() {
        let Some(captures) = DOCKER_ARG.captures(line) else {
            continue;
        };
        let Some((name, value)) = captures[1].trim().split_once('=') else {
            continue;
        };
        symbols.define(name, unquote(value));
    }
    symbols
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
