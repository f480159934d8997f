use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::secrets::{EnvSecretResolver, SecretResolver};

/// `{{ scope.NAME }}` with an optional `| default("...")` filter
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("valid placeholder regex")
});

/// Expand `{{ env.VAR }}` placeholders from the process environment
///
/// See [`expand_with`] for the placeholder grammar.
///
/// # Errors
///
/// Same as [`expand_with`]
pub fn expand_env(input: &str) -> Result<String, String> {
    expand_with(input, &EnvSecretResolver)
}

/// Expand `{{ env.VAR }}` placeholders in a raw TOML string
///
/// `{{ env.VAR | default("fallback") }}` substitutes the fallback when the
/// resolver has no value. Comment lines are copied through untouched so a
/// commented-out secret never has to be set.
///
/// # Errors
///
/// Returns an error naming the variable when it is unset and has no
/// fallback, or when a placeholder uses a scope other than `env`
pub fn expand_with(input: &str, resolver: &dyn SecretResolver) -> Result<String, String> {
    let lines = input
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                Ok(line.to_owned())
            } else {
                expand_line(line, resolver)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str, resolver: &dyn SecretResolver) -> Result<String, String> {
    let mut expanded = String::with_capacity(line.len());
    let mut cursor = 0;

    for captures in PLACEHOLDER.captures_iter(line) {
        let Some(whole) = captures.get(0) else {
            continue;
        };

        expanded.push_str(&line[cursor..whole.start()]);
        expanded.push_str(&substitute(&captures, resolver)?);
        cursor = whole.end();
    }

    expanded.push_str(&line[cursor..]);

    Ok(expanded)
}

fn substitute(captures: &Captures<'_>, resolver: &dyn SecretResolver) -> Result<String, String> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let fallback = captures.get(2).map(|m| m.as_str());

    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    resolver
        .get(name)
        .or_else(|| fallback.map(str::to_owned))
        .ok_or_else(|| format!("environment variable not found: `{name}`"))
}
