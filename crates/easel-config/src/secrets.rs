/// Resolves a named secret or configuration value
///
/// The process environment is the default source; embedders can swap in
/// their own resolver (a vault, a runtime config object) when expanding
/// configuration with [`crate::expand_with`].
pub trait SecretResolver: Send + Sync {
    /// Look up `name`, returning `None` when it is unset
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads values from the process environment
///
/// Empty values and values that are still an unexpanded `${...}` template
/// (as left behind by container entrypoints that failed to substitute)
/// count as unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .filter(|value| !is_unexpanded_template(value))
    }
}

fn is_unexpanded_template(value: &str) -> bool {
    value.is_empty() || (value.starts_with("${") && value.ends_with('}'))
}
