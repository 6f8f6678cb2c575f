//! Tuning knobs for the invocation core.
//!
//! Values are read once from the environment the first time
//! [`global`] is called, unless a configuration was [`install`]ed before.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::OnceLock;

fn env_true(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|val| {
        let trimmed = val.trim();
        !trimmed.is_empty() && !matches!(trimmed, "0" | "false" | "FALSE" | "False")
    })
}

fn bool_from_env(key: &str, default: bool) -> bool {
    env_true(key).unwrap_or(default)
}

fn number_from_env<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => match val.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("ignoring unparsable {}={:?}", key, val);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeConfig {
    /// Interpreted invocations before a form is compiled. Negative disables
    /// compilation, zero compiles on first use.
    pub compile_threshold: i32,
    /// Largest parameter slot count a handle type may have.
    pub max_arity: usize,
    /// Invocations of each guard branch before the branch wrapper is
    /// dropped. Zero disables the counting wrappers.
    pub dont_inline_threshold: i32,
    /// Invocations before a handle gets a form specialized to it.
    pub customize_threshold: i32,
    /// Captured slots above which a rebind wraps instead of extending.
    pub field_count_threshold: usize,
    /// Form size above which a rebind wraps instead of extending.
    pub form_expression_threshold: usize,
    /// Forms with more names are linked to an interpreter stub.
    pub max_compiled_names: usize,
    /// `owner.name` entries treated as caller-sensitive in addition to
    /// members flagged on their definition.
    pub caller_sensitive: BTreeSet<String>,
    /// Cache resolved direct handles for public, non-caller-sensitive members.
    pub cache_direct_handles: bool,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            compile_threshold: 30,
            max_arity: 254,
            dont_inline_threshold: 30,
            customize_threshold: 127,
            field_count_threshold: 12,
            form_expression_threshold: 24,
            max_compiled_names: 200,
            caller_sensitive: BTreeSet::new(),
            cache_direct_handles: true,
        }
    }
}

impl InvokeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let caller_sensitive = std::env::var("MH_CALLER_SENSITIVE")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            compile_threshold: number_from_env("MH_COMPILE_THRESHOLD", defaults.compile_threshold),
            max_arity: number_from_env("MH_MAX_ARITY", defaults.max_arity),
            dont_inline_threshold: number_from_env(
                "MH_DONT_INLINE_THRESHOLD",
                defaults.dont_inline_threshold,
            ),
            customize_threshold: number_from_env(
                "MH_CUSTOMIZE_THRESHOLD",
                defaults.customize_threshold,
            ),
            field_count_threshold: number_from_env(
                "MH_FIELD_COUNT_THRESHOLD",
                defaults.field_count_threshold,
            ),
            form_expression_threshold: number_from_env(
                "MH_FORM_EXPRESSION_THRESHOLD",
                defaults.form_expression_threshold,
            ),
            max_compiled_names: number_from_env(
                "MH_MAX_COMPILED_NAMES",
                defaults.max_compiled_names,
            ),
            caller_sensitive,
            cache_direct_handles: bool_from_env(
                "MH_CACHE_DIRECT_HANDLES",
                defaults.cache_direct_handles,
            ),
        }
    }

    pub fn is_caller_sensitive(&self, owner: &str, name: &str) -> bool {
        self.caller_sensitive.contains(&format!("{}.{}", owner, name))
    }
}

static CONFIG: OnceLock<InvokeConfig> = OnceLock::new();

pub fn global() -> &'static InvokeConfig {
    CONFIG.get_or_init(InvokeConfig::from_env)
}

/// Installs `config` as the process-wide configuration. Fails, handing the
/// value back, once [`global`] has been read or another config installed.
pub fn install(config: InvokeConfig) -> Result<(), InvokeConfig> {
    CONFIG.set(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = InvokeConfig::default();
        assert_eq!(config.compile_threshold, 30);
        assert_eq!(config.max_arity, 254);
        assert_eq!(config.customize_threshold, 127);
        assert!(config.cache_direct_handles);
    }

    #[test]
    fn caller_sensitive_entries_match_owner_and_name() {
        let mut config = InvokeConfig::default();
        config
            .caller_sensitive
            .insert("demo.Reflection.getCallerClass".to_string());
        assert!(config.is_caller_sensitive("demo.Reflection", "getCallerClass"));
        assert!(!config.is_caller_sensitive("demo.Reflection", "other"));
    }
}
