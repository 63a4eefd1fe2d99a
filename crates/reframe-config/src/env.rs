//! `REFRAME_*` environment overrides.
//!
//! Applied after the config files. Values that fail to parse are skipped
//! with a warning rather than aborting startup.

use std::str::FromStr;

use crate::types::ReframeConfig;

/// Prefix shared by every override variable.
pub const ENV_PREFIX: &str = "REFRAME_";

/// Variables recognised by [`apply_overrides_from`], for `config show`.
pub const ENV_VARS: &[&str] = &[
    "REFRAME_BIND",
    "REFRAME_PORT",
    "REFRAME_REQUEST_LOGGING",
    "REFRAME_MAX_UPLOAD_BYTES",
    "REFRAME_REQUEST_TIMEOUT_SECS",
    "REFRAME_MAX_SESSIONS",
    "REFRAME_MAX_SESSION_BYTES",
    "REFRAME_SESSION_TTL_SECS",
    "REFRAME_CLEANUP_INTERVAL_SECS",
    "REFRAME_MAX_PENDING_PER_SESSION",
    "REFRAME_WORKERS",
    "REFRAME_WORKER_BASE_PORT",
    "REFRAME_CODEC_THREADS",
    "REFRAME_RESTART_DELAY_MS",
    "REFRAME_MAX_DIMENSION",
    "REFRAME_MAX_DECODE_PIXELS",
];

/// Apply overrides from the process environment.
pub fn apply_overrides(config: &mut ReframeConfig) -> Vec<String> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

/// Apply overrides using `lookup` to resolve variable names.
///
/// Returns one warning per variable whose value could not be parsed.
pub fn apply_overrides_from<F>(config: &mut ReframeConfig, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut warnings = Vec::new();
    let mut env = Overrides {
        lookup: &lookup,
        warnings: &mut warnings,
    };

    if let Some(v) = env.string("REFRAME_BIND") {
        config.server_mut().bind = v;
    }
    if let Some(v) = env.parse("REFRAME_PORT") {
        config.server_mut().port = v;
    }
    if let Some(v) = env.flag("REFRAME_REQUEST_LOGGING") {
        config.server_mut().request_logging = v;
    }
    if let Some(v) = env.parse("REFRAME_MAX_UPLOAD_BYTES") {
        config.server_mut().max_upload_bytes = v;
    }
    if let Some(v) = env.parse("REFRAME_REQUEST_TIMEOUT_SECS") {
        config.server_mut().request_timeout_secs = v;
    }

    if let Some(v) = env.parse("REFRAME_MAX_SESSIONS") {
        config.session_mut().max_sessions = v;
    }
    if let Some(v) = env.parse("REFRAME_MAX_SESSION_BYTES") {
        config.session_mut().max_bytes = v;
    }
    if let Some(v) = env.parse("REFRAME_SESSION_TTL_SECS") {
        config.session_mut().ttl_secs = v;
    }
    if let Some(v) = env.parse("REFRAME_CLEANUP_INTERVAL_SECS") {
        config.session_mut().cleanup_interval_secs = v;
    }
    if let Some(v) = env.parse("REFRAME_MAX_PENDING_PER_SESSION") {
        config.session_mut().max_pending_per_session = v;
    }

    if let Some(v) = env.parse("REFRAME_WORKERS") {
        config.workers_mut().count = Some(v);
    }
    if let Some(v) = env.parse("REFRAME_WORKER_BASE_PORT") {
        config.workers_mut().base_port = v;
    }
    if let Some(v) = env.parse("REFRAME_CODEC_THREADS") {
        config.workers_mut().codec_threads = Some(v);
    }
    if let Some(v) = env.parse("REFRAME_RESTART_DELAY_MS") {
        config.workers_mut().restart_delay_ms = v;
    }

    if let Some(v) = env.parse("REFRAME_MAX_DIMENSION") {
        config.limits_mut().max_dimension = v;
    }
    if let Some(v) = env.parse("REFRAME_MAX_DECODE_PIXELS") {
        config.limits_mut().max_decode_pixels = v;
    }

    warnings
}

struct Overrides<'a, F> {
    lookup: &'a F,
    warnings: &'a mut Vec<String>,
}

impl<F> Overrides<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&mut self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&mut self, name: &str) -> Option<T> {
        let raw = self.string(name)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                self.warnings
                    .push(format!("Ignoring {name}={raw:?}: not a valid value"));
                None
            }
        }
    }

    fn flag(&mut self, name: &str) -> Option<bool> {
        let raw = self.string(name)?;
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                self.warnings
                    .push(format!("Ignoring {name}={raw:?}: expected true or false"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_no_vars_leaves_config_untouched() {
        let mut config = ReframeConfig::new();
        let warnings = apply_overrides_from(&mut config, lookup(&[]));
        assert!(warnings.is_empty());
        assert_eq!(config, ReframeConfig::new());
    }

    #[test]
    fn test_overrides_apply_to_sections() {
        let mut config = ReframeConfig::from_toml("[server]\nport = 1000\n").unwrap();
        let warnings = apply_overrides_from(
            &mut config,
            lookup(&[
                ("REFRAME_PORT", "9999"),
                ("REFRAME_WORKERS", "0"),
                ("REFRAME_SESSION_TTL_SECS", "5"),
                ("REFRAME_REQUEST_LOGGING", "off"),
                ("REFRAME_MAX_DIMENSION", "2048"),
            ]),
        );
        assert!(warnings.is_empty());
        assert_eq!(config.server_config().port, 9999);
        assert!(!config.server_config().request_logging);
        assert_eq!(config.workers_config().count, Some(0));
        assert_eq!(config.session_config().ttl_secs, 5);
        assert_eq!(config.limits_config().max_dimension, 2048);
    }

    #[test]
    fn test_bad_values_warn_and_skip() {
        let mut config = ReframeConfig::new();
        let warnings = apply_overrides_from(
            &mut config,
            lookup(&[
                ("REFRAME_PORT", "not-a-port"),
                ("REFRAME_REQUEST_LOGGING", "maybe"),
            ]),
        );
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("REFRAME_PORT"));
        assert_eq!(config.server_config().port, 8080);
    }

    #[test]
    fn test_blank_values_ignored() {
        let mut config = ReframeConfig::new();
        let warnings = apply_overrides_from(&mut config, lookup(&[("REFRAME_BIND", "   ")]));
        assert!(warnings.is_empty());
        assert!(config.server.is_none());
    }

    #[test]
    fn test_env_var_list_matches_prefix() {
        assert!(ENV_VARS.iter().all(|v| v.starts_with(ENV_PREFIX)));
    }
}
