//! Mapping validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for structural
//! errors such as duplicate hosts or names, missing destinations, malformed
//! destination addresses and out-of-range options. Every error is collected
//! so a rejected refresh reports all problems at once. Returns a list of
//! [`ValidationError`] values with per-field suggestions.

use std::collections::HashSet;

use http::{HeaderName, HeaderValue};
use url::Url;

use super::model::{Config, Defaults, HeaderRules, MappingRecord, PoolSettings};
use crate::error::ValidationError;

/// Upper bound for connect and read timeouts, in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Upper bound for per-mapping retries.
pub const MAX_RETRY_COUNT: u32 = 10;

/// Validate an inbound host match key. Returns `Ok(())` or a human-readable error.
pub fn validate_host(host: &str) -> Result<(), String> {
    if host.trim().is_empty() {
        return Err("host cannot be empty".into());
    }
    if host.contains("://") {
        return Err("host must not contain a scheme".into());
    }
    if host.contains('/') {
        return Err("host must not contain a path".into());
    }
    if host.chars().any(char::is_whitespace) {
        return Err("host must not contain whitespace".into());
    }
    // Requests are matched on the host with its port removed.
    let has_port = if host.starts_with('[') {
        !host.ends_with(']')
    } else {
        host.contains(':')
    };
    if has_port {
        return Err("host must not contain a port".into());
    }
    Ok(())
}

/// Validate a destination base address. Returns `Ok(())` or a human-readable error.
pub fn validate_destination(destination: &str) -> Result<(), String> {
    let Ok(parsed) = Url::parse(destination) else {
        return Err(format!("'{destination}' is not a valid URL"));
    };
    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(format!(
            "unsupported scheme '{scheme}' (expected http or https)"
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(format!("'{destination}' has no host"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(format!(
            "'{destination}' must not carry a query string or fragment"
        ));
    }
    Ok(())
}

/// Validate a timeout in milliseconds. Returns `Ok(())` or a human-readable error.
pub fn validate_timeout(timeout_ms: u64) -> Result<(), String> {
    if timeout_ms == 0 {
        return Err("timeout must be greater than 0".into());
    }
    if timeout_ms > MAX_TIMEOUT_MS {
        return Err(format!(
            "timeout {timeout_ms}ms exceeds the maximum of {MAX_TIMEOUT_MS}ms"
        ));
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_defaults(&config.defaults, &mut errors);

    let mut seen_hosts = HashSet::new();
    let mut seen_names = HashSet::new();

    for (i, mapping) in config.mappings.iter().enumerate() {
        let mapping_id = if mapping.host.is_empty() && mapping.name.is_none() {
            format!("mappings[{i}]")
        } else {
            mapping.id()
        };

        if let Err(msg) = validate_host(&mapping.host) {
            errors.push(ValidationError {
                mapping: mapping_id.clone(),
                field: "host".into(),
                message: msg,
                suggestion: host_suggestion(&mapping.host),
            });
        } else if !seen_hosts.insert(mapping.host.to_ascii_lowercase()) {
            errors.push(ValidationError {
                mapping: mapping_id.clone(),
                field: "host".into(),
                message: format!("duplicate host '{}'", mapping.host),
                suggestion: Some("hosts are matched case-insensitively".into()),
            });
        }

        if matches!(mapping.name.as_deref(), Some(name) if name.trim().is_empty()) {
            errors.push(ValidationError {
                mapping: mapping_id.clone(),
                field: "name".into(),
                message: "name cannot be blank".into(),
                suggestion: Some("omit it to use the host as the name".into()),
            });
        } else if !seen_names.insert(mapping.id()) {
            errors.push(ValidationError {
                mapping: mapping_id.clone(),
                field: "name".into(),
                message: format!("duplicate mapping name '{}'", mapping.id()),
                suggestion: None,
            });
        }

        validate_record(mapping, &mapping_id, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_defaults(defaults: &Defaults, errors: &mut Vec<ValidationError>) {
    let mut push = |field: &str, message: String| {
        errors.push(ValidationError {
            mapping: "(defaults)".into(),
            field: field.into(),
            message,
            suggestion: None,
        });
    };

    if let Err(msg) = validate_timeout(defaults.connect_timeout) {
        push("defaults.connect_timeout", msg);
    }
    if let Err(msg) = validate_timeout(defaults.read_timeout) {
        push("defaults.read_timeout", msg);
    }
    if defaults.retry_count > MAX_RETRY_COUNT {
        push(
            "defaults.retry_count",
            format!("retry_count must be at most {MAX_RETRY_COUNT}"),
        );
    }
    for (field, msg) in pool_errors(&defaults.pool) {
        push(&format!("defaults.pool.{field}"), msg);
    }
    for (field, msg) in header_errors(&defaults.headers) {
        push(&format!("defaults.headers.{field}"), msg);
    }
}

fn validate_record(mapping: &MappingRecord, mapping_id: &str, errors: &mut Vec<ValidationError>) {
    let mut push = |field: &str, message: String| {
        errors.push(ValidationError {
            mapping: mapping_id.to_string(),
            field: field.into(),
            message,
            suggestion: None,
        });
    };

    if mapping.destinations.is_empty() {
        push(
            "destinations",
            "at least one destination must be defined".into(),
        );
    }

    for destination in &mapping.destinations {
        if let Err(msg) = validate_destination(destination) {
            push("destinations", msg);
        }
    }

    if let Some(timeout) = mapping.connect_timeout {
        if let Err(msg) = validate_timeout(timeout) {
            push("connect_timeout", msg);
        }
    }
    if let Some(timeout) = mapping.read_timeout {
        if let Err(msg) = validate_timeout(timeout) {
            push("read_timeout", msg);
        }
    }
    if mapping.retry_count.is_some_and(|r| r > MAX_RETRY_COUNT) {
        push(
            "retry_count",
            format!("retry_count must be at most {MAX_RETRY_COUNT}"),
        );
    }
    if let Some(ref pool) = mapping.pool {
        for (field, msg) in pool_errors(pool) {
            push(&format!("pool.{field}"), msg);
        }
    }
    for (field, msg) in header_errors(&mapping.headers) {
        push(&format!("headers.{field}"), msg);
    }
}

fn pool_errors(pool: &PoolSettings) -> Vec<(&'static str, String)> {
    let mut errors = Vec::new();
    if pool.max_connections == 0 {
        errors.push(("max_connections", "max_connections must be at least 1".into()));
    }
    if let Err(msg) = validate_timeout(pool.acquire_timeout) {
        errors.push(("acquire_timeout", msg));
    }
    errors
}

fn header_errors(rules: &HeaderRules) -> Vec<(&'static str, String)> {
    let mut errors = Vec::new();
    for (name, value) in &rules.add {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(("add", format!("'{name}' is not a valid header name")));
        } else if HeaderValue::from_str(value).is_err() {
            errors.push(("add", format!("value of '{name}' is not a valid header value")));
        }
    }
    for name in &rules.strip {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(("strip", format!("'{name}' is not a valid header name")));
        }
    }
    errors
}

fn host_suggestion(host: &str) -> Option<String> {
    let stripped = host
        .split_once("://")
        .map_or(host, |(_, rest)| rest)
        .split('/')
        .next()
        .unwrap_or_default()
        .trim();
    let stripped = if stripped.starts_with('[') {
        stripped.find(']').map_or(stripped, |end| &stripped[..=end])
    } else {
        stripped.split(':').next().unwrap_or_default()
    };
    (!stripped.is_empty() && stripped != host).then(|| format!("did you mean '{stripped}'?"))
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = vec![format!(
        "  {} mappings, {} destinations\n",
        config.mappings.len(),
        config.total_destinations()
    )];

    for mapping in &config.mappings {
        let read_timeout = mapping.read_timeout.map_or_else(
            || format!("{}ms (default)", config.defaults.read_timeout),
            |t| format!("{t}ms"),
        );
        let retries = mapping.retry_count.unwrap_or(config.defaults.retry_count);

        lines.push(format!(
            "  {}  -> {} destinations ({:?})",
            mapping.host,
            mapping.destinations.len(),
            mapping.selector,
        ));
        lines.push(format!("    name: {}", mapping.id()));
        lines.push(format!("    read timeout: {read_timeout}"));
        lines.push(format!("    retries: {retries}"));
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(host: &str, destinations: &[&str]) -> MappingRecord {
        MappingRecord::new(host, destinations.iter().map(|d| (*d).to_string()).collect())
    }

    fn config(mappings: Vec<MappingRecord>) -> Config {
        Config {
            defaults: Defaults::default(),
            mappings,
        }
    }

    #[test]
    fn valid_config_passes() {
        let cfg = config(vec![record("a.example.com", &["http://10.0.0.1:8080"])]);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn empty_mapping_set_is_valid() {
        assert!(validate(&config(vec![])).is_ok());
    }

    #[test]
    fn duplicate_hosts_fail_case_insensitively() {
        let cfg = config(vec![
            record("x.com", &["http://a:80"]),
            record("X.COM", &["http://b:80"]),
        ]);
        let errors = validate(&cfg).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate host")));
    }

    #[test]
    fn malformed_header_rules_fail() {
        let mut bad = record("a.com", &["http://a:80"]);
        bad.headers.add.insert("X Bad".into(), "1".into());
        bad.headers.strip.push("also bad".into());
        let errors = validate(&config(vec![bad])).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "headers.add"));
        assert!(errors.iter().any(|e| e.field == "headers.strip"));
    }

    #[test]
    fn host_with_port_fails_with_suggestion() {
        let errors = validate(&config(vec![record("a.com:8080", &["http://a:80"])])).unwrap_err();
        let error = errors.iter().find(|e| e.field == "host").unwrap();
        assert!(error.message.contains("port"));
        assert_eq!(error.suggestion.as_deref(), Some("did you mean 'a.com'?"));

        assert!(validate_host("[::1]:8080").is_err());
        assert!(validate_host("[::1]").is_ok());
    }

    #[test]
    fn duplicate_names_fail() {
        let mut first = record("a.com", &["http://a:80"]);
        first.name = Some("shared".into());
        let mut second = record("b.com", &["http://b:80"]);
        second.name = Some("shared".into());
        let errors = validate(&config(vec![first, second])).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("duplicate mapping name")));
    }

    #[test]
    fn empty_destinations_fail() {
        let errors = validate(&config(vec![record("a.com", &[])])).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("at least one destination")));
    }

    #[test]
    fn invalid_destination_fails() {
        let errors = validate(&config(vec![record("a.com", &["not a url"])])).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("not a valid URL")));
    }

    #[test]
    fn destination_with_query_fails() {
        let errors =
            validate(&config(vec![record("a.com", &["http://a:80/?x=1"])])).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("query string")));
    }

    #[test]
    fn unsupported_scheme_fails() {
        let errors = validate(&config(vec![record("a.com", &["ftp://a:21"])])).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("unsupported scheme")));
    }

    #[test]
    fn host_with_scheme_suggests_fix() {
        let errors =
            validate(&config(vec![record("https://a.com/", &["http://a:80"])])).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.suggestion.as_deref() == Some("did you mean 'a.com'?")));
    }

    #[test]
    fn zero_timeout_fails() {
        let mut rec = record("a.com", &["http://a:80"]);
        rec.read_timeout = Some(0);
        let errors = validate(&config(vec![rec])).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "read_timeout"));
    }

    #[test]
    fn excessive_retry_count_fails() {
        let mut rec = record("a.com", &["http://a:80"]);
        rec.retry_count = Some(MAX_RETRY_COUNT + 1);
        let errors = validate(&config(vec![rec])).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "retry_count"));
    }

    #[test]
    fn zero_pool_capacity_fails() {
        let mut rec = record("a.com", &["http://a:80"]);
        rec.pool = Some(PoolSettings {
            max_connections: 0,
            ..PoolSettings::default()
        });
        let errors = validate(&config(vec![rec])).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "pool.max_connections"));
    }

    #[test]
    fn all_errors_are_collected() {
        let cfg = config(vec![record("", &[]), record("b.com", &["bad"])]);
        let errors = validate(&cfg).unwrap_err();
        assert!(errors.len() >= 3);
    }
}
