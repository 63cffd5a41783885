//! `hostgate init` — generate a starter mapping document.
//!
//! Writes a YAML, JSON, or TOML document with either a minimal or a fully
//! documented template.

use std::path::PathBuf;

use crate::cli::{DocumentFormat, InitArgs};
use crate::error::HostgateError;

pub fn execute(args: &InitArgs) -> Result<(), HostgateError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("hostgate.{}", args.format.extension())));

    if output.exists() && !args.force {
        return Err(HostgateError::FileExists { path: output });
    }

    std::fs::write(&output, template(args.format, args.full))?;
    println!("Created {}", output.display());
    println!("Check it with: hostgate validate {}", output.display());
    Ok(())
}

#[must_use]
pub const fn template(format: DocumentFormat, full: bool) -> &'static str {
    match (format, full) {
        (DocumentFormat::Yaml, false) => YAML_MINIMAL,
        (DocumentFormat::Yaml, true) => YAML_FULL,
        (DocumentFormat::Json, false) => JSON_MINIMAL,
        (DocumentFormat::Json, true) => JSON_FULL,
        (DocumentFormat::Toml, false) => TOML_MINIMAL,
        (DocumentFormat::Toml, true) => TOML_FULL,
    }
}

const YAML_MINIMAL: &str = r#"# hostgate mapping document

mappings:
  - host: "app.example.com"
    destinations:
      - "http://127.0.0.1:3000"
"#;

const YAML_FULL: &str = r#"# hostgate mapping document
#
# Values under `defaults` are the built-in defaults; every mapping inherits
# them unless it overrides the option itself.

defaults:
  connect_timeout: 500      # ms to establish an upstream connection
  read_timeout: 2000        # ms per attempt, sending plus reading the full body
  retry_count: 0            # extra destinations tried on timeout or refused connection
  forward_headers: true     # pass client headers through
  proxy_headers: true       # add X-Forwarded-For/-Proto/-Host/-Port
  strip_hop_by_hop: true    # drop Connection, Keep-Alive, TE, ...
  headers:
    add: {}                 # header: value, set on every forwarded request
    strip: []               # header names removed from every forwarded request
  pool:
    max_idle_per_host: 32   # idle keep-alive connections per destination
    idle_timeout: 30        # seconds an idle connection is kept
    max_connections: 256    # concurrent calls per mapping
    acquire_timeout: 1000   # ms a call waits for a free slot before failing

mappings:
  # Hosts match case-insensitively and must be unique.
  - name: "app"                       # pool identity, defaults to the host
    host: "app.example.com"
    destinations:
      - "http://10.0.0.1:8080"
      - "http://10.0.0.2:8080"
    path_preserved: true              # append the request path to the destination
    selector: "round-robin"           # round-robin | first-available | random
    retry_count: 1
    read_timeout: 5000
    preserve_host: false              # send the destination authority as Host
    force_https: false                # redirect plain-HTTP clients to https://
    headers:
      add:
        X-Gateway: "hostgate"
      strip:
        - "X-Debug"
    pool:
      max_connections: 64

  - host: "legacy.example.com"
    destinations:
      - "http://10.0.1.1:8080/maintenance"
    path_preserved: false             # every request lands on /maintenance
    selector: "first-available"
"#;

const JSON_MINIMAL: &str = r#"{
  "mappings": [
    {
      "host": "app.example.com",
      "destinations": ["http://127.0.0.1:3000"]
    }
  ]
}
"#;

const JSON_FULL: &str = r#"{
  "defaults": {
    "connect_timeout": 500,
    "read_timeout": 2000,
    "retry_count": 0,
    "forward_headers": true,
    "proxy_headers": true,
    "strip_hop_by_hop": true,
    "headers": { "add": {}, "strip": [] },
    "pool": {
      "max_idle_per_host": 32,
      "idle_timeout": 30,
      "max_connections": 256,
      "acquire_timeout": 1000
    }
  },
  "mappings": [
    {
      "name": "app",
      "host": "app.example.com",
      "destinations": ["http://10.0.0.1:8080", "http://10.0.0.2:8080"],
      "path_preserved": true,
      "selector": "round-robin",
      "retry_count": 1,
      "read_timeout": 5000,
      "preserve_host": false,
      "force_https": false,
      "headers": { "add": { "X-Gateway": "hostgate" }, "strip": ["X-Debug"] },
      "pool": { "max_connections": 64 }
    },
    {
      "host": "legacy.example.com",
      "destinations": ["http://10.0.1.1:8080/maintenance"],
      "path_preserved": false,
      "selector": "first-available"
    }
  ]
}
"#;

const TOML_MINIMAL: &str = r#"# hostgate mapping document

[[mappings]]
host = "app.example.com"
destinations = ["http://127.0.0.1:3000"]
"#;

const TOML_FULL: &str = r#"# hostgate mapping document
#
# Values under [defaults] are the built-in defaults; every mapping inherits
# them unless it overrides the option itself.

[defaults]
connect_timeout = 500      # ms to establish an upstream connection
read_timeout = 2000        # ms per attempt, sending plus reading the full body
retry_count = 0            # extra destinations tried on timeout or refused connection
forward_headers = true
proxy_headers = true       # add X-Forwarded-For/-Proto/-Host/-Port
strip_hop_by_hop = true

[defaults.headers]
add = {}
strip = []

[defaults.pool]
max_idle_per_host = 32
idle_timeout = 30          # seconds
max_connections = 256
acquire_timeout = 1000     # ms

[[mappings]]
name = "app"
host = "app.example.com"
destinations = ["http://10.0.0.1:8080", "http://10.0.0.2:8080"]
path_preserved = true
selector = "round-robin"   # round-robin | first-available | random
retry_count = 1
read_timeout = 5000
preserve_host = false
force_https = false

[mappings.headers]
add = { X-Gateway = "hostgate" }
strip = ["X-Debug"]

[mappings.pool]
max_connections = 64

[[mappings]]
host = "legacy.example.com"
destinations = ["http://10.0.1.1:8080/maintenance"]
path_preserved = false
selector = "first-available"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sources::parse_config_str;
    use crate::config::validation::validate;

    fn assert_valid(ext: &str, content: &str) {
        let config = parse_config_str(ext, content, "template").unwrap();
        assert!(validate(&config).is_ok(), "{ext} template failed validation");
        assert!(!config.mappings.is_empty());
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_templates_are_valid() {
        assert_valid("yaml", template(DocumentFormat::Yaml, false));
        assert_valid("yaml", template(DocumentFormat::Yaml, true));
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_templates_are_valid() {
        assert_valid("json", template(DocumentFormat::Json, false));
        assert_valid("json", template(DocumentFormat::Json, true));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn toml_templates_are_valid() {
        assert_valid("toml", template(DocumentFormat::Toml, false));
        assert_valid("toml", template(DocumentFormat::Toml, true));
    }
}
