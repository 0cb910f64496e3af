//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

use crate::config::Config;
use crate::plugins::resolver::DependencyGraph;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["logging", "manager", "plugins"];

const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];

const KNOWN_MANAGER: &[&str] = &[
    "health_check_interval_ms",
    "heartbeat_timeout_ms",
    "error_threshold",
    "retry_backoff_ms",
    "health_monitor_enabled",
];

/// Known fields of one plugin manifest entry.
const KNOWN_PLUGIN: &[&str] = &[
    "id",
    "metadata",
    "dependencies",
    "options",
    "error_handling",
];

const KNOWN_ERROR_HANDLING: &[&str] = &["retry_attempts", "timeout_ms", "recovery_strategy"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

/// Report keys of `obj` not in `known`. Returns `true` if any were found.
fn check_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, path, msg));
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "",
            "Config must be a JSON object",
        ));
        return diagnostics;
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = check_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);

    if let Some(logging) = obj.get("logging").and_then(Value::as_object) {
        has_unknown |= check_keys(logging, KNOWN_LOGGING, "logging", &mut diagnostics);
    }
    if let Some(manager) = obj.get("manager").and_then(Value::as_object) {
        has_unknown |= check_keys(manager, KNOWN_MANAGER, "manager", &mut diagnostics);
    }
    if let Some(plugins) = obj.get("plugins").and_then(Value::as_array) {
        for (i, plugin) in plugins.iter().enumerate() {
            let Some(plugin) = plugin.as_object() else {
                continue;
            };
            let prefix = format!("plugins[{}]", i);
            has_unknown |= check_keys(plugin, KNOWN_PLUGIN, &prefix, &mut diagnostics);
            if let Some(eh) = plugin.get("error_handling").and_then(Value::as_object) {
                has_unknown |= check_keys(
                    eh,
                    KNOWN_ERROR_HANDLING,
                    &format!("{}.error_handling", prefix),
                    &mut diagnostics,
                );
            }
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    diagnostics
}

/// Validate manager settings and the plugin manifest of a parsed config.
///
/// Every manifest entry is normalized the way registration would, then the
/// dependency graph is resolved to catch missing dependencies and cycles.
pub fn validate_plugins(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let manager = &config.manager;

    if manager.health_check_interval_ms == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "manager.health_check_interval_ms",
            "must be greater than zero",
        ));
    }
    if manager.heartbeat_timeout_ms < manager.health_check_interval_ms {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "manager.heartbeat_timeout_ms",
            format!(
                "shorter than the health check interval ({}ms); every tick may report stale plugins",
                manager.health_check_interval_ms
            ),
        ));
    }

    let mut graph = DependencyGraph::new();
    let mut seen = HashSet::new();
    for (i, manifest) in config.plugins.iter().enumerate() {
        let path = format!("plugins[{}]", i);
        if !seen.insert(manifest.id.as_str()) {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                path,
                format!("duplicate plugin id '{}'", manifest.id),
            ));
            continue;
        }
        match manifest.config.clone().normalize(&manifest.id) {
            Ok(normalized) => {
                graph.add_node(&manifest.id, normalized.dependencies);
            }
            Err(e) => diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, path, e.to_string())),
        }
    }

    match graph.resolve_order() {
        Ok(order) if !order.is_empty() => diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "plugins",
            format!("Initialization order: {}", order.join(", ")),
        )),
        Ok(_) => {}
        Err(e) => diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, "plugins", e.to_string())),
    }

    diagnostics
}
