// config.rs — Loader configuration
//
// Finds and reads the TOML configuration, variable files, and
// `--var NAME=VALUE` assignments, and folds them into `LoadOptions`.
//
// Preconditions: none.
// Postconditions: later sources win: config < var files < `--var`.
// Failure modes: `LoadError` for unreadable or malformed files and
//   malformed assignments.
// Side effects: reads the file system.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use indexmap::IndexMap;
use log::{debug, info};
use serde::Deserialize;

use crate::driver::LoadOptions;
use crate::error::LoadError;
use crate::eval::evaluate_constant;
use crate::parser::parse_expression;
use crate::value::Value;

/// File name looked for in the mod directory and the user config directory.
pub const CONFIG_FILE_NAME: &str = "modload.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub load: LoadSection,
    pub variables: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadSection {
    /// Only decode these block types.
    pub block_types: Option<Vec<String>>,
}

impl LoaderConfig {
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, LoadError> {
        toml::from_str(text).map_err(|source| LoadError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn into_options(self) -> LoadOptions {
        LoadOptions {
            block_types: self.load.block_types,
            variables: self.variables,
        }
    }
}

/// The per-user configuration file, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "modload", "modload").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Find and load the configuration.
///
/// Search order: the explicit path, `modload.toml` in the mod directory,
/// the per-user config directory, then the default configuration.
pub fn load_config(explicit: Option<&Path>, mod_dir: &Path) -> Result<LoaderConfig, LoadError> {
    if let Some(path) = explicit {
        info!(path = path.display().to_string(); "loading configuration from explicit path");
        if !path.exists() {
            return Err(LoadError::MissingConfig(path.to_path_buf()));
        }
        return load_config_file(path);
    }

    let local = mod_dir.join(CONFIG_FILE_NAME);
    if local.is_file() {
        info!(path = local.display().to_string(); "loading configuration from mod directory");
        return load_config_file(&local);
    }

    match default_config_path() {
        Some(path) if path.is_file() => {
            info!(path = path.display().to_string(); "loading configuration from user directory");
            return load_config_file(&path);
        }
        Some(path) => {
            debug!(path = path.display().to_string(); "user configuration file not found");
        }
        None => {
            debug!("could not determine the user configuration directory");
        }
    }

    debug!("no configuration file found, using defaults");
    Ok(LoaderConfig::default())
}

fn load_config_file(path: &Path) -> Result<LoaderConfig, LoadError> {
    let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    LoaderConfig::from_toml(&text, path)
}

/// Read a TOML file of top-level `name = value` variable assignments.
pub fn load_var_file(path: &Path) -> Result<IndexMap<String, Value>, LoadError> {
    let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    let vars: IndexMap<String, Value> = toml::from_str(&text).map_err(|source| LoadError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = path.display().to_string(), count = vars.len(); "loaded variable file");
    Ok(vars)
}

/// Split `NAME=VALUE`. The value is read as a constant expression
/// (`42`, `true`, `["a", "b"]`, `"quoted"`); anything that does not parse
/// as one is taken as a plain string.
pub fn parse_var_assignment(assignment: &str) -> Result<(String, Value), LoadError> {
    let Some((name, raw)) = assignment.split_once('=') else {
        return Err(LoadError::InvalidAssignment(assignment.to_string()));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(LoadError::InvalidAssignment(assignment.to_string()));
    }

    let parsed = parse_expression(raw);
    let value = match parsed.expr {
        Some(expr) if parsed.errors.is_empty() => {
            evaluate_constant(&expr).unwrap_or_else(|_| Value::from(raw))
        }
        _ => Value::from(raw),
    };
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections() {
        let text = r#"
[load]
block_types = ["query", "control"]

[variables]
region = "eu-west-1"
limit = 10
tags = { team = "ops" }
"#;
        let config = LoaderConfig::from_toml(text, Path::new("modload.toml")).unwrap();
        assert_eq!(
            config.load.block_types,
            Some(vec!["query".to_string(), "control".to_string()])
        );
        assert_eq!(config.variables["region"], Value::from("eu-west-1"));
        assert_eq!(config.variables["limit"], Value::from(10.0));
        let options = config.into_options();
        assert_eq!(options.variables.len(), 3);
    }

    #[test]
    fn empty_config_is_default() {
        let config = LoaderConfig::from_toml("", Path::new("modload.toml")).unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = LoaderConfig::from_toml("[output]\nformat = 1\n", Path::new("c.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Config { .. }));
    }

    #[test]
    fn explicit_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(Some(missing.as_path()), dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::MissingConfig(_)));
    }

    #[test]
    fn mod_directory_config_is_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "[variables]\nx = true\n").unwrap();
        let config = load_config(None, dir.path()).unwrap();
        assert_eq!(config.variables["x"], Value::from(true));
    }

    #[test]
    fn var_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.toml");
        fs::write(&path, "region = \"us\"\nports = [80, 443]\n").unwrap();
        let vars = load_var_file(&path).unwrap();
        assert_eq!(vars["region"], Value::from("us"));
        assert_eq!(
            vars["ports"],
            Value::Tuple(vec![Value::from(80.0), Value::from(443.0)])
        );
    }

    #[test]
    fn var_assignments() {
        assert_eq!(
            parse_var_assignment("n=42").unwrap(),
            ("n".to_string(), Value::from(42.0))
        );
        assert_eq!(
            parse_var_assignment("on=true").unwrap().1,
            Value::from(true)
        );
        assert_eq!(
            parse_var_assignment("list=[\"a\", \"b\"]").unwrap().1,
            Value::Tuple(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            parse_var_assignment("region=eu-west-1").unwrap().1,
            Value::from("eu-west-1")
        );
        assert_eq!(
            parse_var_assignment("q=\"quoted\"").unwrap().1,
            Value::from("quoted")
        );
        assert!(parse_var_assignment("novalue").is_err());
        assert!(parse_var_assignment("=1").is_err());
    }
}
