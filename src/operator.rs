//! Operator versions as laid out on disk:
//!
//! ```text
//! <dir>/operator.yaml    name, version, tasks, plans
//! <dir>/params.yaml      parameters (optional)
//! <dir>/templates/*      one template per file, named by file name
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::OperatorError;
use crate::model::{OperatorVersion, Parameter, Plan, TaskSpec};

#[derive(Deserialize)]
struct OperatorManifest {
    name: String,
    version: String,
    #[serde(default)]
    tasks: HashMap<String, TaskSpec>,
    #[serde(default)]
    plans: HashMap<String, Plan>,
}

#[derive(Deserialize, Default)]
struct ParamsFile {
    #[serde(default)]
    parameters: Vec<Parameter>,
}

fn read(path: &Path) -> Result<String, OperatorError> {
    std::fs::read_to_string(path).map_err(|source| OperatorError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, OperatorError> {
    serde_yaml::from_str(&read(path)?).map_err(|source| OperatorError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_operator_dir(dir: &Path) -> Result<OperatorVersion, OperatorError> {
    let manifest_path = dir.join("operator.yaml");
    if !manifest_path.is_file() {
        return Err(OperatorError::MissingManifest(dir.display().to_string()));
    }
    let manifest: OperatorManifest = parse(&manifest_path)?;

    let params_path = dir.join("params.yaml");
    let params: ParamsFile = if params_path.is_file() {
        parse(&params_path)?
    } else {
        ParamsFile::default()
    };

    let mut templates = HashMap::new();
    let templates_dir = dir.join("templates");
    if templates_dir.is_dir() {
        let entries = std::fs::read_dir(&templates_dir).map_err(|source| OperatorError::Io {
            path: templates_dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| OperatorError::Io {
                path: templates_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            templates.insert(name, read(&path)?);
        }
    }

    Ok(OperatorVersion {
        name: manifest.name,
        version: manifest.version,
        tasks: manifest.tasks,
        plans: manifest.plans,
        parameters: params.parameters,
        templates,
    })
}

/// Loads every operator directory under `root`. Broken directories are
/// logged and skipped; a missing root yields nothing.
pub fn load_operators(root: &Path) -> Vec<OperatorVersion> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::info!(target: "planexec", "no operators loaded from {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut operators = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match load_operator_dir(&path) {
            Ok(op) => {
                log::info!(target: "planexec", "loaded operator version {}", op.full_name());
                operators.push(op);
            }
            Err(e) => log::warn!(target: "planexec", "skipping {}: {}", path.display(), e),
        }
    }
    operators.sort_by_key(|op| op.full_name());
    operators
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_operator(dir: &Path) {
        fs::create_dir_all(dir.join("templates")).unwrap();
        fs::write(
            dir.join("operator.yaml"),
            "name: redis\nversion: 6.2.0\ntasks:\n  app:\n    resources: [deployment.yaml]\nplans:\n  deploy:\n    phases:\n      - name: main\n        steps:\n          - name: app\n            tasks: [app]\n",
        )
        .unwrap();
        fs::write(
            dir.join("params.yaml"),
            "parameters:\n  - name: replicas\n    default: \"1\"\n",
        )
        .unwrap();
        fs::write(
            dir.join("templates").join("deployment.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {{ .Name }}\nspec:\n  replicas: {{ .Params.replicas }}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_load_operator_dir() {
        let tmp = TempDir::new().unwrap();
        write_operator(tmp.path());

        let op = load_operator_dir(tmp.path()).unwrap();
        assert_eq!(op.full_name(), "redis-6.2.0");
        assert_eq!(op.tasks["app"].resources, vec!["deployment.yaml"]);
        assert_eq!(op.plans["deploy"].phases[0].steps[0].tasks, vec!["app"]);
        assert_eq!(op.parameters[0].default.as_deref(), Some("1"));
        assert!(op.templates["deployment.yaml"].contains("{{ .Params.replicas }}"));
    }

    #[test]
    fn test_params_file_is_optional() {
        let tmp = TempDir::new().unwrap();
        write_operator(tmp.path());
        fs::remove_file(tmp.path().join("params.yaml")).unwrap();

        let op = load_operator_dir(tmp.path()).unwrap();
        assert!(op.parameters.is_empty());
    }

    #[test]
    fn test_missing_manifest_and_bad_yaml() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_operator_dir(tmp.path()),
            Err(OperatorError::MissingManifest(_))
        ));

        fs::write(tmp.path().join("operator.yaml"), "name: [unclosed").unwrap();
        assert!(matches!(load_operator_dir(tmp.path()), Err(OperatorError::Yaml { .. })));
    }

    #[test]
    fn test_load_operators_skips_broken_dirs() {
        let tmp = TempDir::new().unwrap();
        write_operator(&tmp.path().join("redis"));
        fs::create_dir_all(tmp.path().join("broken")).unwrap();

        let ops = load_operators(tmp.path());
        assert_eq!(ops.len(), 1);
        assert!(load_operators(&tmp.path().join("absent")).is_empty());
    }
}
