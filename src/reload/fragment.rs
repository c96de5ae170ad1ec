//! Parsing of module config fragment files.

use std::path::Path;

use config::{Config, File};
use serde_json::Value;

use super::ReloadError;

/// Load the raw module configs contained in one fragment file.
///
/// The format follows the file extension. A top-level `modules` array
/// yields one config per element; otherwise the whole file is a single
/// module config. An empty file yields nothing.
pub fn load_fragment(path: &Path) -> Result<Vec<Value>, ReloadError> {
    let load_err = |source| ReloadError::Load {
        path: path.to_path_buf(),
        source,
    };

    let config = Config::builder()
        .add_source(File::from(path))
        .build()
        .map_err(load_err)?;
    let value: Value = config.try_deserialize().map_err(load_err)?;

    match value {
        Value::Object(mut map) => match map.remove("modules") {
            Some(Value::Array(modules)) => Ok(modules),
            Some(_) => Err(ReloadError::InvalidFragment {
                path: path.to_path_buf(),
                reason: "'modules' must be an array".to_string(),
            }),
            None if map.is_empty() => Ok(Vec::new()),
            None => Ok(vec![Value::Object(map)]),
        },
        _ => Err(ReloadError::InvalidFragment {
            path: path.to_path_buf(),
            reason: "expected a table at the top level".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn single_module_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redis.toml");
        fs::write(
            &path,
            r#"
            module = "redis"
            metricsets = ["info"]
            hosts = ["127.0.0.1:6379"]
            period = "5s"
            "#,
        )
        .unwrap();

        let modules = load_fragment(&path).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0]["module"], "redis");
        assert_eq!(modules[0]["hosts"][0], "127.0.0.1:6379");
    }

    #[test]
    fn modules_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("many.toml");
        fs::write(
            &path,
            r#"
            [[modules]]
            module = "fake"
            metricsets = ["status"]

            [[modules]]
            module = "fake"
            metricsets = ["status"]
            enabled = false
            "#,
        )
        .unwrap();

        let modules = load_fragment(&path).unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[1]["enabled"], false);
    }

    #[test]
    fn json_and_yaml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("a.json");
        fs::write(&json, r#"{ "module": "fake", "metricsets": ["status"] }"#).unwrap();
        let yaml = dir.path().join("b.yaml");
        fs::write(&yaml, "modules:\n  - module: fake\n    metricsets: [status]\n").unwrap();

        assert_eq!(load_fragment(&json).unwrap()[0]["module"], "fake");
        assert_eq!(load_fragment(&yaml).unwrap()[0]["metricsets"][0], "status");
    }

    #[test]
    fn empty_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "").unwrap();
        assert!(load_fragment(&path).unwrap().is_empty());
    }

    #[test]
    fn malformed_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "module = [unclosed").unwrap();
        assert!(matches!(load_fragment(&broken), Err(ReloadError::Load { .. })));

        let bad_modules = dir.path().join("bad.toml");
        fs::write(&bad_modules, "modules = \"fake\"").unwrap();
        assert!(matches!(
            load_fragment(&bad_modules),
            Err(ReloadError::InvalidFragment { .. })
        ));
    }
}
