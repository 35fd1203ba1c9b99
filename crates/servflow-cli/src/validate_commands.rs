//! The `validate` command: schema-check every YAML and compile every
//! plan, reporting all failures instead of stopping at the first.

use servflow_config::{generate_schema, validate_against_schema, ApiConfig};
use servflow_core::Planner;
use std::path::Path;
use tracing::debug;

/// Validate a config folder. Returns the number of failing files.
pub(crate) fn run(folder: &Path, verbose: bool) -> anyhow::Result<usize> {
    let registry = servflow_core::global_actions();
    servflow_actions::register_builtin_actions(registry)?;
    let schema = generate_schema(&registry.action_schemas());

    let mut paths: Vec<_> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    paths.sort();

    let mut failures = 0;
    for path in &paths {
        match validate_file(path, &schema, registry) {
            Ok(()) => {
                if verbose {
                    println!("OK   {}", path.display());
                }
            }
            Err(messages) => {
                failures += 1;
                println!("FAIL {}", path.display());
                for message in messages {
                    println!("     {message}");
                }
            }
        }
    }
    if verbose {
        println!("checked {} file(s), {failures} failure(s)", paths.len());
    }
    Ok(failures)
}

fn validate_file(
    path: &Path,
    schema: &serde_json::Value,
    registry: &servflow_core::ActionRegistry,
) -> Result<(), Vec<String>> {
    let raw = std::fs::read_to_string(path).map_err(|e| vec![e.to_string()])?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|e| vec![format!("YAML parse: {e}")])?;
    let instance = serde_json::to_value(&yaml).map_err(|e| vec![e.to_string()])?;

    validate_against_schema(schema, &instance)?;

    let config: ApiConfig =
        serde_yaml::from_str(&raw).map_err(|e| vec![format!("deserialize: {e}")])?;
    if config.has_conflicting_surfaces() {
        return Err(vec![format!(
            "api {:?} declares both an HTTP endpoint and an MCP tool",
            config.id
        )]);
    }
    debug!(api = %config.id, "schema ok, compiling plan");
    Planner::new(&config, registry)
        .compile()
        .map(|_| ())
        .map_err(|e| vec![format!("plan compile: {e}")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn valid_and_invalid_files_are_tallied() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "good.yaml",
            r#"
id: good
http:
  listenPath: hello
  method: GET
  next: response.ok
responses:
  ok:
    code: 200
    template: ok
"#,
        );
        write_file(
            dir.path(),
            "bad-code.yaml",
            r#"
id: bad
responses:
  r:
    code: 1000
    template: nope
"#,
        );
        write_file(
            dir.path(),
            "bad-ref.yaml",
            r#"
id: dangling
http:
  listenPath: x
  method: GET
  next: response.ghost
"#,
        );

        let failures = run(dir.path(), false).unwrap();
        assert_eq!(failures, 2);
    }
}
