use crate::config::types::PipelineConfig;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a pipeline definition from the given path
///
/// The crawler name defaults to the file stem when the file does not set one.
///
/// # Arguments
///
/// * `path` - Path to the YAML pipeline file
///
/// # Returns
///
/// * `Ok(PipelineConfig)` - Successfully loaded and validated definition
/// * `Err(ConfigError)` - Failed to load, parse, or validate the definition
pub fn load_pipeline(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config: PipelineConfig = serde_yaml::from_str(&content)?;

    // Default the crawler name to the file stem
    if config.name.is_none() {
        config.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string());
    }

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the pipeline file content
///
/// Used to detect whether a definition changed between runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a pipeline definition and returns both the config and its hash
pub fn load_pipeline_with_hash(path: &Path) -> Result<(PipelineConfig, String), ConfigError> {
    let config = load_pipeline(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_pipeline() {
        let config_content = r#"
name: docs-crawler
description: Crawl the documentation portal
schedule: daily
delay: 2
pipeline:
  init:
    handler: seed
    params:
      urls:
        - https://example.com/
    handle:
      pass: fetch
  fetch:
    handler: fetch
    handle:
      pass: parse
  parse:
    handler: parse
"#;

        let file = create_temp_config(config_content);
        let config = load_pipeline(file.path()).unwrap();

        assert_eq!(config.name.as_deref(), Some("docs-crawler"));
        assert_eq!(config.schedule, crate::Schedule::Daily);
        assert_eq!(config.delay, 2);
        assert_eq!(config.pipeline.len(), 3);
    }

    #[test]
    fn test_name_defaults_to_file_stem() {
        let config_content = r#"
pipeline:
  init:
    handler: seed
"#;
        let file = create_temp_config(config_content);
        let config = load_pipeline(file.path()).unwrap();

        let stem = file
            .path()
            .file_stem()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert_eq!(config.name.as_deref(), Some(stem.as_str()));
    }

    #[test]
    fn test_load_pipeline_with_invalid_path() {
        let result = load_pipeline(Path::new("/nonexistent/pipeline.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_pipeline_with_invalid_yaml() {
        let file = create_temp_config("pipeline: [not: {valid");
        let result = load_pipeline(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_pipeline_with_dangling_stage_reference() {
        let config_content = r#"
name: broken
pipeline:
  init:
    handler: seed
    handle:
      pass: parse
  parse:
    handler: parse
    handle:
      pass: store
"#;
        let file = create_temp_config(config_content);
        let err = load_pipeline(file.path()).unwrap_err();
        match err {
            ConfigError::UnknownStage {
                stage,
                referenced_by,
            } => {
                assert_eq!(stage, "store");
                assert_eq!(referenced_by, "parse");
            }
            other => panic!("expected UnknownStage, got {other:?}"),
        }
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
