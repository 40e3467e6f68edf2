use crate::config::types::PipelineConfig;
use crate::ConfigError;

/// Validates an entire pipeline definition
///
/// Validation is eager: a definition with a broken stage graph must fail here,
/// before any run could enqueue work for it.
pub fn validate(config: &PipelineConfig) -> Result<(), ConfigError> {
    validate_name(config)?;
    validate_pipeline(config)?;
    Ok(())
}

/// Validates the crawler name
///
/// The name is the sole namespace key into the job and crawl-state stores, so
/// it must be present and filesystem/key safe.
fn validate_name(config: &PipelineConfig) -> Result<(), ConfigError> {
    let name = match &config.name {
        Some(name) if !name.is_empty() => name,
        _ => {
            return Err(ConfigError::Validation(
                "crawler name cannot be empty".to_string(),
            ))
        }
    };

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "crawler name must contain only alphanumeric characters, '-', '_' or '.', got '{}'",
            name
        )));
    }

    Ok(())
}

/// Validates the stage graph
fn validate_pipeline(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.pipeline.is_empty() {
        return Err(ConfigError::Validation(
            "pipeline must define at least one stage".to_string(),
        ));
    }

    if !config.pipeline.contains_key(&config.init_stage) {
        return Err(ConfigError::Validation(format!(
            "init stage '{}' is not defined in the pipeline",
            config.init_stage
        )));
    }

    for (stage_name, stage) in &config.pipeline {
        if stage.handler.is_empty() {
            return Err(ConfigError::Validation(format!(
                "stage '{}' has an empty handler",
                stage_name
            )));
        }

        // Every routing target must name an existing stage
        for target in stage.handle.values() {
            if !config.pipeline.contains_key(target) {
                return Err(ConfigError::UnknownStage {
                    stage: target.clone(),
                    referenced_by: stage_name.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> PipelineConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_valid_pipeline() {
        let config = parse(
            r#"
name: news
pipeline:
  init:
    handler: seed
    handle:
      pass: fetch
  fetch:
    handler: fetch
"#,
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_name_rejected() {
        let config = parse(
            r#"
pipeline:
  init:
    handler: seed
"#,
        );
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_name_charset_rejected() {
        let config = parse(
            r#"
name: "news crawler!"
pipeline:
  init:
    handler: seed
"#,
        );
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let config = parse("name: empty\npipeline: {}\n");
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_init_stage_rejected() {
        let config = parse(
            r#"
name: news
init: bootstrap
pipeline:
  fetch:
    handler: fetch
"#,
        );
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_dangling_handle_target_names_the_stage() {
        let config = parse(
            r#"
name: news
pipeline:
  parse:
    handler: parse
    handle:
      pass: store
"#,
        );
        // init defaults to "init", which is also missing, so point init at parse
        let mut config = config;
        config.init_stage = "parse".to_string();

        match validate(&config) {
            Err(ConfigError::UnknownStage {
                stage,
                referenced_by,
            }) => {
                assert_eq!(stage, "store");
                assert_eq!(referenced_by, "parse");
            }
            other => panic!("expected UnknownStage, got {other:?}"),
        }
    }
}
