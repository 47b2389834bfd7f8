mod common;

use std::io::Write;

use common::{generator_stores, query};
use fleetql::{EngineConfig, Role, SearchEngine, ValidationError};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn loads_partial_file_over_defaults() {
    let file = write_config(
        r#"
        max_results = 5
        request_timeout_ms = 3000

        [resolution_weights]
        pattern = 0.5
        alias = 0.4
        graph_label = 0.05
        embedding = 0.05

        [[policy]]
        role = "*"
        action_id = "view_details"
        effect = "allow"
        "#,
    );

    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.max_results, 5);
    assert_eq!(config.request_timeout_ms, Some(3000));
    assert_eq!(config.extraction_timeout_ms, EngineConfig::default().extraction_timeout_ms);
    assert_eq!(config.policy.as_ref().map(Vec::len), Some(1));
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ValidationError::InvalidConfig { message } if message.contains("absent.toml")));
}

#[test]
fn malformed_and_invalid_files_are_rejected() {
    let file = write_config("max_results = [");
    assert!(matches!(
        EngineConfig::from_file(file.path()),
        Err(ValidationError::InvalidConfig { .. })
    ));

    let file = write_config("min_label_similarity = 1.5");
    assert!(matches!(
        EngineConfig::from_file(file.path()),
        Err(ValidationError::OutOfRange { field, .. }) if field == "min_label_similarity"
    ));
}

#[tokio::test]
async fn policy_from_file_drives_the_gate() {
    // Only reads are allowed, for everyone.
    let file = write_config(
        r#"
        [[policy]]
        role = "*"
        action_id = "view_details"
        effect = "allow"

        [[policy]]
        role = "*"
        action_id = "view_history"
        effect = "allow"
        "#,
    );
    let config = EngineConfig::from_file(file.path()).unwrap();
    let engine = SearchEngine::in_memory(&generator_stores(), config).unwrap();

    let frame = engine
        .search(&query("generator oil change due", Role::Captain))
        .await
        .unwrap();
    assert!(!frame.result_items.is_empty());
    for result in &frame.result_items {
        assert!(!result.has_write_action());
        assert!(result.action("view_details").is_some());
    }
}
