//! Tests for error display formatting.

use boxrun::error::Error;

#[test]
fn test_spawn_and_wait_failures_read_differently() {
    let start = Error::ProcessStart {
        command: "sh".to_string(),
        reason: "no such file".to_string(),
    };
    let wait = Error::ProcessWait {
        command: "sh".to_string(),
        reason: "interrupted".to_string(),
    };

    assert_eq!(
        start.to_string(),
        "failed to start command 'sh': no such file"
    );
    assert_eq!(wait.to_string(), "failed waiting for command 'sh': interrupted");
}

#[test]
fn test_network_error_names_its_context() {
    let err = Error::Network {
        context: "manifest latest".to_string(),
        reason: "status 401 Unauthorized".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "registry request failed (manifest latest): status 401 Unauthorized"
    );
}

#[test]
fn test_unsupported_format_names_the_value() {
    let err = Error::UnsupportedFormat("layer compressor 'lzma'".to_string());
    assert_eq!(err.to_string(), "unsupported format: layer compressor 'lzma'");
}
