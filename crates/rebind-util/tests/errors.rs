use rebind_util::errors::RebindError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = RebindError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_manifest_error_display() {
    let err = RebindError::manifest("bad json");
    assert_eq!(err.to_string(), "Manifest error: bad json");
}

#[test]
fn test_resolution_error_display() {
    let err = RebindError::resolution("Unable to resolve binding redirect for A, Version = 2.0.0.0");
    assert_eq!(
        err.to_string(),
        "Resolution failed: Unable to resolve binding redirect for A, Version = 2.0.0.0"
    );
}

#[test]
fn test_metadata_error_display() {
    let err = RebindError::Metadata {
        path: "lib/net45/A.dll".to_string(),
        message: "missing CLI header".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid module lib/net45/A.dll: missing CLI header"
    );
}

#[test]
fn test_assertion_error_display() {
    let err = RebindError::Assertion {
        message: "redirects differ".to_string(),
    };
    assert_eq!(err.to_string(), "Assertion failed: redirects differ");
}

#[test]
fn test_generic_error_display() {
    let err = RebindError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}
