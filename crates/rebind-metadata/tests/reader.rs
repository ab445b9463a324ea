use rebind_metadata::{public_key_token, ImageError, ModuleReader, PeModuleReader};

#[test]
fn missing_file_names_the_path() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("Missing.dll");
    let err = PeModuleReader::new().read_identity(&path).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Missing.dll"), "got: {msg}");
}

#[test]
fn text_file_is_not_an_image() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("readme.dll");
    std::fs::write(&path, "just text").unwrap();
    let err = PeModuleReader::new().read_references(&path).unwrap_err();
    assert!(err.to_string().contains("bad DOS signature"), "got: {err}");
}

#[test]
fn truncated_header() {
    let mut data = vec![0u8; 0x40];
    data[0] = b'M';
    data[1] = b'Z';
    data[0x3c] = 0xf0;
    assert!(matches!(
        PeModuleReader::identity_from_bytes(&data),
        Err(ImageError::Truncated(_))
    ));
}

#[test]
fn tokens_are_sixteen_hex_digits() {
    let token = public_key_token(b"any key material");
    assert_eq!(token.len(), 16);
    assert!(token.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
}
