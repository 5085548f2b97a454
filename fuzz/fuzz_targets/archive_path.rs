//! Fuzz target for ArchivePath::new with arbitrary string input.
//!
//! Run with: cargo +nightly fuzz run archive_path

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(path_str) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = pbokit::ArchivePath::new(path_str) else {
        return;
    };

    for segment in path.components() {
        assert!(!segment.is_empty(), "empty segment accepted: {:?}", path_str);
        assert!(!segment.contains(['/', '\\', '\0']));
    }

    // Both string forms parse back to the same path
    let display = path.to_string();
    assert_eq!(pbokit::ArchivePath::new(&display).ok(), Some(path.clone()));
    assert_eq!(pbokit::ArchivePath::new(&path.to_entry_name()).ok(), Some(path));
});
