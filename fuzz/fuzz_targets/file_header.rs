//! Fuzz target for the header block and entry table decoder.
//!
//! Run with: cargo +nightly fuzz run file_header

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut cursor = Cursor::new(data);
    let Ok(header) = pbokit::format::read_file_header(&mut cursor) else {
        return;
    };

    // A decoded header never points past the end of the input
    assert!(header.data_end() <= data.len() as u64);
    for (entry, offset) in header.entries.iter().zip(header.entry_offsets()) {
        assert!(offset + entry.data_size as u64 <= data.len() as u64);
        assert!(!entry.path.is_empty());
    }

    let _ = pbokit::format::trailer::verify_trailer(&mut cursor, &header, "fuzz");
});
