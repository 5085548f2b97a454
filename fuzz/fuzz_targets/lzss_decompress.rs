//! Fuzz target for the LZSS decoder with arbitrary packed input.
//!
//! Run with: cargo +nightly fuzz run lzss_decompress

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    // First two bytes pick the decoded size, the rest is the packed stream
    let size = u16::from_le_bytes([data[0], data[1]]) as u64;
    if let Ok(decoded) = pbokit::codec::lzss::decompress(&data[2..], size, "fuzz") {
        assert_eq!(decoded.len() as u64, size);
    }
});
