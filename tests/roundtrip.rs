//! Round-trip tests: write containers, decode them back and compare.

mod common;

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};

use pbokit::format::{FileHeader, PackingMethod, TRAILER_SIZE, read_file_header};
use pbokit::progress::NoProgress;
use pbokit::{ArchivePath, ArchiveWriter, BinarySource, Descriptor, Document, Header, WriteOptions};

use common::{create_archive_with_result, random_payload, text_payload, write_files};

fn decode(path: &std::path::Path) -> FileHeader {
    let mut reader = BufReader::new(File::open(path).unwrap());
    read_file_header(&mut reader).unwrap()
}

fn slice(path: &std::path::Path, offset: u64, len: u64) -> Vec<u8> {
    let mut file = File::open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    let mut data = vec![0u8; len as usize];
    file.read_exact(&mut data).unwrap();
    data
}

#[test]
fn test_three_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let files: [(&str, &[u8]); 3] = [
        ("config.cpp", b"class CfgPatches {};"),
        ("data\\logo.paa", &[0u8, 1, 2, 3, 4, 5, 6, 7]),
        ("scripts\\init.sqf", b"hint 'ready';"),
    ];
    let options = WriteOptions::new().checksum(false);
    let (archive, result) = create_archive_with_result(
        dir.path(),
        "addon.pbo",
        &[Header::new("prefix", "x\\addon")],
        &files,
        false,
        &options,
    )
    .unwrap();

    let header = decode(&archive);
    assert_eq!(header.headers, [Header::new("prefix", "x\\addon")]);
    assert_eq!(header.entries.len(), 3);
    assert_eq!(header.data_end(), header.file_len);
    assert!(!header.has_trailer());

    let offsets = header.entry_offsets();
    for ((entry, offset), (name, data)) in header.entries.iter().zip(&offsets).zip(&files) {
        assert_eq!(entry.path, ArchivePath::new(name).unwrap());
        assert_eq!(entry.packing_method, PackingMethod::Uncompressed);
        assert_eq!(entry.data_size as usize, data.len());
        assert_eq!(entry.decoded_size(), data.len() as u64);
        assert_eq!(slice(&archive, *offset, entry.data_size as u64), *data);
    }

    let placements: Vec<u64> = result.placements.iter().map(|p| p.offset).collect();
    assert_eq!(placements, offsets);
    assert_eq!(result.archive_size, header.file_len);
}

#[test]
fn test_packed_entries_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let script = text_payload(20_000);
    let files: [(&str, &[u8]); 2] = [("a.sqf", script.as_slice()), ("tiny.txt", b"ab")];
    let (archive, result) = create_archive_with_result(
        dir.path(),
        "packed.pbo",
        &[],
        &files,
        true,
        &WriteOptions::default(),
    )
    .unwrap();

    let header = decode(&archive);
    let big = &header.entries[0];
    assert_eq!(big.packing_method, PackingMethod::Packed);
    assert_eq!(big.original_size as usize, script.len());
    assert!((big.data_size as usize) < script.len());
    // Packing two bytes does not pay off, so they stay stored.
    assert_eq!(header.entries[1].packing_method, PackingMethod::Uncompressed);
    assert!(result.compression_ratio() < 1.0);

    let document = Document::open(&archive).unwrap();
    let tree = document.tree().unwrap();
    let node = tree.get(tree.root(), &ArchivePath::new("a.sqf").unwrap()).unwrap();
    assert_eq!(tree[node].source().unwrap().read_to_vec().unwrap(), script);
}

#[cfg(feature = "checksum")]
#[test]
fn test_trailer_appended_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let (archive, _) = create_archive_with_result(
        dir.path(),
        "sealed.pbo",
        &[],
        &[("a.txt", b"alpha")],
        false,
        &WriteOptions::default(),
    )
    .unwrap();

    let header = decode(&archive);
    assert_eq!(header.file_len, header.data_end() + TRAILER_SIZE);
    let opened = Document::open_with_options(
        &archive,
        pbokit::ReadOptions::new().verify_checksum(true),
    );
    assert!(opened.is_ok());
}

#[test]
fn test_writer_in_memory_rejects_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &[("a.txt", b"alpha"), ("b.txt", b"bravo")]);

    let mut writer = ArchiveWriter::new(Cursor::new(Vec::new())).options(WriteOptions::new().checksum(false));
    writer.add_header(Header::new("product", "game")).unwrap();
    writer
        .add(Descriptor::new(
            ArchivePath::new("a.txt").unwrap(),
            BinarySource::loose(dir.path().join("a.txt")),
        ))
        .unwrap();
    let duplicate = writer.add(Descriptor::new(
        ArchivePath::new("A.TXT").unwrap(),
        BinarySource::loose(dir.path().join("b.txt")),
    ));
    assert!(duplicate.unwrap_err().is_conflict());
    assert_eq!(writer.len(), 1);

    let result = writer.finish(&mut NoProgress).unwrap();
    assert_eq!(result.entries_written, 1);
    assert_eq!(result.total_size, 5);
}

#[test]
fn test_resave_copies_packed_entries_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let script = text_payload(8_192);
    let (archive, _) = create_archive_with_result(
        dir.path(),
        "addon.pbo",
        &[],
        &[("raw.bin", &[9u8; 64]), ("s.sqf", script.as_slice())],
        true,
        &WriteOptions::new().checksum(false),
    )
    .unwrap();
    let before = decode(&archive);

    let mut document = Document::open(&archive).unwrap();
    let copy = dir.path().join("copy.pbo");
    document
        .save_as(&copy, &WriteOptions::new().checksum(false), &mut NoProgress)
        .unwrap();
    assert_eq!(document.path().unwrap(), copy);

    let after = decode(&copy);
    let stored = |h: &FileHeader, i: usize| {
        let offsets = h.entry_offsets();
        (h.entries[i].packing_method, h.entries[i].data_size, offsets[i])
    };
    for i in 0..2 {
        let (method_before, size_before, offset_before) = stored(&before, i);
        let (method_after, size_after, offset_after) = stored(&after, i);
        assert_eq!(method_before, method_after);
        assert_eq!(size_before, size_after);
        assert_eq!(
            slice(&archive, offset_before, size_before as u64),
            slice(&copy, offset_after, size_after as u64)
        );
    }
}

#[test]
fn test_incompressible_entry_stays_stored() {
    let dir = tempfile::tempdir().unwrap();
    let noise = random_payload(16_384);
    let (archive, _) = create_archive_with_result(
        dir.path(),
        "noise.pbo",
        &[],
        &[("noise.bin", noise.as_slice())],
        true,
        &WriteOptions::new().checksum(false),
    )
    .unwrap();

    let header = decode(&archive);
    let entry = &header.entries[0];
    assert_eq!(entry.packing_method, PackingMethod::Uncompressed);
    assert_eq!(entry.data_size as usize, noise.len());
    let offset = header.entry_offsets()[0];
    assert_eq!(slice(&archive, offset, entry.data_size as u64), noise);
}
