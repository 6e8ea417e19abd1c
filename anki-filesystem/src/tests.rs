use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::archive::{Archive, ArchiveWriter, Codec};
use crate::filesystem::ResourceFilesystem;
use crate::Error;

fn write_fixture(root: &Path, interior: &str, bytes: &[u8]) {
    let path = root.join(interior);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

#[test]
fn smoketest_directory_mount() {
    let temp = tempfile::TempDir::new().unwrap();
    write_fixture(temp.path(), "subdir0/hello.txt", b"hello\n");

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(temp.path()).unwrap();
    filesystem.freeze();

    let mut file = filesystem.open("subdir0/hello.txt").unwrap();
    assert_eq!(file.size(), 6);
    assert_eq!(file.read_all_bytes().unwrap(), b"hello\n");
}

#[test]
fn smoketest_archive_mount() {
    let temp = tempfile::TempDir::new().unwrap();
    let archive_path = temp.path().join("dir.ankizip");

    let mut writer = ArchiveWriter::new();
    writer.add("subdir0/hello.txt", b"hell\n", Codec::Store).unwrap();
    writer.write_file(&archive_path).unwrap();

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(&archive_path).unwrap();
    filesystem.freeze();

    let mut file = filesystem.open("subdir0/hello.txt").unwrap();
    assert_eq!(file.size(), 5);
    assert_eq!(file.read_all_bytes().unwrap(), b"hell\n");
}

#[test]
fn deflate_round_trip() {
    let temp = tempfile::TempDir::new().unwrap();
    let archive_path = temp.path().join("data.ankizip");
    let payload: Vec<u8> = b"abcdefgh".iter().cycle().take(4096).copied().collect();

    let mut writer = ArchiveWriter::new();
    writer.add("blob.bin", &payload, Codec::Deflate).unwrap();
    writer.write_file(&archive_path).unwrap();

    let archive = Archive::open(&archive_path).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.entries().count(), 1);
    let entry = archive.entry("blob.bin").unwrap();
    assert_eq!(entry.uncompressed_size, 4096);
    // A repeating payload actually compresses.
    assert!(entry.compressed_size < entry.uncompressed_size);

    let mut file = archive.open_entry("blob.bin").unwrap();
    assert_eq!(file.size(), 4096);
    assert_eq!(file.read_all_bytes().unwrap(), payload);
}

#[test]
fn mixed_codecs_in_one_archive() {
    let temp = tempfile::TempDir::new().unwrap();
    let archive_path = temp.path().join("mixed.ankizip");

    let mut writer = ArchiveWriter::new();
    writer.add("a.txt", b"stored", Codec::Store).unwrap();
    writer.add("b.txt", b"deflated deflated deflated", Codec::Deflate).unwrap();
    writer.write_file(&archive_path).unwrap();

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(&archive_path).unwrap();

    assert_eq!(
        filesystem.open("a.txt").unwrap().read_all_bytes().unwrap(),
        b"stored"
    );
    assert_eq!(
        filesystem.open("b.txt").unwrap().read_all_bytes().unwrap(),
        b"deflated deflated deflated"
    );
}

#[test]
fn earlier_mounts_shadow_later_ones() {
    let first = tempfile::TempDir::new().unwrap();
    let second = tempfile::TempDir::new().unwrap();
    write_fixture(first.path(), "shared.txt", b"first");
    write_fixture(second.path(), "shared.txt", b"second");
    write_fixture(second.path(), "only-second.txt", b"fallthrough");

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(first.path()).unwrap();
    filesystem.mount(second.path()).unwrap();
    filesystem.freeze();

    let mut shared = filesystem.open("shared.txt").unwrap();
    assert_eq!(shared.read_all_bytes().unwrap(), b"first");
    let mut fallthrough = filesystem.open("only-second.txt").unwrap();
    assert_eq!(fallthrough.read_all_bytes().unwrap(), b"fallthrough");
}

#[test]
fn directory_shadows_archive() {
    let dir = tempfile::TempDir::new().unwrap();
    write_fixture(dir.path(), "asset.txt", b"from directory");

    let archive_path = dir.path().join("pack.ankizip");
    let mut writer = ArchiveWriter::new();
    writer.add("asset.txt", b"from archive", Codec::Store).unwrap();
    writer.add("archive-only.txt", b"archive wins", Codec::Store).unwrap();
    writer.write_file(&archive_path).unwrap();

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(dir.path()).unwrap();
    filesystem.mount(&archive_path).unwrap();

    let mut shadowed = filesystem.open("asset.txt").unwrap();
    assert_eq!(shadowed.read_all_bytes().unwrap(), b"from directory");
    let mut archive_only = filesystem.open("archive-only.txt").unwrap();
    assert_eq!(archive_only.read_all_bytes().unwrap(), b"archive wins");
}

#[test]
fn open_canonicalises_filenames() {
    let temp = tempfile::TempDir::new().unwrap();
    write_fixture(temp.path(), "a/b.txt", b"payload");

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(temp.path()).unwrap();

    for spelling in ["a/b.txt", "./a/b.txt", "a/./b.txt", "a/c/../b.txt"] {
        let mut file = filesystem.open(spelling).unwrap();
        assert_eq!(file.read_all_bytes().unwrap(), b"payload");
    }
}

#[test]
fn open_rejects_escapes() {
    let temp = tempfile::TempDir::new().unwrap();
    let filesystem = {
        let mut filesystem = ResourceFilesystem::new();
        filesystem.mount(temp.path()).unwrap();
        filesystem
    };

    assert!(matches!(
        filesystem.open("../secret.txt"),
        Err(Error::PathEscape { .. })
    ));
    assert!(matches!(
        filesystem.open("/etc/passwd"),
        Err(Error::PathEscape { .. })
    ));
    assert!(matches!(
        filesystem.open("a\\b.txt"),
        Err(Error::InvalidPath { .. })
    ));
}

#[test]
fn open_missing_file() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(temp.path()).unwrap();

    assert!(matches!(
        filesystem.open("nope.txt"),
        Err(Error::NotFound(name)) if name == "nope.txt"
    ));
}

#[test]
fn archive_and_directory_files_read_identically() {
    let temp = tempfile::TempDir::new().unwrap();
    let payload = b"0123456789abcdef";
    write_fixture(temp.path(), "data.bin", payload);

    let archive_path = temp.path().join("pack.ankizip");
    let mut writer = ArchiveWriter::new();
    writer.add("stored.bin", payload, Codec::Store).unwrap();
    writer.add("deflated.bin", payload, Codec::Deflate).unwrap();
    writer.write_file(&archive_path).unwrap();

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(temp.path()).unwrap();
    filesystem.mount(&archive_path).unwrap();

    for name in ["data.bin", "stored.bin", "deflated.bin"] {
        let mut file = filesystem.open(name).unwrap();
        assert_eq!(file.size(), payload.len() as u64, "{name}");

        // Absolute seek then a bounded read.
        file.seek_from_start(10).unwrap();
        let mut tail = [0u8; 6];
        file.read_exact(&mut tail).unwrap();
        assert_eq!(&tail, b"abcdef", "{name}");

        // Relative seek back to the middle.
        file.seek(SeekFrom::Current(-8)).unwrap();
        let mut middle = [0u8; 2];
        file.read_exact(&mut middle).unwrap();
        assert_eq!(&middle, b"89", "{name}");

        // Reads past the end are clean EOFs.
        file.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(file.read(&mut tail).unwrap(), 0, "{name}");
    }
}

#[test]
fn read_all_text_strips_trailing_nul() {
    let temp = tempfile::TempDir::new().unwrap();
    write_fixture(temp.path(), "terminated.txt", b"shader source\0");
    write_fixture(temp.path(), "plain.txt", b"shader source");

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(temp.path()).unwrap();

    for name in ["terminated.txt", "plain.txt"] {
        let text = filesystem.open(name).unwrap().read_all_text().unwrap();
        assert_eq!(text, "shader source");
    }
}

#[test]
fn parse_xml_documents() {
    let temp = tempfile::TempDir::new().unwrap();
    write_fixture(
        temp.path(),
        "material.xml",
        b"<material><program>shaders/pbr.vert</program></material>",
    );

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(temp.path()).unwrap();

    let root = filesystem.open("material.xml").unwrap().parse_xml().unwrap();
    assert_eq!(root.name, "material");
    let program = root.get_child("program").unwrap();
    assert_eq!(program.get_text().unwrap(), "shaders/pbr.vert");
}

#[test]
fn walk_visits_directory_mounts_in_order() {
    let first = tempfile::TempDir::new().unwrap();
    let second = tempfile::TempDir::new().unwrap();
    write_fixture(first.path(), "textures/a.tga", b"a");
    write_fixture(first.path(), "textures/deep/b.tga", b"b");
    write_fixture(first.path(), "meshes/c.akms", b"c");
    write_fixture(second.path(), "textures/d.tga", b"d");

    let archive_path = first.path().join("meshes/pack.ankizip");
    let mut writer = ArchiveWriter::new();
    writer.add("textures/in-archive.tga", b"x", Codec::Store).unwrap();
    writer.write_file(&archive_path).unwrap();

    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(first.path()).unwrap();
    filesystem.mount(&archive_path).unwrap();
    filesystem.mount(second.path()).unwrap();
    filesystem.freeze();

    let mut visited = Vec::new();
    filesystem.walk("textures", |path| visited.push(path.to_owned())).unwrap();

    // Directory mounts only, mount order first, lexicographic within a mount.
    assert_eq!(
        visited,
        vec![
            "textures/a.tga".to_owned(),
            "textures/deep/b.tga".to_owned(),
            "textures/d.tga".to_owned(),
        ]
    );

    let mut everything = Vec::new();
    filesystem.walk("", |path| everything.push(path.to_owned())).unwrap();
    assert!(everything.contains(&"meshes/c.akms".to_owned()));
    assert!(everything.contains(&"meshes/pack.ankizip".to_owned()));
}

#[test]
fn corrupt_archives_are_rejected() {
    let temp = tempfile::TempDir::new().unwrap();

    let bad_magic = temp.path().join("bad-magic.ankizip");
    fs::write(&bad_magic, b"NOTANARC\x01\x00\x00\x00\x00\x00\x00\x00").unwrap();
    assert!(matches!(
        Archive::open(&bad_magic),
        Err(Error::CorruptArchive { .. })
    ));

    // A valid prelude that promises more entries than the file holds.
    let truncated = temp.path().join("truncated.ankizip");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&crate::archive::ARCHIVE_MAGIC);
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&3u32.to_le_bytes());
    fs::write(&truncated, &bytes).unwrap();
    assert!(matches!(
        Archive::open(&truncated),
        Err(Error::CorruptArchive { .. })
    ));

    // An index whose payload lies beyond the end of the file.
    let out_of_bounds = temp.path().join("oob.ankizip");
    let mut writer = ArchiveWriter::new();
    writer.add("x.bin", b"0123456789", Codec::Store).unwrap();
    let mut bytes = Vec::new();
    writer.write_to(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 4);
    fs::write(&out_of_bounds, &bytes).unwrap();
    assert!(matches!(
        Archive::open(&out_of_bounds),
        Err(Error::CorruptArchive { .. })
    ));
}

#[test]
fn mount_missing_directory() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut filesystem = ResourceFilesystem::new();
    assert!(matches!(
        filesystem.mount(temp.path().join("missing")),
        Err(Error::NotFound(_))
    ));
}

#[test]
#[should_panic(expected = "fixed after freeze")]
fn mount_after_freeze_panics() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut filesystem = ResourceFilesystem::new();
    filesystem.mount(temp.path()).unwrap();
    filesystem.freeze();
    let _ = filesystem.mount(temp.path());
}
