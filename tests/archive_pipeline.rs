use filetime::FileTime;
use sandbox_archive::{Config, Error, Filesystem, QuotaTracker};
use std::fs;
use std::path::Path;
use tar::{Builder, EntryType, Header};

fn write(root: &Path, relative: &str, data: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

/// Plain tar whose single member name is written into the header verbatim.
fn raw_tar(name: &[u8], data: &[u8]) -> Vec<u8> {
    let mut header = Header::new_gnu();
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(1_600_000_000);
    header.set_entry_type(EntryType::Regular);
    header.set_cksum();

    let mut builder = Builder::new(Vec::new());
    builder.append(&header, data).unwrap();
    builder.into_inner().unwrap()
}

#[tokio::test]
async fn compress_then_decompress_round_trips() {
    let files: [(&str, &[u8], u32, i64); 2] = [
        ("a.txt", b"0123456789", 0o640, 1_700_000_000),
        ("sub/b.txt", &[7u8; 20], 0o755, 1_650_000_000),
    ];

    let tmp = tempfile::tempdir().unwrap();
    let source = Filesystem::new(Config::new(tmp.path().join("source"))).unwrap();
    for (name, data, _mode, mtime) in files {
        let path = source.root().join("world").join(name);
        write(source.root(), &format!("world/{name}"), data);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(_mode)).unwrap();
        }
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }
    write(source.root(), "world/skipped.txt", b"not selected");

    let archive = source.compress_files("world", &["a.txt", "sub"]).await.unwrap();
    let name = archive.path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("archive-") && name.ends_with(".tar.gz"), "{name}");
    assert!(!name.contains(':'));
    assert_eq!(archive.path.parent().unwrap(), source.root().join("world"));

    let target = Filesystem::new(Config::new(tmp.path().join("target"))).unwrap();
    fs::copy(&archive.path, target.root().join(&name)).unwrap();

    let mut entries = target.archive_entries("", &name).await.unwrap();
    entries.retain(|e| !e.is_dir);
    let mut names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "sub/b.txt"]);

    target.decompress_file("", &name).await.unwrap();
    assert!(!target.root().join("skipped.txt").exists());

    for (name, data, _mode, mtime) in files {
        let path = target.root().join(name);
        assert_eq!(fs::read(&path).unwrap(), data, "{name}");

        let meta = fs::metadata(&path).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&meta),
            FileTime::from_unix_time(mtime, 0),
            "{name}"
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(meta.permissions().mode() & 0o7777, _mode, "{name}");
        }
    }
}

#[tokio::test]
async fn archive_over_the_limit_is_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("srv");
    write(&root, "a.txt", &[1u8; 10]);
    write(&root, "sub/b.txt", &[2u8; 20]);

    let fs = Filesystem::new(Config::new(&root).with_disk_limit(5)).unwrap();
    assert_eq!(fs.quota().current_usage(), 30);

    let err = fs.compress_files("", &["a.txt", "sub/b.txt"]).await.unwrap_err();
    assert!(matches!(err, Error::QuotaExceeded { .. }), "{err}");
    assert_eq!(fs.quota().current_usage(), 30);

    let leftovers: Vec<_> = fs::read_dir(fs.root())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("archive-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn traversal_in_tar_member_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = Filesystem::new(Config::new(tmp.path().join("srv"))).unwrap();
    fs::write(fs.root().join("evil.tar"), raw_tar(b"../../evil.txt", b"pwned")).unwrap();

    let err = fs.decompress_file("", "evil.tar").await.unwrap_err();
    assert!(err.is_containment(), "{err}");
    assert!(err.to_string().contains("evil.tar"));
    assert!(!tmp.path().join("evil.txt").exists());
}

#[tokio::test]
async fn gbk_tar_member_names_are_decoded() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = Filesystem::new(Config::new(tmp.path().join("srv"))).unwrap();
    let name = [0xC4, 0xE3, 0xBA, 0xC3, b'.', b't', b'x', b't'];
    fs::write(fs.root().join("legacy.tar"), raw_tar(&name, b"hello")).unwrap();

    fs.decompress_file("", "legacy.tar").await.unwrap();
    assert_eq!(fs::read(fs.root().join("你好.txt")).unwrap(), b"hello");
    assert_eq!(
        FileTime::from_last_modification_time(&fs::metadata(fs.root().join("你好.txt")).unwrap())
            .unix_seconds(),
        1_600_000_000
    );
}

#[tokio::test]
async fn denylisted_members_are_left_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let source = Filesystem::new(Config::new(tmp.path().join("source"))).unwrap();
    write(source.root(), "config.yml", b"from archive");
    write(source.root(), "server.properties", b"motd=hi");
    let archive = source
        .compress_files("", &["config.yml", "server.properties"])
        .await
        .unwrap();

    let target = Filesystem::new(
        Config::new(tmp.path().join("target")).with_denylist(["config.yml"]),
    )
    .unwrap();
    write(target.root(), "config.yml", b"local");
    let name = archive.path.file_name().unwrap();
    fs::copy(&archive.path, target.root().join(name)).unwrap();

    target.decompress_file("", name).await.unwrap();
    assert_eq!(fs::read(target.root().join("config.yml")).unwrap(), b"local");
    assert_eq!(
        fs::read(target.root().join("server.properties")).unwrap(),
        b"motd=hi"
    );
}

#[tokio::test]
async fn unsupported_and_missing_archives() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = Filesystem::new(Config::new(tmp.path().join("srv"))).unwrap();
    fs::write(fs.root().join("readme.tar.gz"), b"this is not gzip").unwrap();

    let err = fs.decompress_file("", "readme.tar.gz").await.unwrap_err();
    assert!(err.is_unknown_archive(), "{err}");

    let err = fs.decompress_file("", "missing.zip").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err}");

    let err = fs.decompress_file("../..", "etc/passwd").await.unwrap_err();
    assert!(err.is_containment(), "{err}");
}
