use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Component, Path, PathBuf},
};

use bzip2::read::BzDecoder;
use driverman_utils::fs::ensure_dir_exists;
use flate2::read::GzDecoder;
use regex::Regex;
use tracing::{debug, trace};

use crate::error::ArchiveError;

const ZIP_LOCAL_HEADER: &[u8; 4] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8; 4] = b"PK\x05\x06";
const USTAR_MAGIC_OFFSET: usize = 257;
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarBz2,
    TarGz,
    Bz2,
    Gz,
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Detects the format from the file name. Compound suffixes win over single ones.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();

        if name.ends_with(".tar.bz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".bz2") {
            Some(Self::Bz2)
        } else if name.ends_with(".gz") {
            Some(Self::Gz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Detects zip and plain tar archives from their leading bytes.
    pub fn sniff(path: &Path) -> Result<Option<Self>, ArchiveError> {
        let file = File::open(path).map_err(io_error(path, "open"))?;
        let mut head = Vec::with_capacity(USTAR_MAGIC_OFFSET + 5);
        file.take(USTAR_MAGIC_OFFSET as u64 + 5)
            .read_to_end(&mut head)
            .map_err(io_error(path, "read"))?;

        if head.starts_with(ZIP_LOCAL_HEADER) || head.starts_with(ZIP_EMPTY_ARCHIVE) {
            return Ok(Some(Self::Zip));
        }
        if head.get(USTAR_MAGIC_OFFSET..) == Some(b"ustar".as_slice()) {
            return Ok(Some(Self::Tar));
        }
        Ok(None)
    }

    pub fn detect(path: &Path) -> Result<Option<Self>, ArchiveError> {
        match Self::from_path(path) {
            Some(format) => Ok(Some(format)),
            None => Self::sniff(path),
        }
    }
}

/// Unpacks `archive` into `target`.
///
/// Without a pattern every regular file keeps its path relative to `target`. With a pattern,
/// only entries whose full in-archive path matches are written, directly into `target` under
/// their base name, and directory entries are skipped. Symbolic and hard links are never
/// recreated. Any entry that would land outside `target` aborts the extraction with
/// [`ArchiveError::PathTraversal`].
///
/// Files that are not archives are copied into `target` unchanged.
pub fn extract(archive: &Path, target: &Path, pattern: Option<&Regex>) -> Result<(), ArchiveError> {
    ensure_dir_exists(target)?;

    let format = ArchiveFormat::detect(archive)?;
    debug!(
        "extracting {} ({:?}) into {}",
        archive.display(),
        format,
        target.display()
    );

    let open = || File::open(archive).map_err(io_error(archive, "open"));
    let extractor = Extractor {
        archive,
        target,
        pattern,
    };

    match format {
        Some(ArchiveFormat::TarBz2) => extractor.tar(BzDecoder::new(open()?)),
        Some(ArchiveFormat::TarGz) => extractor.tar(GzDecoder::new(open()?)),
        Some(ArchiveFormat::Tar) => extractor.tar(open()?),
        Some(ArchiveFormat::Zip) => extractor.zip(open()?),
        Some(ArchiveFormat::Bz2) => extractor.single(BzDecoder::new(open()?)),
        Some(ArchiveFormat::Gz) => extractor.single(GzDecoder::new(open()?)),
        None => extractor.passthrough(),
    }
}

struct Extractor<'a> {
    archive: &'a Path,
    target: &'a Path,
    pattern: Option<&'a Regex>,
}

impl Extractor<'_> {
    fn tar<R: Read>(&self, reader: R) -> Result<(), ArchiveError> {
        let mut archive = tar::Archive::new(reader);
        let entries = archive.entries().map_err(io_error(self.archive, "read"))?;

        for entry in entries {
            let mut entry = entry.map_err(io_error(self.archive, "read"))?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let kind = entry.header().entry_type();

            if kind.is_dir() {
                self.directory(&name)?;
            } else if kind.is_file() {
                let mode = entry.header().mode().ok();
                self.file(&name, &mut entry, mode)?;
            } else {
                trace!("skipping {:?} entry {}", kind, name);
            }
        }

        Ok(())
    }

    fn zip(&self, file: File) -> Result<(), ArchiveError> {
        let zip_err = |source| {
            ArchiveError::Zip {
                path: self.archive.to_path_buf(),
                source,
            }
        };
        let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(zip_err)?;
            let name = entry.name().to_string();
            let mode = entry.unix_mode();

            if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
                trace!("skipping symlink entry {}", name);
            } else if entry.is_dir() {
                self.directory(&name)?;
            } else {
                self.file(&name, &mut entry, mode)?;
            }
        }

        Ok(())
    }

    fn single<R: Read>(&self, mut reader: R) -> Result<(), ArchiveError> {
        let name = self
            .archive
            .file_stem()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("file"));
        let dest = self.target.join(name);

        write_file(&dest, &mut reader)?;
        Ok(())
    }

    fn passthrough(&self) -> Result<(), ArchiveError> {
        let Some(name) = self.archive.file_name() else {
            return Err(io_error(self.archive, "copy")(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path has no file name",
            )));
        };
        let dest = self.target.join(name);

        debug!("{} is not an archive, copying as is", self.archive.display());
        fs::copy(self.archive, &dest).map_err(io_error(&dest, "copy"))?;
        Ok(())
    }

    fn directory(&self, name: &str) -> Result<(), ArchiveError> {
        let relative = self.sanitize(name)?;
        if self.pattern.is_some() || relative.as_os_str().is_empty() {
            return Ok(());
        }

        let dest = self.target.join(relative);
        fs::create_dir_all(&dest).map_err(io_error(&dest, "create"))
    }

    fn file<R: Read>(&self, name: &str, reader: &mut R, mode: Option<u32>) -> Result<(), ArchiveError> {
        let relative = self.sanitize(name)?;

        let dest = match self.pattern {
            Some(pattern) => {
                if !pattern.is_match(&normalize(name)) {
                    trace!("{} does not match {}", name, pattern);
                    return Ok(());
                }
                match relative.file_name() {
                    Some(base) => self.target.join(base),
                    None => return Ok(()),
                }
            }
            None if relative.as_os_str().is_empty() => return Ok(()),
            None => self.target.join(&relative),
        };

        trace!("writing {}", dest.display());
        write_file(&dest, reader)?;
        if let Some(mode) = mode {
            restore_mode(&dest, mode)?;
        }
        Ok(())
    }

    fn sanitize(&self, name: &str) -> Result<PathBuf, ArchiveError> {
        sanitize_entry_path(name).ok_or_else(|| {
            ArchiveError::PathTraversal {
                archive: self.archive.to_path_buf(),
                entry: name.to_string(),
            }
        })
    }
}

fn normalize(name: &str) -> String {
    name.replace('\\', "/")
}

/// Turns an in-archive name into a relative path. Returns `None` for absolute names and for
/// names whose `..` segments climb above the extraction root.
fn sanitize_entry_path(name: &str) -> Option<PathBuf> {
    let normalized = normalize(name);
    let mut out = PathBuf::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(out)
}

fn write_file<R: Read + ?Sized>(dest: &Path, reader: &mut R) -> Result<(), ArchiveError> {
    if let Some(parent) = dest.parent() {
        ensure_dir_exists(parent)?;
    }
    let mut file = File::create(dest).map_err(io_error(dest, "create"))?;
    io::copy(reader, &mut file).map_err(io_error(dest, "write"))?;
    Ok(())
}

#[cfg(unix)]
fn restore_mode(path: &Path, mode: u32) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt as _;

    if mode & 0o111 == 0 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
        .map_err(io_error(path, "set permissions on"))
}

#[cfg(not(unix))]
fn restore_mode(_path: &Path, _mode: u32) -> Result<(), ArchiveError> {
    Ok(())
}

fn io_error<'a>(path: &'a Path, action: &'static str) -> impl Fn(io::Error) -> ArchiveError + 'a {
    move |source| {
        ArchiveError::Io {
            path: path.to_path_buf(),
            action,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use tar::{EntryType, Header};
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    use super::*;

    const DRIVER: &[u8] = b"\x7fELF pretend driver";
    const README: &[u8] = b"read me";

    fn tar_bytes(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data, mode) in files {
            let mut header = Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(EntryType::Regular);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gz(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn bz2(data: &[u8]) -> Vec<u8> {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn zip_bytes(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, mode) in files {
            let options = SimpleFileOptions::default().unix_permissions(*mode);
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        fn walk(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, Vec<u8>)>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_path_buf();
                    out.push((rel, fs::read(&path).unwrap()));
                }
            }
        }
        let mut out = Vec::new();
        walk(root, root, &mut out);
        out.sort();
        out
    }

    #[test]
    fn test_format_from_path() {
        let cases = [
            ("geckodriver-v0.30.0-linux64.tar.gz", Some(ArchiveFormat::TarGz)),
            ("phantomjs-2.1.1-linux-x86_64.tar.bz2", Some(ArchiveFormat::TarBz2)),
            ("driver.TGZ", Some(ArchiveFormat::TarGz)),
            ("driver.bz2", Some(ArchiveFormat::Bz2)),
            ("driver.gz", Some(ArchiveFormat::Gz)),
            ("driver.tar", Some(ArchiveFormat::Tar)),
            ("chromedriver_win32.zip", Some(ArchiveFormat::Zip)),
            ("IEDriverServer.exe", None),
        ];
        for (name, expected) in cases {
            assert_eq!(ArchiveFormat::from_path(Path::new(name)), expected, "{name}");
        }
    }

    #[test]
    fn test_sniff_zip_without_extension() {
        let dir = tempdir().unwrap();
        let file = write(
            dir.path(),
            "download",
            &zip_bytes(&[("chromedriver", DRIVER, 0o755)]),
        );
        let out = dir.path().join("out");

        assert_eq!(ArchiveFormat::detect(&file).unwrap(), Some(ArchiveFormat::Zip));
        extract(&file, &out, None).unwrap();
        assert_eq!(fs::read(out.join("chromedriver")).unwrap(), DRIVER);
    }

    #[test]
    fn test_sniff_tar_without_extension() {
        let dir = tempdir().unwrap();
        let file = write(
            dir.path(),
            "download",
            &tar_bytes(&[("geckodriver", DRIVER, 0o755)]),
        );

        assert_eq!(ArchiveFormat::sniff(&file).unwrap(), Some(ArchiveFormat::Tar));
    }

    #[test]
    fn test_single_gz_strips_suffix() {
        let dir = tempdir().unwrap();
        let file = write(dir.path(), "operadriver.gz", &gz(DRIVER));
        let out = dir.path().join("out");

        extract(&file, &out, None).unwrap();

        assert_eq!(snapshot(&out), vec![(PathBuf::from("operadriver"), DRIVER.to_vec())]);
    }

    #[test]
    fn test_single_bz2_strips_suffix() {
        let dir = tempdir().unwrap();
        let file = write(dir.path(), "operadriver.bz2", &bz2(DRIVER));
        let out = dir.path().join("out");

        extract(&file, &out, None).unwrap();

        assert_eq!(snapshot(&out), vec![(PathBuf::from("operadriver"), DRIVER.to_vec())]);
    }

    #[test]
    fn test_all_formats_extract_identically() {
        let files: &[(&str, &[u8], u32)] = &[
            ("driver/bin/geckodriver", DRIVER, 0o755),
            ("driver/README.txt", README, 0o644),
        ];
        let tar = tar_bytes(files);
        let dir = tempdir().unwrap();
        let archives = [
            write(dir.path(), "a.tar", &tar),
            write(dir.path(), "a.tar.gz", &gz(&tar)),
            write(dir.path(), "a.tar.bz2", &bz2(&tar)),
            write(dir.path(), "a.zip", &zip_bytes(files)),
        ];

        let mut snapshots = Vec::new();
        for (i, archive) in archives.iter().enumerate() {
            let out = dir.path().join(format!("out{i}"));
            extract(archive, &out, None).unwrap();
            snapshots.push(snapshot(&out));
        }

        assert_eq!(snapshots[0].len(), 2);
        assert!(snapshots.iter().all(|s| s == &snapshots[0]));
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_restored() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempdir().unwrap();
        let file = write(
            dir.path(),
            "d.tar",
            &tar_bytes(&[("geckodriver", DRIVER, 0o755)]),
        );
        let out = dir.path().join("out");

        extract(&file, &out, None).unwrap();

        let mode = fs::metadata(out.join("geckodriver")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn test_pattern_flattens_matches() {
        let files: &[(&str, &[u8], u32)] = &[
            ("dir/sub/file.txt", README, 0o644),
            ("dir/other.bin", DRIVER, 0o755),
        ];
        let dir = tempdir().unwrap();
        let out_tar = dir.path().join("tar");
        let out_zip = dir.path().join("zip");
        let pattern = Regex::new(r".*\.txt$").unwrap();

        extract(&write(dir.path(), "a.tar", &tar_bytes(files)), &out_tar, Some(&pattern)).unwrap();
        extract(&write(dir.path(), "a.zip", &zip_bytes(files)), &out_zip, Some(&pattern)).unwrap();

        for out in [out_tar, out_zip] {
            assert_eq!(snapshot(&out), vec![(PathBuf::from("file.txt"), README.to_vec())]);
            assert!(!out.join("dir").exists());
        }
    }

    #[test]
    fn test_tar_traversal_rejected() {
        let mut header = Header::new_old();
        let name = b"../../etc/passwd";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        let mut builder = tar::Builder::new(Vec::new());
        builder.append(&header, &b"root"[..]).unwrap();
        let data = builder.into_inner().unwrap();

        let dir = tempdir().unwrap();
        let out = dir.path().join("a").join("b").join("out");
        let file = write(dir.path(), "evil.tar", &data);

        let err = extract(&file, &out, None).unwrap_err();

        assert!(matches!(err, ArchiveError::PathTraversal { .. }));
        assert!(!dir.path().join("a").join("etc").exists());
        assert!(snapshot(&out).is_empty());
    }

    #[test]
    fn test_zip_traversal_rejected() {
        let dir = tempdir().unwrap();
        let file = write(
            dir.path(),
            "evil.zip",
            &zip_bytes(&[("../escaped.txt", README, 0o644)]),
        );
        let out = dir.path().join("out");

        let err = extract(&file, &out, None).unwrap_err();

        assert!(matches!(err, ArchiveError::PathTraversal { .. }));
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_traversal_rejected_even_with_pattern() {
        let dir = tempdir().unwrap();
        let file = write(
            dir.path(),
            "evil.zip",
            &zip_bytes(&[("../../escaped.txt", README, 0o644)]),
        );
        let pattern = Regex::new(r".*\.txt$").unwrap();

        let err = extract(&file, &dir.path().join("out"), Some(&pattern)).unwrap_err();
        assert!(matches!(err, ArchiveError::PathTraversal { .. }));
    }

    #[test]
    fn test_tar_symlink_skipped() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut link = Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        link.set_link_name("/etc/passwd").unwrap();
        builder.append_data(&mut link, "passwd", io::empty()).unwrap();
        let mut header = Header::new_gnu();
        header.set_size(DRIVER.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(EntryType::Regular);
        builder.append_data(&mut header, "geckodriver", DRIVER).unwrap();
        let data = builder.into_inner().unwrap();

        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        extract(&write(dir.path(), "l.tar", &data), &out, None).unwrap();

        assert!(fs::symlink_metadata(out.join("passwd")).is_err());
        assert_eq!(fs::read(out.join("geckodriver")).unwrap(), DRIVER);
    }

    #[test]
    fn test_zip_symlink_skipped() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_symlink("passwd", "/etc/passwd", SimpleFileOptions::default())
            .unwrap();
        writer
            .start_file("chromedriver", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(DRIVER).unwrap();
        let data = writer.finish().unwrap().into_inner();

        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        extract(&write(dir.path(), "l.zip", &data), &out, None).unwrap();

        assert!(fs::symlink_metadata(out.join("passwd")).is_err());
        assert_eq!(fs::read(out.join("chromedriver")).unwrap(), DRIVER);
    }

    #[test]
    fn test_directories_created_without_pattern() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_directory("empty/", SimpleFileOptions::default())
            .unwrap();
        let data = writer.finish().unwrap().into_inner();

        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let archive = write(dir.path(), "d.zip", &data);

        extract(&archive, &out, None).unwrap();
        assert!(out.join("empty").is_dir());

        let flat = dir.path().join("flat");
        extract(&archive, &flat, Some(&Regex::new(".*").unwrap())).unwrap();
        assert!(!flat.join("empty").exists());
    }

    #[test]
    fn test_non_archive_passed_through() {
        let dir = tempdir().unwrap();
        let file = write(dir.path(), "IEDriverServer.exe", DRIVER);
        let out = dir.path().join("out");

        extract(&file, &out, None).unwrap();

        assert_eq!(
            snapshot(&out),
            vec![(PathBuf::from("IEDriverServer.exe"), DRIVER.to_vec())]
        );
        assert!(file.exists());
    }

    #[test]
    fn test_sanitize_entry_path() {
        assert_eq!(sanitize_entry_path("a/./b"), Some(PathBuf::from("a/b")));
        assert_eq!(sanitize_entry_path("a/../b"), Some(PathBuf::from("b")));
        assert_eq!(sanitize_entry_path("a\\b"), Some(PathBuf::from("a/b")));
        assert_eq!(sanitize_entry_path("../b"), None);
        assert_eq!(sanitize_entry_path("a/../../b"), None);
        assert_eq!(sanitize_entry_path("/etc/passwd"), None);
    }
}
