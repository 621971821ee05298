use std::{
    fs::{self, File},
    io::{self, Seek, Write},
    path::{self, Path, PathBuf, StripPrefixError},
};

use derive_more::{Display, Error, From};
use tokio::task::{self, JoinError};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// Deflate level used for every archive entry.
const COMPRESSION_LEVEL: i32 = 9;

/// Errors that may occur during the archive creation process.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ArchiverError {
    /// [`zip`]-crate specific error.
    Zip(zip::result::ZipError),

    /// [`walkdir`]-crate specific error.
    WalkDir(walkdir::Error),

    /// IO error.
    Io(io::Error),

    /// Unable to strip source directory prefix from path.
    StripPrefix(StripPrefixError),

    /// Blocking archive task did not complete.
    Join(JoinError),
}

/// Request to package a directory into a single archive file.
#[derive(Clone, Debug)]
pub(crate) struct ArchiveJob {
    /// Directory whose contents are archived.
    pub source_dir: PathBuf,

    /// Directory the archive file is written to.
    pub dest_dir: PathBuf,

    /// Archive file name inside of `dest_dir`.
    pub filename: String,
}

impl ArchiveJob {
    /// Full path of the produced archive.
    pub(crate) fn output_path(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }
}

/// Package the job's source directory into a zip archive.
///
/// The returned future resolves only after the archive has been finalized,
/// synced to disk and closed, so the file at the returned path is complete.
/// On failure, a partially written archive is removed.
#[instrument(skip_all, fields(filename = %job.filename), err)]
pub(crate) async fn build_archive(job: &ArchiveJob) -> Result<PathBuf, ArchiverError> {
    info!("building {}", job.filename);

    let job = job.clone();
    task::spawn_blocking(move || write_archive_file(&job)).await?
}

/// Blocking part of [`build_archive`].
fn write_archive_file(job: &ArchiveJob) -> Result<PathBuf, ArchiverError> {
    if !job.dest_dir.exists() {
        fs::create_dir(&job.dest_dir)?;
    }

    let path = job.output_path();
    let file = File::create(&path)?;

    let result = build_zip_archive(&job.source_dir, file).and_then(|file| Ok(file.sync_all()?));

    if let Err(error) = result {
        if let Err(remove_error) = fs::remove_file(&path) {
            warn!(
                "unable to remove partial archive {}: {}",
                path.display(),
                remove_error
            );
        }

        return Err(error);
    }

    Ok(path)
}

/// Archive every file under `source_dir` into the provided `file`.
///
/// Entry names are relative to `source_dir`, so the archive root matches the
/// directory root. Only regular files are stored; directories are implied by
/// entry names.
pub(crate) fn build_zip_archive<W: Write + Seek>(
    source_dir: &Path,
    file: W,
) -> Result<W, ArchiverError> {
    let mut writer = ZipWriter::new(file);

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    let mut entries = WalkDir::new(source_dir).sort_by_file_name().into_iter();

    while let Some(entry) = entries.next().transpose()? {
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.path().strip_prefix(source_dir)?.to_str() else {
            warn!("file {} contains non-unicode symbols in path", entry.path().display());
            continue;
        };

        writer.start_file(entry_name(name), options)?;
        io::copy(&mut File::open(entry.path())?, &mut writer)?;
    }

    Ok(writer.finish()?)
}

/// Zip entry names always use forward slashes.
fn entry_name(relative_path: &str) -> String {
    if path::MAIN_SEPARATOR == '/' {
        relative_path.to_owned()
    } else {
        relative_path.replace(path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        fs::{self, File},
        io::{Cursor, Read},
        path::Path,
    };

    use zip::{CompressionMethod, ZipArchive};

    use super::{build_archive, build_zip_archive, ArchiveJob, ArchiverError};

    fn create_sources(root: &Path) {
        fs::create_dir_all(root.join("sub")).expect("unable to create source tree");
        fs::write(root.join("a.js"), "exports.a = () => 'a';\n").expect("unable to write a.js");
        fs::write(root.join("sub/b.js"), "exports.b = () => 'b';\n").expect("unable to write b.js");
    }

    fn entry_names<R: Read + std::io::Seek>(archive: &ZipArchive<R>) -> BTreeSet<String> {
        archive.file_names().map(String::from).collect()
    }

    #[tokio::test]
    async fn package_functions_directory() {
        let dir = tempfile::tempdir().expect("unable to create temporary directory");
        let source_dir = dir.path().join("functions");
        create_sources(&source_dir);

        let job = ArchiveJob {
            source_dir,
            dest_dir: dir.path().join("functions-zip"),
            filename: String::from("my-ext-v1.2.3.zip"),
        };

        assert!(!job.dest_dir.exists());

        let path = build_archive(&job).await.expect("unable to build archive");

        assert_eq!(path, dir.path().join("functions-zip/my-ext-v1.2.3.zip"));
        assert!(path.is_file());

        let mut archive =
            ZipArchive::new(File::open(&path).expect("unable to open archive")).expect("invalid archive");

        assert_eq!(
            entry_names(&archive),
            BTreeSet::from([String::from("a.js"), String::from("sub/b.js")])
        );

        let mut entry = archive.by_name("sub/b.js").expect("missing entry");
        assert_eq!(entry.compression(), CompressionMethod::Deflated);

        let mut contents = String::new();
        entry
            .read_to_string(&mut contents)
            .expect("unable to read entry");
        assert_eq!(contents, "exports.b = () => 'b';\n");
    }

    #[tokio::test]
    async fn archive_is_complete_on_return() {
        let dir = tempfile::tempdir().expect("unable to create temporary directory");
        let source_dir = dir.path().join("functions");
        create_sources(&source_dir);
        fs::write(source_dir.join("large.js"), "// padding\n".repeat(64 * 1024))
            .expect("unable to write large.js");

        let job = ArchiveJob {
            source_dir: source_dir.clone(),
            dest_dir: dir.path().join("out"),
            filename: String::from("bundle.zip"),
        };

        let path = build_archive(&job).await.expect("unable to build archive");

        let on_disk = fs::read(&path).expect("unable to read archive");
        let in_memory = build_zip_archive(&source_dir, Cursor::new(Vec::new()))
            .expect("unable to build in-memory archive")
            .into_inner();

        assert_eq!(on_disk.len(), in_memory.len());
        assert_eq!(
            fs::metadata(&path).expect("missing archive").len(),
            on_disk.len() as u64
        );
        assert!(ZipArchive::new(Cursor::new(on_disk)).is_ok());
    }

    #[tokio::test]
    async fn existing_destination_is_reused() {
        let dir = tempfile::tempdir().expect("unable to create temporary directory");
        let source_dir = dir.path().join("functions");
        create_sources(&source_dir);

        let dest_dir = dir.path().join("functions-zip");
        fs::create_dir(&dest_dir).expect("unable to create destination");
        fs::write(dest_dir.join("my-ext-v1.2.2.zip"), b"old").expect("unable to write old archive");

        let job = ArchiveJob {
            source_dir,
            dest_dir: dest_dir.clone(),
            filename: String::from("my-ext-v1.2.3.zip"),
        };

        build_archive(&job).await.expect("unable to build archive");

        assert!(dest_dir.join("my-ext-v1.2.2.zip").is_file());
        assert!(dest_dir.join("my-ext-v1.2.3.zip").is_file());
    }

    #[tokio::test]
    async fn missing_source_leaves_no_archive() {
        let dir = tempfile::tempdir().expect("unable to create temporary directory");

        let job = ArchiveJob {
            source_dir: dir.path().join("functions"),
            dest_dir: dir.path().join("functions-zip"),
            filename: String::from("my-ext-v1.2.3.zip"),
        };

        let result = build_archive(&job).await;

        assert!(matches!(result, Err(ArchiverError::WalkDir(_))));
        assert!(job.dest_dir.is_dir());
        assert!(!job.output_path().exists());
    }

    #[tokio::test]
    async fn missing_destination_parent() {
        let dir = tempfile::tempdir().expect("unable to create temporary directory");
        let source_dir = dir.path().join("functions");
        create_sources(&source_dir);

        let job = ArchiveJob {
            source_dir,
            dest_dir: dir.path().join("build/functions-zip"),
            filename: String::from("my-ext-v1.2.3.zip"),
        };

        assert!(matches!(
            build_archive(&job).await,
            Err(ArchiverError::Io(_))
        ));
    }
}
