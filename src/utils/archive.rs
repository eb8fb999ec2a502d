//! tar.gz archive creation and extraction

use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Timestamp layout embedded in artifact names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Unsupported archive format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// An archive produced for one job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArtifact {
    pub path: PathBuf,
    pub encrypted: bool,
    pub from_folder: bool,
}

impl ArchiveArtifact {
    /// File name of the artifact as it is uploaded
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }
}

/// `<base>_<YYYYMMDD_HHMMSS>.tar.gz`
pub fn artifact_file_name(base: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.tar.gz", base, now.format(TIMESTAMP_FORMAT))
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms)
}

fn mtime_of(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn header_for(meta: &fs::Metadata, entry_type: EntryType, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode_of(meta));
    header.set_mtime(mtime_of(meta));
    header
}

fn append_entry<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    name: &Path,
    meta: &fs::Metadata,
) -> Result<()> {
    let file_type = meta.file_type();

    if file_type.is_dir() {
        let mut header = header_for(meta, EntryType::Directory, 0);
        builder
            .append_data(&mut header, name, io::empty())
            .map_err(io_err(path))?;
    } else if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(io_err(path))?;
        let mut header = header_for(meta, EntryType::Symlink, 0);
        builder
            .append_link(&mut header, name, &target)
            .map_err(io_err(path))?;
    } else if file_type.is_file() {
        let file = File::open(path).map_err(io_err(path))?;
        let mut header = header_for(meta, EntryType::Regular, meta.len());
        builder
            .append_data(&mut header, name, BufReader::new(file))
            .map_err(io_err(path))?;
    } else {
        warn!("Skipping unsupported file type: {}", path.display());
    }

    Ok(())
}

/// Append `root` and everything below it. Entry names are relative to `root`,
/// placed under `prefix` when one is given.
fn append_tree<W: Write>(builder: &mut Builder<W>, root: &Path, prefix: Option<&Path>) -> Result<usize> {
    let mut count = 0;

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());

        let name = match prefix {
            Some(prefix) => prefix.join(relative),
            None if relative.as_os_str().is_empty() => continue,
            None => relative.to_path_buf(),
        };

        let meta = entry.metadata()?;
        append_entry(builder, entry.path(), &name, &meta)?;
        count += 1;
    }

    Ok(count)
}

fn create_archive(output: &Path) -> Result<Builder<GzEncoder<BufWriter<File>>>> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let file = File::create(output).map_err(io_err(output))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);
    Ok(builder)
}

fn finish_archive(builder: Builder<GzEncoder<BufWriter<File>>>, output: &Path) -> Result<()> {
    let encoder = builder.into_inner().map_err(io_err(output))?;
    let mut writer = encoder.finish().map_err(io_err(output))?;
    writer.flush().map_err(io_err(output))?;
    Ok(())
}

/// Archive a single entry of the data root. The entry is stored under its base name.
pub fn compress_file(data_root: &Path, file_name: &str, output: &Path) -> Result<ArchiveArtifact> {
    let source = data_root.join(file_name);
    let meta = fs::symlink_metadata(&source)
        .map_err(|_| ArchiveError::SourceNotFound(source.clone()))?;

    let base = source
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| ArchiveError::SourceNotFound(source.clone()))?;

    info!("Compressing {} into {}", source.display(), output.display());

    let mut builder = create_archive(output)?;
    if meta.is_dir() {
        append_tree(&mut builder, &source, Some(&base))?;
    } else {
        append_entry(&mut builder, &source, &base, &meta)?;
    }
    finish_archive(builder, output)?;

    Ok(ArchiveArtifact {
        path: output.to_path_buf(),
        encrypted: false,
        from_folder: false,
    })
}

/// Copy `src` into `dst`, keeping modes, modification times and symlinks
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    if !src.is_dir() {
        return Err(ArchiveError::SourceNotFound(src.to_path_buf()));
    }

    debug!("Copying {} to {}", src.display(), dst.display());
    fs::create_dir_all(dst).map_err(io_err(dst))?;

    let mut directories = Vec::new();
    let mut copied = 0u64;

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dst.join(relative);
        let meta = entry.metadata()?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_err(&target))?;
            directories.push((target, mode_of(&meta)));
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(io_err(&target))?;
            if let Ok(modified) = meta.modified() {
                let file = File::open(&target).map_err(io_err(&target))?;
                file.set_modified(modified).map_err(io_err(&target))?;
            }
            copied += 1;
        } else {
            warn!("Skipping unsupported file type: {}", entry.path().display());
        }
    }

    // Restrictive directory modes only after their contents exist
    for (dir, mode) in directories.into_iter().rev() {
        set_mode(&dir, mode).map_err(io_err(&dir))?;
    }

    debug!("Copied {} files into staging", copied);
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).map_err(io_err(src))?;
    std::os::unix::fs::symlink(&target, dst).map_err(io_err(dst))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> Result<()> {
    warn!("Skipping symlink: {}", src.display());
    Ok(())
}

/// Archive the contents of a staging directory
pub fn compress_folder(staging: &Path, output: &Path) -> Result<ArchiveArtifact> {
    if !staging.is_dir() {
        return Err(ArchiveError::SourceNotFound(staging.to_path_buf()));
    }

    info!("Compressing {} into {}", staging.display(), output.display());

    let mut builder = create_archive(output)?;
    let entries = append_tree(&mut builder, staging, None)?;
    finish_archive(builder, output)?;

    debug!("Archived {} entries", entries);
    Ok(ArchiveArtifact {
        path: output.to_path_buf(),
        encrypted: false,
        from_folder: true,
    })
}

/// Reject absolute paths and parent traversal, drop `.` components
fn sanitize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(clean)
}

fn unpack_entries<R: Read>(mut archive: Archive<R>, archive_path: &Path, dest: &Path) -> Result<usize> {
    let mut directories = Vec::new();
    let mut restored = 0;

    for entry in archive.entries().map_err(io_err(archive_path))? {
        let mut entry = entry.map_err(io_err(archive_path))?;
        let raw_path = entry.path().map_err(io_err(archive_path))?.into_owned();

        let relative = match sanitize_entry_path(&raw_path) {
            Some(relative) => relative,
            None => {
                warn!("Skipping unsafe entry path: {}", raw_path.display());
                continue;
            }
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let output = dest.join(&relative);
        let mode = entry.header().mode().unwrap_or(0o644);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&output).map_err(io_err(&output))?;
                directories.push((output, mode));
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = output.parent() {
                    fs::create_dir_all(parent).map_err(io_err(parent))?;
                }
                let mut file = File::create(&output).map_err(io_err(&output))?;
                io::copy(&mut entry, &mut file).map_err(io_err(&output))?;
                if let Ok(mtime) = entry.header().mtime() {
                    let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(mtime);
                    file.set_modified(modified).map_err(io_err(&output))?;
                }
                drop(file);
                set_mode(&output, mode).map_err(io_err(&output))?;
                restored += 1;
            }
            other => {
                warn!(
                    "Skipping unsupported file type: {:?} in file {}",
                    other,
                    raw_path.display()
                );
            }
        }
    }

    for (dir, mode) in directories.into_iter().rev() {
        set_mode(&dir, mode).map_err(io_err(&dir))?;
    }

    Ok(restored)
}

/// Extract a `.tar.gz` / `.tgz` or plain `.tar` archive into `dest`
pub fn extract(archive_path: &Path, dest: &Path) -> Result<usize> {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    info!("Extracting backup...");
    fs::create_dir_all(dest).map_err(io_err(dest))?;
    let file = File::open(archive_path).map_err(io_err(archive_path))?;
    let reader = BufReader::new(file);

    let restored = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        unpack_entries(Archive::new(GzDecoder::new(reader)), archive_path, dest)?
    } else if name.ends_with(".tar") {
        unpack_entries(Archive::new(reader), archive_path, dest)?
    } else {
        return Err(ArchiveError::UnsupportedFormat(archive_path.to_path_buf()));
    };

    info!("Extracting backup...done ({} files)", restored);
    Ok(restored)
}
