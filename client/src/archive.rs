// Chaincode source archives, unpacked into the staging directory before install

use flate2::read::GzDecoder;
use log::{debug, trace};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Chaincode archive {} does not exist", _0.display())]
    Missing(PathBuf),
    #[error("Unsupported chaincode archive format: {}", _0.display())]
    UnsupportedFormat(PathBuf),
    #[error("I/O error while extracting {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid zip archive {}: {}", path.display(), source)]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Entry {} of {} escapes the destination directory", entry, path.display())]
    UnsafeEntry { path: PathBuf, entry: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    // Detect the format from the file name
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

// Extraction is blocking, callers run it off the async runtime
pub trait ArchiveExtractor: Send + Sync {
    // Unpack the archive into destination, returns the number of entries written
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize, ArchiveError>;
}

pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize, ArchiveError> {
        let file = open(archive)?;
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        let io_err = |source| ArchiveError::Io {
            path: archive.to_path_buf(),
            source,
        };

        let mut count = 0;
        for entry in tar.entries().map_err(io_err)? {
            let mut entry = entry.map_err(io_err)?;
            let name = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            // unpack_in refuses entries that would land outside of destination
            if !entry.unpack_in(destination).map_err(io_err)? {
                return Err(ArchiveError::UnsafeEntry {
                    path: archive.to_path_buf(),
                    entry: name,
                });
            }
            trace!("extracted {}", name);
            count += 1;
        }

        Ok(count)
    }
}

pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize, ArchiveError> {
        let file = open(archive)?;
        let zip_err = |source| ArchiveError::Zip {
            path: archive.to_path_buf(),
            source,
        };

        let mut zip = zip::ZipArchive::new(file).map_err(zip_err)?;
        let count = zip.len();
        zip.extract(destination).map_err(zip_err)?;
        Ok(count)
    }
}

// Picks the extractor matching the archive extension
pub struct DefaultExtractor;

impl ArchiveExtractor for DefaultExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize, ArchiveError> {
        let format = ArchiveFormat::detect(archive)
            .ok_or_else(|| ArchiveError::UnsupportedFormat(archive.to_path_buf()))?;

        fs::create_dir_all(destination).map_err(|source| ArchiveError::Io {
            path: destination.to_path_buf(),
            source,
        })?;

        debug!(
            "Extracting {:?} archive {} into {}",
            format,
            archive.display(),
            destination.display()
        );
        match format {
            ArchiveFormat::TarGz => TarGzExtractor.extract(archive, destination),
            ArchiveFormat::Zip => ZipExtractor.extract(archive, destination),
        }
    }
}

fn open(archive: &Path) -> Result<File, ArchiveError> {
    File::open(archive).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ArchiveError::Missing(archive.to_path_buf()),
        _ => ArchiveError::Io {
            path: archive.to_path_buf(),
            source,
        },
    })
}
