//! Build contexts.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io;
use std::path::PathBuf;

/// Files sent to the engine for an image build.
#[derive(Debug, Clone)]
pub enum BuildContext {
    /// Directory on the host, packed into a gzip tar archive at build time
    Directory(PathBuf),
    /// Ready-made tar archive (optionally compressed)
    Archive(Vec<u8>),
}

impl BuildContext {
    pub fn directory<P: Into<PathBuf>>(path: P) -> Self {
        BuildContext::Directory(path.into())
    }

    /// Produce the archive body for the engine's build endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be read.
    pub fn to_archive(&self) -> io::Result<Vec<u8>> {
        match self {
            BuildContext::Archive(bytes) => Ok(bytes.clone()),
            BuildContext::Directory(path) => {
                if !path.is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("build context {} is not a directory", path.display()),
                    ));
                }

                let encoder = GzEncoder::new(Vec::new(), Compression::default());
                let mut archive = tar::Builder::new(encoder);
                archive.follow_symlinks(false);
                archive.append_dir_all(".", path)?;
                archive.into_inner()?.finish()
            }
        }
    }
}
