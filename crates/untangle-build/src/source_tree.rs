use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use itertools::Itertools;
use tempfile::TempDir;
use tracing::{debug, instrument};

use untangle_normalize::PackageName;
use untangle_pep440::Version;

use crate::Error;

/// A source distribution unpacked into a temporary directory.
///
/// The directory is removed when the [`SourceTree`] is dropped, whether or not the build that
/// used it succeeded.
#[derive(Debug)]
pub struct SourceTree {
    temp_dir: TempDir,
    root: PathBuf,
}

impl SourceTree {
    /// Unpack a `.tar.gz` source distribution and locate the project inside it.
    ///
    /// The project is expected in a top-level directory named like the archive, or
    /// `{name}-{version}` with either the normalized or the underscore form of the name. An
    /// archive with a single top-level directory of another name is accepted too.
    #[instrument(skip(archive, name, version))]
    pub fn extract(
        filename: &str,
        archive: &[u8],
        name: &PackageName,
        version: &Version,
    ) -> Result<Self, Error> {
        let temp_dir = tempfile::Builder::new()
            .prefix("untangle-")
            .suffix(&format!("-metadata-preparation-{filename}"))
            .tempdir()?;
        let extracted = temp_dir.path().join("extracted");

        let mut tar = tar::Archive::new(GzDecoder::new(archive));
        // https://github.com/alexcrichton/tar-rs/issues/349
        tar.set_preserve_mtime(false);
        tar.unpack(&extracted)?;

        let search_dirs = [
            filename.strip_suffix(".tar.gz").unwrap_or(filename).to_string(),
            format!("{name}-{version}"),
            format!("{}-{version}", name.as_dist_info_name()),
        ]
        .into_iter()
        .unique()
        .collect::<Vec<_>>();
        let root = if let Some(dir) = search_dirs
            .iter()
            .map(|dir| extracted.join(dir))
            .find(|dir| dir.is_dir())
        {
            dir
        } else {
            let top_level = fs_err::read_dir(&extracted)?.collect::<Result<Vec<_>, _>>()?;
            match top_level.as_slice() {
                [root] if root.path().is_dir() => root.path(),
                _ => {
                    return Err(Error::InvalidSourceDist(format!(
                        "`{filename}` has no top-level directory named like one of: {}",
                        search_dirs.join(", ")
                    )));
                }
            }
        };
        debug!("Unpacked {filename} to {}", root.display());

        Ok(Self { temp_dir, root })
    }

    /// The project directory, containing the `pyproject.toml` or `setup.py`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A scratch directory next to the project, removed together with it.
    pub fn scratch(&self) -> &Path {
        self.temp_dir.path()
    }
}
