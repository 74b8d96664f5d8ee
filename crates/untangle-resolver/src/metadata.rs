use std::cell::RefCell;
use std::io::{Cursor, Read};
use std::path::Path;
use std::rc::Rc;

use flate2::read::GzDecoder;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument, warn};
use url::Url;
use zip::ZipArchive;
use zip::result::ZipError;

use untangle_build::{Interpreter, SourceBuild, SourceTree};
use untangle_client::{FixtureRecorder, RegistryClient};
use untangle_distribution_filename::{DistFilename, SourceDistFilename};
use untangle_normalize::PackageName;
use untangle_pypi_types::Metadata;

use crate::{Candidate, MetadataError};

/// Obtains the core metadata of distributions, trying in order:
///
/// 1. the `.metadata` file the index serves next to the distribution,
/// 2. the metadata file inside the downloaded distribution,
/// 3. for source distributions, asking the build backend to prepare the metadata.
///
/// Source distributions of packages in `legacy_metadata` skip straight to the build backend.
/// Results are cached by URL for the lifetime of the fetcher.
pub struct MetadataFetcher<'a> {
    client: &'a RegistryClient,
    interpreter: &'a Interpreter,
    legacy_metadata: FxHashSet<PackageName>,
    recorder: Option<&'a FixtureRecorder>,
    cache: RefCell<FxHashMap<Url, Rc<Metadata>>>,
}

impl<'a> MetadataFetcher<'a> {
    pub fn new(client: &'a RegistryClient, interpreter: &'a Interpreter) -> Self {
        Self {
            client,
            interpreter,
            legacy_metadata: FxHashSet::default(),
            recorder: None,
            cache: RefCell::default(),
        }
    }

    /// Build the metadata of these packages from source.
    #[must_use]
    pub fn with_legacy_metadata(mut self, names: impl IntoIterator<Item = PackageName>) -> Self {
        self.legacy_metadata.extend(names);
        self
    }

    /// Record all metadata that is used into a fixture.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Option<&'a FixtureRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    #[instrument(skip_all, fields(candidate = %candidate))]
    pub fn fetch(&self, candidate: &Candidate) -> Result<Rc<Metadata>, MetadataError> {
        if let Some(metadata) = self.cache.borrow().get(candidate.url()) {
            return Ok(metadata.clone());
        }

        let filename = candidate.filename().to_string();
        let raw = self.fetch_raw(candidate)?;
        let metadata = Metadata::parse(&raw).map_err(|err| MetadataError::Invalid {
            filename: filename.clone(),
            err,
        })?;
        if let Some(recorder) = self.recorder {
            recorder
                .record_metadata(&filename, &raw)
                .map_err(|err| MetadataError::Record { filename, err })?;
        }

        let metadata = Rc::new(metadata);
        self.cache
            .borrow_mut()
            .insert(candidate.url().clone(), metadata.clone());
        Ok(metadata)
    }

    fn fetch_raw(&self, candidate: &Candidate) -> Result<Vec<u8>, MetadataError> {
        let filename = candidate.filename();
        let url = candidate.url();

        if self.legacy_metadata.contains(filename.name()) {
            if let DistFilename::SourceDistFilename(sdist) = filename {
                warn!("Building the metadata of {filename} from source, as requested");
                let archive = self.client.download(url)?;
                return self.build(sdist, url, &archive);
            }
            debug!("{filename} is not a source distribution; ignoring the legacy metadata request");
        }

        if let Some(raw) = self.client.metadata_sidecar(url)? {
            match Metadata::parse(&raw) {
                Ok(metadata) if !metadata.is_empty() => {
                    debug!("Using the metadata file of {filename}");
                    return Ok(raw);
                }
                Ok(_) => debug!("Ignoring the empty metadata file of {filename}"),
                Err(err) => debug!("Ignoring the invalid metadata file of {filename}: {err}"),
            }
        }

        let archive = self.client.download(url)?;
        if let Some(raw) = read_embedded(filename, &archive)? {
            debug!("Using the metadata inside {filename}");
            return Ok(raw);
        }

        match filename {
            DistFilename::WheelFilename(_) => Err(MetadataError::NotFound {
                filename: filename.to_string(),
                url: url.clone(),
            }),
            DistFilename::SourceDistFilename(sdist) => {
                warn!("{filename} contains no metadata, building it from source");
                self.build(sdist, url, &archive)
            }
        }
    }

    /// Let the build backend prepare the metadata. The unpacked source tree is removed when
    /// this returns, whether or not the build succeeded.
    fn build(
        &self,
        filename: &SourceDistFilename,
        url: &Url,
        archive: &[u8],
    ) -> Result<Vec<u8>, MetadataError> {
        let prepare = || {
            let source_tree = SourceTree::extract(
                filename.filename(),
                archive,
                &filename.name,
                &filename.version,
            )?;
            let package_id = format!("{}=={}", filename.name, filename.version);
            SourceBuild::setup(self.interpreter, source_tree, &package_id)?.metadata()
        };
        let raw = prepare().map_err(|err| MetadataError::PreparationFailed {
            url: url.clone(),
            err: Box::new(err),
        })?;
        debug!("Prepared the metadata of {filename}");
        Ok(raw)
    }
}

/// The metadata file inside a downloaded distribution, if there is one.
fn read_embedded(filename: &DistFilename, archive: &[u8]) -> Result<Option<Vec<u8>>, MetadataError> {
    match filename {
        DistFilename::WheelFilename(wheel) => read_wheel_entry(archive, &wheel.metadata_path())
            .map_err(|err| MetadataError::Zip {
                filename: filename.to_string(),
                err,
            }),
        DistFilename::SourceDistFilename(sdist) => {
            read_sdist_entry(archive, &sdist.metadata_paths()).map_err(|err| {
                MetadataError::Archive {
                    filename: filename.to_string(),
                    err,
                }
            })
        }
    }
}

/// Read `path` from a wheel. Falls back to a case-insensitive match of the `.dist-info`
/// directory, since not all wheels spell it like their filename.
fn read_wheel_entry(archive: &[u8], path: &str) -> Result<Option<Vec<u8>>, ZipError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let name = if zip.index_for_name(path).is_some() {
        path.to_string()
    } else {
        let Some(name) = zip
            .file_names()
            .find(|name| name.eq_ignore_ascii_case(path))
            .map(ToString::to_string)
        else {
            return Ok(None);
        };
        name
    };
    let mut file = zip.by_name(&name)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(Some(content))
}

/// Read the first of `paths` present in a `.tar.gz` source distribution.
fn read_sdist_entry(archive: &[u8], paths: &[String]) -> std::io::Result<Option<Vec<u8>>> {
    let mut found: Option<(usize, Vec<u8>)> = None;
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    for entry in tar.entries()? {
        let mut entry = entry?;
        let Some(position) = paths
            .iter()
            .position(|path| entry.path().is_ok_and(|entry_path| entry_path == Path::new(path)))
        else {
            continue;
        };
        if found.as_ref().is_some_and(|(best, _)| *best <= position) {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        if position == 0 {
            return Ok(Some(content));
        }
        found = Some((position, content));
    }
    Ok(found.map(|(_, content)| content))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use zip::write::SimpleFileOptions;

    use super::{read_sdist_entry, read_wheel_entry};

    fn wheel(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn sdist(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn wheel_metadata() {
        let archive = wheel(&[
            ("pysocks/__init__.py", b""),
            ("PySocks-1.7.1.dist-info/METADATA", b"Name: PySocks\n"),
        ]);
        let content = read_wheel_entry(&archive, "PySocks-1.7.1.dist-info/METADATA").unwrap();
        assert_eq!(content.as_deref(), Some(&b"Name: PySocks\n"[..]));
    }

    #[test]
    fn wheel_metadata_other_casing() {
        let archive = wheel(&[("pysocks-1.7.1.dist-info/METADATA", b"Name: PySocks\n")]);
        let content = read_wheel_entry(&archive, "PySocks-1.7.1.dist-info/METADATA").unwrap();
        assert_eq!(content.as_deref(), Some(&b"Name: PySocks\n"[..]));
    }

    #[test]
    fn wheel_without_metadata() {
        let archive = wheel(&[("pysocks/__init__.py", b"")]);
        let content = read_wheel_entry(&archive, "PySocks-1.7.1.dist-info/METADATA").unwrap();
        assert_eq!(content, None);
    }

    #[test]
    fn broken_wheel() {
        assert!(read_wheel_entry(b"not a zip", "foo-1.0.dist-info/METADATA").is_err());
    }

    #[test]
    fn sdist_metadata() {
        let archive = sdist(&[
            ("idna-3.4/setup.py", b""),
            ("idna-3.4/PKG-INFO", b"Name: idna\n"),
        ]);
        let content = read_sdist_entry(&archive, &["idna-3.4/PKG-INFO".to_string()]).unwrap();
        assert_eq!(content.as_deref(), Some(&b"Name: idna\n"[..]));

        let content = read_sdist_entry(&archive, &["idna-3.5/PKG-INFO".to_string()]).unwrap();
        assert_eq!(content, None);
    }

    #[test]
    fn sdist_metadata_prefers_normalized_directory() {
        let paths = ["foo-bar-1.0/PKG-INFO".to_string(), "Foo_Bar-1.0/PKG-INFO".to_string()];

        let archive = sdist(&[("Foo_Bar-1.0/PKG-INFO", b"Name: Foo_Bar\n")]);
        let content = read_sdist_entry(&archive, &paths).unwrap();
        assert_eq!(content.as_deref(), Some(&b"Name: Foo_Bar\n"[..]));

        let archive = sdist(&[
            ("Foo_Bar-1.0/PKG-INFO", b"Name: Foo_Bar\n"),
            ("foo-bar-1.0/PKG-INFO", b"Name: foo-bar\n"),
        ]);
        let content = read_sdist_entry(&archive, &paths).unwrap();
        assert_eq!(content.as_deref(), Some(&b"Name: foo-bar\n"[..]));
    }
}
