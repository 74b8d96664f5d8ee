//! Recording and replaying the index responses of a resolution, so the resolution can be
//! repeated offline in tests.
//!
//! A fixture is a directory:
//!
//! ```text
//! <name>/
//!   inputs.json                 {"requirements": [...]}
//!   index/<package>.json.gz     the project page of each package
//!   metadata/<file>.metadata.gz the metadata used for each distribution
//!   lock.json                   the resulting lock
//! ```
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use untangle_normalize::PackageName;

use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureInputs {
    pub requirements: Vec<String>,
}

/// Writes a fixture while a resolution runs.
#[derive(Debug, Clone)]
pub struct FixtureRecorder {
    path: PathBuf,
}

impl FixtureRecorder {
    /// Create `<fixtures_dir>/<name>` and record the requested requirements.
    pub fn start(fixtures_dir: &Path, name: &str, requirements: &[String]) -> Result<Self, Error> {
        let path = fixtures_dir.join(name);
        for dir in [path.clone(), path.join("index"), path.join("metadata")] {
            fs_err::create_dir_all(&dir).map_err(|err| ErrorKind::FixtureWrite(dir, err))?;
        }
        let recorder = Self { path };
        recorder.write_json(
            &recorder.path.join("inputs.json"),
            &FixtureInputs {
                requirements: requirements.to_vec(),
            },
        )?;
        debug!("Recording fixture to {}", recorder.path.display());
        Ok(recorder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the project page of a package, pretty printed.
    pub fn record_index(&self, package_name: &PackageName, raw: &[u8]) -> Result<(), Error> {
        let path = self
            .path
            .join("index")
            .join(format!("{package_name}.json.gz"));
        let page = serde_json::from_slice::<serde_json::Value>(raw)
            .map_err(|err| ErrorKind::FixtureJson(path.clone(), err))?;
        let content = serde_json::to_vec_pretty(&page)
            .map_err(|err| ErrorKind::FixtureJson(path.clone(), err))?;
        write_gzip(&path, &content)
    }

    /// Record the metadata that was used for a distribution, whichever way it was obtained.
    pub fn record_metadata(&self, filename: &str, metadata: &[u8]) -> Result<(), Error> {
        let path = self
            .path
            .join("metadata")
            .join(format!("{filename}.metadata.gz"));
        write_gzip(&path, metadata)
    }

    /// Record the resulting lock.
    pub fn finish(&self, lock: &impl Serialize) -> Result<(), Error> {
        self.write_json(&self.path.join("lock.json"), lock)?;
        info!("Wrote fixture to {}", self.path.display());
        Ok(())
    }

    fn write_json(&self, path: &Path, value: &impl Serialize) -> Result<(), Error> {
        let mut content = serde_json::to_vec_pretty(value)
            .map_err(|err| ErrorKind::FixtureJson(path.to_path_buf(), err))?;
        content.push(b'\n');
        fs_err::write(path, content)
            .map_err(|err| ErrorKind::FixtureWrite(path.to_path_buf(), err).into())
    }
}

fn write_gzip(path: &Path, content: &[u8]) -> Result<(), Error> {
    let file = fs_err::File::create(path)
        .map_err(|err| ErrorKind::FixtureWrite(path.to_path_buf(), err))?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder
        .write_all(content)
        .map_err(|err| ErrorKind::FixtureWrite(path.to_path_buf(), err))?;
    encoder
        .finish()
        .map_err(|err| ErrorKind::FixtureWrite(path.to_path_buf(), err))?;
    Ok(())
}

fn read_gzip(path: &Path) -> Result<Vec<u8>, Error> {
    let file =
        fs_err::File::open(path).map_err(|err| ErrorKind::FixtureRead(path.to_path_buf(), err))?;
    let mut content = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut content)
        .map_err(|err| ErrorKind::FixtureRead(path.to_path_buf(), err))?;
    Ok(content)
}

/// A recorded fixture, read back for replay against a mock index.
#[derive(Debug, Clone)]
pub struct FixtureReplay {
    pub inputs: FixtureInputs,
    pub lock: serde_json::Value,
    /// Project pages by package name.
    pub index: BTreeMap<String, serde_json::Value>,
    /// Metadata by distribution filename.
    pub metadata: BTreeMap<String, Vec<u8>>,
}

impl FixtureReplay {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let inputs = read_json(&path.join("inputs.json"))?;
        let lock = read_json(&path.join("lock.json"))?;

        let mut index = BTreeMap::new();
        for (name, path) in list_with_suffix(&path.join("index"), ".json.gz")? {
            let content = read_gzip(&path)?;
            let page = serde_json::from_slice(&content)
                .map_err(|err| ErrorKind::FixtureJson(path.clone(), err))?;
            index.insert(name, page);
        }

        let mut metadata = BTreeMap::new();
        for (filename, path) in list_with_suffix(&path.join("metadata"), ".metadata.gz")? {
            metadata.insert(filename, read_gzip(&path)?);
        }

        Ok(Self {
            inputs,
            lock,
            index,
            metadata,
        })
    }

    /// Point every file URL at `{base}/files/{filename}`, for serving from a mock server.
    pub fn rebase_file_urls(&mut self, base: &Url) {
        let base = base.as_str().trim_end_matches('/');
        for page in self.index.values_mut() {
            let Some(files) = page.get_mut("files").and_then(|files| files.as_array_mut()) else {
                continue;
            };
            for file in files {
                let Some(filename) = file
                    .get("filename")
                    .and_then(|filename| filename.as_str())
                    .map(ToString::to_string)
                else {
                    continue;
                };
                file["url"] = serde_json::Value::String(format!("{base}/files/{filename}"));
            }
        }
    }

    /// The URL of every listed file, by filename.
    pub fn urls_by_filename(&self) -> BTreeMap<String, String> {
        self.index
            .values()
            .filter_map(|page| page.get("files").and_then(|files| files.as_array()))
            .flatten()
            .filter_map(|file| {
                Some((
                    file.get("filename")?.as_str()?.to_string(),
                    file.get("url")?.as_str()?.to_string(),
                ))
            })
            .collect()
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, Error> {
    let content =
        fs_err::read(path).map_err(|err| ErrorKind::FixtureRead(path.to_path_buf(), err))?;
    serde_json::from_slice(&content)
        .map_err(|err| ErrorKind::FixtureJson(path.to_path_buf(), err).into())
}

/// The files in `dir` ending in `suffix`, keyed by their name without it.
fn list_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<(String, PathBuf)>, Error> {
    let entries =
        fs_err::read_dir(dir).map_err(|err| ErrorKind::FixtureRead(dir.to_path_buf(), err))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ErrorKind::FixtureRead(dir.to_path_buf(), err))?;
        let file_name = entry.file_name();
        let Some(stem) = file_name
            .to_str()
            .and_then(|file_name| file_name.strip_suffix(suffix))
        else {
            continue;
        };
        files.push((stem.to_string(), entry.path()));
    }
    files.sort();
    Ok(files)
}
