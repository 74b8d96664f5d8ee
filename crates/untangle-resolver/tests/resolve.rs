use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use indoc::indoc;
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

use untangle_build::Interpreter;
use untangle_client::{FixtureRecorder, FixtureReplay, RegistryClient, RegistryClientBuilder};
use untangle_normalize::PackageName;
use untangle_pep440::Version;
use untangle_pep508::{MarkerEnvironment, Requirement};
use untangle_resolver::{
    LockDocument, ResolutionResult, ResolveError, ResolveOptions, Session, generate_lock,
};

const REQUESTS_METADATA: &str = indoc! {r#"
    Metadata-Version: 2.1
    Name: requests
    Version: 2.31.0
    Requires-Python: >=3.7
    Requires-Dist: charset-normalizer<4,>=2
    Requires-Dist: idna<4,>=2.5
    Requires-Dist: urllib3<3,>=1.21.1
    Requires-Dist: certifi>=2017.4.17
    Provides-Extra: socks
    Requires-Dist: PySocks!=1.5.7,>=1.5.6; extra == "socks"
    Provides-Extra: use_chardet_on_py3
    Requires-Dist: chardet<6,>=3.0.2; extra == "use_chardet_on_py3"
"#};

/// A package index served by a mock server.
///
/// The server is declared first so it shuts down before the runtime that started it.
struct MockIndex {
    server: MockServer,
    runtime: Runtime,
}

impl MockIndex {
    fn start() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let server = runtime.block_on(MockServer::start());
        Ok(Self { server, runtime })
    }

    /// An index with `requests` and its dependencies.
    fn pypi() -> Result<Self> {
        let index = Self::start()?;

        let mut requests = index.file("requests-2.31.0-py3-none-any.whl", Some(">=3.7"));
        requests["hashes"] =
            json!({"sha256": "58cd2187c01e70e6e26505bca751777aa9f2ee0b7f4300988b709f44e013003f"});
        index.project("requests", vec![requests]);
        index.sidecar("requests-2.31.0-py3-none-any.whl", REQUESTS_METADATA);

        index.project(
            "urllib3",
            vec![
                index.file("urllib3-1.20-py2.py3-none-any.whl", None),
                index.file("urllib3-1.26.18-py2.py3-none-any.whl", Some(">=2.7, !=3.0.*")),
                index.file("urllib3-2.0.7-py3-none-any.whl", Some(">=3.7")),
            ],
        );
        for version in ["1.20", "1.26.18", "2.0.7"] {
            let filename = if version == "2.0.7" {
                format!("urllib3-{version}-py3-none-any.whl")
            } else {
                format!("urllib3-{version}-py2.py3-none-any.whl")
            };
            index.sidecar(
                &filename,
                &format!("Metadata-Version: 2.1\nName: urllib3\nVersion: {version}\n"),
            );
        }

        // Only the metadata inside the wheel.
        index.project("idna", vec![index.file("idna-3.4-py3-none-any.whl", Some(">=3.5"))]);
        index.archive(
            "idna-3.4-py3-none-any.whl",
            wheel(&[
                ("idna/__init__.py", b""),
                (
                    "idna-3.4.dist-info/METADATA",
                    b"Metadata-Version: 2.1\nName: idna\nVersion: 3.4\n",
                ),
            ]),
        );

        // Only a source distribution with a `PKG-INFO`.
        index.project(
            "charset-normalizer",
            vec![index.file("charset-normalizer-3.3.2.tar.gz", Some(">=3.7.0"))],
        );
        index.archive(
            "charset-normalizer-3.3.2.tar.gz",
            sdist(&[
                ("charset-normalizer-3.3.2/setup.py", b""),
                (
                    "charset-normalizer-3.3.2/PKG-INFO",
                    b"Metadata-Version: 2.1\nName: charset-normalizer\nVersion: 3.3.2\n",
                ),
            ]),
        );

        index.project(
            "certifi",
            vec![index.file("certifi-2023.7.22-py3-none-any.whl", Some(">=3.6"))],
        );
        index.sidecar(
            "certifi-2023.7.22-py3-none-any.whl",
            "Metadata-Version: 2.1\nName: certifi\nVersion: 2023.7.22\n",
        );

        index.project(
            "pysocks",
            vec![index.file("PySocks-1.7.1-py3-none-any.whl", Some(">=2.7"))],
        );
        index.sidecar(
            "PySocks-1.7.1-py3-none-any.whl",
            "Metadata-Version: 2.1\nName: PySocks\nVersion: 1.7.1\n",
        );

        Ok(index)
    }

    fn file(&self, filename: &str, requires_python: Option<&str>) -> Value {
        json!({
            "filename": filename,
            "url": format!("{}/files/{filename}", self.server.uri()),
            "hashes": {},
            "requires-python": requires_python,
        })
    }

    fn project(&self, name: &str, files: Vec<Value>) {
        let page = json!({"meta": {"api-version": "1.1"}, "name": name, "files": files});
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("/simple/{name}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(page)),
        );
    }

    fn sidecar(&self, filename: &str, metadata: &str) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("/files/{filename}.metadata")))
                .respond_with(ResponseTemplate::new(200).set_body_string(metadata)),
        );
    }

    fn archive(&self, filename: &str, content: Vec<u8>) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("/files/{filename}")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(content)),
        );
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn client(&self) -> Result<RegistryClient, untangle_client::Error> {
        let index_url = Url::from_str(&format!("{}/simple", self.server.uri()))
            .expect("mock server URL is valid");
        RegistryClientBuilder::new(index_url)
            .retries(0)
            .retry_bounds(Duration::ZERO, Duration::ZERO)
            .build()
    }

    /// How often `path` was requested.
    fn requests_to(&self, path: &str) -> usize {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == path)
            .count()
    }
}

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

/// An interpreter that can't run build backends.
fn interpreter() -> Interpreter {
    Interpreter::artificial(
        MarkerEnvironment::from_host(&Version::new([3, 12, 1])),
        PathBuf::from("/does/not/exist/python3"),
    )
}

fn requirements(requirements: &[&str]) -> Vec<Requirement> {
    requirements
        .iter()
        .map(|requirement| Requirement::from_str(requirement).unwrap())
        .collect()
}

fn resolve_with(
    index: &MockIndex,
    requested: &[&str],
    options: &ResolveOptions,
) -> Result<ResolutionResult, ResolveError> {
    let client = index.client()?;
    let interpreter = interpreter();
    Session::new(&client, &interpreter, options, None).resolve(requirements(requested))
}

fn resolve(index: &MockIndex, requested: &[&str]) -> Result<ResolutionResult, ResolveError> {
    resolve_with(index, requested, &ResolveOptions::default())
}

fn pins(resolution: &ResolutionResult) -> Vec<String> {
    let mut pins = resolution
        .mapping
        .values()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    pins.sort();
    pins
}

/// Every listed dependency has a source, no package depends on itself and the lists are sorted.
fn assert_lock_consistent(lock: &LockDocument) {
    let target = &lock.targets["default"];
    assert_eq!(
        target.keys().collect::<Vec<_>>(),
        lock.sources.keys().collect::<Vec<_>>()
    );
    for (package, dependencies) in target {
        assert!(!dependencies.contains(package), "{package} depends on itself");
        assert!(dependencies.is_sorted(), "{package}: {dependencies:?}");
        for dependency in dependencies {
            assert!(lock.sources.contains_key(dependency), "{dependency}");
        }
    }
}

macro_rules! with_server_filter {
    ($body:block) => {
        insta::with_settings!({
            filters => vec![(r"http://127\.0\.0\.1:\d+", "[SERVER]")],
        }, $body)
    };
}

#[test]
fn requests() -> Result<()> {
    let index = MockIndex::pypi()?;
    let resolution = resolve(&index, &["requests"])?;

    assert_eq!(
        pins(&resolution),
        [
            "certifi==2023.7.22",
            "charset-normalizer==3.3.2",
            "idna==3.4",
            "requests==2.31.0",
            "urllib3==2.0.7",
        ]
    );

    let lock = generate_lock(&resolution);
    assert_lock_consistent(&lock);
    with_server_filter!({
        insta::assert_json_snapshot!(lock, @r#"
        {
          "sources": {
            "certifi": {
              "url": "[SERVER]/files/certifi-2023.7.22-py3-none-any.whl",
              "sha256": null,
              "version": "2023.7.22"
            },
            "charset-normalizer": {
              "url": "[SERVER]/files/charset-normalizer-3.3.2.tar.gz",
              "sha256": null,
              "version": "3.3.2"
            },
            "idna": {
              "url": "[SERVER]/files/idna-3.4-py3-none-any.whl",
              "sha256": null,
              "version": "3.4"
            },
            "requests": {
              "url": "[SERVER]/files/requests-2.31.0-py3-none-any.whl",
              "sha256": "58cd2187c01e70e6e26505bca751777aa9f2ee0b7f4300988b709f44e013003f",
              "version": "2.31.0"
            },
            "urllib3": {
              "url": "[SERVER]/files/urllib3-2.0.7-py3-none-any.whl",
              "sha256": null,
              "version": "2.0.7"
            }
          },
          "targets": {
            "default": {
              "certifi": [],
              "charset-normalizer": [],
              "idna": [],
              "requests": [
                "certifi",
                "charset-normalizer",
                "idna",
                "urllib3"
              ],
              "urllib3": []
            }
          }
        }
        "#);
    });
    Ok(())
}

#[test]
fn requests_with_extra() -> Result<()> {
    let index = MockIndex::pypi()?;
    let resolution = resolve(&index, &["requests[socks]"])?;

    assert_eq!(
        pins(&resolution),
        [
            "certifi==2023.7.22",
            "charset-normalizer==3.3.2",
            "idna==3.4",
            "pysocks==1.7.1",
            "requests==2.31.0",
            "requests[socks]==2.31.0",
            "urllib3==2.0.7",
        ]
    );
    assert!(resolution.edges().any(|(parent, child)| {
        parent.is_some_and(|parent| parent.to_string() == "requests[socks]")
            && child.to_string() == "pysocks"
    }));

    // The extra and its package share one source.
    let lock = generate_lock(&resolution);
    assert_lock_consistent(&lock);
    assert_eq!(lock.sources.len(), 6);
    let requests = &lock.targets["default"][&PackageName::from_str("requests")?];
    assert_eq!(
        requests
            .iter()
            .map(PackageName::as_ref)
            .collect::<Vec<_>>(),
        ["certifi", "charset-normalizer", "idna", "pysocks", "urllib3"]
    );

    // `requests` and `requests[socks]` come from the same project page.
    assert_eq!(index.requests_to("/simple/requests"), 1);
    Ok(())
}

#[test]
fn deterministic() -> Result<()> {
    let index = MockIndex::pypi()?;
    let first = serde_json::to_string(&generate_lock(&resolve(&index, &["requests[socks]"])?))?;
    let second = serde_json::to_string(&generate_lock(&resolve(&index, &["requests[socks]"])?))?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn conflicting_requirements() -> Result<()> {
    let index = MockIndex::pypi()?;
    let err = resolve(&index, &["urllib3<2", "urllib3>=2"]).unwrap_err();
    let ResolveError::NoSolution(no_solution) = &err else {
        panic!("{err}");
    };
    assert_eq!(no_solution.causes().len(), 2);
    insta::assert_snapshot!(err, @r"
    No solution satisfies all requirements; in conflict are:
      urllib3<2 (requested)
      urllib3>=2 (requested)
    ");
    Ok(())
}

#[test]
fn conflict_through_dependency() -> Result<()> {
    let index = MockIndex::pypi()?;
    let err = resolve(&index, &["requests", "urllib3<1.21"]).unwrap_err();
    insta::assert_snapshot!(err, @r"
    No solution satisfies all requirements; in conflict are:
      urllib3<1.21 (requested)
      urllib3<3, >=1.21.1 (required by requests==2.31.0)
    ");
    Ok(())
}

#[test]
fn older_version_satisfies_constraint() -> Result<()> {
    let index = MockIndex::pypi()?;
    let resolution = resolve(&index, &["requests", "urllib3<2"])?;
    assert!(pins(&resolution).contains(&"urllib3==1.26.18".to_string()));
    Ok(())
}

#[test]
fn requires_python() -> Result<()> {
    let index = MockIndex::start()?;
    index.project(
        "tomli",
        vec![
            index.file("tomli-2.0.1-py3-none-any.whl", Some(">=3.7")),
            index.file("tomli-2.1.0-py3-none-any.whl", Some(">=3.13")),
            index.file("tomli-2.2.0-py3-none-any.whl", Some(">=python3")),
        ],
    );
    for version in ["2.0.1", "2.1.0", "2.2.0"] {
        index.sidecar(
            &format!("tomli-{version}-py3-none-any.whl"),
            &format!("Metadata-Version: 2.1\nName: tomli\nVersion: {version}\n"),
        );
    }

    // An invalid `requires-python` doesn't exclude the file.
    let resolution = resolve(&index, &["tomli"])?;
    assert_eq!(pins(&resolution), ["tomli==2.2.0"]);

    let resolution = resolve(&index, &["tomli<2.2"])?;
    assert_eq!(pins(&resolution), ["tomli==2.0.1"]);

    let options = ResolveOptions {
        python_version: Some(Version::new([3, 13, 0])),
        ..ResolveOptions::default()
    };
    let resolution = resolve_with(&index, &["tomli<2.2"], &options)?;
    assert_eq!(pins(&resolution), ["tomli==2.1.0"]);
    Ok(())
}

#[test]
fn failed_build_falls_back_to_older_version() -> Result<()> {
    let index = MockIndex::start()?;
    index.project(
        "legacy-pkg",
        vec![
            index.file("legacy_pkg-1.0-py3-none-any.whl", None),
            index.file("legacy_pkg-2.0.tar.gz", None),
        ],
    );
    index.sidecar(
        "legacy_pkg-1.0-py3-none-any.whl",
        "Metadata-Version: 2.1\nName: legacy-pkg\nVersion: 1.0\n",
    );
    // No `PKG-INFO`, so the metadata has to come from the build backend.
    index.archive(
        "legacy_pkg-2.0.tar.gz",
        sdist(&[("legacy_pkg-2.0/setup.py", b"from setuptools import setup\nsetup()\n")]),
    );

    let resolution = resolve(&index, &["legacy-pkg"])?;
    assert_eq!(pins(&resolution), ["legacy-pkg==1.0"]);
    assert_eq!(index.requests_to("/files/legacy_pkg-2.0.tar.gz"), 1);
    Ok(())
}

#[test]
fn legacy_metadata_skips_sidecar() -> Result<()> {
    let index = MockIndex::start()?;
    index.project(
        "legacy-pkg",
        vec![index.file("legacy_pkg-2.0.tar.gz", None)],
    );
    index.sidecar(
        "legacy_pkg-2.0.tar.gz",
        "Metadata-Version: 2.1\nName: legacy-pkg\nVersion: 2.0\n",
    );
    index.archive(
        "legacy_pkg-2.0.tar.gz",
        sdist(&[("legacy_pkg-2.0/setup.py", b"from setuptools import setup\nsetup()\n")]),
    );

    // The sidecar alone is enough.
    let resolution = resolve(&index, &["legacy-pkg"])?;
    assert_eq!(pins(&resolution), ["legacy-pkg==2.0"]);

    let options = ResolveOptions {
        legacy_metadata: vec![PackageName::from_str("legacy-pkg")?],
        ..ResolveOptions::default()
    };
    let err = resolve_with(&index, &["legacy-pkg"], &options).unwrap_err();
    insta::assert_snapshot!(err, @r"
    No solution satisfies all requirements; in conflict are:
      legacy-pkg (requested)
    ");
    assert_eq!(index.requests_to("/files/legacy_pkg-2.0.tar.gz.metadata"), 1);
    Ok(())
}

#[test]
fn unknown_package() -> Result<()> {
    let index = MockIndex::pypi()?;
    let err = resolve(&index, &["does-not-exist"]).unwrap_err();
    let ResolveError::Client(err) = err else {
        panic!("{err}");
    };
    assert_eq!(err.status().map(|status| status.as_u16()), Some(404));
    Ok(())
}

#[test]
fn too_many_rounds() -> Result<()> {
    let index = MockIndex::pypi()?;
    let options = ResolveOptions {
        max_rounds: 2,
        ..ResolveOptions::default()
    };
    let err = resolve_with(&index, &["requests"], &options).unwrap_err();
    assert!(matches!(err, ResolveError::TooDeep(2)), "{err}");
    Ok(())
}

#[test]
fn timeout() -> Result<()> {
    let index = MockIndex::pypi()?;
    let options = ResolveOptions {
        timeout: Some(Duration::ZERO),
        ..ResolveOptions::default()
    };
    let err = resolve_with(&index, &["requests"], &options).unwrap_err();
    assert!(matches!(err, ResolveError::DeadlineExceeded(0)), "{err}");
    Ok(())
}

#[test]
fn record_fixture() -> Result<()> {
    let index = MockIndex::pypi()?;
    let temp_dir = tempfile::tempdir()?;
    let requested = ["requests[socks]".to_string()];
    let recorder = FixtureRecorder::start(temp_dir.path(), "requests-socks", &requested)?;

    let client = index.client()?;
    let interpreter = interpreter();
    let session = Session::new(
        &client,
        &interpreter,
        &ResolveOptions::default(),
        Some(&recorder),
    );
    let resolution = session.resolve(requirements(&["requests[socks]"]))?;
    let lock = generate_lock(&resolution);
    recorder.finish(&lock)?;

    let replay = FixtureReplay::load(recorder.path())?;
    assert_eq!(replay.inputs.requirements, requested);
    assert_eq!(replay.lock, serde_json::to_value(&lock)?);
    assert_eq!(
        replay.index.keys().collect::<Vec<_>>(),
        [
            "certifi",
            "charset-normalizer",
            "idna",
            "pysocks",
            "requests",
            "urllib3"
        ]
    );
    // The metadata is recorded whichever way it was obtained.
    insta::assert_debug_snapshot!(replay.metadata.keys().collect::<Vec<_>>(), @r#"
    [
        "PySocks-1.7.1-py3-none-any.whl",
        "certifi-2023.7.22-py3-none-any.whl",
        "charset-normalizer-3.3.2.tar.gz",
        "idna-3.4-py3-none-any.whl",
        "requests-2.31.0-py3-none-any.whl",
        "urllib3-2.0.7-py3-none-any.whl",
    ]
    "#);
    Ok(())
}
