use std::str::FromStr;

use anyhow::Result;
use serde_json::json;
use url::Url;

use untangle_client::{FixtureInputs, FixtureRecorder, FixtureReplay};
use untangle_normalize::PackageName;

#[test]
fn record_and_replay() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;

    let recorder = FixtureRecorder::start(
        temp_dir.path(),
        "requests",
        &["requests[socks]".to_string()],
    )?;
    assert_eq!(recorder.path(), temp_dir.path().join("requests"));

    let page = json!({
        "files": [
            {
                "filename": "PySocks-1.7.1.tar.gz",
                "hashes": {"sha256": "3f8804571ebe159c380ac6de37643bb4685970655d3bba243530d6558b799aa0"},
                "url": "https://files.example.com/packages/PySocks-1.7.1.tar.gz"
            }
        ]
    });
    recorder.record_index(
        &PackageName::from_str("PySocks")?,
        serde_json::to_string(&page)?.as_bytes(),
    )?;
    recorder.record_metadata(
        "PySocks-1.7.1.tar.gz",
        b"Metadata-Version: 1.1\nName: PySocks\nVersion: 1.7.1\n",
    )?;
    let lock = json!({"targets": {"default": {"pysocks": []}}});
    recorder.finish(&lock)?;

    let mut replay = FixtureReplay::load(recorder.path())?;
    assert_eq!(
        replay.inputs,
        FixtureInputs {
            requirements: vec!["requests[socks]".to_string()]
        }
    );
    assert_eq!(replay.lock, lock);
    assert_eq!(replay.index.keys().collect::<Vec<_>>(), ["pysocks"]);
    assert_eq!(replay.index["pysocks"], page);
    assert_eq!(
        replay.metadata["PySocks-1.7.1.tar.gz"],
        b"Metadata-Version: 1.1\nName: PySocks\nVersion: 1.7.1\n"
    );

    replay.rebase_file_urls(&Url::parse("http://127.0.0.1:8080/")?);
    insta::assert_debug_snapshot!(replay.urls_by_filename(), @r#"
    {
        "PySocks-1.7.1.tar.gz": "http://127.0.0.1:8080/files/PySocks-1.7.1.tar.gz",
    }
    "#);
    Ok(())
}

#[test]
fn missing_fixture() {
    let temp_dir = tempfile::tempdir().unwrap();
    let err = FixtureReplay::load(&temp_dir.path().join("missing")).unwrap_err();
    assert!(err.to_string().starts_with("Failed to read fixture file"));
}
