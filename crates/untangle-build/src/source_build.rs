use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use indoc::formatdoc;
use itertools::Itertools;
use tracing::{debug, info_span, instrument};
use zip::ZipArchive;

use crate::pyproject::BuildSystem;
use crate::source_tree::SourceTree;
use crate::{Error, Interpreter};

/// Runs the PEP 517 hooks of an unpacked source distribution to obtain its metadata.
#[derive(Debug)]
pub struct SourceBuild {
    source_tree: SourceTree,
    build_system: BuildSystem,
    python: PathBuf,
    /// Package id such as `foo-1.2.3`, for error reporting
    package_id: String,
}

impl SourceBuild {
    pub fn setup(
        interpreter: &Interpreter,
        source_tree: SourceTree,
        package_id: &str,
    ) -> Result<Self, Error> {
        let build_system = BuildSystem::from_source_tree(source_tree.root())?;
        if !source_tree.root().join("pyproject.toml").is_file()
            && !source_tree.root().join("setup.py").is_file()
        {
            return Err(Error::InvalidSourceDist(format!(
                "{package_id} contains neither a `pyproject.toml` nor a `setup.py` file at the top level"
            )));
        }
        Ok(Self {
            source_tree,
            build_system,
            python: interpreter.sys_executable().to_path_buf(),
            package_id: package_id.to_string(),
        })
    }

    pub fn build_system(&self) -> &BuildSystem {
        &self.build_system
    }

    /// Return the contents of the `METADATA` file the backend produces.
    ///
    /// Uses `prepare_metadata_for_build_wheel` if the backend has it, otherwise builds the
    /// wheel and reads the file out of it.
    #[instrument(skip(self), fields(package_id = %self.package_id))]
    pub fn metadata(&self) -> Result<Vec<u8>, Error> {
        let metadata_directory = self.source_tree.scratch().join("metadata_directory");
        fs_err::create_dir_all(&metadata_directory)?;
        if let Some(dist_info) = self.prepare_metadata_for_build_wheel(&metadata_directory)? {
            return Ok(fs_err::read(dist_info.join("METADATA"))?);
        }

        let wheel_dir = self.source_tree.scratch().join("wheel");
        fs_err::create_dir_all(&wheel_dir)?;
        let wheel = self.build_wheel(&wheel_dir)?;
        read_wheel_metadata(&wheel)
    }

    fn prepare_metadata_for_build_wheel(
        &self,
        metadata_directory: &Path,
    ) -> Result<Option<PathBuf>, Error> {
        debug!(
            "Calling `{}.prepare_metadata_for_build_wheel()`",
            self.build_system.build_backend
        );
        let script = formatdoc! {r#"
            {}
            prepare_metadata_for_build_wheel = getattr(backend, "prepare_metadata_for_build_wheel", None)
            if prepare_metadata_for_build_wheel:
                print(prepare_metadata_for_build_wheel("{}"))
            else:
                print()
            "#,
            backend_import(&self.build_system),
            escape_path_for_python(metadata_directory),
        };
        let output = info_span!("run_python_script", name = "prepare_metadata_for_build_wheel")
            .in_scope(|| self.run_python_script(&script))?;
        if !output.status.success() {
            return Err(Error::from_command_output(
                format!(
                    "Build backend failed to determine metadata of {} through `prepare_metadata_for_build_wheel`",
                    self.package_id
                ),
                &output,
            ));
        }
        let Some(message) = last_line(&output) else {
            return Err(Error::from_command_output(
                format!(
                    "Build backend failed to return the metadata directory of {}",
                    self.package_id
                ),
                &output,
            ));
        };
        if message.is_empty() {
            debug!(
                "`{}` has no `prepare_metadata_for_build_wheel`",
                self.build_system.build_backend
            );
            return Ok(None);
        }
        Ok(Some(metadata_directory.join(message)))
    }

    fn build_wheel(&self, wheel_dir: &Path) -> Result<PathBuf, Error> {
        debug!("Calling `{}.build_wheel()`", self.build_system.build_backend);
        let script = formatdoc! {r#"
            {}
            print(backend.build_wheel("{}"))
            "#,
            backend_import(&self.build_system),
            escape_path_for_python(wheel_dir),
        };
        let output = info_span!("run_python_script", name = "build_wheel")
            .in_scope(|| self.run_python_script(&script))?;
        if !output.status.success() {
            return Err(Error::from_command_output(
                format!(
                    "Build backend failed to build a wheel of {} through `build_wheel`",
                    self.package_id
                ),
                &output,
            ));
        }
        let Some(wheel) = last_line(&output)
            .map(|filename| wheel_dir.join(filename))
            .filter(|wheel| wheel.is_file())
        else {
            return Err(Error::from_command_output(
                format!(
                    "Build backend didn't return the wheel it built for {}",
                    self.package_id
                ),
                &output,
            ));
        };
        Ok(wheel)
    }

    fn run_python_script(&self, script: &str) -> Result<Output, Error> {
        Command::new(&self.python)
            .args(["-c", script])
            .current_dir(self.source_tree.root())
            .output()
            .map_err(|err| Error::CommandFailed(self.python.clone(), err))
    }
}

/// Python code importing the backend as `backend`.
fn backend_import(build_system: &BuildSystem) -> String {
    let import = if let Some((path, object)) = build_system.build_backend.split_once(':') {
        format!("from {path} import {object} as backend")
    } else {
        format!("import {} as backend", build_system.build_backend)
    };

    // In-tree backends are imported from the source tree, which is the working directory.
    let backend_path = build_system
        .backend_path
        .iter()
        .flatten()
        .map(|path| format!("\"{}\"", escape_for_python(path)))
        .join(", ");

    formatdoc! {r"
        import sys
        sys.path = [{backend_path}] + sys.path

        {import}
    "}
}

fn escape_for_python(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_path_for_python(path: &Path) -> String {
    escape_for_python(&path.to_string_lossy())
}

/// Backends may print to stdout, so only the last line is the hook's return value.
fn last_line(output: &Output) -> Option<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .last()
        .map(|line| line.trim().to_string())
}

/// Read `{name}-{version}.dist-info/METADATA` from a built wheel.
fn read_wheel_metadata(wheel: &Path) -> Result<Vec<u8>, Error> {
    let mut archive = ZipArchive::new(fs_err::File::open(wheel)?)?;
    let Some(name) = archive
        .file_names()
        .find(|name| {
            name.split_once('/').is_some_and(|(dir, file)| {
                dir.ends_with(".dist-info") && file == "METADATA"
            })
        })
        .map(ToString::to_string)
    else {
        return Err(Error::InvalidSourceDist(format!(
            "The built wheel `{}` contains no `.dist-info/METADATA`",
            wheel.display()
        )));
    };
    let mut file = archive.by_name(&name)?;
    let mut metadata = Vec::new();
    std::io::copy(&mut file, &mut metadata)?;
    Ok(metadata)
}
