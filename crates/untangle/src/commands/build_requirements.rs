use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use untangle_build::build_requirements_from_sdist;

use crate::commands::ExitStatus;

/// Print the `[build-system]` of a source distribution, or the legacy setuptools backend if it
/// declares none.
pub(crate) fn build_requirements(sdist: &Path) -> Result<ExitStatus> {
    let build_system = build_requirements_from_sdist(sdist)
        .with_context(|| format!("Failed to read the build system of `{}`", sdist.display()))?;
    let mut stdout = anstream::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &build_system)?;
    writeln!(stdout)?;
    Ok(ExitStatus::Success)
}
