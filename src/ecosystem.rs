use std::fmt;
use std::path::Path;

use clap::ValueEnum;

/// Package-management domain of a manifest.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, ValueEnum)]
pub(crate) enum Ecosystem {
    Maven,
    Gradle,
    Golang,
    Npm,
    Pypi,
    Docker,
}

/// Manifest file names the tool recognizes, in auto-detection order.
pub(crate) const SUPPORTED_MANIFESTS: &[(&str, Ecosystem)] = &[
    ("pom.xml", Ecosystem::Maven),
    ("build.gradle", Ecosystem::Gradle),
    ("go.mod", Ecosystem::Golang),
    ("package.json", Ecosystem::Npm),
    ("requirements.txt", Ecosystem::Pypi),
    ("Dockerfile", Ecosystem::Docker),
    ("Containerfile", Ecosystem::Docker),
];

impl Ecosystem {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Ecosystem::Maven => "maven",
            Ecosystem::Gradle => "gradle",
            Ecosystem::Golang => "golang",
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Docker => "docker",
        }
    }

    /// Ecosystem implied by a manifest's file name, if it is supported.
    pub(crate) fn from_manifest_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        SUPPORTED_MANIFESTS
            .iter()
            .find(|(name, _)| *name == file_name)
            .map(|(_, ecosystem)| *ecosystem)
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
