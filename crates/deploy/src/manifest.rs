use std::{fs, io, path::Path};

use derive_more::{Display, Error, From};
use serde::Deserialize;

/// Errors that may occur while reading the package manifest.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ManifestError {
    /// Unable to read the manifest file.
    Io(io::Error),

    /// Manifest is not a valid JSON document.
    Json(serde_json::Error),

    /// Manifest does not declare a required field.
    #[display(fmt = "manifest is missing the '{}' field", _0)]
    MissingField(#[error(ignore)] &'static str),
}

/// Package manifest fields relevant for deployment.
///
/// Every other manifest key is ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct Manifest {
    /// Declared package name.
    pub name: Option<String>,

    /// Declared package version.
    pub version: Option<String>,
}

impl Manifest {
    /// Read the manifest from the provided path.
    pub(crate) fn read(path: &Path) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Convert the manifest into a [`BuildTarget`], requiring both name and version.
    pub(crate) fn build_target(self) -> Result<BuildTarget, ManifestError> {
        Ok(BuildTarget {
            name: self.name.ok_or(ManifestError::MissingField("name"))?,
            version: self.version.ok_or(ManifestError::MissingField("version"))?,
        })
    }
}

/// Name and version of the deployed package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BuildTarget {
    /// Package name.
    pub name: String,

    /// Package version.
    pub version: String,
}

impl BuildTarget {
    /// Archive file name, `{name}-v{version}.zip`.
    pub(crate) fn archive_filename(&self) -> String {
        format!("{}-v{}.zip", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{BuildTarget, Manifest, ManifestError};

    #[test]
    fn archive_filename() {
        let pairs = [
            ("my-ext", "1.2.3", "my-ext-v1.2.3.zip"),
            ("functions", "0.0.1-beta.2", "functions-v0.0.1-beta.2.zip"),
            ("api", "10.0.0", "api-v10.0.0.zip"),
        ];

        for (name, version, expected) in pairs {
            let target = BuildTarget {
                name: name.into(),
                version: version.into(),
            };

            assert_eq!(target.archive_filename(), expected);
        }
    }

    #[test]
    fn read_name_and_version() {
        let dir = tempfile::tempdir().expect("unable to create temporary directory");
        let path = dir.path().join("package.json");
        fs::write(
            &path,
            r#"{"name": "my-ext", "version": "1.2.3", "private": true, "dependencies": {}}"#,
        )
        .expect("unable to write manifest");

        let target = Manifest::read(&path)
            .and_then(Manifest::build_target)
            .expect("unable to read manifest");

        assert_eq!(
            target,
            BuildTarget {
                name: "my-ext".into(),
                version: "1.2.3".into(),
            }
        );
    }

    #[test]
    fn missing_version() {
        let dir = tempfile::tempdir().expect("unable to create temporary directory");
        let path = dir.path().join("package.json");
        fs::write(&path, r#"{"name": "my-ext"}"#).expect("unable to write manifest");

        let manifest = Manifest::read(&path).expect("unable to read manifest");

        assert_eq!(manifest.name.as_deref(), Some("my-ext"));
        assert!(manifest.version.is_none());
        assert!(matches!(
            manifest.build_target(),
            Err(ManifestError::MissingField("version"))
        ));
    }

    #[test]
    fn missing_manifest() {
        let dir = tempfile::tempdir().expect("unable to create temporary directory");

        assert!(matches!(
            Manifest::read(&dir.path().join("package.json")),
            Err(ManifestError::Io(_))
        ));
    }
}
