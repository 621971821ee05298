use std::{env, fmt, path::PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{
    de::{self, Visitor},
    Deserialize, Serialize,
};

#[cfg(feature = "logging")]
use tracing_subscriber::filter::LevelFilter;

/// Default configuration file name, resolved relative to the project root.
pub const DEFAULT_CONFIG_FILE: &str = "Deploy.toml";

/// Deployment environment, selected once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    /// Default environment, used unless production is explicitly requested.
    Staging,

    /// Production environment.
    Production,
}

impl Environment {
    /// Environment variable that selects the deployment environment.
    pub const VARIABLE: &'static str = "DEPLOY_ENV";

    /// Resolve an environment from the raw flag value.
    ///
    /// Only the exact value `production` selects [`Environment::Production`].
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("production") => Environment::Production,
            _ => Environment::Staging,
        }
    }

    /// Resolve an environment from the [`Environment::VARIABLE`] environment variable.
    pub fn from_env() -> Self {
        Self::from_flag(env::var(Self::VARIABLE).ok().as_deref())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Staging => f.write_str("staging"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Environment-specific deployment target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Cloud project identifier.
    ///
    /// Only reported in logs: object requests are signed with the HMAC key pair
    /// from the credentials file, which already belongs to a single project.
    #[serde(deserialize_with = "deserialize_scalar")]
    pub project_id: String,

    /// Path to the storage credentials file, relative to the project root.
    #[serde(deserialize_with = "deserialize_scalar")]
    pub credentials_path: PathBuf,

    /// Bucket that receives deployment artifacts.
    #[serde(deserialize_with = "deserialize_scalar")]
    pub bucket: String,
}

impl Target {
    fn staging() -> Self {
        Self {
            project_id: String::from("still-protocol-228301"),
            credentials_path: PathBuf::from("still-protocol-228301-credentials.json"),
            bucket: String::from("still-protocol-228301"),
        }
    }

    fn production() -> Self {
        Self {
            project_id: String::from("q-torial"),
            credentials_path: PathBuf::from("q-torial-credentials.json"),
            bucket: String::from("q-torial"),
        }
    }
}

/// S3-compatible object store configuration.
#[derive(Serialize, Deserialize)]
pub struct Storage {
    /// Object store endpoint URL.
    pub endpoint_url: String,

    /// Region name passed to the request signer.
    pub region: String,

    /// Address buckets as a path segment instead of a subdomain.
    pub force_path_style: bool,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            endpoint_url: String::from("https://storage.googleapis.com"),
            region: String::from("auto"),
            force_path_style: false,
        }
    }
}

/// Project file layout, relative to the project root.
#[derive(Serialize, Deserialize)]
pub struct Layout {
    /// Package manifest providing project name and version.
    pub manifest: PathBuf,

    /// Directory packaged into the functions archive.
    pub source_dir: PathBuf,

    /// Directory the archive is written to.
    pub archive_dir: PathBuf,

    /// Remote prefix under which the archive is published.
    pub archive_prefix: String,

    /// Index configuration file published next to the archive.
    pub index_file: PathBuf,

    /// Rules files, published only when rule publishing is enabled.
    pub rules_files: Vec<PathBuf>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("package.json"),
            source_dir: PathBuf::from("functions"),
            archive_dir: PathBuf::from("functions-zip"),
            archive_prefix: String::from("functions"),
            index_file: PathBuf::from("firestore.indexes.json"),
            rules_files: vec![
                PathBuf::from("firestore.rules"),
                PathBuf::from("storage.rules"),
            ],
        }
    }
}

/// What to do when a single upload fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and proceed with the remaining uploads.
    #[default]
    Continue,

    /// Stop the deployment at the first failed upload.
    Abort,
}

/// Publishing behavior.
#[derive(Default, Serialize, Deserialize)]
pub struct Publishing {
    /// Publish rules files along with the archive and index configuration.
    pub publish_rules: bool,

    /// Upload failure handling.
    pub on_upload_failure: FailurePolicy,
}

/// Visitor accepting any scalar value as its textual form.
struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number or boolean")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
        Ok(value.to_owned())
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
        Ok(value)
    }

    fn visit_char<E: de::Error>(self, value: char) -> Result<String, E> {
        Ok(value.to_string())
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<String, E> {
        Ok(value.to_string())
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
        Ok(value.to_string())
    }

    fn visit_u128<E: de::Error>(self, value: u128) -> Result<String, E> {
        Ok(value.to_string())
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
        Ok(value.to_string())
    }

    fn visit_i128<E: de::Error>(self, value: i128) -> Result<String, E> {
        Ok(value.to_string())
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<String, E> {
        Ok(value.to_string())
    }
}

/// Deserialize a textual value that [`Env`] may have parsed as a number or boolean,
/// e.g. an all-digit bucket name.
fn deserialize_scalar<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: From<String>,
    D: de::Deserializer<'de>,
{
    deserializer.deserialize_any(ScalarVisitor).map(T::from)
}

/// Implementation of [`serde`]'s deserializer for [`FromStr`] types.
///
/// [`FromStr`]: std::str::FromStr
#[cfg(feature = "logging")]
fn deserialize_from_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error,
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    std::str::FromStr::from_str(&s).map_err(serde::de::Error::custom)
}

/// Counterpart of [`deserialize_from_str`] for [`Display`] types.
///
/// [`Display`]: fmt::Display
#[cfg(feature = "logging")]
fn serialize_to_string<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: serde::ser::Serializer,
{
    serializer.collect_str(value)
}

/// Logging configuration.
#[cfg(feature = "logging")]
#[derive(Serialize, Deserialize)]
pub struct Logging {
    /// Log level.
    #[serde(
        serialize_with = "serialize_to_string",
        deserialize_with = "deserialize_from_str"
    )]
    pub level: LevelFilter,
}

#[cfg(feature = "logging")]
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
        }
    }
}

/// General configuration.
#[derive(Serialize, Deserialize)]
pub struct Config {
    /// Default (staging) deployment target.
    pub staging: Target,

    /// Production deployment target.
    pub production: Target,

    /// Object store configuration.
    pub storage: Storage,

    /// Project file layout.
    pub layout: Layout,

    /// Publishing behavior.
    pub publishing: Publishing,

    /// Logging configuration.
    #[cfg(feature = "logging")]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            staging: Target::staging(),
            production: Target::production(),
            storage: Storage::default(),
            layout: Layout::default(),
            publishing: Publishing::default(),
            #[cfg(feature = "logging")]
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Create new config from built-in defaults, the configuration file and environment variables.
    ///
    /// A missing configuration file is not an error. Environment variables are prefixed
    /// with `CONFIG_` and use `__` to separate nested keys, e.g. `CONFIG_PRODUCTION__BUCKET`.
    /// See [`Env`] for more details.
    ///
    /// [`Env`]: figment::providers::Env
    pub fn new(path: Option<PathBuf>) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(
                path.unwrap_or(PathBuf::from(DEFAULT_CONFIG_FILE)),
            ))
            .merge(Env::prefixed("CONFIG_").split("__"))
            .extract()
    }

    /// Deployment target for the provided environment.
    pub fn target(&self, environment: Environment) -> &Target {
        match environment {
            Environment::Staging => &self.staging,
            Environment::Production => &self.production,
        }
    }
}
