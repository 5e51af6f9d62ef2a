//! Layered configuration loading.
//!
//! Layers, lowest precedence first: the last structured file (`toml`, `yaml`,
//! `json`), prefixed environment variables, explicit overrides. Dotenv files
//! are loaded into the process environment before anything is read.

use std::env;
use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use serde::de::DeserializeOwned;

/// Keys checked, in order, for the host launch mode.
const LAUNCH_MODE_VARS: [&str; 3] = ["LAUNCH_MODE", "APP_ENV", "RUST_ENV"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Parse(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        Self::Parse(err.to_string())
    }
}

/// File kinds recognised by [`ConfigBuilder::with_config_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    DotEnv,
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect the format from the file extension, or a `.env*` file name.
    pub fn detect(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let by_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_ascii_lowercase().as_str() {
                "env" => Some(Self::DotEnv),
                "toml" => Some(Self::Toml),
                "yaml" | "yml" => Some(Self::Yaml),
                "json" => Some(Self::Json),
                _ => None,
            });

        by_extension.or_else(|| {
            let name = path.file_name()?.to_str()?;
            (name == "env" || name.starts_with(".env")).then_some(Self::DotEnv)
        })
    }

    pub fn is_structured(self) -> bool {
        !matches!(self, Self::DotEnv)
    }
}

/// Builder assembling a typed configuration from files, env and overrides.
///
/// # Example
///
/// ```ignore
/// use bootkit::ConfigBuilder;
///
/// let config: GrpcConfig = ConfigBuilder::new()
///     .with_dotenv()
///     .with_env_prefix("GRPC")
///     .with_config_file("grpc.toml")
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    dotenv: bool,
    files: Vec<PathBuf>,
    env_prefix: Option<String>,
    overrides: Vec<(String, String)>,
    #[cfg(feature = "tracing")]
    logging: bool,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.env` from the working directory, if present.
    pub fn with_dotenv(mut self) -> Self {
        self.dotenv = true;
        self
    }

    /// Add a file layer. Dotenv files all apply; of the structured files only
    /// the last one is read.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Read only variables named `{prefix}_{KEY}`; `GRPC_PORT=9000` with
    /// prefix `GRPC` sets `port`. Nested keys use `__`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Pin `key` to `value` above every other layer.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Install the global subscriber from `LOG_FORMAT`/`RUST_LOG` during build.
    #[cfg(feature = "tracing")]
    pub fn with_logging_from_env(mut self) -> Self {
        self.logging = true;
        self
    }

    pub fn build<C: DeserializeOwned>(self) -> Result<C, ConfigError> {
        let structured = self.load_dotenv_files();

        #[cfg(feature = "tracing")]
        if self.logging {
            crate::logging::init_logging_from_env();
        }

        let layers = self.layers(structured.as_deref())?;
        tracing::debug!(
            file = ?structured,
            env_prefix = ?self.env_prefix,
            overrides = self.overrides.len(),
            "configuration layers assembled"
        );

        layers.build()?.try_deserialize().map_err(ConfigError::from)
    }

    /// Apply every dotenv layer and return the structured file to read.
    fn load_dotenv_files(&self) -> Option<PathBuf> {
        if self.dotenv {
            let _ = dotenvy::dotenv();
        }

        let mut structured = None;
        for path in &self.files {
            match ConfigFormat::detect(path) {
                Some(ConfigFormat::DotEnv) if path.exists() => {
                    if let Err(err) = dotenvy::from_path(path) {
                        tracing::warn!(path = %path.display(), error = %err, "skipping dotenv file");
                    }
                }
                Some(format) if format.is_structured() => structured = Some(path.clone()),
                _ => {}
            }
        }
        structured
    }

    fn layers(
        &self,
        structured: Option<&Path>,
    ) -> Result<config::ConfigBuilder<DefaultState>, ConfigError> {
        let mut layers = config::Config::builder();

        if let Some(path) = structured {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            layers = layers.add_source(config::File::from(path));
        }

        layers = layers.add_source(PrefixedEnv {
            prefix: self.env_prefix.clone(),
        });

        for (key, value) in &self.overrides {
            layers = layers.set_override(key.as_str(), value.as_str())?;
        }

        Ok(layers)
    }
}

/// Environment layer that also fills `launch_mode` from the host's usual
/// variables when no prefixed value set it.
#[derive(Debug, Clone)]
struct PrefixedEnv {
    prefix: Option<String>,
}

impl config::Source for PrefixedEnv {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let environment = match self.prefix.as_deref() {
            Some(prefix) => config::Environment::with_prefix(prefix).prefix_separator("_"),
            None => config::Environment::default(),
        };
        let environment = environment.separator("__").try_parsing(true);
        let mut values = config::Source::collect(&environment)?;

        if !values.contains_key("launch_mode") {
            if let Some(mode) = LAUNCH_MODE_VARS.iter().find_map(|var| env::var(var).ok()) {
                values.insert(
                    "launch_mode".to_string(),
                    config::Value::new(None, config::ValueKind::String(mode)),
                );
            }
        }

        Ok(values)
    }
}
