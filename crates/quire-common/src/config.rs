//! Editor configuration.
//!
//! Loaded from a TOML file (with `$VAR` environment substitution) or built
//! from defaults plus `QUIRE_*` environment overrides. Every section is
//! optional and falls back to the reference values.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::ConfigError;

/// Logical key drafts are stored under.
pub const DEFAULT_DRAFT_KEY: &str = "postDraft";

/// Ten mebibytes.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub autosave: AutosaveConfig,
    pub uploads: UploadConfig,
    pub drafts: DraftConfig,
    pub placeholders: PlaceholderText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before a flush.
    pub debounce_ms: u64,
    /// Safety-net flush period, restarted by every flush.
    pub interval_secs: u64,
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub allowed_types: Vec<SmolStr>,
    pub signing_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    /// Endpoint of the HTTP signing collaborator, if one is used.
    pub signing_endpoint: Option<String>,
}

impl UploadConfig {
    pub fn signing_timeout(&self) -> Duration {
        Duration::from_secs(self.signing_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn is_allowed(&self, content_type: &str) -> bool {
        self.allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type))
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: vec![
                SmolStr::new_static("image/jpeg"),
                SmolStr::new_static("image/png"),
                SmolStr::new_static("image/gif"),
                SmolStr::new_static("image/webp"),
            ],
            signing_timeout_secs: 15,
            transfer_timeout_secs: 60,
            signing_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    pub key: SmolStr,
    /// Directory for the JSON file draft store. None keeps drafts in memory.
    pub dir: Option<PathBuf>,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            key: SmolStr::new_static(DEFAULT_DRAFT_KEY),
            dir: None,
        }
    }
}

/// Phrases inserted by toolbar formatting when nothing is selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderText {
    pub bold: SmolStr,
    pub italic: SmolStr,
    pub strikethrough: SmolStr,
    pub code: SmolStr,
    pub heading: SmolStr,
    pub quote: SmolStr,
    pub code_block: SmolStr,
    pub link_text: SmolStr,
    pub link_url: SmolStr,
    pub image_alt: SmolStr,
    pub list_item: SmolStr,
    pub checklist_item: SmolStr,
}

impl Default for PlaceholderText {
    fn default() -> Self {
        Self {
            bold: SmolStr::new_static("bold text"),
            italic: SmolStr::new_static("italic text"),
            strikethrough: SmolStr::new_static("strikethrough text"),
            code: SmolStr::new_static("code"),
            heading: SmolStr::new_static("Heading"),
            quote: SmolStr::new_static("Quote"),
            code_block: SmolStr::new_static("code goes here"),
            link_text: SmolStr::new_static("link text"),
            link_url: SmolStr::new_static("url"),
            image_alt: SmolStr::new_static("image"),
            list_item: SmolStr::new_static("List item"),
            checklist_item: SmolStr::new_static("Task"),
        }
    }
}

impl Config {
    /// Load a TOML config file, substituting `$VAR` references first.
    pub fn load(config_file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = config_file.as_ref();
        let mut config_string = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        config_string = substitute_env(&config_string, |var| env::var(var).ok());
        Self::parse(&config_string, path)
    }

    fn parse(source: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults with `QUIRE_*` environment overrides applied.
    ///
    /// - `QUIRE_AUTOSAVE_DEBOUNCE_MS`, `QUIRE_AUTOSAVE_INTERVAL_SECS`
    /// - `QUIRE_UPLOAD_MAX_BYTES`, `QUIRE_SIGNING_ENDPOINT`
    /// - `QUIRE_DRAFT_KEY`, `QUIRE_DRAFT_DIR`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|var| env::var(var).ok())?;
        Ok(config)
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(ms) = parse_var(&lookup, "QUIRE_AUTOSAVE_DEBOUNCE_MS")? {
            self.autosave.debounce_ms = ms;
        }
        if let Some(secs) = parse_var(&lookup, "QUIRE_AUTOSAVE_INTERVAL_SECS")? {
            self.autosave.interval_secs = secs;
        }
        if let Some(max) = parse_var(&lookup, "QUIRE_UPLOAD_MAX_BYTES")? {
            self.uploads.max_bytes = max;
        }
        if let Some(endpoint) = lookup("QUIRE_SIGNING_ENDPOINT") {
            self.uploads.signing_endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("QUIRE_DRAFT_KEY") {
            self.drafts.key = key.into();
        }
        if let Some(dir) = lookup("QUIRE_DRAFT_DIR") {
            self.drafts.dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidEnv {
                var,
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Replace each `$NAME` with the value `lookup` gives for the whole name.
/// Names nothing is known for are left as written.
fn substitute_env(source: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let re = match Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)") {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(error = %e, "environment pattern failed to compile");
            return source.to_string();
        }
    };
    re.replace_all(source, |caps: &Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_reference_values() {
        let config = Config::default();
        assert_eq!(config.autosave.debounce(), Duration::from_secs(1));
        assert_eq!(config.autosave.interval(), Duration::from_secs(30));
        assert_eq!(config.uploads.max_bytes, 10_485_760);
        assert_eq!(config.drafts.key, "postDraft");
        assert!(config.uploads.is_allowed("image/webp"));
        assert!(config.uploads.is_allowed("IMAGE/PNG"));
        assert!(!config.uploads.is_allowed("image/svg+xml"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::parse(
            "[autosave]\ndebounce_ms = 250\n\n[placeholders]\nbold = \"굵은 텍스트\"\n",
            Path::new("quire.toml"),
        )
        .unwrap();
        assert_eq!(config.autosave.debounce_ms, 250);
        assert_eq!(config.autosave.interval_secs, 30);
        assert_eq!(config.placeholders.bold, "굵은 텍스트");
        assert_eq!(config.placeholders.italic, "italic text");
    }

    #[test]
    fn load_substitutes_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quire.toml");
        let home = env::var("HOME").unwrap_or_default();
        fs::write(&path, "[drafts]\ndir = \"$HOME/drafts\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.drafts.dir,
            Some(PathBuf::from(format!("{}/drafts", home)))
        );
    }

    #[test]
    fn substitution_matches_whole_names() {
        let vars: HashMap<&str, &str> = [("HOME", "/home/ann"), ("HOMEDIR", "/srv/quire")]
            .into_iter()
            .collect();
        let lookup = |var: &str| vars.get(var).map(|v| v.to_string());

        assert_eq!(
            substitute_env("a = \"$HOMEDIR/x\"\nb = \"$HOME/y\"", lookup),
            "a = \"/srv/quire/x\"\nb = \"/home/ann/y\""
        );
        assert_eq!(substitute_env("$HOMER and $5", lookup), "$HOMER and $5");
    }

    #[test]
    fn substitution_leaves_unknown_prefixed_names() {
        let lookup = |var: &str| (var == "HOME").then(|| "/home/ann".to_string());
        assert_eq!(substitute_env("$HOMEDIR/$HOME", lookup), "$HOMEDIR//home/ann");
    }

    #[test]
    fn bad_toml_reports_path() {
        let err = Config::parse("[autosave\n", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("QUIRE_AUTOSAVE_DEBOUNCE_MS", "500"),
            ("QUIRE_DRAFT_KEY", "otherDraft"),
            ("QUIRE_SIGNING_ENDPOINT", "https://api.example.com/uploads/sign"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.autosave.debounce_ms, 500);
        assert_eq!(config.drafts.key, "otherDraft");
        assert_eq!(
            config.uploads.signing_endpoint.as_deref(),
            Some("https://api.example.com/uploads/sign")
        );
    }

    #[test]
    fn env_override_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|var| (var == "QUIRE_UPLOAD_MAX_BYTES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "QUIRE_UPLOAD_MAX_BYTES",
                ..
            }
        ));
    }
}
