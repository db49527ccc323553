use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::locale::Locale;
use crate::progress::{ProfileSchema, SectionSpec};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5005";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Values picked up from the process environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EnvDefaults {
    pub backend_url: Option<String>,
    pub locale: Option<String>,
    pub sender_id: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        Self {
            backend_url: non_empty_var("PROFILE_CHAT_BACKEND_URL"),
            locale: non_empty_var("PROFILE_CHAT_LOCALE"),
            sender_id: non_empty_var("PROFILE_CHAT_SENDER_ID"),
            timeout_secs: non_empty_var("PROFILE_CHAT_TIMEOUT_SECS").and_then(|v| v.parse().ok()),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Values given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CliOverrides {
    pub backend_url: Option<String>,
    pub locale: Option<String>,
    pub sender_id: Option<String>,
    pub timeout_secs: Option<u64>,
    pub schema_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub backend_url: String,
    pub locale: Locale,
    /// Pinned backend sender id. `None` means a fresh id per session.
    pub sender_id: Option<String>,
    pub timeout: Duration,
    pub schema: ProfileSchema,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            locale: Locale::default(),
            sender_id: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            schema: ProfileSchema::onboarding(),
        }
    }
}

pub fn resolve_chat_settings(env: &EnvDefaults, cli: &CliOverrides) -> anyhow::Result<ChatSettings> {
    let backend_url = cli
        .backend_url
        .clone()
        .or_else(|| env.backend_url.clone())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    url::Url::parse(&backend_url).with_context(|| format!("invalid backend url {backend_url:?}"))?;

    let locale = match cli.locale.as_deref().or(env.locale.as_deref()) {
        Some(tag) => tag.parse()?,
        None => Locale::default(),
    };

    let sender_id = cli.sender_id.clone().or_else(|| env.sender_id.clone());

    let timeout_secs = cli.timeout_secs.or(env.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        anyhow::bail!("timeout must be at least one second");
    }

    let schema = match &cli.schema_path {
        Some(path) => load_schema(path)?,
        None => ProfileSchema::onboarding(),
    };

    Ok(ChatSettings {
        backend_url,
        locale,
        sender_id,
        timeout: Duration::from_secs(timeout_secs),
        schema,
    })
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    sections: Vec<SectionSpec>,
}

/// Reads a section layout from a JSON file of the form
/// `{"sections": [{"name": "...", "fields": ["..."]}]}`.
pub fn load_schema(path: &Path) -> anyhow::Result<ProfileSchema> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    let file: SchemaFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing schema {}", path.display()))?;
    Ok(ProfileSchema::new(file.sections)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn precedence_cli_over_env_over_default() {
        let env = EnvDefaults {
            backend_url: Some("http://env-bot:5005".into()),
            locale: Some("fil".into()),
            sender_id: Some("env-sender".into()),
            timeout_secs: Some(10),
        };
        let cli = CliOverrides {
            backend_url: Some("http://cli-bot:5005".into()),
            locale: None,
            sender_id: None,
            timeout_secs: Some(5),
            schema_path: None,
        };

        let eff = resolve_chat_settings(&env, &cli).unwrap();

        assert_eq!(eff.backend_url, "http://cli-bot:5005"); // from cli
        assert_eq!(eff.locale, Locale::Fil); // from env
        assert_eq!(eff.sender_id.as_deref(), Some("env-sender")); // from env
        assert_eq!(eff.timeout, Duration::from_secs(5)); // from cli
        assert_eq!(eff.schema, ProfileSchema::onboarding());
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let eff = resolve_chat_settings(&EnvDefaults::default(), &CliOverrides::default()).unwrap();
        assert_eq!(eff, ChatSettings::default());
    }

    #[test]
    fn bad_values_are_rejected() {
        let cli = CliOverrides { backend_url: Some("localhost 5005".into()), ..Default::default() };
        assert!(resolve_chat_settings(&EnvDefaults::default(), &cli).is_err());
        let cli = CliOverrides { locale: Some("klingon".into()), ..Default::default() };
        assert!(resolve_chat_settings(&EnvDefaults::default(), &cli).is_err());
        let cli = CliOverrides { timeout_secs: Some(0), ..Default::default() };
        assert!(resolve_chat_settings(&EnvDefaults::default(), &cli).is_err());
    }

    #[test]
    fn schema_file_replaces_default_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"sections":[{"name":"Contact","fields":["email","phone_number"]}]}"#,
        )
        .unwrap();
        let cli = CliOverrides { schema_path: Some(path), ..Default::default() };
        let eff = resolve_chat_settings(&EnvDefaults::default(), &cli).unwrap();
        assert_eq!(eff.schema.sections().len(), 1);
        assert_eq!(eff.schema.total_fields(), 2);
    }

    #[test]
    fn schema_file_with_duplicate_sections_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"sections":[{"name":"A","fields":["x"]},{"name":"A","fields":["y"]}]}"#,
        )
        .unwrap();
        assert!(load_schema(&path).is_err());
        assert!(load_schema(&dir.path().join("missing.json")).is_err());
    }
}
