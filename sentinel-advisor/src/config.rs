use crate::error::AdvisorError;
use parking_lot::Mutex;
use sentinel_data::assembler::{AcquisitionConfig, AcquisitionMode};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};

/// Environment variable naming the settings file.
pub const ENV_SETTINGS_PATH: &str = "SENTINEL_SETTINGS";
pub const ENV_API_KEY: &str = "SENTINEL_API_KEY";
pub const ENV_WEBHOOK_URL: &str = "SENTINEL_WEBHOOK_URL";
pub const ENV_SYMBOL: &str = "SENTINEL_SYMBOL";

pub const DEFAULT_SETTINGS_PATH: &str = "sentinel.json";
pub const DEFAULT_REFRESH_MINUTES: u64 = 15;
pub const MAX_REFRESH_MINUTES: u64 = 24 * 60;

/// Reasoning backend.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Gemini,
    /// Any OpenAI-compatible `/chat/completions` host (OpenAI, DeepSeek, ...).
    #[serde(alias = "deepseek")]
    OpenAi,
}

impl EngineKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            EngineKind::Gemini => "gemini-2.0-flash",
            EngineKind::OpenAi => "gpt-4o-mini",
        }
    }
}

/// Chat webhook payload dialect.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookFlavor {
    #[default]
    Discord,
    Slack,
}

/// Persisted user settings.
///
/// Read once at startup and handed to the cycle as an immutable value.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub engine: EngineKind,
    pub api_key: String,
    /// Defaults to [`EngineKind::default_model`] when unset.
    pub model: Option<String>,
    /// Override the engine's API host, eg/ `https://api.deepseek.com/v1`.
    pub base_url: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_flavor: WebhookFlavor,
    pub refresh_minutes: u64,
    pub auto_run: bool,
    pub symbol: String,
    pub acquisition_mode: AcquisitionMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            api_key: String::new(),
            model: None,
            base_url: None,
            webhook_url: None,
            webhook_flavor: WebhookFlavor::default(),
            refresh_minutes: DEFAULT_REFRESH_MINUTES,
            auto_run: false,
            symbol: sentinel_data::assembler::DEFAULT_SYMBOL.to_string(),
            acquisition_mode: AcquisitionMode::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. A missing file yields [`Settings::default`].
    pub fn load(path: &Path) -> Result<Self, AdvisorError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(AdvisorError::Settings(format!(
                    "failed to read {}: {error}",
                    path.display()
                )));
            }
        };

        let mut settings = serde_json::from_str::<Self>(&contents).map_err(|error| {
            AdvisorError::Settings(format!("failed to parse {}: {error}", path.display()))
        })?;
        settings.symbol = normalise_symbol(&settings.symbol);

        Ok(settings)
    }

    /// Persist settings as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), AdvisorError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|error| AdvisorError::Settings(error.to_string()))?;

        std::fs::write(path, contents).map_err(|error| {
            AdvisorError::Settings(format!("failed to write {}: {error}", path.display()))
        })
    }

    /// Apply overrides from a variable lookup, ignoring empty values.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(api_key) = lookup(ENV_API_KEY) {
            self.api_key = api_key;
        }
        if let Some(webhook_url) = lookup(ENV_WEBHOOK_URL) {
            self.webhook_url = Some(webhook_url);
        }
        if let Some(symbol) = lookup(ENV_SYMBOL) {
            self.symbol = normalise_symbol(&symbol);
        }
        self
    }

    pub fn validate(&self) -> Result<(), AdvisorError> {
        if self.symbol.trim().is_empty() {
            return Err(AdvisorError::Settings("symbol is empty".to_string()));
        }
        if !(1..=MAX_REFRESH_MINUTES).contains(&self.refresh_minutes) {
            return Err(AdvisorError::Settings(format!(
                "refreshMinutes must be within 1..={MAX_REFRESH_MINUTES}, got {}",
                self.refresh_minutes
            )));
        }
        if self.api_key.is_empty() {
            warn!("no AI API key configured, analysis steps will fail");
        }
        Ok(())
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| self.engine.default_model())
    }

    pub fn refresh_interval(&self) -> Duration {
        let minutes = self.refresh_minutes.clamp(1, MAX_REFRESH_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    /// Snapshot of the acquisition parameters for one cycle.
    pub fn acquisition_config(&self) -> AcquisitionConfig {
        AcquisitionConfig::new(normalise_symbol(&self.symbol)).with_mode(self.acquisition_mode)
    }
}

/// Exchange symbols are uppercase, eg/ `BTCUSDT`.
fn normalise_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Live [`Settings`] plus the file they were loaded from.
///
/// Runtime edits are applied to both the effective settings and the file's own contents, and
/// only the latter is written back, so environment overrides (eg/ the API key) never land on
/// disk.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

#[derive(Debug)]
struct StoreState {
    file: Settings,
    effective: Settings,
}

impl SettingsStore {
    /// Load settings from the path in [`ENV_SETTINGS_PATH`] (or [`DEFAULT_SETTINGS_PATH`]) and
    /// apply environment overrides.
    pub fn from_env() -> Result<Self, AdvisorError> {
        let path = std::env::var(ENV_SETTINGS_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH));

        Self::load(path, |key| std::env::var(key).ok())
    }

    pub fn load<F>(path: PathBuf, lookup: F) -> Result<Self, AdvisorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = Settings::load(&path)?;
        let effective = file.clone().with_overrides(lookup);
        effective.validate()?;

        Ok(Self {
            path,
            state: Mutex::new(StoreState { file, effective }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current effective settings.
    pub fn current(&self) -> Settings {
        self.state.lock().effective.clone()
    }

    /// Apply `edit`, validate, and persist. Nothing changes if validation or the write fails.
    pub fn update<F>(&self, edit: F) -> Result<Settings, AdvisorError>
    where
        F: Fn(&mut Settings),
    {
        let mut state = self.state.lock();

        let mut effective = state.effective.clone();
        edit(&mut effective);
        effective.validate()?;

        let mut file = state.file.clone();
        edit(&mut file);
        file.save(&self.path)?;

        info!(path = %self.path.display(), "settings saved");
        state.file = file;
        state.effective = effective.clone();

        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn temp_settings_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "sentinel-settings-{name}-{}.json",
            std::process::id()
        ))
    }

    #[test]
    fn test_settings_deserialise_with_defaults() {
        struct TestCase {
            input: &'static str,
            expected: Settings,
        }

        let tests = vec![
            TestCase {
                // TC0: empty object is all defaults
                input: "{}",
                expected: Settings::default(),
            },
            TestCase {
                // TC1: camelCase fields
                input: r#"{
                    "engine": "openai",
                    "apiKey": "sk-test",
                    "baseUrl": "https://api.deepseek.com/v1",
                    "webhookUrl": "https://hooks.slack.com/services/x",
                    "webhookFlavor": "slack",
                    "refreshMinutes": 5,
                    "autoRun": true,
                    "symbol": "ETHUSDT",
                    "acquisitionMode": "parallel"
                }"#,
                expected: Settings {
                    engine: EngineKind::OpenAi,
                    api_key: "sk-test".to_string(),
                    model: None,
                    base_url: Some("https://api.deepseek.com/v1".to_string()),
                    webhook_url: Some("https://hooks.slack.com/services/x".to_string()),
                    webhook_flavor: WebhookFlavor::Slack,
                    refresh_minutes: 5,
                    auto_run: true,
                    symbol: "ETHUSDT".to_string(),
                    acquisition_mode: AcquisitionMode::Parallel,
                },
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<Settings>(test.input).unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_settings_with_overrides() {
        let env = HashMap::from([
            (ENV_API_KEY, "from-env".to_string()),
            (ENV_SYMBOL, "solusdt".to_string()),
            (ENV_WEBHOOK_URL, "   ".to_string()),
        ]);

        let actual = Settings {
            api_key: "from-file".to_string(),
            webhook_url: Some("https://discord.com/api/webhooks/1".to_string()),
            ..Default::default()
        }
        .with_overrides(|key| env.get(key).cloned());

        assert_eq!(actual.api_key, "from-env");
        assert_eq!(actual.symbol, "SOLUSDT");
        // Blank overrides are ignored
        assert_eq!(
            actual.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1")
        );
    }

    #[test]
    fn test_settings_validate_and_derived_values() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.model(), "gemini-2.0-flash");
        assert_eq!(settings.refresh_interval(), Duration::from_secs(15 * 60));

        let config = settings.acquisition_config();
        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.timeframes.len(), 4);

        for refresh_minutes in [0, MAX_REFRESH_MINUTES + 1, u64::MAX] {
            let invalid = Settings {
                refresh_minutes,
                ..Default::default()
            };
            assert!(matches!(invalid.validate(), Err(AdvisorError::Settings(_))));
            // Derived interval stays bounded even for unvalidated values
            assert!(invalid.refresh_interval() <= Duration::from_secs(MAX_REFRESH_MINUTES * 60));
        }
    }

    #[test]
    fn test_symbol_is_normalised_from_every_source() {
        struct TestCase {
            file_symbol: &'static str,
            env_symbol: Option<&'static str>,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: lowercase in the settings file
                file_symbol: "ethusdt",
                env_symbol: None,
                expected: "ETHUSDT",
            },
            TestCase {
                // TC1: padded mixed case in the settings file
                file_symbol: "  SolUsdt ",
                env_symbol: None,
                expected: "SOLUSDT",
            },
            TestCase {
                // TC2: env override wins and is normalised too
                file_symbol: "ethusdt",
                env_symbol: Some("xrpusdt"),
                expected: "XRPUSDT",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let path = temp_settings_path(&format!("symbol-{index}"));
            std::fs::write(&path, format!(r#"{{"symbol":"{}"}}"#, test.file_symbol)).unwrap();

            let env = test
                .env_symbol
                .map(|symbol| HashMap::from([(ENV_SYMBOL, symbol.to_string())]))
                .unwrap_or_default();
            let store = SettingsStore::load(path.clone(), |key| env.get(key).cloned()).unwrap();
            let config = store.current().acquisition_config();

            assert_eq!(store.current().symbol, test.expected, "TC{} failed", index);
            assert_eq!(config.symbol, test.expected, "TC{} failed", index);
            assert!(
                sentinel_data::exchange::bybit::kline_path(
                    &config.symbol,
                    sentinel_data::Timeframe::H1,
                    config.candle_limit
                )
                .contains(&format!("symbol={}", test.expected)),
                "TC{} failed",
                index
            );

            let _ = std::fs::remove_file(&path);
        }

        // Values built in code are normalised on the way into acquisition
        let settings = Settings {
            symbol: "bnbusdt".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.acquisition_config().symbol, "BNBUSDT");
    }

    #[test]
    fn test_settings_store_update_persists_file_values_only() {
        let path = temp_settings_path("store");
        std::fs::write(&path, r#"{"apiKey":"from-file","refreshMinutes":30}"#).unwrap();

        let env = HashMap::from([(ENV_API_KEY, "from-env".to_string())]);
        let store = SettingsStore::load(path.clone(), |key| env.get(key).cloned()).unwrap();
        assert_eq!(store.current().api_key, "from-env");

        let updated = store
            .update(|settings| {
                settings.auto_run = true;
                settings.refresh_minutes = 5;
            })
            .unwrap();
        assert!(updated.auto_run);
        assert_eq!(updated.refresh_interval(), Duration::from_secs(5 * 60));
        assert_eq!(store.current(), updated);

        let on_disk = Settings::load(&path).unwrap();
        assert!(on_disk.auto_run);
        assert_eq!(on_disk.refresh_minutes, 5);
        assert_eq!(on_disk.api_key, "from-file");

        // Invalid edits are rejected and leave both copies untouched
        let rejected = store.update(|settings| settings.refresh_minutes = 0);
        assert!(matches!(rejected, Err(AdvisorError::Settings(_))));
        assert_eq!(store.current().refresh_minutes, 5);
        assert_eq!(Settings::load(&path).unwrap().refresh_minutes, 5);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_settings_load_and_save() {
        let path = temp_settings_path("load-save");
        let _ = std::fs::remove_file(&path);

        // Missing file falls back to defaults
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());

        let settings = Settings {
            engine: EngineKind::OpenAi,
            model: Some("deepseek-chat".to_string()),
            auto_run: true,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(AdvisorError::Settings(_))));

        let _ = std::fs::remove_file(&path);
    }
}
