use crate::{ConfigError, Section};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_CLIENT_ID: &str = "REPOSTER_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "REPOSTER_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "REPOSTER_REFRESH_TOKEN";
pub const ENV_STORE_URL: &str = "REPOSTER_STORE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub sections: SectionsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_store_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_credit_floor")]
    pub credit_floor: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub pages_per_cycle: u32,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionsConfig {
    #[serde(default = "default_hot_section")]
    pub hot: SectionConfig,
    #[serde(default = "default_user_section")]
    pub user: SectionConfig,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_store_url() -> String {
    "sqlite://reposter.db".to_string()
}

fn default_credit_floor() -> u32 {
    10
}

fn default_cooldown_secs() -> u64 {
    10 * 60
}

fn default_user_agent() -> String {
    format!("reposter/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_thumbnail_size() -> String {
    "s".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_hot_section() -> SectionConfig {
    SectionConfig {
        enabled: true,
        pages_per_cycle: 1,
        poll_interval_secs: Section::Hot.default_poll_interval().as_secs(),
    }
}

fn default_user_section() -> SectionConfig {
    SectionConfig {
        enabled: true,
        pages_per_cycle: 3,
        poll_interval_secs: Section::User.default_poll_interval().as_secs(),
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_store_url(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            credit_floor: default_credit_floor(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            hot: default_hot_section(),
            user: default_user_section(),
        }
    }
}

impl BudgetConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl SectionsConfig {
    pub fn get(&self, section: Section) -> &SectionConfig {
        match section {
            Section::Hot => &self.hot,
            Section::User => &self.user,
        }
    }

    pub fn enabled(&self) -> Vec<Section> {
        [Section::Hot, Section::User]
            .into_iter()
            .filter(|section| self.get(*section).enabled)
            .collect()
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Secrets and the store location may come from the environment instead
    /// of the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CLIENT_ID) {
            self.credentials.client_id = value;
        }
        if let Some(value) = lookup(ENV_CLIENT_SECRET) {
            self.credentials.client_secret = value;
        }
        if let Some(value) = lookup(ENV_REFRESH_TOKEN) {
            self.credentials.refresh_token = value;
        }
        if let Some(value) = lookup(ENV_STORE_URL) {
            self.store.url = value;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("credentials.client_id", &self.credentials.client_id),
            ("credentials.client_secret", &self.credentials.client_secret),
            ("credentials.refresh_token", &self.credentials.refresh_token),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        if self.client.thumbnail_size.chars().count() != 1 {
            return Err(ConfigError::InvalidValue {
                field: "client.thumbnail_size".to_string(),
                value: self.client.thumbnail_size.clone(),
            });
        }

        for section in [Section::Hot, Section::User] {
            let section_config = self.sections.get(section);
            if section_config.pages_per_cycle == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("sections.{}.pages_per_cycle", section),
                    value: "0".to_string(),
                });
            }
        }

        if self.store.backend == StoreBackend::Sqlite && self.store.url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "store.url".to_string(),
            });
        }

        Ok(())
    }
}
