use serde::Deserialize;
use sew_log::EventLogConfig;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct SewConfig {
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub permissions: PermissionsSection,
    #[serde(default)]
    pub claims: ClaimsSection,
    #[serde(default)]
    pub event_log: EventLogConfig,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PermissionsSection {
    #[serde(default = "default_ranks_file")]
    pub ranks_file: String,
}

fn default_ranks_file() -> String {
    "ranks.json".into()
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            ranks_file: default_ranks_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClaimsSection {
    #[serde(default = "default_claims_file")]
    pub file: String,
    /// Most chunks a single player may hold.
    #[serde(default = "default_max_chunks")]
    pub max_chunks_per_player: usize,
}

fn default_claims_file() -> String {
    "claims.json".into()
}

fn default_max_chunks() -> usize {
    64
}

impl Default for ClaimsSection {
    fn default() -> Self {
        Self {
            file: default_claims_file(),
            max_chunks_per_player: default_max_chunks(),
        }
    }
}

impl SewConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}
