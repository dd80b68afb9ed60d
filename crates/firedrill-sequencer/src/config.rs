use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actuator::SceneState;
use crate::catalog::{Package, PackageCatalog};
use crate::countdown::CountdownSettings;
use crate::dialogue::DialogueSettings;
use crate::error::ConfigError;
use crate::fire_zone::FireZoneSettings;
use crate::revert::RevertTiming;

/// Session-wide knobs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Seed for clip selection; random when unset
    pub seed: Option<u64>,
    pub revert_timing: RevertTiming,
}

/// Everything a session is built from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub packages: Vec<Package>,

    /// Alarm countdown, if the scenario has one
    #[serde(default)]
    pub countdown: Option<CountdownSettings>,

    /// Step dialogue panel, if the scenario has one
    #[serde(default)]
    pub dialogue: Option<DialogueSettings>,

    #[serde(default)]
    pub fire_zones: Vec<FireZoneSettings>,

    /// Initial scene used when no host scene is supplied
    #[serde(default)]
    pub scene: SceneState,
}

impl ScenarioConfig {
    /// Read and validate a scenario file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(target: "session",
            "Loaded scenario from {} ({} packages)",
            path.display(),
            config.packages.len()
        );
        Ok(config)
    }

    /// Parse and validate scenario text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ScenarioConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Builds a throwaway catalog so package rules live in one place
        PackageCatalog::new(self.packages.clone())?;

        if let Some(countdown) = &self.countdown {
            countdown.validate()?;
        }
        if let Some(dialogue) = &self.dialogue {
            dialogue.validate()?;
        }
        for (index, zone) in self.fire_zones.iter().enumerate() {
            zone.validate(index)?;
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<PackageCatalog, ConfigError> {
        PackageCatalog::new(self.packages.clone())
    }
}
