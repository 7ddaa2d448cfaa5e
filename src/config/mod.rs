//! Scan and projection settings, persisted as JSON or XML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bitmap::COORDINATE_BITS;
use crate::error::{Error, Result};
use crate::projection::ProjectionJob;
use crate::scan::{ClassifierKind, ScanSession, DEFAULT_MATCH_MARGIN};

/// Settings for acquiring a projection map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// log2 of the stimulus texture size.
    pub texture_size: u32,
    /// Coordinate bits resolved per axis.
    pub scan_depth: u32,
    /// Texture file the renderer reads stimuli from.
    pub texture_path: PathBuf,
    /// Response classification strategy.
    pub classifier: ClassifierKind,
    /// Ambiguity margin for the margin classifier.
    pub match_margin: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            texture_size: 10,
            scan_depth: 10,
            texture_path: PathBuf::from("scan_texture.png"),
            classifier: ClassifierKind::default(),
            match_margin: DEFAULT_MATCH_MARGIN,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        // Session construction carries the range checks.
        self.session().map(|_| ())
    }

    /// A fresh session for these settings.
    pub fn session(&self) -> Result<ScanSession> {
        ScanSession::with_classifier(self.texture_size, self.scan_depth, self.classifier, self.match_margin)
    }
}

/// Settings for turning a map and an overlay into a texture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// log2 of the projected texture size.
    pub texture_size: u32,
    /// log2 of the saved texture size, when it differs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u32>,
    /// Hole filling passes, 0 disables.
    pub fill_passes: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            texture_size: 10,
            output_size: None,
            fill_passes: 1,
        }
    }
}

impl ProjectionConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [("texture size", Some(self.texture_size)), ("output size", self.output_size)] {
            if let Some(size) = size {
                if !(1..=COORDINATE_BITS).contains(&size) {
                    return Err(Error::Configuration(format!(
                        "{} {} must be between 1 and {}",
                        name, size, COORDINATE_BITS
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn job(&self) -> ProjectionJob {
        ProjectionJob {
            texture_size: self.texture_size,
            output_size: self.output_size,
            fill_passes: self.fill_passes,
        }
    }
}

/// Everything a scan-then-project run needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub scan: ScanConfig,
    pub projection: ProjectionConfig,
}

impl ProjectConfig {
    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.projection.validate()
    }

    /// Default location of the project file in the user's config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("Projexture").join("project.json"))
    }

    /// Load from `path`: JSON for `.json`, XML otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config: ProjectConfig = if is_json(path) {
            serde_json::from_str(&contents)?
        } else {
            quick_xml::de::from_str(&contents).map_err(Error::XmlParse)?
        };
        config.validate()?;

        log::info!("Loaded project config from {}", path.display());
        Ok(config)
    }

    /// Save to `path`, format chosen by extension as in [`ProjectConfig::load`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            quick_xml::se::to_string(self).map_err(Error::XmlWrite)?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;

        log::info!("Saved project config to {}", path.display());
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
