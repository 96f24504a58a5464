use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::app::ports::GazetteerPort;
use crate::domain::Coordinates;
use crate::error::{LedgerError, Result};
use crate::pipeline::processing::normalize::normalize;

#[derive(Debug, Deserialize)]
struct GazetteerFile {
    #[serde(default)]
    places: Vec<PlaceEntry>,
}

#[derive(Debug, Deserialize)]
struct PlaceEntry {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    latitude: f64,
    longitude: f64,
}

/// Gazetteer backed by a TOML table of places, held in memory.
///
/// ```toml
/// [[places]]
/// name = "Kerch"
/// aliases = ["Керчь", "Керч"]
/// latitude = 45.3566
/// longitude = 36.4681
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticGazetteer {
    places: HashMap<String, Coordinates>,
}

impl StaticGazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let gazetteer = Self::from_toml_str(&text)?;
        info!("Loaded {} gazetteer names from {}", gazetteer.len(), path.display());
        Ok(gazetteer)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: GazetteerFile = toml::from_str(text)?;
        let mut gazetteer = Self::new();
        for entry in file.places {
            let centroid = Coordinates::new(entry.latitude, entry.longitude).ok_or_else(|| {
                LedgerError::Gazetteer(format!(
                    "{}: coordinates ({}, {}) out of range",
                    entry.name, entry.latitude, entry.longitude
                ))
            })?;
            for name in std::iter::once(&entry.name).chain(entry.aliases.iter()) {
                gazetteer.insert(name, centroid);
            }
        }
        Ok(gazetteer)
    }

    /// Later entries replace earlier ones with the same normalized name
    pub fn insert(&mut self, name: &str, centroid: Coordinates) {
        let key = normalize(name);
        if !key.is_empty() {
            self.places.insert(key, centroid);
        }
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

#[async_trait]
impl GazetteerPort for StaticGazetteer {
    async fn centroid(&self, place: &str) -> anyhow::Result<Option<Coordinates>> {
        let found = self.places.get(&normalize(place)).copied();
        debug!("Gazetteer lookup {}: {}", place, if found.is_some() { "found" } else { "unknown" });
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[places]]
        name = "Kerch"
        aliases = ["Керчь"]
        latitude = 45.3566
        longitude = 36.4681

        [[places]]
        name = "Kursk Oblast"
        aliases = ["Курская область"]
        latitude = 51.76
        longitude = 36.19
    "#;

    #[tokio::test]
    async fn resolves_names_and_aliases() -> anyhow::Result<()> {
        let gazetteer = StaticGazetteer::from_toml_str(SAMPLE)?;
        let kerch = gazetteer.centroid("KERCH").await?.unwrap();
        assert_eq!(gazetteer.centroid("Керчь").await?, Some(kerch));
        assert!(gazetteer.centroid("Tuapse").await?.is_none());
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let text = "[[places]]\nname = \"Nowhere\"\nlatitude = 123.0\nlongitude = 0.0\n";
        assert!(matches!(
            StaticGazetteer::from_toml_str(text),
            Err(LedgerError::Gazetteer(_))
        ));
    }

    #[test]
    fn loads_from_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gazetteer.toml");
        std::fs::write(&path, SAMPLE)?;
        let gazetteer = StaticGazetteer::load(&path)?;
        assert!(!gazetteer.is_empty());
        Ok(())
    }
}
