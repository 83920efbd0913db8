//! Pollen from the Google Pollen API.
//!
//! Upstream reports per-plant indexes. Each plant is assigned to a family
//! by display name and a family's index is the highest of its plants.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use envwatch_types::{Coordinates, Measurement, PlantIndex, Pollen, PollenFamily, ProviderKind};

use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpTransport, fetch_json};
use crate::providers::{Provider, ProviderSettings};
use crate::thresholds::PollenThresholds;

/// Default upstream.
pub const DEFAULT_BASE_URL: &str = "https://pollen.googleapis.com";
/// Default cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(120 * 60);

/// Name fragments per family, checked in order against the lowercased
/// display name. The first family with a matching fragment wins.
pub const FAMILY_TABLE: [(PollenFamily, &[&str]); 3] = [
    (PollenFamily::Grass, &["grass"]),
    (
        PollenFamily::Weed,
        &["ragweed", "mugwort", "weed", "plantain", "nettle"],
    ),
    (
        PollenFamily::Tree,
        &[
            "birch",
            "oak",
            "alder",
            "ash",
            "cottonwood",
            "elm",
            "maple",
            "olive",
            "pine",
            "juniper",
            "cypress",
            "cedar",
            "hazel",
            "tree",
        ],
    ),
];

/// Family for a plant display name, if recognized.
#[must_use]
pub fn plant_family(display_name: &str) -> Option<PollenFamily> {
    let name = display_name.to_lowercase();
    FAMILY_TABLE
        .iter()
        .find(|(_, fragments)| fragments.iter().any(|f| name.contains(f)))
        .map(|(family, _)| *family)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ForecastResponse {
    #[serde(default)]
    daily_info: Vec<DayInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayInfo {
    #[serde(default)]
    plant_info: Vec<PlantInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlantInfo {
    code: String,
    display_name: Option<String>,
    index_info: Option<IndexInfo>,
}

#[derive(Debug, Deserialize)]
struct IndexInfo {
    value: Option<u8>,
}

pub(crate) fn transform(response: ForecastResponse, thresholds: &PollenThresholds) -> Result<Pollen> {
    let today = response
        .daily_info
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoDataAvailable("pollen forecast has no days".into()))?;

    let mut pollen = Pollen::default();
    for plant in today.plant_info {
        // Plants out of season carry no index
        let Some(index) = plant.index_info.and_then(|i| i.value) else {
            continue;
        };
        let display_name = plant.display_name.unwrap_or_else(|| plant.code.clone());
        let family = plant_family(&display_name);

        let slot = match family {
            Some(PollenFamily::Tree) => Some(&mut pollen.tree),
            Some(PollenFamily::Grass) => Some(&mut pollen.grass),
            Some(PollenFamily::Weed) => Some(&mut pollen.weed),
            None => None,
        };
        if let Some(slot) = slot {
            *slot = Some(slot.map_or(index, |current| current.max(index)));
        }

        pollen.plants.push(PlantIndex {
            code: plant.code,
            display_name,
            family,
            index,
        });
    }

    pollen.overall = [pollen.tree, pollen.grass, pollen.weed]
        .into_iter()
        .flatten()
        .max();
    pollen.risk = pollen.overall.map(|i| thresholds.evaluate(i));
    Ok(pollen)
}

/// Pollen provider.
pub struct PollenProvider {
    settings: ProviderSettings,
    transport: Arc<dyn HttpTransport>,
    thresholds: PollenThresholds,
}

impl PollenProvider {
    pub fn new(settings: ProviderSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
            thresholds: PollenThresholds::default(),
        }
    }
}

#[async_trait]
impl Provider for PollenProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Pollen
    }

    fn name(&self) -> &str {
        "google-pollen"
    }

    fn ttl(&self) -> Duration {
        self.settings.ttl
    }

    async fn fetch(&self, at: Coordinates) -> Result<Measurement> {
        let key = self.settings.require_key(self.name())?;
        let request = HttpRequest::get(self.settings.url("v1/forecast:lookup"))
            .query("key", key)
            .query("location.latitude", at.latitude)
            .query("location.longitude", at.longitude)
            .query("days", 1)
            .timeout(self.settings.timeout);

        let response: ForecastResponse =
            fetch_json(self.transport.as_ref(), self.name(), request).await?;
        transform(response, &self.thresholds).map(Measurement::Pollen)
    }
}
