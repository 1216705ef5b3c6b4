use crate::structures::MetricColumn;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATISTICS_FILE: &str = "tmin_zstats_distrito.csv";
pub const DEFAULT_GEOMETRY_FILE: &str = "shape_file/DISTRITOS.shp";

/// Source column names of the statistics table, keyed by logical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsColumns {
    pub admin_code: String,
    pub name: String,
    pub band_label: String,
    pub mean: String,
    pub p10: String,
    pub p90: String,
    pub std: String,
    pub min: String,
    pub max: String,
    pub frost_share: String,
}

impl Default for StatisticsColumns {
    fn default() -> Self {
        Self {
            admin_code: "__UBIGEO__".to_string(),
            name: "__NOMBRE__".to_string(),
            band_label: "band_label".to_string(),
            mean: "mean".to_string(),
            p10: "p10".to_string(),
            p90: "p90".to_string(),
            std: "std".to_string(),
            min: "min".to_string(),
            max: "max".to_string(),
            frost_share: "frost_share".to_string(),
        }
    }
}

impl StatisticsColumns {
    pub fn metric(&self, metric: MetricColumn) -> &str {
        match metric {
            MetricColumn::Mean => &self.mean,
            MetricColumn::P10 => &self.p10,
            MetricColumn::P90 => &self.p90,
            MetricColumn::Std => &self.std,
            MetricColumn::Min => &self.min,
            MetricColumn::Max => &self.max,
            MetricColumn::FrostShare => &self.frost_share,
        }
    }
}

/// Source field names of the district geometry file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryFields {
    pub admin_code: String,
    pub department: String,
    /// WKB column for Parquet inputs; GeoJSON features carry their own geometry.
    pub geometry: String,
}

impl Default for GeometryFields {
    fn default() -> Self {
        Self {
            admin_code: "IDDIST".to_string(),
            department: "DEPARTAMEN".to_string(),
            geometry: "geometry".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaMapping {
    pub statistics: StatisticsColumns,
    pub geometry: GeometryFields,
}

impl SchemaMapping {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open schema mapping: {:?}", path))?;
        let reader = BufReader::new(file);
        let mapping = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse schema mapping: {:?}", path))?;
        Ok(mapping)
    }
}

/// Locations and schema of the two inputs, handed to the loader per session.
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub statistics_path: PathBuf,
    pub geometry_path: PathBuf,
    pub schema: SchemaMapping,
}

impl DataConfig {
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self {
            statistics_path: data_dir.join(DEFAULT_STATISTICS_FILE),
            geometry_path: data_dir.join(DEFAULT_GEOMETRY_FILE),
            schema: SchemaMapping::default(),
        }
    }
}
