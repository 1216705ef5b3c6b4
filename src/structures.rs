use geo::{BoundingRect, Geometry, MultiPolygon, Polygon, Rect};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

// Canonical column names of the normalized statistics table.
pub const ADMIN_CODE: &str = "admin_code";
pub const NAME: &str = "name";
pub const BAND_LABEL: &str = "band_label";
pub const DEPARTMENT: &str = "department";

/// Department selector value meaning "every department".
pub const ALL_DEPARTMENTS: &str = "TODOS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricColumn {
    Mean,
    P10,
    P90,
    Std,
    Min,
    Max,
    FrostShare,
}

impl MetricColumn {
    pub const ALL: [MetricColumn; 7] = [
        MetricColumn::Mean,
        MetricColumn::P10,
        MetricColumn::P90,
        MetricColumn::Std,
        MetricColumn::Min,
        MetricColumn::Max,
        MetricColumn::FrostShare,
    ];

    pub fn column(self) -> &'static str {
        match self {
            MetricColumn::Mean => "mean",
            MetricColumn::P10 => "p10",
            MetricColumn::P90 => "p90",
            MetricColumn::Std => "std",
            MetricColumn::Min => "min",
            MetricColumn::Max => "max",
            MetricColumn::FrostShare => "frost_share",
        }
    }
}

impl Display for MetricColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Variable shading the choropleth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapVariable {
    #[default]
    Mean,
    P10,
}

impl MapVariable {
    pub fn metric(self) -> MetricColumn {
        match self {
            MapVariable::Mean => MetricColumn::Mean,
            MapVariable::P10 => MetricColumn::P10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistrictMetrics {
    pub mean: Option<f64>,
    pub p10: Option<f64>,
    pub p90: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub frost_share: Option<f64>,
}

impl DistrictMetrics {
    pub fn get(&self, metric: MetricColumn) -> Option<f64> {
        match metric {
            MetricColumn::Mean => self.mean,
            MetricColumn::P10 => self.p10,
            MetricColumn::P90 => self.p90,
            MetricColumn::Std => self.std,
            MetricColumn::Min => self.min,
            MetricColumn::Max => self.max,
            MetricColumn::FrostShare => self.frost_share,
        }
    }

    pub fn set(&mut self, metric: MetricColumn, value: Option<f64>) {
        let slot = match metric {
            MetricColumn::Mean => &mut self.mean,
            MetricColumn::P10 => &mut self.p10,
            MetricColumn::P90 => &mut self.p90,
            MetricColumn::Std => &mut self.std,
            MetricColumn::Min => &mut self.min,
            MetricColumn::Max => &mut self.max,
            MetricColumn::FrostShare => &mut self.frost_share,
        };
        *slot = value;
    }
}

/// One row of the statistics table: a district over one band.
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictRecord {
    pub admin_code: String,
    pub name: Option<String>,
    pub band_label: String,
    pub department: Option<String>,
    pub metrics: DistrictMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DistrictShape {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl DistrictShape {
    /// Keeps areal geometries only; boundaries never come as points or lines.
    pub fn from_geometry(geometry: Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Polygon(p) => Some(DistrictShape::Polygon(p)),
            Geometry::MultiPolygon(mp) => Some(DistrictShape::MultiPolygon(mp)),
            _ => None,
        }
    }

    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            DistrictShape::Polygon(p) => Geometry::Polygon(p.clone()),
            DistrictShape::MultiPolygon(mp) => Geometry::MultiPolygon(mp.clone()),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            DistrictShape::Polygon(p) => p.bounding_rect(),
            DistrictShape::MultiPolygon(mp) => mp.bounding_rect(),
        }
    }
}

/// A district boundary from the geometry file, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictGeometry {
    pub admin_code: String,
    pub department: Option<String>,
    pub geom: DistrictShape,
}

/// Everything read from the geometry file.
///
/// `departments` holds one (code, department) pair per coded feature in file
/// order, including features whose geometry was null or not areal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryTable {
    pub geometries: Vec<DistrictGeometry>,
    pub departments: Vec<(String, Option<String>)>,
}

impl From<Vec<DistrictGeometry>> for GeometryTable {
    fn from(geometries: Vec<DistrictGeometry>) -> Self {
        let departments = geometries
            .iter()
            .map(|g| (g.admin_code.clone(), g.department.clone()))
            .collect();
        GeometryTable {
            geometries,
            departments,
        }
    }
}

/// A geometry joined with the statistics of the selected band.
#[derive(Debug, Clone, PartialEq)]
pub struct MapFeature {
    pub admin_code: String,
    pub department: Option<String>,
    pub geom: DistrictShape,
    pub metrics: DistrictMetrics,
}

/// Immutable session data: both inputs normalized plus selector options.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub stats: DataFrame,
    pub geometries: Vec<DistrictGeometry>,
    pub bands: Vec<String>,
    pub departments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartmentFilter {
    All,
    Only(String),
}

impl DepartmentFilter {
    /// Reads a selector value; the sentinel and an empty value mean no filter.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => DepartmentFilter::All,
            Some(v) if v.eq_ignore_ascii_case(ALL_DEPARTMENTS) => DepartmentFilter::All,
            Some(v) => DepartmentFilter::Only(crate::normalize::normalize_name(v)),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            DepartmentFilter::All => ALL_DEPARTMENTS,
            DepartmentFilter::Only(d) => d,
        }
    }
}

impl Display for DepartmentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
