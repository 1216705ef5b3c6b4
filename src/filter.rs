use crate::error::PipelineError;
use crate::loader::district_records;
use crate::structures::{
    Dataset, DepartmentFilter, DistrictMetrics, MapFeature, BAND_LABEL, DEPARTMENT,
};
use anyhow::Result;
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Statistics rows of one selection and the geometries they shade.
#[derive(Debug, Clone)]
pub struct FilteredView {
    pub stats: DataFrame,
    pub map: Vec<MapFeature>,
}

impl FilteredView {
    pub fn is_empty(&self) -> bool {
        self.stats.height() == 0
    }
}

/// Restricts the statistics table to one band and optionally one department.
///
/// Unknown bands or departments give an empty frame, not an error.
pub fn filter_statistics(
    stats: &DataFrame,
    band: &str,
    department: &DepartmentFilter,
) -> Result<DataFrame> {
    let mut predicate = col(BAND_LABEL).eq(lit(band));
    if let DepartmentFilter::Only(dep) = department {
        predicate = predicate.and(col(DEPARTMENT).eq(lit(dep.as_str())));
    }
    Ok(stats.clone().lazy().filter(predicate).collect()?)
}

/// Inner join of filtered statistics onto the geometry table by code.
pub fn join_map(stats: &DataFrame, dataset: &Dataset) -> Result<Vec<MapFeature>> {
    let mut by_code: HashMap<String, DistrictMetrics> = HashMap::new();
    for record in district_records(stats)? {
        by_code.entry(record.admin_code).or_insert(record.metrics);
    }

    Ok(dataset
        .geometries
        .iter()
        .filter_map(|g| {
            by_code.get(&g.admin_code).map(|metrics| MapFeature {
                admin_code: g.admin_code.clone(),
                department: g.department.clone(),
                geom: g.geom.clone(),
                metrics: *metrics,
            })
        })
        .collect())
}

pub fn filter_dataset(
    dataset: &Dataset,
    band: &str,
    department: &DepartmentFilter,
) -> Result<FilteredView> {
    let stats = filter_statistics(&dataset.stats, band, department)?;
    let map = join_map(&stats, dataset)?;
    debug!(
        band,
        department = %department,
        stats_rows = stats.height(),
        map_features = map.len(),
        "selection filtered"
    );
    Ok(FilteredView { stats, map })
}

/// How well the filtered statistics reached the map.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JoinReport {
    pub stats_rows: usize,
    pub map_features: usize,
    /// Codes in the filtered statistics with no geometry; absent from the map.
    pub unmatched_codes: Vec<String>,
}

impl JoinReport {
    pub fn from_view(view: &FilteredView) -> Result<Self> {
        let mapped: BTreeSet<&str> = view.map.iter().map(|f| f.admin_code.as_str()).collect();
        let unmatched_codes: BTreeSet<String> = district_records(&view.stats)?
            .into_iter()
            .map(|r| r.admin_code)
            .filter(|c| !mapped.contains(c.as_str()))
            .collect();
        Ok(Self {
            stats_rows: view.stats.height(),
            map_features: view.map.len(),
            unmatched_codes: unmatched_codes.into_iter().collect(),
        })
    }

    /// Rows to show but nothing joined: almost always a code formatting problem.
    pub fn is_key_mismatch(&self) -> bool {
        self.stats_rows > 0 && self.map_features == 0
    }

    pub fn check(&self, strict: bool) -> Result<()> {
        if self.is_key_mismatch() {
            if strict {
                return Err(PipelineError::KeyMismatch {
                    stats_rows: self.stats_rows,
                }
                .into());
            }
            warn!(
                stats_rows = self.stats_rows,
                "no geometry matched the selected statistics; map will be empty"
            );
        } else if !self.unmatched_codes.is_empty() {
            warn!(
                unmatched = self.unmatched_codes.len(),
                "statistics rows without geometry are left off the map"
            );
        }
        Ok(())
    }
}
