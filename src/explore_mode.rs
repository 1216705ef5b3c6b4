use crate::analysis::{build_rankings, histogram, metric_values, DistributionSummary, SelectionKpis};
use crate::cli::{ExploreArgs, MapFormat};
use crate::filter::{filter_dataset, JoinReport};
use crate::loader::load_dataset;
use crate::report::{render_markdown, SelectionSummary};
use crate::structures::{Dataset, DepartmentFilter, MapVariable, MetricColumn};
use crate::writer::{write_csv, write_map_geojson, write_map_parquet};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Everything a selector change decides, besides the data itself.
#[derive(Debug, Clone)]
pub struct ExploreSettings {
    pub band: String,
    pub department: DepartmentFilter,
    pub threshold_c: f64,
    pub map_variable: MapVariable,
    pub top_k: usize,
    pub bins: usize,
    pub map_format: MapFormat,
    pub strict: bool,
}

pub struct ExploreOutcome {
    pub stats_rows: usize,
    pub map_features: usize,
    pub artifacts: Vec<PathBuf>,
}

fn file_label(s: &str) -> String {
    s.replace(['/', '\\'], "_")
}

pub fn run_explore(args: ExploreArgs) -> Result<ExploreOutcome> {
    info!("starting explore mode");
    let config = args.data.to_config()?;
    let dataset = load_dataset(&config)?;

    let band = match args.band {
        Some(b) => b,
        None => dataset
            .bands
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("statistics table has no band labels"))?,
    };
    if !dataset.bands.contains(&band) {
        warn!(band=%band, available=?dataset.bands, "band not present in statistics");
    }

    let department = DepartmentFilter::parse(Some(&args.department));
    if let DepartmentFilter::Only(d) = &department {
        if !dataset.departments.contains(d) {
            warn!(department=%d, "department not present in statistics");
        }
    }

    let settings = ExploreSettings {
        band,
        department,
        threshold_c: args.threshold,
        map_variable: args.map_variable,
        top_k: args.top_k,
        bins: args.bins,
        map_format: args.map_format,
        strict: args.strict,
    };
    explore_selection(&dataset, &settings, &args.output_dir)
}

pub fn explore_selection(
    dataset: &Dataset,
    settings: &ExploreSettings,
    output_dir: &Path,
) -> Result<ExploreOutcome> {
    std::fs::create_dir_all(output_dir)?;
    let _span = tracing::info_span!(
        "selection",
        band = %settings.band,
        department = %settings.department
    )
    .entered();

    let start = Instant::now();
    let view = filter_dataset(dataset, &settings.band, &settings.department)?;
    let join = JoinReport::from_view(&view)?;
    join.check(settings.strict)?;

    let kpis = SelectionKpis::compute(&view.stats, settings.threshold_c)?;
    info!(
        districts = kpis.districts,
        at_risk = kpis.at_risk,
        at_risk_pct = kpis.at_risk_pct,
        map_features = view.map.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "selection computed"
    );

    let band = file_label(&settings.band);
    let dep = file_label(settings.department.label());
    let mut artifacts = Vec::new();
    let mut distribution = None;
    let mut bins = Vec::new();

    if view.is_empty() {
        warn!("no districts for the current selection");
    } else {
        let values = metric_values(&view.stats, MetricColumn::Mean)?;
        distribution = DistributionSummary::from_values(&values);
        bins = histogram(&values, settings.bins);

        let table = output_dir.join(format!("tmin_stats_{}_{}.csv", band, dep));
        write_csv(&view.stats, &table)?;
        artifacts.push(table);

        let (coldest, warmest) = build_rankings(&view.stats, settings.top_k)?;
        let k = settings.top_k;
        let top = output_dir.join(format!("ranking_top{}_{}_{}.csv", k, band, dep));
        write_csv(&coldest, &top)?;
        artifacts.push(top);
        let bottom = output_dir.join(format!("ranking_bottom{}_{}_{}.csv", k, band, dep));
        write_csv(&warmest, &bottom)?;
        artifacts.push(bottom);
    }

    if view.map.is_empty() {
        warn!("no geometries for the current selection; map layer not written");
    } else {
        let map = match settings.map_format {
            MapFormat::Geojson => {
                let p = output_dir.join(format!("map_{}_{}.geojson", band, dep));
                write_map_geojson(&view.map, settings.map_variable, &p)?;
                p
            }
            MapFormat::Parquet => {
                let p = output_dir.join(format!("map_{}_{}.parquet", band, dep));
                write_map_parquet(&view.map, &p)?;
                p
            }
        };
        artifacts.push(map);
    }

    let summary = SelectionSummary {
        generated_at: Utc::now().to_rfc3339(),
        band: settings.band.clone(),
        department: settings.department.label().to_string(),
        map_variable: settings.map_variable,
        kpis,
        distribution,
        histogram: bins,
        join,
        artifacts: artifacts.clone(),
    };
    let json_out = output_dir.join("summary.json");
    summary.write_json(&json_out)?;
    artifacts.push(json_out);

    let md_out = output_dir.join("report.md");
    std::fs::write(&md_out, render_markdown(&summary))?;
    artifacts.push(md_out);

    info!(
        output_dir=?output_dir,
        artifacts = artifacts.len(),
        "selection written"
    );
    Ok(ExploreOutcome {
        stats_rows: view.stats.height(),
        map_features: view.map.len(),
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::assemble_dataset;
    use crate::structures::{DistrictGeometry, DistrictShape};
    use geo::polygon;

    fn dataset() -> Dataset {
        let stats = polars::df!(
            "admin_code" => ["030101", "030102", "080101", "030101"],
            "name" => ["ABANCAY", "CHACOCHE", "CUSCO", "ABANCAY"],
            "band_label" => ["2024", "2024", "2024", "1991-2020"],
            "mean" => [9.0, 3.0, 4.5, 8.5],
            "p10" => [5.0, -1.0, 0.5, 4.5],
            "p90" => [12.0, 7.0, 8.0, 11.5],
            "std" => [2.0, 2.5, 2.2, 2.1],
            "min" => [3.0, -3.0, -1.0, 2.5],
            "max" => [14.0, 9.0, 10.0, 13.0],
            "frost_share" => [0.0, 0.2, 0.05, 0.0]
        )
        .unwrap();
        let geometries: Vec<DistrictGeometry> = ["030101", "030102", "080101"]
            .iter()
            .enumerate()
            .map(|(i, code)| DistrictGeometry {
                admin_code: code.to_string(),
                department: Some(if code.starts_with("03") { "APURIMAC" } else { "CUSCO" }.to_string()),
                geom: DistrictShape::Polygon(polygon![
                    (x: i as f64, y: 0.0),
                    (x: i as f64 + 1.0, y: 0.0),
                    (x: i as f64 + 1.0, y: 1.0),
                    (x: i as f64, y: 0.0),
                ]),
            })
            .collect();
        assemble_dataset(stats, geometries).unwrap()
    }

    fn settings(band: &str, department: &str) -> ExploreSettings {
        ExploreSettings {
            band: band.to_string(),
            department: DepartmentFilter::parse(Some(department)),
            threshold_c: 0.0,
            map_variable: MapVariable::Mean,
            top_k: 15,
            bins: 30,
            map_format: MapFormat::Geojson,
            strict: true,
        }
    }

    #[test]
    fn writes_tables_rankings_map_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let outcome =
            explore_selection(&dataset(), &settings("2024", "Apurímac"), dir.path()).unwrap();

        assert_eq!(outcome.stats_rows, 2);
        assert_eq!(outcome.map_features, 2);
        for name in [
            "tmin_stats_2024_APURIMAC.csv",
            "ranking_top15_2024_APURIMAC.csv",
            "ranking_bottom15_2024_APURIMAC.csv",
            "map_2024_APURIMAC.geojson",
            "summary.json",
            "report.md",
        ] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }

        let table = std::fs::read_to_string(dir.path().join("tmin_stats_2024_APURIMAC.csv")).unwrap();
        assert!(table.starts_with("admin_code,name,band_label,mean"));
        assert_eq!(table.lines().count(), 3);

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["kpis"]["at_risk"], 1);
        assert_eq!(summary["department"], "APURIMAC");
    }

    #[test]
    fn empty_selection_writes_only_summary() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = explore_selection(&dataset(), &settings("2030", "TODOS"), dir.path()).unwrap();

        assert_eq!(outcome.stats_rows, 0);
        assert_eq!(outcome.artifacts.len(), 2);
        assert!(!dir.path().join("tmin_stats_2030_TODOS.csv").exists());
        let report = std::fs::read_to_string(dir.path().join("report.md")).unwrap();
        assert!(report.contains("No districts for the current selection."));
    }

    #[test]
    fn parquet_map_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings("1991-2020", "TODOS");
        s.map_format = MapFormat::Parquet;
        let outcome = explore_selection(&dataset(), &s, dir.path()).unwrap();

        assert_eq!(outcome.map_features, 1);
        assert!(dir.path().join("map_1991-2020_TODOS.parquet").exists());
    }

    #[test]
    fn labels_with_separators_stay_in_output_dir() {
        assert_eq!(file_label("2019/2020"), "2019_2020");
    }
}
