use crate::structures::{MetricColumn, ADMIN_CODE, DEPARTMENT, NAME};
use anyhow::Result;
use polars::prelude::*;
use serde::Serialize;

pub const DEFAULT_TOP_K: usize = 15;
pub const DEFAULT_HISTOGRAM_BINS: usize = 30;

const RANKING_COLUMNS: [&str; 10] = [
    ADMIN_CODE,
    NAME,
    DEPARTMENT,
    "mean",
    "min",
    "max",
    "p10",
    "p90",
    "std",
    "frost_share",
];

/// Finite values of a metric column; nulls and NaN are skipped.
pub fn metric_values(df: &DataFrame, metric: MetricColumn) -> Result<Vec<f64>> {
    let column = df.column(metric.column())?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect())
}

/// Percentile with linear interpolation between closest ranks. `sorted` must be ascending.
pub fn percentile(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = pct.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
}

impl DistributionSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            count: sorted.len(),
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median: percentile(&sorted, 50.0)?,
            p10: percentile(&sorted, 10.0)?,
            p90: percentile(&sorted, 90.0)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub density: f64,
}

/// Equal-width bins over the value range; the last bin is closed on the right.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }

    let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in &finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let n = finite.len() as f64;
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lo + width * i as f64,
            upper: lo + width * (i + 1) as f64,
            count,
            density: count as f64 / (n * width),
        })
        .collect()
}

fn ranked(stats: &DataFrame, k: usize, warmest_first: bool) -> Result<DataFrame> {
    let columns: Vec<Expr> = RANKING_COLUMNS.iter().map(|c| col(*c)).collect();
    Ok(stats
        .clone()
        .lazy()
        .sort(
            ["mean"],
            SortMultipleOptions::default()
                .with_order_descending(warmest_first)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .limit(k as IdxSize)
        .select(columns)
        .collect()?)
}

/// (coldest, warmest) districts by mean Tmin, `k` rows each.
pub fn build_rankings(stats: &DataFrame, k: usize) -> Result<(DataFrame, DataFrame)> {
    Ok((ranked(stats, k, false)?, ranked(stats, k, true)?))
}

/// Headline numbers of a selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionKpis {
    pub districts: usize,
    pub threshold_c: f64,
    /// Rows with `p10` below the threshold.
    pub at_risk: usize,
    pub at_risk_pct: f64,
    pub mean_of_mean: Option<f64>,
}

impl SelectionKpis {
    pub fn compute(stats: &DataFrame, threshold_c: f64) -> Result<Self> {
        let districts = stats.height();
        let p10 = stats
            .column(MetricColumn::P10.column())?
            .cast(&DataType::Float64)?;
        let at_risk = p10
            .f64()?
            .into_iter()
            .filter(|v| matches!(v, Some(v) if *v < threshold_c))
            .count();
        let at_risk_pct = if districts > 0 {
            at_risk as f64 / districts as f64 * 100.0
        } else {
            0.0
        };
        let mean_of_mean = DistributionSummary::from_values(&metric_values(stats, MetricColumn::Mean)?)
            .map(|d| d.mean);

        Ok(Self {
            districts,
            threshold_c,
            at_risk,
            at_risk_pct,
            mean_of_mean,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> DataFrame {
        polars::df!(
            "admin_code" => ["010101", "010102", "010103", "010104", "010105"],
            "name" => ["A", "B", "C", "D", "E"],
            "band_label" => ["2024"; 5],
            "department" => [Some("CUSCO"), Some("CUSCO"), None, Some("PUNO"), Some("PUNO")],
            "mean" => [Some(4.0), Some(-2.0), Some(10.0), None, Some(1.0)],
            "p10" => [Some(0.5), Some(-6.0), Some(6.0), Some(-1.0), None],
            "p90" => [8.0, 2.0, 14.0, 3.0, 5.0],
            "std" => [1.0; 5],
            "min" => [-1.0, -8.0, 4.0, -5.0, -3.0],
            "max" => [9.0, 4.0, 16.0, 5.0, 6.0],
            "frost_share" => [0.0, 0.6, 0.0, 0.3, 0.1]
        )
        .unwrap()
    }

    fn codes(df: &DataFrame) -> Vec<Option<String>> {
        df.column("admin_code")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|c| c.map(str::to_string))
            .collect()
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 50.0), Some(2.5));
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 100.0), Some(4.0));
        assert!((percentile(&sorted, 10.0).unwrap() - 1.3).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn distribution_ignores_missing_values() {
        let values = metric_values(&selection(), MetricColumn::Mean).unwrap();
        assert_eq!(values.len(), 4);

        let summary = DistributionSummary::from_values(&values).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.median, 2.5);
        assert_eq!(summary.mean, 3.25);
        assert!(summary.p10 < summary.median && summary.median < summary.p90);
        assert!(DistributionSummary::from_values(&[f64::NAN]).is_none());
    }

    #[test]
    fn histogram_bins_cover_every_value() {
        let values = [0.0, 1.0, 2.0, 3.0, 10.0];
        let bins = histogram(&values, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 5);
        assert_eq!(bins[0].lower, 0.0);
        assert_eq!(bins[4].upper, 10.0);
        assert_eq!(bins[4].count, 1);

        let area: f64 = bins.iter().map(|b| b.density * (b.upper - b.lower)).sum();
        assert!((area - 1.0).abs() < 1e-9);
    }

    #[test]
    fn histogram_of_constant_values_is_centered() {
        let bins = histogram(&[3.0, 3.0], 2);
        assert_eq!(bins[0].lower, 2.5);
        assert_eq!(bins[1].upper, 3.5);
        assert_eq!(bins[1].count, 2);
        assert!(histogram(&[], 30).is_empty());
    }

    #[test]
    fn rankings_order_by_mean() {
        let (coldest, warmest) = build_rankings(&selection(), 3).unwrap();
        assert_eq!(coldest.height(), 3);
        assert_eq!(
            codes(&coldest),
            vec![
                Some("010102".to_string()),
                Some("010105".to_string()),
                Some("010101".to_string())
            ]
        );
        assert_eq!(codes(&warmest)[0].as_deref(), Some("010103"));
        assert_eq!(coldest.width(), RANKING_COLUMNS.len());
        assert!(coldest.column("band_label").is_err());
    }

    #[test]
    fn rankings_put_missing_means_last() {
        let (coldest, warmest) = build_rankings(&selection(), 5).unwrap();
        assert_eq!(codes(&coldest)[4].as_deref(), Some("010104"));
        assert_eq!(codes(&warmest)[4].as_deref(), Some("010104"));
    }

    #[test]
    fn kpis_count_districts_below_threshold() {
        let kpis = SelectionKpis::compute(&selection(), 0.0).unwrap();
        assert_eq!(kpis.districts, 5);
        assert_eq!(kpis.at_risk, 2);
        assert_eq!(kpis.at_risk_pct, 40.0);
        assert_eq!(kpis.mean_of_mean, Some(3.25));
    }

    #[test]
    fn kpis_of_empty_selection() {
        let empty = selection().head(Some(0));
        let kpis = SelectionKpis::compute(&empty, 0.0).unwrap();
        assert_eq!(kpis.districts, 0);
        assert_eq!(kpis.at_risk_pct, 0.0);
        assert_eq!(kpis.mean_of_mean, None);
    }
}
