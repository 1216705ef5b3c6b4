use crate::analysis::{DistributionSummary, HistogramBin, SelectionKpis};
use crate::filter::JoinReport;
use crate::structures::MapVariable;
use anyhow::Result;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct SelectionSummary {
    pub generated_at: String,
    pub band: String,
    pub department: String,
    pub map_variable: MapVariable,
    pub kpis: SelectionKpis,
    pub distribution: Option<DistributionSummary>,
    pub histogram: Vec<HistogramBin>,
    pub join: JoinReport,
    pub artifacts: Vec<PathBuf>,
}

impl SelectionSummary {
    pub fn is_empty(&self) -> bool {
        self.kpis.districts == 0
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let f = File::create(path)?;
        serde_json::to_writer_pretty(f, self)?;
        Ok(())
    }
}

fn celsius(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.1} °C", v),
        None => "n/a".to_string(),
    }
}

pub fn render_markdown(summary: &SelectionSummary) -> String {
    let kpis = &summary.kpis;
    let mut md = String::new();

    md.push_str("# Tmin Zonal Statistics - Selection Report\n\n");
    md.push_str(&format!("Generated: {}\n\n", summary.generated_at));
    md.push_str(&format!(
        "Band: **{}** | Department: **{}** | Map variable: **{}**\n\n",
        summary.band,
        summary.department,
        summary.map_variable.metric()
    ));

    if summary.is_empty() {
        md.push_str("No districts for the current selection.\n");
        return md;
    }

    md.push_str("## Headline\n\n| Metric | Value |\n|---|---:|\n");
    md.push_str(&format!("| Districts shown | {} |\n", kpis.districts));
    md.push_str(&format!(
        "| % with p10 < {:.1} °C | {:.1}% |\n",
        kpis.threshold_c, kpis.at_risk_pct
    ));
    md.push_str(&format!(
        "| Average of mean Tmin | {} |\n",
        celsius(kpis.mean_of_mean)
    ));

    if let Some(d) = &summary.distribution {
        md.push_str("\n## Distribution of mean Tmin\n\n| Statistic | Value |\n|---|---:|\n");
        md.push_str(&format!("| Median | {} |\n", celsius(Some(d.median))));
        md.push_str(&format!("| P10 | {} |\n", celsius(Some(d.p10))));
        md.push_str(&format!("| P90 | {} |\n", celsius(Some(d.p90))));
    }

    md.push_str("\n## Diagnosis\n\n");
    md.push_str(&format!(
        "In **{}** for **{}**:\n\n",
        summary.department, summary.band
    ));
    md.push_str(&format!(
        "- **{}** districts ({:.1}%) with **p10 < {:.1} °C**.\n",
        kpis.at_risk, kpis.at_risk_pct, kpis.threshold_c
    ));
    md.push_str(&format!(
        "- Average mean Tmin **{}**.\n\n",
        celsius(kpis.mean_of_mean)
    ));
    md.push_str(&format!(
        "Suggested targeting: districts with `p10 < {:.1} °C` and/or high `frost_share`.\n",
        kpis.threshold_c
    ));

    md.push_str("\n## Map coverage\n\n");
    md.push_str(&format!(
        "{} of {} statistics rows joined onto a district geometry.\n",
        summary.join.map_features, summary.join.stats_rows
    ));
    if !summary.join.unmatched_codes.is_empty() {
        md.push_str(&format!(
            "Without geometry: {}\n",
            summary.join.unmatched_codes.join(", ")
        ));
    }

    if !summary.artifacts.is_empty() {
        md.push_str("\n## Artifacts\n\n");
        for a in &summary.artifacts {
            md.push_str(&format!("- {}\n", a.display()));
        }
    }
    md
}
