use crate::analysis::{DEFAULT_HISTOGRAM_BINS, DEFAULT_TOP_K};
use crate::config::{DataConfig, SchemaMapping};
use crate::structures::{MapVariable, ALL_DEPARTMENTS};
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tmin-zonal")]
#[command(about = "Explore district zonal statistics of minimum temperature", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show districts, bands and departments available in the inputs
    Info(InfoArgs),
    /// Filter by band and department and write tables, rankings and map layer
    Explore(ExploreArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding tmin_zstats_distrito.csv and shape_file/DISTRITOS.shp
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Statistics table (CSV or Parquet); overrides the data-dir default
    #[arg(long, alias = "statistics")]
    pub stats: Option<PathBuf>,

    /// District geometry (Shapefile, GeoJSON, or Parquet with a WKB column); overrides the data-dir default
    #[arg(long)]
    pub geometry: Option<PathBuf>,

    /// JSON schema mapping of logical fields to source column names
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

impl DataArgs {
    pub fn to_config(&self) -> Result<DataConfig> {
        let mut config = DataConfig::from_data_dir(&self.data_dir);
        if let Some(p) = &self.stats {
            config.statistics_path = p.clone();
        }
        if let Some(p) = &self.geometry {
            config.geometry_path = p.clone();
        }
        if let Some(p) = &self.schema {
            config.schema = SchemaMapping::load(p)?;
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub data: DataArgs,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MapFormat {
    #[default]
    Geojson,
    Parquet,
}

#[derive(Args, Debug)]
pub struct ExploreArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Band label to show; defaults to the last band
    #[arg(long)]
    pub band: Option<String>,

    /// Department name, or TODOS for the whole country
    #[arg(long, default_value = ALL_DEPARTMENTS)]
    pub department: String,

    /// Districts with p10 below this temperature (°C) are flagged at risk
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub threshold: f64,

    #[arg(long, value_enum, default_value_t = MapVariable::Mean)]
    pub map_variable: MapVariable,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    #[arg(long, default_value_t = DEFAULT_HISTOGRAM_BINS)]
    pub bins: usize,

    #[arg(long, value_enum, default_value_t = MapFormat::Geojson)]
    pub map_format: MapFormat,

    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Fail when the selection has statistics but none joins onto a geometry
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}
