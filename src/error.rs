use std::fmt::{self, Display};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Statistics,
    Geometry,
}

impl Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Statistics => write!(f, "statistics table"),
            InputKind::Geometry => write!(f, "geometry file"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source file is absent. Data has to be regenerated upstream.
    #[error("{kind} not found: {path:?} (regenerate it before exploring)")]
    MissingInput { kind: InputKind, path: PathBuf },

    #[error("column `{column}` not found in {kind}")]
    MissingColumn { kind: InputKind, column: String },

    #[error("unsupported geometry file format: {0:?} (expected .shp, .geojson, .json or .parquet)")]
    UnsupportedGeometryFormat(PathBuf),

    /// Statistics rows exist but none joined onto a geometry.
    #[error(
        "none of the {stats_rows} statistics rows matched a geometry by administrative code; \
         check the code columns in the schema mapping"
    )]
    KeyMismatch { stats_rows: usize },
}
