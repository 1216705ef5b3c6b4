use crate::config::{DataConfig, GeometryFields, StatisticsColumns};
use crate::error::{InputKind, PipelineError};
use crate::normalize::{normalize_name, pad_admin_code};
use crate::structures::{
    Dataset, DistrictGeometry, DistrictMetrics, DistrictRecord, DistrictShape, GeometryTable,
    MetricColumn, ADMIN_CODE, BAND_LABEL, DEPARTMENT, NAME,
};
use anyhow::{Context, Result};
use geo::Geometry;
use geojson::{FeatureCollection, GeoJson};
use geozero::wkb::Wkb;
use geozero::ToGeo;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field as ParquetField;
use polars::prelude::*;
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| wanted.iter().any(|w| e.eq_ignore_ascii_case(w)))
        .unwrap_or(false)
}

fn require_column<'a>(df: &'a DataFrame, column: &str, kind: InputKind) -> Result<&'a Column> {
    df.column(column).map_err(|_| {
        PipelineError::MissingColumn {
            kind,
            column: column.to_string(),
        }
        .into()
    })
}

fn string_values(column: &Column) -> Result<Vec<Option<String>>> {
    let as_str = column.cast(&DataType::String)?;
    Ok(as_str
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn float_values(column: &Column) -> Result<Vec<Option<f64>>> {
    let as_f64 = column.cast(&DataType::Float64)?;
    Ok(as_f64.f64()?.into_iter().collect())
}

/// Reads the raw statistics table (CSV, or Parquet by extension).
pub fn read_statistics(path: &Path) -> Result<DataFrame> {
    if has_extension(path, &["parquet"]) {
        let p = path.to_string_lossy();
        let lf = LazyFrame::scan_parquet(PlPath::from_str(&p), ScanArgsParquet::default())?;
        return lf
            .collect()
            .with_context(|| format!("Failed reading statistics Parquet: {:?}", path));
    }
    // Band labels look numeric for the first rows ("2024") and textual later
    // ("1991-2020"); type inference has to see every row.
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Failed reading statistics CSV: {:?}", path))
}

/// Maps a raw statistics table onto the canonical schema.
///
/// Codes are cast to string and zero-padded, names normalized, metrics cast
/// to `f64`. Rows without a code or band label are dropped.
pub fn normalize_statistics(raw: &DataFrame, columns: &StatisticsColumns) -> Result<DataFrame> {
    let kind = InputKind::Statistics;

    let codes: Vec<Option<String>> =
        string_values(require_column(raw, &columns.admin_code, kind)?)?
            .into_iter()
            .map(|c| c.map(|c| pad_admin_code(&c)))
            .collect();
    let names: Vec<Option<String>> = string_values(require_column(raw, &columns.name, kind)?)?
        .into_iter()
        .map(|n| n.map(|n| normalize_name(&n)))
        .collect();
    let bands = string_values(require_column(raw, &columns.band_label, kind)?)?;

    let mut out = vec![
        Column::new(ADMIN_CODE.into(), codes),
        Column::new(NAME.into(), names),
        Column::new(BAND_LABEL.into(), bands),
    ];
    for metric in MetricColumn::ALL {
        let values = float_values(require_column(raw, columns.metric(metric), kind)?)?;
        out.push(Column::new(metric.column().into(), values));
    }

    let df = DataFrame::new(out)?;
    let before = df.height();
    let df = df
        .lazy()
        .filter(col(ADMIN_CODE).is_not_null().and(col(BAND_LABEL).is_not_null()))
        .collect()?;
    if df.height() < before {
        warn!(
            dropped = before - df.height(),
            "statistics rows without administrative code or band label dropped"
        );
    }
    Ok(df)
}

fn json_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parquet_scalar(field: &ParquetField) -> Option<String> {
    match field {
        ParquetField::Str(s) => Some(s.clone()),
        ParquetField::Long(v) => Some(v.to_string()),
        ParquetField::Int(v) => Some(v.to_string()),
        _ => None,
    }
}

fn dbf_scalar(value: &FieldValue) -> Option<String> {
    let whole = |v: f64| {
        if v.fract() == 0.0 && v.abs() < 1e15 {
            format!("{:.0}", v)
        } else {
            v.to_string()
        }
    };
    match value {
        FieldValue::Character(Some(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        FieldValue::Numeric(Some(v)) | FieldValue::Double(v) => Some(whole(*v)),
        FieldValue::Float(Some(v)) => Some(whole(f64::from(*v))),
        FieldValue::Integer(v) => Some(v.to_string()),
        _ => None,
    }
}

/// Records the department of a coded feature, then keeps its geometry if it
/// is areal. Returns false when no geometry was kept.
fn push_feature(
    table: &mut GeometryTable,
    code: &str,
    department: Option<&str>,
    geom: Option<Geometry<f64>>,
) -> bool {
    let admin_code = pad_admin_code(code);
    let department = department.map(normalize_name);
    table
        .departments
        .push((admin_code.clone(), department.clone()));

    match geom.and_then(DistrictShape::from_geometry) {
        Some(geom) => {
            table.geometries.push(DistrictGeometry {
                admin_code,
                department,
                geom,
            });
            true
        }
        None => false,
    }
}

fn load_geometries_shapefile(path: &Path, fields: &GeometryFields) -> Result<GeometryTable> {
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {:?}", path))?;

    let mut table = GeometryTable::default();
    let mut skipped = 0usize;
    for item in reader.iter_shapes_and_records() {
        let (shape, record) =
            item.with_context(|| format!("Failed reading shapefile record: {:?}", path))?;
        let code = record.get(&fields.admin_code).and_then(dbf_scalar);
        let department = record.get(&fields.department).and_then(dbf_scalar);

        let Some(code) = code else {
            skipped += 1;
            continue;
        };
        let geom = match shape {
            Shape::NullShape => None,
            shape => match Geometry::<f64>::try_from(shape) {
                Ok(g) => Some(g),
                Err(e) => {
                    warn!(admin_code=%code, error=%e, "unreadable shape; skipping");
                    None
                }
            },
        };
        if !push_feature(&mut table, &code, department.as_deref(), geom) {
            skipped += 1;
        }
    }

    if skipped > 0 {
        warn!(skipped, "shapefile records without code or areal geometry skipped");
    }
    Ok(table)
}

fn load_geometries_geojson(path: &Path, fields: &GeometryFields) -> Result<GeometryTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open geometry file: {:?}", path))?;
    let geojson: GeoJson = raw
        .parse()
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;
    let collection = FeatureCollection::try_from(geojson)
        .with_context(|| format!("Expected a FeatureCollection in {:?}", path))?;

    let mut table = GeometryTable {
        geometries: Vec::with_capacity(collection.features.len()),
        departments: Vec::with_capacity(collection.features.len()),
    };
    let mut skipped = 0usize;
    for feature in collection.features {
        let props = feature.properties.as_ref();
        let code = props
            .and_then(|p| p.get(&fields.admin_code))
            .and_then(json_scalar);
        let department = props
            .and_then(|p| p.get(&fields.department))
            .and_then(json_scalar);

        let Some(code) = code else {
            skipped += 1;
            continue;
        };
        let geom = match feature.geometry {
            Some(geometry) => match Geometry::<f64>::try_from(geometry.value) {
                Ok(g) => Some(g),
                Err(e) => {
                    warn!(admin_code=%code, error=%e, "unreadable feature geometry; skipping");
                    None
                }
            },
            None => None,
        };
        if !push_feature(&mut table, &code, department.as_deref(), geom) {
            skipped += 1;
        }
    }

    if skipped > 0 {
        warn!(skipped, "geometry features without code or areal geometry skipped");
    }
    Ok(table)
}

fn load_geometries_parquet(path: &Path, fields: &GeometryFields) -> Result<GeometryTable> {
    let file =
        File::open(path).with_context(|| format!("Failed to open geometry file: {:?}", path))?;
    let reader = SerializedFileReader::new(file).context("Failed to create parquet reader")?;
    let num_rows = reader.metadata().file_metadata().num_rows() as usize;

    let mut table = GeometryTable {
        geometries: Vec::with_capacity(num_rows),
        departments: Vec::with_capacity(num_rows),
    };
    let mut skipped = 0usize;
    for row in reader.get_row_iter(None)? {
        let row = row?;

        let mut code = None;
        let mut department = None;
        let mut wkb = None;
        for (name, field) in row.get_column_iter() {
            if *name == fields.admin_code {
                code = parquet_scalar(field);
            } else if *name == fields.department {
                department = parquet_scalar(field);
            } else if *name == fields.geometry {
                if let ParquetField::Bytes(b) = field {
                    wkb = Some(b.data().to_vec());
                }
            }
        }

        let Some(code) = code else {
            skipped += 1;
            continue;
        };
        let geom = match wkb.map(|w| Wkb(w).to_geo()) {
            Some(Ok(g)) => Some(g),
            Some(Err(e)) => {
                warn!(admin_code=%code, error=%e, "unreadable WKB geometry; skipping");
                None
            }
            None => None,
        };
        if !push_feature(&mut table, &code, department.as_deref(), geom) {
            skipped += 1;
        }
    }

    if skipped > 0 {
        warn!(skipped, "geometry rows without code or areal geometry skipped");
    }
    Ok(table)
}

/// Reads district boundaries, normalizing code and department on the way in.
///
/// Every coded feature contributes a department entry, even when its
/// geometry is missing or unusable.
pub fn load_geometries(path: &Path, fields: &GeometryFields) -> Result<GeometryTable> {
    if has_extension(path, &["shp"]) {
        load_geometries_shapefile(path, fields)
    } else if has_extension(path, &["geojson", "json"]) {
        load_geometries_geojson(path, fields)
    } else if has_extension(path, &["parquet"]) {
        load_geometries_parquet(path, fields)
    } else {
        Err(PipelineError::UnsupportedGeometryFormat(path.to_path_buf()).into())
    }
}

/// Code -> department, first occurrence wins.
pub fn department_lookup(entries: &[(String, Option<String>)]) -> HashMap<String, Option<String>> {
    let mut lookup = HashMap::with_capacity(entries.len());
    for (code, department) in entries {
        lookup
            .entry(code.clone())
            .or_insert_with(|| department.clone());
    }
    lookup
}

/// Left join of department names onto the statistics table.
pub fn attach_departments(
    stats: &DataFrame,
    lookup: &HashMap<String, Option<String>>,
) -> Result<DataFrame> {
    let codes = stats.column(ADMIN_CODE)?.str()?;
    let departments: Vec<Option<String>> = codes
        .into_iter()
        .map(|c| c.and_then(|c| lookup.get(c).cloned().flatten()))
        .collect();

    let mut out = stats.clone();
    out.with_column(Column::new(DEPARTMENT.into(), departments))?;
    Ok(out)
}

fn distinct_sorted(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let values: BTreeSet<String> = df
        .column(column)?
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();
    Ok(values.into_iter().collect())
}

/// Joins departments onto normalized statistics and derives selector options.
pub fn assemble_dataset(stats: DataFrame, table: impl Into<GeometryTable>) -> Result<Dataset> {
    let GeometryTable {
        geometries,
        departments,
    } = table.into();
    let lookup = department_lookup(&departments);
    if lookup.len() < departments.len() {
        info!(
            features = departments.len(),
            distinct_codes = lookup.len(),
            "duplicate administrative codes in geometry; keeping first department"
        );
    }

    let stats = attach_departments(&stats, &lookup)?;
    let with_department = stats.height() - stats.column(DEPARTMENT)?.null_count();
    if stats.height() > 0 && with_department == 0 {
        warn!(
            stats_rows = stats.height(),
            "no statistics row matched a geometry code; departments are empty"
        );
    }

    let bands = distinct_sorted(&stats, BAND_LABEL)?;
    let departments = distinct_sorted(&stats, DEPARTMENT)?;

    Ok(Dataset {
        stats,
        geometries,
        bands,
        departments,
    })
}

fn ensure_exists(path: &Path, kind: InputKind) -> Result<()> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            kind,
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

#[instrument(skip(config), fields(stats = ?config.statistics_path, geometry = ?config.geometry_path))]
pub fn load_dataset(config: &DataConfig) -> Result<Dataset> {
    ensure_exists(&config.statistics_path, InputKind::Statistics)?;
    ensure_exists(&config.geometry_path, InputKind::Geometry)?;

    let start = Instant::now();
    let raw = read_statistics(&config.statistics_path)?;
    let stats = normalize_statistics(&raw, &config.schema.statistics)?;
    let table = load_geometries(&config.geometry_path, &config.schema.geometry)?;
    info!(
        stats_rows = stats.height(),
        geometries = table.geometries.len(),
        coded_features = table.departments.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "loaded inputs"
    );

    assemble_dataset(stats, table)
}

/// Reads a canonical statistics frame back into typed rows.
pub fn district_records(df: &DataFrame) -> Result<Vec<DistrictRecord>> {
    let codes = df.column(ADMIN_CODE)?.str()?;
    let names = df.column(NAME)?.str()?;
    let bands = df.column(BAND_LABEL)?.str()?;
    let departments = df.column(DEPARTMENT)?.str()?;

    let mut metric_values = Vec::with_capacity(MetricColumn::ALL.len());
    for metric in MetricColumn::ALL {
        metric_values.push((metric, float_values(df.column(metric.column())?)?));
    }

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(code), Some(band)) = (codes.get(i), bands.get(i)) else {
            continue;
        };
        let mut metrics = DistrictMetrics::default();
        for (metric, values) in &metric_values {
            metrics.set(*metric, values[i]);
        }
        records.push(DistrictRecord {
            admin_code: code.to_string(),
            name: names.get(i).map(str::to_string),
            band_label: band.to_string(),
            department: departments.get(i).map(str::to_string),
            metrics,
        });
    }
    Ok(records)
}
