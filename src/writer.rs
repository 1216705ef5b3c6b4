use crate::structures::{MapFeature, MapVariable, MetricColumn};
use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BinaryArray, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo::Rect;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use geozero::{CoordDimensions, ToWkb};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Serializes a table as UTF-8 CSV with a header row and no index column.
pub fn df_to_csv_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut frame = df.clone();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .finish(&mut frame)
        .context("Failed to serialize table as CSV")?;
    Ok(buf)
}

pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let bytes = df_to_csv_bytes(df)?;
    let mut file =
        File::create(path).with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Writes map features as Parquet: code, department, metrics and WKB geometry.
pub struct MapWriter {
    writer: ArrowWriter<File>,
    batch_buffer: Vec<MapFeature>,
    batch_size: usize,
    schema: Arc<Schema>,
}

impl MapWriter {
    pub fn new(path: &Path, batch_size: usize) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {:?}", path))?;

        let mut fields = vec![
            Field::new("admin_code", DataType::Utf8, false),
            Field::new("department", DataType::Utf8, true),
        ];
        for metric in MetricColumn::ALL {
            fields.push(Field::new(metric.column(), DataType::Float64, true));
        }
        fields.push(Field::new("geom", DataType::Binary, false));
        let schema = Arc::new(Schema::new(fields));

        let props = WriterProperties::builder().build();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .context("Failed to create ArrowWriter")?;

        Ok(Self {
            writer,
            batch_buffer: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
            schema,
        })
    }

    pub fn write(&mut self, feature: MapFeature) -> Result<()> {
        self.batch_buffer.push(feature);
        if self.batch_buffer.len() >= self.batch_size {
            self.flush_buffer()?;
        }
        Ok(())
    }

    pub fn flush_buffer(&mut self) -> Result<()> {
        if self.batch_buffer.is_empty() {
            return Ok(());
        }

        let len = self.batch_buffer.len();
        let mut codes = Vec::with_capacity(len);
        let mut departments = Vec::with_capacity(len);
        let mut wkbs = Vec::with_capacity(len);
        for f in &self.batch_buffer {
            codes.push(f.admin_code.clone());
            departments.push(f.department.clone());
            let wkb = f
                .geom
                .to_geometry()
                .to_wkb(CoordDimensions::xy())
                .with_context(|| format!("Failed to encode WKB for district {}", f.admin_code))?;
            wkbs.push(wkb);
        }

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(codes)),
            Arc::new(StringArray::from(departments)),
        ];
        for metric in MetricColumn::ALL {
            let values: Vec<Option<f64>> = self
                .batch_buffer
                .iter()
                .map(|f| f.metrics.get(metric))
                .collect();
            columns.push(Arc::new(Float64Array::from(values)));
        }
        columns.push(Arc::new(BinaryArray::from_iter_values(wkbs.iter())));

        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        self.writer.write(&batch)?;
        self.batch_buffer.clear();

        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.flush_buffer()?;
        self.writer.close()?;
        Ok(())
    }
}

fn merge_rect(acc: Option<Rect<f64>>, next: Rect<f64>) -> Rect<f64> {
    match acc {
        None => next,
        Some(r) => Rect::new(
            (r.min().x.min(next.min().x), r.min().y.min(next.min().y)),
            (r.max().x.max(next.max().x), r.max().y.max(next.max().y)),
        ),
    }
}

fn number(value: Option<f64>) -> JsonValue {
    value
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Choropleth layer: one feature per matched district, `value` holds the shaded variable.
pub fn map_feature_collection(features: &[MapFeature], variable: MapVariable) -> FeatureCollection {
    let mut bbox: Option<Rect<f64>> = None;
    let mut out = Vec::with_capacity(features.len());

    for f in features {
        if let Some(r) = f.geom.bounding_rect() {
            bbox = Some(merge_rect(bbox, r));
        }

        let mut properties = JsonObject::new();
        properties.insert("admin_code".to_string(), JsonValue::from(f.admin_code.clone()));
        properties.insert(
            "department".to_string(),
            f.department
                .clone()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
        );
        for metric in MetricColumn::ALL {
            properties.insert(metric.column().to_string(), number(f.metrics.get(metric)));
        }
        properties.insert("value".to_string(), number(f.metrics.get(variable.metric())));

        out.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &f.geom.to_geometry(),
            ))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    FeatureCollection {
        bbox: bbox.map(|r| vec![r.min().x, r.min().y, r.max().x, r.max().y]),
        features: out,
        foreign_members: None,
    }
}

pub fn write_map_geojson(features: &[MapFeature], variable: MapVariable, path: &Path) -> Result<()> {
    let collection = map_feature_collection(features, variable);
    std::fs::write(path, GeoJson::from(collection).to_string())
        .with_context(|| format!("Failed to write GeoJSON map: {:?}", path))?;
    Ok(())
}

pub fn write_map_parquet(features: &[MapFeature], path: &Path) -> Result<()> {
    let mut writer = MapWriter::new(path, 10000)?;
    for f in features {
        writer.write(f.clone())?;
    }
    writer.close()
}
