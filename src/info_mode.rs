use crate::cli::InfoArgs;
use crate::loader::load_dataset;
use crate::structures::{Dataset, ADMIN_CODE, ALL_DEPARTMENTS};
use anyhow::Result;
use colored::Colorize;
use std::collections::HashSet;
use tracing::info;

pub fn distinct_districts(dataset: &Dataset) -> Result<usize> {
    let codes: HashSet<&str> = dataset
        .stats
        .column(ADMIN_CODE)?
        .str()?
        .into_iter()
        .flatten()
        .collect();
    Ok(codes.len())
}

pub fn run_info(args: InfoArgs) -> Result<()> {
    let config = args.data.to_config()?;
    let dataset = load_dataset(&config)?;
    let districts = distinct_districts(&dataset)?;

    info!(
        districts,
        bands = dataset.bands.len(),
        departments = dataset.departments.len(),
        geometries = dataset.geometries.len(),
        "dataset summary"
    );

    println!("{} {}", "Districts:".bold(), districts);
    println!("{} {}", "Bands:".bold(), dataset.bands.len());
    for band in &dataset.bands {
        println!("  {}", band.cyan());
    }
    println!("{}", "Departments:".bold());
    println!("  {}", ALL_DEPARTMENTS.yellow());
    for dep in &dataset.departments {
        println!("  {}", dep);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::assemble_dataset;
    use crate::structures::GeometryTable;

    #[test]
    fn counts_each_district_once() {
        let stats = polars::df!(
            "admin_code" => ["010101", "010101", "010102"],
            "name" => ["A", "A", "B"],
            "band_label" => ["1991-2020", "2024", "2024"],
            "mean" => [1.0, 2.0, 3.0],
            "p10" => [0.0; 3],
            "p90" => [5.0; 3],
            "std" => [1.0; 3],
            "min" => [-1.0; 3],
            "max" => [6.0; 3],
            "frost_share" => [0.0; 3]
        )
        .unwrap();
        let dataset = assemble_dataset(stats, GeometryTable::default()).unwrap();
        assert_eq!(distinct_districts(&dataset).unwrap(), 2);
        assert!(dataset.departments.is_empty());
    }
}
