use anyhow::{Context, Result};
use std::path::Path;

/// One row of the sensor-template file (spec.md §3, §6).
struct Variable {
    alias: &'static str,
    variablename: &'static str,
    postprocess: &'static str,
    units: &'static str,
    datatype: &'static str,
}

const VARIABLES: [Variable; 4] = [
    Variable {
        alias: "Precipitation",
        variablename: "precipitation",
        postprocess: "none",
        units: "mm",
        datatype: "float",
    },
    Variable {
        alias: "Temperature",
        variablename: "temperature",
        postprocess: "none",
        units: "C",
        datatype: "float",
    },
    Variable {
        alias: "Humidity",
        variablename: "humidity",
        postprocess: "none",
        units: "percent",
        datatype: "float",
    },
    Variable {
        alias: "Flooding",
        variablename: "flooding",
        postprocess: "none",
        units: "binary",
        datatype: "int",
    },
];

/// Materializes the static sensor-template file consumed by the uploader
/// (spec.md §3 "Sensor template file"). Per spec.md §6 the on-disk shape is
/// comma-delimited fields *inside* tab-delimited rows — a quirk of the
/// original tooling this format was distilled from, preserved here for
/// interoperability with the uploader.
pub fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create template dir {}", parent.display()))?;
    }
    let header = "alias,variablename,postprocess,units,datatype";
    let rows: Vec<String> = VARIABLES
        .iter()
        .map(|v| format!("{},{},{},{},{}", v.alias, v.variablename, v.postprocess, v.units, v.datatype))
        .collect();
    let contents = format!("{header}\n{}", rows.join("\t"));
    std::fs::write(path, contents).with_context(|| format!("write template {}", path.display()))?;
    Ok(())
}
