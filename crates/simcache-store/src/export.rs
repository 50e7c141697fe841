use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::{json, Map, Value};
use simcache_core::array::{NamedArrays, NdArray};
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::serde::to_canonical_json_bytes;
use tempfile::NamedTempFile;

use crate::record::RunRecord;

/// Destination formats accepted by `export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Bin,
}

impl ExportFormat {
    pub const SUPPORTED: [&'static str; 3] = ["json", "csv", "bin"];

    /// Parses a format name such as `csv`.
    pub fn parse(name: &str) -> Result<Self, SimError> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "bin" => Ok(Self::Bin),
            other => Err(SimError::UnsupportedFormat(
                ErrorInfo::new("store.export_format", format!("unsupported format `{other}`"))
                    .with_hint(format!("use one of: {}", Self::SUPPORTED.join(", "))),
            )),
        }
    }

    /// Infers the format from the destination file extension.
    pub fn from_path(path: &Path) -> Result<Self, SimError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Self::parse(ext).map_err(|err| match err {
            SimError::UnsupportedFormat(info) => SimError::UnsupportedFormat(
                info.with_context("path", path.display().to_string()),
            ),
            other => other,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Bin => "bin",
        }
    }
}

fn export_error(path: &Path, err: impl ToString) -> SimError {
    SimError::Io(
        ErrorInfo::new("store.export", err.to_string())
            .with_context("path", path.display().to_string()),
    )
}

pub(crate) fn encode_arrays(arrays: &NamedArrays) -> Result<Vec<u8>, SimError> {
    bincode::serialize(arrays)
        .map_err(|err| SimError::Serde(ErrorInfo::new("store.arrays_encode", err.to_string())))
}

/// Decodes an array payload. Every array must fill its shape exactly.
pub(crate) fn decode_arrays(bytes: &[u8]) -> Result<NamedArrays, SimError> {
    let raw: NamedArrays = bincode::deserialize(bytes)
        .map_err(|err| SimError::PartialWrite(ErrorInfo::new("store.arrays_decode", err.to_string())))?;
    raw.into_iter()
        .map(|(name, array)| match NdArray::new(array.shape, array.data) {
            Ok(array) => Ok((name, array)),
            Err(err) => Err(SimError::PartialWrite(
                ErrorInfo::new("store.arrays_decode", err.info().message.clone())
                    .with_context("array", name),
            )),
        })
        .collect()
}

/// Renders the arrays of `record` and writes them to `dest` atomically: the
/// destination either does not change or holds the complete export.
pub(crate) fn write_export(
    record: &RunRecord,
    format: ExportFormat,
    dest: &Path,
) -> Result<(), SimError> {
    let bytes = match format {
        ExportFormat::Json => json_bytes(record)?,
        ExportFormat::Csv => csv_bytes(&record.arrays)?,
        ExportFormat::Bin => encode_arrays(&record.arrays)?,
    };
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&dir).map_err(|err| export_error(&dir, err))?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|err| export_error(&dir, err))?;
    tmp.write_all(&bytes).map_err(|err| export_error(dest, err))?;
    tmp.as_file()
        .sync_all()
        .map_err(|err| export_error(dest, err))?;
    tmp.persist(dest).map_err(|err| export_error(dest, err.error))?;
    Ok(())
}

fn json_bytes(record: &RunRecord) -> Result<Vec<u8>, SimError> {
    let arrays: Map<String, Value> = record
        .arrays
        .iter()
        .map(|(name, array)| (name.clone(), array.to_json()))
        .collect();
    let doc = json!({
        "fingerprint": record.fingerprint.as_str(),
        "arrays": arrays,
    });
    to_canonical_json_bytes(&doc)
}

/// Long format: one row per element with a dotted multi-index.
fn csv_bytes(arrays: &NamedArrays) -> Result<Vec<u8>, SimError> {
    let csv_err = |err: csv::Error| SimError::Serde(ErrorInfo::new("store.export_csv", err.to_string()));
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["array", "index", "value"]).map_err(csv_err)?;
    for (name, array) in arrays {
        for (flat, value) in array.data.iter().enumerate() {
            wtr.write_record([name.clone(), multi_index(array, flat), value.to_string()])
                .map_err(csv_err)?;
        }
    }
    wtr.into_inner()
        .map_err(|err| SimError::Serde(ErrorInfo::new("store.export_csv", err.to_string())))
}

fn multi_index(array: &NdArray, flat: usize) -> String {
    if array.shape.is_empty() {
        return String::new();
    }
    let mut remaining = flat;
    let mut parts = vec![0usize; array.shape.len()];
    for (axis, extent) in array.shape.iter().enumerate().rev() {
        if *extent > 0 {
            parts[axis] = remaining % extent;
            remaining /= extent;
        }
    }
    parts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a/out.CSV")).unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out.json")).unwrap(), ExportFormat::Json);
        let err = ExportFormat::from_path(Path::new("out.dat")).unwrap_err();
        assert!(matches!(err, SimError::UnsupportedFormat(_)));
        assert!(ExportFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn multi_index_is_row_major() {
        let array = NdArray::new(vec![2, 3], (0..6).map(f64::from).collect()).unwrap();
        assert_eq!(multi_index(&array, 0), "0.0");
        assert_eq!(multi_index(&array, 4), "1.1");
        assert_eq!(multi_index(&NdArray::scalar(1.0), 0), "");
    }

    #[test]
    fn csv_has_header_and_one_row_per_element() {
        let mut arrays = NamedArrays::new();
        arrays.insert("x".into(), NdArray::from_vec(vec![1.5, 2.0]));
        let text = String::from_utf8(csv_bytes(&arrays).unwrap()).unwrap();
        assert_eq!(text, "array,index,value\nx,0,1.5\nx,1,2\n");
    }
}
