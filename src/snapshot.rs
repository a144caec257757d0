//! Parquet snapshot of the prepared, embedded dataset.
//!
//! The snapshot lets repeated ingestion runs skip CSV parsing,
//! normalization, and embedding. Columns:
//!
//! | Column | Arrow type |
//! |--------|------------|
//! | `i` | `UInt64` |
//! | `q`, `a`, `c` | `Utf8` |
//! | `q_`, `a_`, `c_` | `FixedSizeList<Float32, dims>` |

use anyhow::{bail, Context, Result};
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::path::Path;
use std::sync::Arc;

use crate::models::{EmbeddedRecord, Record};

/// Prepared dataset with one embedding per text field.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub dims: usize,
    pub records: Vec<EmbeddedRecord>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn vector_field(name: &str, dims: usize) -> Field {
    Field::new(
        name,
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dims as i32),
        false,
    )
}

fn build_schema(dims: usize) -> Schema {
    Schema::new(vec![
        Field::new("i", DataType::UInt64, false),
        Field::new("q", DataType::Utf8, false),
        vector_field("q_", dims),
        Field::new("c", DataType::Utf8, false),
        vector_field("c_", dims),
        Field::new("a", DataType::Utf8, false),
        vector_field("a_", dims),
    ])
}

fn vector_column<'a>(
    vectors: impl Iterator<Item = &'a Vec<f32>>,
    dims: usize,
    column: &str,
) -> Result<ArrayRef> {
    let mut flat: Vec<f32> = Vec::new();
    for (row, v) in vectors.enumerate() {
        if v.len() != dims {
            bail!(
                "row {} column {}: expected {} dims, got {}",
                row,
                column,
                dims,
                v.len()
            );
        }
        flat.extend_from_slice(v);
    }
    let item = Arc::new(Field::new("item", DataType::Float32, true));
    let list = FixedSizeListArray::try_new(item, dims as i32, Arc::new(Float32Array::from(flat)), None)?;
    Ok(Arc::new(list))
}

/// Write the snapshot to `path`, replacing any existing file.
///
/// The file is written next to its final location and renamed into place,
/// so a crashed run never leaves a truncated snapshot behind.
pub fn save(snapshot: &Snapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let dims = snapshot.dims;
    let recs = &snapshot.records;
    let schema = Arc::new(build_schema(dims));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(recs.iter().map(|r| r.record.id).collect::<Vec<_>>())),
        Arc::new(StringArray::from_iter_values(recs.iter().map(|r| r.record.question.as_str()))),
        vector_column(recs.iter().map(|r| &r.question_vec), dims, "q_")?,
        Arc::new(StringArray::from_iter_values(recs.iter().map(|r| r.record.context.as_str()))),
        vector_column(recs.iter().map(|r| &r.context_vec), dims, "c_")?,
        Arc::new(StringArray::from_iter_values(recs.iter().map(|r| r.record.answer.as_str()))),
        vector_column(recs.iter().map(|r| &r.answer_vec), dims, "a_")?,
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let tmp = path.with_extension("parquet.tmp");
    let file = std::fs::File::create(&tmp)
        .with_context(|| format!("Failed to create snapshot: {}", tmp.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move snapshot into place: {}", path.display()))?;
    Ok(())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("snapshot column '{}' missing or not Utf8", name))
}

fn list_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a FixedSizeListArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow::anyhow!("snapshot column '{}' missing or not a vector", name))
}

fn list_value(list: &FixedSizeListArray, row: usize) -> Result<Vec<f32>> {
    let value = list.value(row);
    let floats = value
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| anyhow::anyhow!("snapshot vector values are not Float32"))?;
    Ok(floats.values().to_vec())
}

/// Read a snapshot previously written by [`save`].
pub fn load(path: &Path) -> Result<Snapshot> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open snapshot: {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;

    let dims = match builder.schema().field_with_name("q_")?.data_type() {
        DataType::FixedSizeList(_, n) => *n as usize,
        other => bail!("snapshot column 'q_' has unexpected type {:?}", other),
    };

    let mut records = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        let ids = batch
            .column_by_name("i")
            .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
            .ok_or_else(|| anyhow::anyhow!("snapshot column 'i' missing or not UInt64"))?;
        let q = string_column(&batch, "q")?;
        let a = string_column(&batch, "a")?;
        let c = string_column(&batch, "c")?;
        let q_ = list_column(&batch, "q_")?;
        let a_ = list_column(&batch, "a_")?;
        let c_ = list_column(&batch, "c_")?;

        for row in 0..batch.num_rows() {
            records.push(EmbeddedRecord {
                record: Record {
                    id: ids.value(row),
                    question: q.value(row).to_string(),
                    answer: a.value(row).to_string(),
                    context: c.value(row).to_string(),
                },
                question_vec: list_value(q_, row)?,
                answer_vec: list_value(a_, row)?,
                context_vec: list_value(c_, row)?,
            });
        }
    }

    Ok(Snapshot { dims, records })
}
