use arrow_array::{
	Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use noterag_core::error::{Error, Result};
use noterag_core::types::{DocumentMetadata, VectorDocument};

pub const VECTOR_COLUMN: &str = "vector";

/// Chunk table schema; the vector column is sized per store.
pub fn build_arrow_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("note_id", DataType::Utf8, false),
		Field::new("note_path", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("title", DataType::Utf8, false),
		Field::new("note_type", DataType::Utf8, true),
		// JSON array
		Field::new("tags", DataType::Utf8, false),
		Field::new("created", DataType::Utf8, true),
		Field::new("modified", DataType::Utf8, true),
		Field::new("connection_count", DataType::Int32, false),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
	]))
}

/// Width of the vector column, if the schema has one.
pub fn vector_dimension(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => Some(*n as usize),
		_ => None,
	}
}

pub fn documents_to_record_batch(docs: &[VectorDocument], dim: usize) -> Result<RecordBatch> {
	let schema = build_arrow_schema(dim);
	let mut tags = Vec::with_capacity(docs.len());
	for doc in docs {
		tags.push(serde_json::to_string(&doc.metadata.tags).map_err(Error::store)?);
	}
	let vectors = docs.iter().map(|d| Some(d.embedding.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
	RecordBatch::try_new(schema, vec![
		Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.id.as_str()))),
		Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.note_id.as_str()))),
		Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.note_path.as_str()))),
		Arc::new(Int32Array::from_iter_values(docs.iter().map(|d| d.chunk_index as i32))),
		Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.content.as_str()))),
		Arc::new(StringArray::from_iter_values(docs.iter().map(|d| d.metadata.title.as_str()))),
		Arc::new(StringArray::from(docs.iter().map(|d| d.metadata.note_type.clone()).collect::<Vec<_>>())),
		Arc::new(StringArray::from(tags)),
		Arc::new(StringArray::from(docs.iter().map(|d| d.metadata.created.clone()).collect::<Vec<_>>())),
		Arc::new(StringArray::from(docs.iter().map(|d| d.metadata.modified.clone()).collect::<Vec<_>>())),
		Arc::new(Int32Array::from_iter_values(docs.iter().map(|d| d.metadata.connection_count as i32))),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim as i32)),
	])
	.map_err(Error::store)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::store(format!("column {name} missing or not utf8")))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
		.ok_or_else(|| Error::store(format!("column {name} missing or not int32")))
}

fn optional(col: &StringArray, i: usize) -> Option<String> {
	(!col.is_null(i)).then(|| col.value(i).to_string())
}

/// Rows of a batch as documents, paired with `_distance` when the batch came from a vector search.
pub fn record_batch_to_documents(batch: &RecordBatch) -> Result<Vec<(VectorDocument, Option<f32>)>> {
	let ids = string_column(batch, "id")?;
	let note_ids = string_column(batch, "note_id")?;
	let note_paths = string_column(batch, "note_path")?;
	let chunk_indices = int_column(batch, "chunk_index")?;
	let contents = string_column(batch, "content")?;
	let titles = string_column(batch, "title")?;
	let note_types = string_column(batch, "note_type")?;
	let tags = string_column(batch, "tags")?;
	let created = string_column(batch, "created")?;
	let modified = string_column(batch, "modified")?;
	let connections = int_column(batch, "connection_count")?;
	let vectors = batch
		.column_by_name(VECTOR_COLUMN)
		.and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
		.ok_or_else(|| Error::store("column vector missing or not a fixed size list"))?;
	let distances = batch
		.column_by_name("_distance")
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>());

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let embedding = if vectors.is_null(i) {
			Vec::new()
		} else {
			let row = vectors.value(i);
			row.as_any()
				.downcast_ref::<Float32Array>()
				.map(|a| a.values().to_vec())
				.ok_or_else(|| Error::store("vector items are not float32"))?
		};
		let doc = VectorDocument {
			id: ids.value(i).to_string(),
			note_id: note_ids.value(i).to_string(),
			note_path: note_paths.value(i).to_string(),
			chunk_index: chunk_indices.value(i).max(0) as usize,
			content: contents.value(i).to_string(),
			embedding,
			metadata: DocumentMetadata {
				title: titles.value(i).to_string(),
				note_type: optional(note_types, i),
				tags: serde_json::from_str(tags.value(i)).unwrap_or_default(),
				created: optional(created, i),
				modified: optional(modified, i),
				connection_count: connections.value(i).max(0) as u32,
			},
		};
		out.push((doc, distances.map(|d| d.value(i))));
	}
	Ok(out)
}
