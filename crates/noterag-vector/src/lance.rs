//! LanceDB-backed [`VectorStore`].
//!
//! One table (`chunks`) under the store directory. The vector column width is
//! fixed by the first batch written; a model with a different dimension needs
//! a `clear()` first, which removes and recreates the directory.

use std::path::{Path, PathBuf};

use arrow_array::{RecordBatch, RecordBatchIterator};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use tokio::sync::RwLock;
use tracing::{debug, info};

use noterag_core::error::{Error, Result};
use noterag_core::traits::VectorStore;
use noterag_core::types::{VectorDocument, VectorHit};

use crate::schema::{documents_to_record_batch, record_batch_to_documents, vector_dimension};

pub const DEFAULT_TABLE: &str = "chunks";
const DELETE_CHUNK: usize = 256;

pub struct LanceVectorStore {
	dir: PathBuf,
	table_name: String,
	conn: RwLock<Option<Connection>>,
}

fn quote(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

impl LanceVectorStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into(), table_name: DEFAULT_TABLE.to_string(), conn: RwLock::new(None) }
	}

	pub fn with_table_name(mut self, name: &str) -> Self {
		self.table_name = name.to_string();
		self
	}

	pub fn dir(&self) -> &Path { &self.dir }

	async fn open(&self) -> Result<Connection> {
		tokio::fs::create_dir_all(&self.dir).await?;
		let uri = self.dir.to_string_lossy().to_string();
		connect(&uri).execute().await.map_err(Error::store)
	}

	async fn connection(&self) -> Result<Connection> {
		if let Some(conn) = self.conn.read().await.as_ref() {
			return Ok(conn.clone());
		}
		let mut guard = self.conn.write().await;
		if let Some(conn) = guard.as_ref() {
			return Ok(conn.clone());
		}
		let conn = self.open().await?;
		*guard = Some(conn.clone());
		Ok(conn)
	}

	async fn table(&self) -> Result<Option<Table>> {
		let conn = self.connection().await?;
		let names = conn.table_names().execute().await.map_err(Error::store)?;
		if !names.contains(&self.table_name) {
			return Ok(None);
		}
		let table = conn.open_table(&self.table_name).execute().await.map_err(Error::store)?;
		Ok(Some(table))
	}

	async fn table_dimension(table: &Table) -> Result<Option<usize>> {
		let schema = table.schema().await.map_err(Error::store)?;
		Ok(vector_dimension(&schema))
	}
}

async fn collect_rows<S, E>(mut stream: S) -> Result<Vec<(VectorDocument, Option<f32>)>>
where
	S: futures::Stream<Item = std::result::Result<RecordBatch, E>> + Unpin,
	E: std::fmt::Display,
{
	let mut rows = Vec::new();
	while let Some(batch) = stream.try_next().await.map_err(Error::store)? {
		rows.extend(record_batch_to_documents(&batch)?);
	}
	Ok(rows)
}

#[async_trait]
impl VectorStore for LanceVectorStore {
	async fn initialize(&self) -> Result<()> {
		self.connection().await?;
		debug!(dir = %self.dir.display(), table = %self.table_name, "lance store ready");
		Ok(())
	}

	async fn add(&self, documents: &[VectorDocument]) -> Result<()> {
		let Some(first) = documents.first() else { return Ok(()) };
		let dim = first.dimension();
		if let Some(bad) = documents.iter().find(|d| d.dimension() != dim) {
			return Err(Error::DimensionMismatch { expected: dim, actual: bad.dimension() });
		}
		let batch = documents_to_record_batch(documents, dim)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));

		match self.table().await? {
			Some(table) => {
				if let Some(existing) = Self::table_dimension(&table).await? {
					if existing != dim {
						return Err(Error::DimensionMismatch { expected: existing, actual: dim });
					}
				}
				table.add(reader).execute().await.map_err(Error::store)?;
			}
			None => {
				let conn = self.connection().await?;
				conn.create_table(&self.table_name, reader).execute().await.map_err(Error::store)?;
				info!(table = %self.table_name, dimension = dim, "created lance table");
			}
		}
		Ok(())
	}

	async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
		let Some(table) = self.table().await? else { return Ok(Vec::new()) };
		if let Some(dim) = Self::table_dimension(&table).await? {
			if dim != query.len() {
				return Err(Error::DimensionMismatch { expected: dim, actual: query.len() });
			}
		}
		let stream = table
			.vector_search(query.to_vec())
			.map_err(Error::store)?
			.distance_type(DistanceType::Cosine)
			.limit(top_k)
			.execute()
			.await
			.map_err(Error::store)?;
		let rows = collect_rows(stream).await?;
		let mut hits: Vec<VectorHit> = rows
			.into_iter()
			.map(|(document, distance)| VectorHit { document, distance: distance.unwrap_or(1.0) })
			.collect();
		hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
		Ok(hits)
	}

	async fn delete(&self, ids: &[String]) -> Result<()> {
		if ids.is_empty() {
			return Ok(());
		}
		let Some(table) = self.table().await? else { return Ok(()) };
		for group in ids.chunks(DELETE_CHUNK) {
			let list: Vec<String> = group.iter().map(|id| quote(id)).collect();
			table.delete(&format!("id IN ({})", list.join(", "))).await.map_err(Error::store)?;
		}
		Ok(())
	}

	async fn delete_by_note_path(&self, note_path: &str) -> Result<()> {
		let Some(table) = self.table().await? else { return Ok(()) };
		table.delete(&format!("note_path = {}", quote(note_path))).await.map_err(Error::store)?;
		Ok(())
	}

	async fn clear(&self) -> Result<()> {
		let mut guard = self.conn.write().await;
		*guard = None;
		if tokio::fs::try_exists(&self.dir).await? {
			tokio::fs::remove_dir_all(&self.dir).await?;
		}
		*guard = Some(self.open().await?);
		info!(dir = %self.dir.display(), "cleared lance store");
		Ok(())
	}

	async fn count(&self) -> Result<usize> {
		match self.table().await? {
			Some(table) => table.count_rows(None).await.map_err(Error::store),
			None => Ok(0),
		}
	}

	async fn get_all_documents(&self) -> Result<Vec<VectorDocument>> {
		let Some(table) = self.table().await? else { return Ok(Vec::new()) };
		let stream = table.query().execute().await.map_err(Error::store)?;
		let rows = collect_rows(stream).await?;
		Ok(rows.into_iter().map(|(doc, _)| doc).collect())
	}

	async fn dimension(&self) -> Result<Option<usize>> {
		let Some(table) = self.table().await? else { return Ok(None) };
		if table.count_rows(None).await.map_err(Error::store)? == 0 {
			return Ok(None);
		}
		Self::table_dimension(&table).await
	}
}
