use noterag_core::traits::VectorStore;
use noterag_core::types::{document_id, note_id_for, DocumentMetadata, VectorDocument};
use noterag_vector::{LanceVectorStore, MemoryVectorStore};

fn doc(note_path: &str, chunk_index: usize, embedding: Vec<f32>) -> VectorDocument {
    let note_id = note_id_for(note_path);
    VectorDocument {
        id: document_id(&note_id, chunk_index),
        note_id,
        note_path: note_path.to_string(),
        chunk_index,
        content: format!("{note_path} chunk {chunk_index}"),
        embedding,
        metadata: DocumentMetadata {
            title: note_path.trim_end_matches(".md").to_string(),
            note_type: Some("note".to_string()),
            tags: vec!["garden".to_string(), "it's".to_string()],
            created: None,
            modified: Some("2024-05-01".to_string()),
            connection_count: 2,
        },
    }
}

async fn exercise_contract(store: &dyn VectorStore) -> anyhow::Result<()> {
    store.initialize().await?;
    assert_eq!(store.count().await?, 0);
    assert_eq!(store.dimension().await?, None);
    assert!(store.search(&[1.0, 0.0, 0.0], 3).await?.is_empty());

    store
        .add(&[
            doc("a.md", 0, vec![1.0, 0.0, 0.0]),
            doc("a.md", 1, vec![0.7, 0.7, 0.0]),
            doc("o'brien.md", 0, vec![0.0, 1.0, 0.0]),
        ])
        .await?;
    store.add(&[doc("c.md", 0, vec![0.0, 0.0, 1.0])]).await?;
    assert_eq!(store.count().await?, 4);
    assert_eq!(store.dimension().await?, Some(3));

    let hits = store.search(&[1.0, 0.1, 0.0], 2).await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document.id, document_id(&note_id_for("a.md"), 0));
    assert!(hits[0].distance <= hits[1].distance);
    assert_eq!(hits[0].document.metadata.tags, vec!["garden", "it's"]);
    assert_eq!(hits[0].document.metadata.connection_count, 2);

    let mixed = store.add(&[doc("d.md", 0, vec![1.0, 0.0])]).await;
    assert!(mixed.unwrap_err().is_dimension_mismatch());
    assert!(store.search(&[1.0, 0.0], 1).await.unwrap_err().is_dimension_mismatch());

    store.delete_by_note_path("o'brien.md").await?;
    assert_eq!(store.count().await?, 3);
    store.delete(&[document_id(&note_id_for("a.md"), 1)]).await?;
    let mut remaining: Vec<String> = store.get_all_documents().await?.into_iter().map(|d| d.id).collect();
    remaining.sort();
    let mut expected = vec![document_id(&note_id_for("a.md"), 0), document_id(&note_id_for("c.md"), 0)];
    expected.sort();
    assert_eq!(remaining, expected);

    store.clear().await?;
    assert_eq!(store.count().await?, 0);
    assert_eq!(store.dimension().await?, None);

    // a different dimension is accepted once the store is empty again
    store.add(&[doc("a.md", 0, vec![0.5, 0.5])]).await?;
    assert_eq!(store.dimension().await?, Some(2));
    Ok(())
}

#[tokio::test]
async fn memory_store_honors_contract() -> anyhow::Result<()> {
    exercise_contract(&MemoryVectorStore::new()).await
}

#[tokio::test]
async fn lance_store_honors_contract() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = LanceVectorStore::new(tmp.path().join(".noterag").join("vectors"));
    exercise_contract(&store).await
}

#[tokio::test]
async fn lance_store_persists_across_reopen() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("vectors");
    {
        let store = LanceVectorStore::new(&dir);
        store.initialize().await?;
        store.add(&[doc("a.md", 0, vec![1.0, 0.0]), doc("b.md", 0, vec![0.0, 1.0])]).await?;
    }
    let reopened = LanceVectorStore::new(&dir);
    reopened.initialize().await?;
    assert_eq!(reopened.count().await?, 2);
    let docs = reopened.get_all_documents().await?;
    let a = docs.iter().find(|d| d.note_path == "a.md").unwrap();
    assert_eq!(a.embedding, vec![1.0, 0.0]);
    assert_eq!(a.metadata.modified.as_deref(), Some("2024-05-01"));
    assert_eq!(a.metadata.created, None);
    Ok(())
}
