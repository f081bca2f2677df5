use std::fs;

use localqa_core::data_processor::DataProcessor;
use localqa_core::traits::{Embedder, VectorSearch};
use localqa_core::types::DocumentChunk;
use localqa_core::Error;
use localqa_embed::FakeEmbedder;
use localqa_vector::manifest::MANIFEST_FILE;
use localqa_vector::{IndexManifest, IndexWriter, VectorIndex};

const DIM: usize = 64;

fn corpus() -> Vec<DocumentChunk> {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("capital.txt"), "The capital of France is Paris.").unwrap();
    fs::write(tmp.path().join("water.txt"), "Boil water for one minute to make it safe to drink.").unwrap();
    fs::write(tmp.path().join("fire.txt"), "A fire needs fuel, heat and oxygen to keep burning.").unwrap();
    DataProcessor::new().process_directory(tmp.path()).unwrap().chunks
}

async fn build(index_dir: &std::path::Path, chunks: &[DocumentChunk]) -> anyhow::Result<IndexManifest> {
    let embedder = FakeEmbedder::new(DIM);
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embedder.embed_batch(&texts)?;
    let manifest = IndexManifest::new(embedder.id(), DIM, 500, 50, 3);
    IndexWriter::new(index_dir).write(chunks, &embeddings, manifest).await
}

#[tokio::test]
async fn reopened_index_returns_the_same_top_k() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index_dir = tmp.path().join("vectorstore");
    let chunks = corpus();
    let written = build(&index_dir, &chunks).await?;
    assert_eq!(written.chunk_count, 3);

    let q = FakeEmbedder::new(DIM).embed_query("What is the capital of France?")?;
    let first = VectorIndex::open(&index_dir).await?.expect("index present");
    let hits_a = first.search(&q, 2).await?;
    drop(first);
    let second = VectorIndex::open(&index_dir).await?.expect("index present");
    let hits_b = second.search(&q, 2).await?;

    assert_eq!(hits_a.len(), 2);
    assert_eq!(hits_a[0].chunk.doc_id, "capital.txt");
    let ids_a: Vec<&str> = hits_a.iter().map(|h| h.chunk.id.as_str()).collect();
    let ids_b: Vec<&str> = hits_b.iter().map(|h| h.chunk.id.as_str()).collect();
    assert_eq!(ids_a, ids_b);
    assert!(hits_a[0].score >= hits_a[1].score);
    assert_eq!(second.manifest().embedder_id, "fake:d64");
    Ok(())
}

#[tokio::test]
async fn rebuilding_from_the_same_input_is_idempotent() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index_dir = tmp.path().join("vectorstore");
    let chunks = corpus();

    build(&index_dir, &chunks).await?;
    let before = VectorIndex::open(&index_dir).await?.unwrap().chunks().await?;
    build(&index_dir, &chunks).await?;
    let after = VectorIndex::open(&index_dir).await?.unwrap().chunks().await?;

    assert_eq!(before.len(), 3);
    assert_eq!(before, after);
    assert!(!tmp.path().join("vectorstore.staging").exists());
    assert!(!tmp.path().join("vectorstore.old").exists());
    Ok(())
}

#[tokio::test]
async fn rebuild_replaces_previous_contents() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index_dir = tmp.path().join("vectorstore");
    let chunks = corpus();
    build(&index_dir, &chunks).await?;
    build(&index_dir, &chunks[..1]).await?;

    let index = VectorIndex::open(&index_dir).await?.unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index.chunks().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn empty_index_opens_and_returns_nothing() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index_dir = tmp.path().join("vectorstore");
    let written = build(&index_dir, &[]).await?;
    assert_eq!(written.chunk_count, 0);

    let index = VectorIndex::open(&index_dir).await?.expect("empty index still opens");
    assert!(index.is_empty());
    let hits = index.search_vec(&vec![0.1; DIM], 3).await?;
    assert!(hits.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_or_unfinished_index_is_absent() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    assert!(VectorIndex::open(&tmp.path().join("nothing-here")).await?.is_none());

    let partial = tmp.path().join("partial");
    fs::create_dir_all(partial.join("chunks.lance"))?;
    assert!(VectorIndex::open(&partial).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn manifest_without_table_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index_dir = tmp.path().join("vectorstore");
    fs::create_dir_all(&index_dir)?;
    IndexManifest::new("fake:d64", DIM, 500, 50, 0).write(&index_dir)?;
    assert!(index_dir.join(MANIFEST_FILE).exists());
    assert!(VectorIndex::open(&index_dir).await.is_err());
    Ok(())
}

#[tokio::test]
async fn search_handles_k_zero_and_wrong_dim() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index_dir = tmp.path().join("vectorstore");
    build(&index_dir, &corpus()).await?;
    let index = VectorIndex::open(&index_dir).await?.unwrap();

    assert!(index.search(&vec![0.1; DIM], 0).await?.is_empty());
    assert!(index.search(&[0.1; 3], 2).await.is_err());
    let all = index.search(&vec![0.1; DIM], 10).await?;
    assert_eq!(all.len(), 3);
    Ok(())
}

#[tokio::test]
async fn mismatched_embeddings_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let chunks = corpus();
    let manifest = IndexManifest::new("fake:d64", DIM, 500, 50, 3);
    let err = IndexWriter::new(tmp.path().join("vectorstore"))
        .write(&chunks, &[vec![0.0; DIM]], manifest)
        .await
        .expect_err("length mismatch");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Operation(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn unwritable_location_is_an_index_write_error() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    fs::write(&blocker, "plain file").unwrap();
    let index_dir = blocker.join("vectorstore");

    let chunks = corpus();
    let err = build(&index_dir, &chunks).await.expect_err("cannot write under a file");
    match err.downcast_ref::<Error>() {
        Some(Error::IndexWrite { path, .. }) => assert_eq!(path, &index_dir),
        other => panic!("unexpected error: {other:?}"),
    }
}
