use clap::Parser;
use localqa_cli::{init_tracing, print_ingest_report, IngestArgs};
use localqa_embed::{load_embedder, select_device};
use localqa_rag::ingest_directory;
use localqa_vector::IndexWriter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = IngestArgs::parse();
    let settings = args.settings()?;
    let documents_dir = settings.data.documents_dir();
    let index_dir = settings.data.index_dir();

    println!("📚 localqa-ingest\n================");
    println!("Documents: {}", documents_dir.display());
    println!("Index: {}", index_dir.display());
    println!("Chunks: {} chars, {} overlap", settings.ingest.chunk_size, settings.ingest.chunk_overlap);

    let device = select_device(settings.device)?;
    let embedder = load_embedder(&settings.embed, &device)?;
    let writer = IndexWriter::new(&index_dir);
    let report = ingest_directory(&documents_dir, &settings.ingest, embedder.as_ref(), &writer).await?;

    print_ingest_report(&report);
    if report.chunks == 0 {
        println!("ℹ️  No documents found in {}; the index is empty.", documents_dir.display());
        println!("💡 Put .txt files there and run localqa-ingest again.");
    } else {
        println!("\n💡 To ask questions, use: localqa-query '<question>'");
    }
    Ok(())
}
