use clap::Parser;
use tracing::error;

use localqa_cli::{init_tracing, is_exit_command, is_recoverable_question_error, print_answer, read_question, QueryArgs};
use localqa_embed::{load_embedder, select_device};
use localqa_llm::QuantizedLlama;
use localqa_rag::{open_context, ContextState, QueryPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = QueryArgs::parse();
    let settings = args.settings()?;
    let index_dir = settings.data.index_dir();

    let device = select_device(settings.device)?;
    let llm = QuantizedLlama::load(&settings.llm, &device)?;
    let context = open_context(&index_dir, || load_embedder(&settings.embed, &device)).await?;
    match &context {
        ContextState::Ready(_) => println!("🔍 RAG mode: answering from {}", index_dir.display()),
        ContextState::Unavailable(reason) => println!("💬 LLM-only mode: {}", reason),
    }

    let mut pipeline = QueryPipeline::new(
        Box::new(llm),
        context,
        settings.retrieval.top_k,
        settings.llm.generation_params(),
        settings.prompt.clone(),
    );

    if let Some(question) = args.question() {
        let answer = pipeline.answer(question).await?;
        print_answer(&answer);
        return Ok(());
    }

    println!("Ready. Ask a question, or type 'exit' to quit.");
    while let Some(line) = read_question()? {
        let question = line.trim();
        if question.is_empty() { continue; }
        if is_exit_command(question) { break; }
        match pipeline.answer(question).await {
            Ok(answer) => print_answer(&answer),
            Err(e) if is_recoverable_question_error(&e) => error!("{:#}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
