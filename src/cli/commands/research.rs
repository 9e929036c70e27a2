//! Research command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::report::ReportGenerator;
use crate::research::ResearchController;
use anyhow::Result;
use uuid::Uuid;

/// Run the research command.
pub async fn run_research(
    topic: &str,
    max_iterations: Option<u32>,
    output: Option<String>,
    settings: Settings,
) -> Result<()> {
    let controller = ResearchController::from_settings(&settings)?;

    let session_key = format!("research-{}", Uuid::new_v4());
    let session = controller.start_session_with_limit(&session_key, topic, max_iterations)?;

    Output::info(&format!("Researching: {}", topic));
    let spinner = Output::spinner("Searching and indexing videos...");

    let outcome = controller.run(session.clone()).await;
    spinner.finish_and_clear();

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            controller.cleanup_session(&session_key);
            Output::error(&format!("Research failed: {}", e));
            return Err(anyhow::anyhow!("{}", e));
        }
    };

    Output::success(&format!(
        "Researched {} videos across {} passes ({} chunks indexed)",
        summary.videos_processed, summary.iterations, summary.chunks_indexed
    ));

    if summary.chunks_indexed == 0 {
        Output::warning("No transcripts could be indexed; the report will be sparse.");
    }

    let spinner = Output::spinner("Generating report...");
    let generator = ReportGenerator::new(controller.retriever(), settings.retrieval.clone());
    let report = generator.generate(&session).await;
    spinner.finish_and_clear();

    controller.cleanup_session(&session_key);

    let report = report?;
    match output {
        Some(path) => {
            std::fs::write(&path, &report)?;
            Output::success(&format!("Report written to {}", path));
        }
        None => println!("{}", report),
    }

    Ok(())
}
