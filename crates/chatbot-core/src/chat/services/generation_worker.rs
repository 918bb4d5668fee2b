use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::inference::{EngineHandle, GenerationConfig, GenerationOutcome, StreamControl};
use crate::chat::models::{DispatchSender, FinishedGeneration, GenerationId, ResponseSink};
use crate::chat::views::MessageHandle;

/// Everything one generation needs, moved onto its blocking thread.
pub struct GenerationJob {
    pub generation_id: GenerationId,
    pub session_id: String,
    pub prompt: String,
    pub target: MessageHandle,
    pub sink: ResponseSink,
    pub engine: EngineHandle,
    pub config: GenerationConfig,
    pub dispatch: DispatchSender,
    pub shutdown: Arc<AtomicBool>,
}

/// Run the job on the blocking pool.
///
/// Streams a render task per token and always ends with exactly one finalize
/// task, whatever the engine does.
pub fn spawn(job: GenerationJob) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || run(job))
}

fn run(job: GenerationJob) {
    let GenerationJob {
        generation_id,
        session_id,
        prompt,
        target,
        sink,
        engine,
        config,
        dispatch,
        shutdown,
    } = job;

    debug!(generation_id = generation_id.0, session_id = %session_id, "Generation started");
    sink.reset();

    let mut interrupted = false;
    let result = engine.with_pipeline(|pipeline| {
        let mut on_token = |token: &str| {
            if shutdown.load(Ordering::SeqCst) {
                interrupted = true;
                return StreamControl::Stop;
            }
            sink.append(token);
            dispatch.render(target, sink.snapshot());
            StreamControl::Continue
        };
        pipeline.generate(&prompt, &config, &mut on_token)
    });

    let outcome = match result {
        None => {
            info!(generation_id = generation_id.0, "Inference engine unavailable, completing with empty response");
            GenerationOutcome::EngineUnavailable
        }
        Some(Err(e)) => {
            warn!(error = %e, generation_id = generation_id.0, "Generation failed, keeping partial response");
            GenerationOutcome::Failed(e.to_string())
        }
        Some(Ok(())) if interrupted => GenerationOutcome::Interrupted,
        Some(Ok(())) => GenerationOutcome::Completed,
    };

    let text = sink.snapshot();
    debug!(
        generation_id = generation_id.0,
        chars = text.len(),
        outcome = ?outcome,
        "Generation finished"
    );

    dispatch.finalize(FinishedGeneration {
        generation_id,
        session_id,
        target,
        text,
        outcome,
    });
}
