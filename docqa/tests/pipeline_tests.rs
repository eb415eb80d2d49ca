//! End-to-end tests for `RagPipeline::answer`.

mod common;

use std::sync::Arc;

use common::{HashEmbedder, RecordingLanguageModel, Reply, corpus};
use docqa::{
    ConversationHistory, InMemoryVectorStore, PromptTemplate, RagConfig, RagError, RagPipeline,
};

fn pipeline_with(model: Arc<RecordingLanguageModel>, config: RagConfig) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(HashEmbedder::new()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .language_model(model)
        .build()
        .unwrap()
}

#[tokio::test]
async fn answers_capital_of_france_with_its_source() {
    let dir = corpus(&[
        ("geography/france.txt", "The capital of France is Paris."),
        ("cooking.txt", "Bake bread at a high temperature with steam."),
    ]);
    let model = Arc::new(RecordingLanguageModel::new(Reply::Echo));
    let pipeline = pipeline_with(model.clone(), RagConfig::default());
    pipeline.reindex(dir.path()).await.unwrap();

    let answer = pipeline
        .answer("What is the capital of France?", &ConversationHistory::new())
        .await
        .unwrap();

    assert!(answer.sources.contains(&"geography/france.txt:0:0".to_string()));
    assert_eq!(answer.sources[0], "geography/france.txt:0:0");
    assert!(answer.text.contains("Paris"));
    assert!(!answer.text.starts_with("Response:"));
    assert!(!answer.text.contains("Sources:"));
}

#[tokio::test]
async fn only_recent_history_reaches_the_prompt() {
    let dir = corpus(&[("notes.txt", "Ferris is the Rust mascot.")]);
    let model = Arc::new(RecordingLanguageModel::new(Reply::Fixed("ok".to_string())));
    let pipeline = pipeline_with(model.clone(), RagConfig::default());
    pipeline.reindex(dir.path()).await.unwrap();

    let mut history = ConversationHistory::new();
    history.push_user("first question");
    history.push_assistant("first reply");
    history.push_user("second question");
    history.push_assistant("second reply");
    history.push_user("third question");
    let snapshot = history.clone();

    pipeline.answer("Who is Ferris?", &history).await.unwrap();

    let prompt = model.last_prompt();
    assert!(
        prompt.contains("User: second question\nAssistant: second reply\nUser: third question\n")
    );
    assert!(!prompt.contains("first question"));
    assert!(!prompt.contains("first reply"));
    assert_eq!(history, snapshot);
}

#[tokio::test]
async fn empty_store_still_invokes_the_model() {
    let model = Arc::new(RecordingLanguageModel::new(Reply::Fixed("I don't know.".to_string())));
    let pipeline = pipeline_with(model.clone(), RagConfig::default());

    let answer = pipeline.answer("Anything?", &ConversationHistory::new()).await.unwrap();

    assert!(answer.sources.is_empty());
    assert_eq!(answer.text, "I don't know.");
    assert_eq!(model.prompts().len(), 1);
    assert!(model.last_prompt().contains("Current context:\n\n"));
}

#[tokio::test]
async fn model_failure_surfaces_as_error() {
    let dir = corpus(&[("a.txt", "Alpha.")]);
    let model = Arc::new(RecordingLanguageModel::new(Reply::Fail));
    let pipeline = pipeline_with(model.clone(), RagConfig::default());
    pipeline.reindex(dir.path()).await.unwrap();

    let err = pipeline.answer("Alpha?", &ConversationHistory::new()).await.unwrap_err();
    assert!(matches!(&err, RagError::PipelineError { operation, .. } if operation == "generation"));
    assert!(matches!(err.root_cause(), RagError::GenerationError { .. }));
    assert_eq!(model.prompts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_model_times_out() {
    let model = Arc::new(RecordingLanguageModel::new(Reply::Hang));
    let config = RagConfig::builder().generation_timeout_secs(5).build().unwrap();
    let pipeline = pipeline_with(model, config);

    let err = pipeline.answer("Hello?", &ConversationHistory::new()).await.unwrap_err();
    assert!(matches!(err.root_cause(), RagError::GenerationError { .. }));
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn empty_question_is_rejected_before_generation() {
    let model = Arc::new(RecordingLanguageModel::new(Reply::Echo));
    let pipeline = pipeline_with(model.clone(), RagConfig::default());

    let err = pipeline.answer("   ", &ConversationHistory::new()).await.unwrap_err();
    assert!(matches!(err, RagError::RetrievalError(_)));
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn retrieval_is_bounded_by_top_k() {
    let files: Vec<(String, String)> = (0..8)
        .map(|i| (format!("doc{i}.txt"), format!("Document number {i} about rivers.")))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    let dir = corpus(&refs);
    let model = Arc::new(RecordingLanguageModel::new(Reply::Echo));
    let pipeline = pipeline_with(model, RagConfig::builder().top_k(3).build().unwrap());
    pipeline.reindex(dir.path()).await.unwrap();

    let answer = pipeline.answer("rivers", &ConversationHistory::new()).await.unwrap();
    assert_eq!(answer.sources.len(), 3);
}

#[tokio::test]
async fn custom_template_is_used() {
    let model = Arc::new(RecordingLanguageModel::new(Reply::Echo));
    let pipeline = RagPipeline::builder()
        .embedding_provider(Arc::new(HashEmbedder::new()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .language_model(model.clone())
        .prompt_template(PromptTemplate::new("Q: {question}\nC: {context}").unwrap())
        .build()
        .unwrap();

    pipeline.answer("Why?", &ConversationHistory::new()).await.unwrap();
    assert_eq!(model.last_prompt(), "Q: Why?\nC: ");
}

#[test]
fn builder_requires_models_and_store() {
    let err = RagPipeline::builder()
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .language_model(Arc::new(RecordingLanguageModel::new(Reply::Echo)))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, RagError::ConfigError(_)));
}
