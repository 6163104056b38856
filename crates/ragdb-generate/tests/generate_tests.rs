use ragdb_core::{GenerativeModel, Prompt, ProviderErrorKind};
use ragdb_generate::{GeminiGenerator, OllamaGenerator};

fn prompt() -> Prompt {
    Prompt::new("What is the capital of France?", vec!["Paris is the capital of France.".to_string()])
}

#[tokio::test]
async fn unreachable_gemini_endpoint_is_unavailable() {
    let generator = GeminiGenerator::new("gemini-pro", "test-key").with_base_url("http://127.0.0.1:9");
    let err = generator.generate(&prompt()).await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Unavailable);
}

#[tokio::test]
async fn unreachable_ollama_is_unavailable() {
    let generator = OllamaGenerator::new("llama3").with_base_url("http://127.0.0.1:9/");
    let err = generator.generate(&prompt()).await.unwrap_err();
    assert!(err.is_transient());
}

#[test]
fn gemini_requires_an_api_key() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("RAGDB_TEST_GEMINI_KEY", "");
        assert!(GeminiGenerator::from_env("gemini-pro", "RAGDB_TEST_GEMINI_KEY").is_err());
        assert!(GeminiGenerator::from_env("gemini-pro", "RAGDB_TEST_UNSET_KEY").is_err());

        jail.set_env("RAGDB_TEST_GEMINI_KEY", "abc");
        let generator = GeminiGenerator::from_env("gemini-pro", "RAGDB_TEST_GEMINI_KEY").map_err(|e| e.to_string())?;
        assert_eq!(generator.model_id(), "gemini:gemini-pro");
        assert_eq!(generator.max_input_chars(), Some(90_000));
        Ok(())
    });
}
