use mks_model_openai::{
    CompletionBackend, CompletionRequest, OpenAiChatBackend, OpenAiConfig, AUTH_ENV_VAR,
};

#[tokio::test]
async fn live_completion_can_skip_when_env_missing() {
    let Ok(api_key) = std::env::var(AUTH_ENV_VAR) else {
        eprintln!(
            "skipping live completion test because {} is missing",
            AUTH_ENV_VAR
        );
        return;
    };

    let backend = OpenAiChatBackend::new(OpenAiConfig::new(api_key)).expect("backend should build");
    let text = backend
        .complete(&CompletionRequest {
            system_prompt: "You are a meme copywriter.".to_string(),
            user_prompt: "Write a 120-char meme caption inspired by:\nMonday again".to_string(),
            max_tokens: 40,
        })
        .await
        .expect("completion should succeed");

    assert!(!text.trim().is_empty());
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    let config = OpenAiConfig::new("sk-test").with_endpoint("http://127.0.0.1:9/v1");
    let backend = OpenAiChatBackend::new(config).expect("backend should build");

    let result = backend
        .complete(&CompletionRequest {
            system_prompt: String::new(),
            user_prompt: "hello".to_string(),
            max_tokens: 8,
        })
        .await;

    assert!(matches!(
        result,
        Err(mks_model_openai::ModelError::Transport(_))
    ));
}
