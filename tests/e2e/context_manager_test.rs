use std::sync::Arc;
use std::time::Duration;

use chronicle_context::{
    BlockKind, ContextConfiguration, ContextStrategy, ConversationContextManager,
    InMemorySessionStore, MessageRole, ProviderSummarizer, SessionStore,
};
use chronicle_runtime::{GenerateResponse, MockProvider, ProviderError};
use uuid::Uuid;

const EXCHANGES: [(&str, &str); 3] = [
    (
        "What happened to Captain Thorne?",
        "Captain Thorne vanished near the old lighthouse in Shadowhaven.",
    ),
    (
        "Who was with him?",
        "The halfling merchant Pip and two sailors of the Crimson Company.",
    ),
    (
        "What did Pip carry?",
        "Pip carried the Sunblade, which the party agreed to keep secret.",
    ),
];

async fn campaign_session(manager: &ConversationContextManager, messages: usize) -> Uuid {
    let id = manager.create_session().await.unwrap();
    for i in 0..messages {
        let (question, answer) = EXCHANGES[(i / 2) % EXCHANGES.len()];
        let (role, content) = if i % 2 == 0 {
            (MessageRole::User, question)
        } else {
            (MessageRole::Assistant, answer)
        };
        manager.add_message(id, role, content).await.unwrap();
    }
    id
}

fn scenario_config() -> ContextConfiguration {
    ContextConfiguration::new(ContextStrategy::Hybrid)
        .with_max_conversation_tokens(2000)
        .with_max_recent_messages(6)
        .with_summarization_message_threshold(25)
        .with_summary_target_tokens(400)
        .with_system_prompt("You are the archivist of a D&D campaign.")
}

#[tokio::test]
async fn thirty_message_hybrid_session_gets_summary_and_recent_window() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_generate(Ok(GenerateResponse::text(
        "Captain Thorne vanished near the old lighthouse; Pip holds the Sunblade.",
    )));
    let store = Arc::new(InMemorySessionStore::new());
    let manager = ConversationContextManager::new(store.clone(), scenario_config())
        .with_summarizer(Arc::new(ProviderSummarizer::new(provider.clone())));
    let id = campaign_session(&manager, 30).await;

    let context = manager
        .build_context(id, "Where is the Sunblade now?")
        .await
        .unwrap();

    let kinds: Vec<BlockKind> = context.blocks.iter().map(|b| b.kind).collect();
    assert_eq!(kinds[0], BlockKind::SystemPrompt);
    assert_eq!(kinds[1], BlockKind::Summary);
    assert_eq!(context.message_ids(), (25..=30).collect::<Vec<u64>>());
    assert_eq!(*kinds.last().unwrap(), BlockKind::Current);
    assert!(context.total_tokens <= 2000);

    let request = &provider.requests()[0];
    assert!(request.prompt.contains("Captain Thorne"));
    assert!(request.prompt.contains("under 400 tokens"));
    assert_eq!(store.load_summary(id).await.unwrap().unwrap().up_to_message_id, 24);
}

#[tokio::test]
async fn empty_session_with_truncate_is_prompt_plus_current() {
    let store = Arc::new(InMemorySessionStore::new());
    let manager = ConversationContextManager::new(
        store,
        scenario_config().with_strategy(ContextStrategy::Truncate),
    );
    let id = manager.create_session().await.unwrap();

    let context = manager.build_context(id, "Hello there").await.unwrap();

    assert_eq!(context.len(), 2);
    assert_eq!(context.blocks[0].kind, BlockKind::SystemPrompt);
    assert_eq!(context.blocks[1].content, "Hello there");
}

#[tokio::test]
async fn summarizer_timeout_falls_back_to_recent_window() {
    let provider = Arc::new(MockProvider::new().with_latency(Duration::from_millis(500)));
    provider.enqueue_generate(Ok(GenerateResponse::text("too late")));
    let store = Arc::new(InMemorySessionStore::new());
    let config = scenario_config().with_summary_timeout(Duration::from_millis(20));
    let manager = ConversationContextManager::new(store.clone(), config)
        .with_summarizer(Arc::new(ProviderSummarizer::new(provider)));
    let id = campaign_session(&manager, 40).await;

    let context = manager.build_context(id, "Recap?").await.unwrap();

    assert!(!context.has_summary());
    assert_eq!(context.message_ids(), (35..=40).collect::<Vec<u64>>());
    assert!(store.load_summary(id).await.unwrap().is_none());
}

#[tokio::test]
async fn provider_error_keeps_context_valid() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_generate(Err(ProviderError::HttpStatus {
        status: 503,
        body: "overloaded".to_string(),
    }));
    let store = Arc::new(InMemorySessionStore::new());
    let manager = ConversationContextManager::new(store, scenario_config())
        .with_summarizer(Arc::new(ProviderSummarizer::new(provider)));
    let id = campaign_session(&manager, 40).await;

    let stats = manager.get_context_stats(id, "Recap?").await.unwrap();

    assert_eq!(stats.summary_count, 0);
    assert_eq!(stats.total_messages, 8);
    assert!(stats.within_limits);
    assert_eq!(stats.conversation_length, 40);
}

#[tokio::test]
async fn running_summary_merges_previous_summary() {
    let provider = Arc::new(MockProvider::new());
    provider.enqueue_generate(Ok(GenerateResponse::text("First chapter: Thorne vanished.")));
    provider.enqueue_generate(Ok(GenerateResponse::text(
        "Thorne vanished; Pip kept the Sunblade secret.",
    )));
    let store = Arc::new(InMemorySessionStore::new());
    let manager = ConversationContextManager::new(store.clone(), scenario_config())
        .with_summarizer(Arc::new(ProviderSummarizer::new(provider.clone())));
    let id = campaign_session(&manager, 30).await;

    manager.build_context(id, "first").await.unwrap();
    for _ in 0..26 {
        manager
            .add_message(id, MessageRole::User, "Tell me more about the Crimson Company.")
            .await
            .unwrap();
    }
    let context = manager.build_context(id, "second").await.unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].prompt.contains("First chapter: Thorne vanished."));
    assert!(requests[1].prompt.contains("ONE combined summary"));
    assert!(context
        .render()
        .contains("Previous conversation summary: Thorne vanished; Pip kept the Sunblade secret."));
    assert_eq!(store.load_summary(id).await.unwrap().unwrap().up_to_message_id, 50);
}
