use std::sync::Arc;

use async_trait::async_trait;
use chronicle_context::{
    BlockKind, ContextConfiguration, ContextResult, ContextStrategy, ConversationContextManager,
    HeuristicEstimator, InMemorySessionStore, MessageRole, Summarizer, SummaryRequest,
    TokenEstimator,
};
use proptest::prelude::*;

/// Summarizer that echoes a fixed-length digest of what it was given.
struct DigestSummarizer;

#[async_trait]
impl Summarizer for DigestSummarizer {
    fn name(&self) -> &'static str {
        "digest"
    }

    async fn summarize(&self, request: SummaryRequest) -> ContextResult<String> {
        let names: Vec<String> = request
            .messages
            .iter()
            .map(|m| format!("m{}", m.id))
            .collect();
        Ok(format!("Covered {}", names.join(" ")))
    }
}

fn arb_strategy() -> impl Strategy<Value = ContextStrategy> {
    prop_oneof![
        Just(ContextStrategy::Truncate),
        Just(ContextStrategy::Summarize),
        Just(ContextStrategy::Hybrid),
    ]
}

fn assemble(
    contents: &[String],
    strategy: ContextStrategy,
    system_prompt: &str,
    current: &str,
    max_recent: usize,
    max_tokens: usize,
) -> chronicle_context::AssembledContext {
    tokio_test::block_on(async {
        let config = ContextConfiguration::new(strategy)
            .with_summarization_message_threshold(5)
            .with_summarization_threshold(50)
            .with_summary_target_tokens(40)
            .with_system_prompt(system_prompt);
        let manager = ConversationContextManager::new(Arc::new(InMemorySessionStore::new()), config)
            .with_summarizer(Arc::new(DigestSummarizer));

        let id = manager.create_session().await.unwrap();
        for (i, content) in contents.iter().enumerate() {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            manager.add_message(id, role, content.clone()).await.unwrap();
        }

        manager
            .get_conversation_context(id, current, max_recent, max_tokens)
            .await
            .unwrap()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_context_fits_budget_unless_fixed_blocks_overflow(
        contents in prop::collection::vec("[a-z][a-z ]{0,159}", 0..30),
        strategy in arb_strategy(),
        system_prompt in "[a-z ]{0,80}",
        current in "[a-z ?]{1,120}",
        max_recent in 0usize..10,
        max_tokens in 0usize..400,
    ) {
        let context = assemble(&contents, strategy, &system_prompt, &current, max_recent, max_tokens);

        let estimator = HeuristicEstimator;
        let fixed: usize = context
            .blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::SystemPrompt | BlockKind::Current))
            .map(|b| estimator.count_text(&b.content))
            .sum();

        if fixed <= max_tokens {
            prop_assert!(
                context.total_tokens <= max_tokens,
                "total {} over budget {}",
                context.total_tokens,
                max_tokens
            );
        } else {
            prop_assert_eq!(context.total_tokens, fixed);
        }
        prop_assert_eq!(context.blocks.last().map(|b| b.kind), Some(BlockKind::Current));
    }

    #[test]
    fn prop_history_stays_chronological(
        contents in prop::collection::vec("[a-z][a-z ]{0,119}", 1..40),
        strategy in arb_strategy(),
        max_recent in 1usize..12,
        max_tokens in 50usize..1500,
    ) {
        let context = assemble(&contents, strategy, "", "next?", max_recent, max_tokens);

        let ids = context.message_ids();
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(ids.len() <= max_recent);
        if let Some(&last) = ids.last() {
            prop_assert_eq!(last as usize, contents.len());
        }

        let summary_at = context.blocks.iter().position(|b| b.kind == BlockKind::Summary);
        let first_message_at = context
            .blocks
            .iter()
            .position(|b| matches!(b.kind, BlockKind::Message { .. }));
        if let (Some(s), Some(m)) = (summary_at, first_message_at) {
            prop_assert!(s < m);
        }
    }

    #[test]
    fn prop_short_sessions_are_verbatim(
        contents in prop::collection::vec("[a-z][a-z ]{0,39}", 1..8),
        strategy in arb_strategy(),
    ) {
        let max_recent = contents.len() + 2;
        let context = assemble(&contents, strategy, "", "next?", max_recent, 10_000);

        prop_assert!(!context.has_summary());
        let expected: Vec<u64> = (1..=contents.len() as u64).collect();
        prop_assert_eq!(context.message_ids(), expected);
    }
}
