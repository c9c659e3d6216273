//! Long-running conversations stay inside their budget without losing the
//! behavior prefix.

use std::fs;
use std::sync::Arc;

use chatrelay_core::{
    BudgetPolicy, ConversationController, ConversationKey, ConversationStore, ControllerConfig,
    FileTemplateStore, InboundMessage, MemoryManager, Message, MockCompletionClient, MockStep,
    TokenCounter,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const BUDGET: usize = 600;

fn controller_with_prompts(dir: &std::path::Path, client: MockCompletionClient) -> ConversationController {
    let counter = TokenCounter::for_model("estimate").unwrap();
    let manager = MemoryManager::new(counter, Arc::new(client), BudgetPolicy::new(BUDGET));
    ConversationController::new(
        Arc::new(ConversationStore::new()),
        manager,
        Arc::new(FileTemplateStore::new(dir)),
        ControllerConfig::default(),
    )
}

fn verbose_reply(turn: usize) -> MockStep {
    MockStep::text(format!(
        "Turn {turn} answer. {}",
        "The quick brown fox jumps over the lazy dog. ".repeat(3)
    ))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hundred_turns_stay_within_budget() {
    let prompts = tempfile::tempdir().unwrap();
    fs::write(
        prompts.path().join("default.txt"),
        "system: You are a concise assistant.\nuser: Say hi\nassistant: Hi!",
    )
    .unwrap();

    let turns = 100;
    let client = MockCompletionClient::from_steps("stress", (0..turns).map(verbose_reply).collect());
    let controller = controller_with_prompts(prompts.path(), client.clone());
    let counter = TokenCounter::for_model("estimate").unwrap();
    let key = ConversationKey::Channel("busy".into());

    for turn in 0..turns {
        controller
            .handle_message(&InboundMessage::new("busy", "u1", format!("Question number {turn}?")))
            .await
            .unwrap();

        let log = controller.snapshot(&key).await.unwrap();
        assert_eq!(log.behavior_length(), 3);
        assert_eq!(log.messages()[0], Message::system("You are a concise assistant."));
        assert_eq!(log.messages()[2], Message::assistant("Hi!"));
        // the assistant reply is appended after trimming, so only the prompt is bounded
        let prompt = &log.messages()[..log.len() - 1];
        assert!(counter.count(prompt) * 5 <= BUDGET * 4, "turn {turn} overran the budget");
    }

    // every request left at least a fifth of the budget for the reply
    for request in client.requests().await {
        assert!(request.max_tokens as usize * 5 >= BUDGET);
    }
}

#[tokio::test]
async fn saved_behavior_survives_a_new_controller() {
    let prompts = tempfile::tempdir().unwrap();
    let key = ConversationKey::Channel("c1".into());

    let first = controller_with_prompts(prompts.path(), MockCompletionClient::new("m"));
    first
        .new_behavior(&key, "system: Answer in French.\nuser: Hello\nassistant: Bonjour")
        .await
        .unwrap();
    first.save_behavior(&key, "french").await.unwrap();
    assert!(prompts.path().join("french.txt").exists());

    let second = controller_with_prompts(prompts.path(), MockCompletionClient::new("m"));
    assert_eq!(second.available_templates().await.unwrap(), vec!["french"]);
    let template = second.load_behavior(&key, "French").await.unwrap();
    assert_eq!(template.behavior_length(), 3);

    let chunks = second
        .handle_message(&InboundMessage::new("c1", "u1", "Thanks"))
        .await
        .unwrap();
    assert_eq!(chunks, vec!["mock-echo: Thanks"]);
}

#[tokio::test]
async fn missing_default_template_seeds_an_empty_conversation() {
    let prompts = tempfile::tempdir().unwrap();
    let controller = controller_with_prompts(prompts.path(), MockCompletionClient::new("m"));

    controller
        .handle_message(&InboundMessage::new("c1", "u1", "anyone?"))
        .await
        .unwrap();
    let log = controller
        .snapshot(&ConversationKey::Channel("c1".into()))
        .await
        .unwrap();
    assert_eq!(log.behavior_length(), 0);
    assert_eq!(log.len(), 2);
}
