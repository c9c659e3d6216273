//! Concurrent turns against one controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chatrelay_core::{
    BudgetPolicy, CompletionClient, CompletionRequest, CompletionResponse, ControllerConfig,
    ConversationController, ConversationKey, ConversationStore, InMemoryTemplateStore,
    InboundMessage, MemoryManager, Message, Result, Role, Template, TokenCounter, TokenUsage,
};
use futures::future::join_all;
use tokio::sync::Barrier;

/// Replies with the number of user messages it saw, after an optional barrier.
struct CountingClient {
    gate: Option<Arc<Barrier>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingClient {
    fn new(gate: Option<Arc<Barrier>>) -> Self {
        Self {
            gate,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionClient for CountingClient {
    fn provider(&self) -> &str {
        "counting"
    }

    fn model(&self) -> &str {
        "counting"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.wait().await;
        } else {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let users = request
            .messages
            .iter()
            .filter(|message| message.role == Role::User)
            .count();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: format!("seen {users}"),
            usage: TokenUsage::default(),
        })
    }
}

fn controller(client: Arc<CountingClient>) -> Arc<ConversationController> {
    let templates = Arc::new(
        InMemoryTemplateStore::new().with_template("default", "system: You are terse."),
    );
    let manager = MemoryManager::new(
        TokenCounter::for_model("estimate").unwrap(),
        client,
        BudgetPolicy::new(100_000),
    );
    Arc::new(ConversationController::new(
        Arc::new(ConversationStore::new()),
        manager,
        templates,
        ControllerConfig::default(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_key_turns_never_interleave() {
    let client = Arc::new(CountingClient::new(None));
    let controller = controller(client.clone());

    let turns = (0..8).map(|i| {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .handle_message(&InboundMessage::new("shared", format!("u{i}"), format!("msg {i}")))
                .await
        })
    });
    let results = join_all(turns).await;

    let mut replies: Vec<String> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().concat())
        .collect();
    replies.sort();
    let mut expected: Vec<String> = (1..=8).map(|n| format!("seen {n}")).collect();
    expected.sort();
    assert_eq!(replies, expected, "each turn saw every earlier turn completed");
    assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 1);

    let log = controller
        .snapshot(&ConversationKey::Channel("shared".into()))
        .await
        .unwrap();
    assert_eq!(log.len(), 1 + 8 * 2);
    // strict user/assistant alternation after the prefix
    for pair in log.history().chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_run_in_parallel() {
    // the barrier only opens once all three completions are in flight together
    let gate = Arc::new(Barrier::new(3));
    let client = Arc::new(CountingClient::new(Some(gate)));
    let controller = controller(client.clone());

    let turns: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|channel| {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .handle_message(&InboundMessage::new(channel, "u1", "hello"))
                    .await
            })
        })
        .collect();

    let finished = tokio::time::timeout(Duration::from_secs(5), join_all(turns))
        .await
        .expect("turns on distinct keys were serialized");
    for turn in finished {
        assert_eq!(turn.unwrap().unwrap(), vec!["seen 1"]);
    }
    assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 3);
    assert_eq!(controller.store().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creation_has_one_winner() {
    let store = Arc::new(ConversationStore::new());
    let key = ConversationKey::Channel("fresh".into());

    let creators = (0..16).map(|i| {
        let store = store.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let seed = Template::new(format!("seed{i}"), vec![Message::system(format!("seed {i}"))]);
            store.get_or_init(&key, &seed)
        })
    });
    let entries: Vec<_> = join_all(creators)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert!(entries.iter().all(|entry| Arc::ptr_eq(entry, &entries[0])));
    assert_eq!(store.len(), 1);
    let log = entries[0].lock().await;
    assert_eq!(log.len(), 1);
}
