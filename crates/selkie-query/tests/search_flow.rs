//! Query service integration tests
//!
//! Covers filtered vector search, supersession exclusion, asynchronous
//! access touching, re-ranking, and memory-prompt composition over the
//! in-memory store and sim providers.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use selkie_core::{
    EnrichmentPatch, ManualClock, MemoryConfig, MemoryRecord, MemoryType, MessageRole,
    RequestContext, SessionKey, TimeProvider,
};
use selkie_llm::{SimEmbeddingProvider, SimGenerationProvider};
use selkie_memory::{HeuristicTokenCounter, LongTermMemoryStore, WorkingMemoryStore};
use selkie_pipeline::{register_handlers, Pipeline, WatermarkStore, TOUCH_TASK};
use selkie_query::{HydratedMessage, MemoryPromptRequest, QueryService, SearchRequest};
use selkie_runtime::{
    HandlerRegistry, TaskQueue, TaskSink, TaskSpec, WorkerPool,
};
use selkie_store::{Filters, InMemoryVectorStore, TagFilter};

const DIM: usize = 16;

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

/// Sink that records task specs without running them
#[derive(Default)]
struct RecordingSink {
    specs: StdMutex<Vec<TaskSpec>>,
}

impl TaskSink for RecordingSink {
    fn enqueue(&self, spec: TaskSpec) -> selkie_core::Result<bool> {
        self.specs.lock().unwrap().push(spec);
        Ok(true)
    }
}

struct Setup {
    clock: Arc<ManualClock>,
    embeddings: Arc<SimEmbeddingProvider>,
    sink: Arc<RecordingSink>,
    service: QueryService,
}

fn setup() -> Setup {
    setup_with_config(MemoryConfig::default())
}

fn setup_with_config(config: MemoryConfig) -> Setup {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let time: Arc<dyn TimeProvider> = clock.clone();

    let embeddings = Arc::new(SimEmbeddingProvider::new(DIM));
    let generation = Arc::new(SimGenerationProvider::new());
    let sink = Arc::new(RecordingSink::default());

    let working = Arc::new(WorkingMemoryStore::new(
        Arc::clone(&time),
        Arc::new(HeuristicTokenCounter),
        config.summarization.clone(),
        config.store.default_wm_ttl_secs,
    ));
    let long_term = Arc::new(LongTermMemoryStore::new(
        Arc::new(InMemoryVectorStore::new(DIM)),
        Arc::clone(&time),
    ));

    let service = QueryService {
        config,
        working,
        long_term,
        embeddings: embeddings.clone(),
        generation,
        tasks: sink.clone(),
        time,
    };

    Setup {
        clock,
        embeddings,
        sink,
        service,
    }
}

async fn seed(
    service: &QueryService,
    text: &str,
    user: &str,
    topics: &[&str],
    vector: Vec<f32>,
) -> MemoryRecord {
    let record = MemoryRecord::new(
        service.long_term.next_id(),
        text,
        MemoryType::Semantic,
        service.time.now_ms(),
    )
    .unwrap()
    .with_user_id(user)
    .with_namespace("n1");

    let created = service.long_term.create(record).await.unwrap();
    service
        .long_term
        .update(created.id, EnrichmentPatch::vector(vector))
        .await
        .unwrap();
    if !topics.is_empty() {
        service
            .long_term
            .update(
                created.id,
                EnrichmentPatch::topics(topics.iter().map(|t| t.to_string()).collect()),
            )
            .await
            .unwrap();
    }
    service.long_term.get(created.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn filtered_search_respects_user_topics_and_limit() {
    let s = setup();
    let ctx = RequestContext::new();

    s.embeddings.pin("pets", unit(0));

    // 20 records across two users; half tagged "pets" with vectors close to
    // the query axis, the rest on other axes.
    for i in 0..10 {
        let mut vector = unit(0);
        vector[1] = 0.05 * i as f32; // increasing distance from the query
        seed(
            &s.service,
            &format!("u1 pet fact {}", i),
            "u1",
            &["pets"],
            vector,
        )
        .await;
    }
    for i in 0..5 {
        seed(&s.service, &format!("u1 work fact {}", i), "u1", &["work"], unit(2)).await;
    }
    for i in 0..5 {
        seed(&s.service, &format!("u2 pet fact {}", i), "u2", &["pets"], unit(0)).await;
    }

    let request = SearchRequest {
        text: Some("pets".into()),
        filters: Filters {
            user_id: Some(TagFilter::eq("u1")),
            topics: Some(TagFilter::any_of(["pets"])),
            ..Default::default()
        },
        limit: Some(5),
        ..Default::default()
    };
    let response = s.service.search(request, &ctx).await.unwrap();

    assert_eq!(response.total, 10);
    assert_eq!(response.memories.len(), 5);
    assert_eq!(response.next_offset, Some(5));

    for result in &response.memories {
        assert_eq!(result.record.user_id.as_deref(), Some("u1"));
        assert!(result.record.topics.contains(&"pets".to_string()));
    }

    // Ordered by ascending distance (descending similarity).
    for pair in response.memories.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn search_never_returns_superseded_or_staged_records() {
    let s = setup();
    let ctx = RequestContext::new();

    s.embeddings.pin("tea", unit(0));

    let old = seed(&s.service, "user likes tea", "u1", &[], unit(0)).await;
    let new = seed(&s.service, "user likes hot green tea", "u1", &[], unit(0)).await;
    s.service.long_term.supersede(old.id, new.id).await.unwrap();

    let response = s
        .service
        .search(
            SearchRequest {
                text: Some("tea".into()),
                ..Default::default()
            },
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(response.total, 1);
    assert!(response
        .memories
        .iter()
        .all(|m| m.record.superseded_by.is_none()));
    assert!(response.memories.iter().all(|m| m.record.is_persisted()));
}

#[tokio::test]
async fn touch_is_scheduled_not_synchronous() {
    let s = setup();
    let ctx = RequestContext::new();

    s.embeddings.pin("tea", unit(0));
    let record = seed(&s.service, "user likes tea", "u1", &[], unit(0)).await;
    assert_eq!(record.access_count, 0);

    let response = s
        .service
        .search(
            SearchRequest {
                text: Some("tea".into()),
                ..Default::default()
            },
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(response.memories.len(), 1);

    // The search returned without touching anything.
    let read = s.service.long_term.get(record.id).await.unwrap().unwrap();
    assert_eq!(read.access_count, 0);

    // One touch task was scheduled with the returned id.
    let specs = s.sink.specs.lock().unwrap();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].name, TOUCH_TASK);
    assert_eq!(specs[0].args["ids"][0], record.id.to_string());
}

#[tokio::test]
async fn touch_task_applies_through_the_runtime() {
    let s = setup();
    let ctx = RequestContext::new();
    let time: Arc<dyn TimeProvider> = s.clock.clone();

    s.embeddings.pin("tea", unit(0));
    let record = seed(&s.service, "user likes tea", "u1", &[], unit(0)).await;

    s.service
        .search(
            SearchRequest {
                text: Some("tea".into()),
                ..Default::default()
            },
            &ctx,
        )
        .await
        .unwrap();

    // Replay the recorded touch task through a real queue and worker.
    let pipeline = Arc::new(Pipeline {
        config: s.service.config.clone(),
        working: Arc::clone(&s.service.working),
        long_term: Arc::clone(&s.service.long_term),
        embeddings: s.embeddings.clone(),
        generation: Arc::new(SimGenerationProvider::new()),
        watermarks: Arc::new(WatermarkStore::new()),
        time: Arc::clone(&time),
    });

    let queue = Arc::new(TaskQueue::new(100, Arc::clone(&time)));
    for spec in s.sink.specs.lock().unwrap().iter() {
        queue.enqueue(spec.clone()).unwrap();
    }

    let mut registry = HandlerRegistry::new();
    register_handlers(&mut registry, pipeline);
    let pool = WorkerPool::new(
        Arc::clone(&queue),
        registry,
        s.service.config.tasks.clone(),
        time,
    );
    pool.drain().await;

    let read = s.service.long_term.get(record.id).await.unwrap().unwrap();
    assert_eq!(read.access_count, 1);
}

#[tokio::test]
async fn reranking_prefers_frequently_accessed_records() {
    let mut config = MemoryConfig::default();
    config.rerank.alpha = 0.0;
    config.rerank.gamma = 1.0;
    let s = setup_with_config(config);
    let ctx = RequestContext::new();

    s.embeddings.pin("tea", unit(0));

    // Closest by similarity, never accessed.
    seed(&s.service, "fresh tea fact", "u1", &[], unit(0)).await;

    // Slightly farther, heavily accessed.
    let mut farther = unit(0);
    farther[1] = 0.2;
    let popular = seed(&s.service, "popular tea fact", "u1", &[], farther).await;
    for _ in 0..20 {
        s.service.long_term.touch(&[popular.id]).await.unwrap();
    }

    let response = s
        .service
        .search(
            SearchRequest {
                text: Some("tea".into()),
                ..Default::default()
            },
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(response.memories[0].record.id, popular.id);
}

#[tokio::test]
async fn query_without_text_scans_by_filters() {
    let s = setup();
    let ctx = RequestContext::new();

    seed(&s.service, "alpha", "u1", &["work"], unit(0)).await;
    seed(&s.service, "beta", "u2", &["work"], unit(1)).await;

    let response = s
        .service
        .search(
            SearchRequest {
                filters: Filters::for_user("u2"),
                ..Default::default()
            },
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(response.total, 1);
    assert_eq!(response.memories[0].record.text, "beta");
    assert_eq!(response.memories[0].distance, 0.0);
}

#[tokio::test]
async fn memory_prompt_composes_context_memories_and_query() {
    let s = setup();
    let ctx = RequestContext::new();

    // Session with a running summary and two messages.
    let session = SessionKey::new(Some("n1".into()), Some("u1".into()), "s1").unwrap();
    s.service
        .working
        .append_messages(
            &session,
            vec![
                (MessageRole::User, "what tea should I buy?".into()),
                (MessageRole::Assistant, "Try a sencha.".into()),
            ],
        )
        .await
        .unwrap();
    let mut wm = s.service.working.get(&session, None).await.unwrap().unwrap();
    wm.context = Some("The user is exploring green teas.".into());
    s.service.working.set(wm).await.unwrap();

    // One relevant long-term memory.
    s.embeddings.pin("which tea to restock?", unit(0));
    seed(&s.service, "user likes hot green tea", "u1", &[], unit(0)).await;

    let request = MemoryPromptRequest {
        query: "which tea to restock?".into(),
        session: Some(session),
        recent_messages_limit: None,
        search: Some(SearchRequest {
            filters: Filters::for_user("u1"),
            ..Default::default()
        }),
    };
    let messages = s.service.memory_prompt(request, &ctx).await.unwrap();

    // summary, 2 session messages, relevant memories, final user query.
    assert_eq!(messages.len(), 5);
    assert!(matches!(messages[0].role, MessageRole::System));
    assert!(messages[0].content.contains("summary of the conversation"));
    assert_eq!(messages[1].content, "what tea should I buy?");
    assert_eq!(messages[2].content, "Try a sencha.");
    assert!(messages[3].content.starts_with("Relevant memories:"));
    assert!(messages[3].content.contains("- user likes hot green tea"));
    assert_eq!(
        messages.last().unwrap(),
        &HydratedMessage {
            role: MessageRole::User,
            content: "which tea to restock?".into(),
        }
    );
}

#[tokio::test]
async fn memory_prompt_without_session_still_hydrates() {
    let s = setup();
    let ctx = RequestContext::new();

    s.embeddings.pin("tea", unit(0));
    seed(&s.service, "user likes hot green tea", "u1", &[], unit(0)).await;

    let request = MemoryPromptRequest {
        query: "tea".into(),
        session: None,
        recent_messages_limit: None,
        search: Some(SearchRequest::default()),
    };
    let messages = s.service.memory_prompt(request, &ctx).await.unwrap();

    assert_eq!(messages.len(), 2);
    assert!(messages[0].content.starts_with("Relevant memories:"));
    assert_eq!(messages[1].content, "tea");
}

#[tokio::test]
async fn optimize_query_failure_surfaces_to_caller() {
    let s = setup();
    let ctx = RequestContext::new();

    seed(&s.service, "anything", "u1", &[], unit(0)).await;

    // The generation provider fails; optimize_query is on the synchronous
    // path, so the error surfaces instead of retrying in the background.
    let generation = Arc::new(SimGenerationProvider::new());
    generation.fail_next(1);
    let service = QueryService {
        generation,
        config: s.service.config.clone(),
        working: Arc::clone(&s.service.working),
        long_term: Arc::clone(&s.service.long_term),
        embeddings: s.embeddings.clone(),
        tasks: s.sink.clone(),
        time: s.clock.clone(),
    };

    let err = service
        .search(
            SearchRequest {
                text: Some("what does the user drink".into()),
                optimize_query: true,
                ..Default::default()
            },
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, selkie_core::Error::ProviderFailure { .. }));
}
