//! End-to-end pipeline tests against a real Postgres and a mock destination.
//!
//! Requires `DATABASE_URL`; run with `cargo test --features integration`.

#![cfg(feature = "integration")]

mod common;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use vellum_db::models::{
    CreateDomainEvent, CreateTenant, CreateWebhook, DomainEvent, Tenant, Webhook,
    WebhookOutboxJob,
};
use vellum_outbox::services::dispatch_service::SIGNATURE_HEADER;
use vellum_outbox::{FanoutProcessor, PipelineConfig, PipelineRunner, TenantRefResolver};

async fn setup_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("database connects");
    vellum_db::run_migrations(&pool).await.expect("migrations apply");
    pool
}

async fn create_test_tenant(pool: &PgPool) -> Tenant {
    Tenant::create(
        pool,
        CreateTenant {
            name: "Test Tenant".to_string(),
            slug: format!("t-{}", Uuid::new_v4().simple()),
        },
    )
    .await
    .expect("tenant created")
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        fanout_limit: 10,
        dispatch_limit: 10,
        max_attempts: 3,
        event_max_attempts: 5,
        retry_backoff_ms: 0,
        dead_letter_grace_ms: 7 * 24 * 60 * 60 * 1000,
        http_timeout_ms: 5_000,
    }
}

async fn create_event(pool: &PgPool, tenant_ref: &str, event_type: &str) -> DomainEvent {
    DomainEvent::create(
        pool,
        CreateDomainEvent {
            tenant_ref: tenant_ref.to_string(),
            event_type: event_type.to_string(),
            occurred_at: chrono::Utc::now(),
            payload: serde_json::json!({ "title": "hello" }),
            metadata: serde_json::json!({ "source": "test" }),
        },
    )
    .await
    .expect("event created")
}

#[tokio::test]
async fn test_full_pipeline_delivers_signed_event() {
    let pool = setup_pool().await;
    let tenant = create_test_tenant(&pool).await;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // Webhook stored under the tenant's UUID representation while the event
    // uses the slug; the run must bridge the two.
    let hook = Webhook::create(
        &pool,
        CreateWebhook {
            tenant_ref: tenant.id.to_string(),
            url: server.uri(),
            secret: "s3cr3t".to_string(),
            is_active: true,
            events: vec!["content.published".to_string()],
        },
    )
    .await
    .expect("webhook created");

    let event = create_event(&pool, &tenant.slug, "content.published").await;

    let runner = PipelineRunner::new(pool.clone(), test_config()).expect("runner builds");
    let summary = runner.run_for_tenant(&tenant.slug).await.expect("run succeeds");

    assert_eq!(summary.fanout.queued, 1);
    assert_eq!(summary.dispatch.succeeded, 1);
    assert_eq!(summary.dispatch.failed, 0);

    let event = DomainEvent::find_by_id(&pool, event.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, "queued");

    let jobs = WebhookOutboxJob::list_for_event(&pool, event.id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].webhook_id, hook.id);
    assert_eq!(jobs[0].status, "done");
    assert!(jobs[0].last_error.is_none());

    // The signature must cover the exact bytes the destination received.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let signature = requests[0]
        .headers
        .get(SIGNATURE_HEADER)
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(
        signature,
        common::expected_signature("s3cr3t", &requests[0].body)
    );
    let envelope: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(envelope["type"], "content.published");
    assert_eq!(envelope["payload"]["title"], "hello");
}

#[tokio::test]
async fn test_event_with_no_webhooks_is_skipped() {
    let pool = setup_pool().await;
    let tenant = create_test_tenant(&pool).await;
    let event = create_event(&pool, &tenant.slug, "content.published").await;

    let runner = PipelineRunner::new(pool.clone(), test_config()).expect("runner builds");
    let summary = runner.run_for_tenant(&tenant.slug).await.expect("run succeeds");

    assert_eq!(summary.fanout.skipped, 1);
    assert_eq!(summary.fanout.queued, 0);

    let event = DomainEvent::find_by_id(&pool, event.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, "skipped");
    assert_eq!(
        event.last_error.as_deref(),
        Some("no active webhook destinations")
    );
}

#[tokio::test]
async fn test_unmatched_event_type_is_skipped() {
    let pool = setup_pool().await;
    let tenant = create_test_tenant(&pool).await;

    Webhook::create(
        &pool,
        CreateWebhook {
            tenant_ref: tenant.slug.clone(),
            url: "https://example.com/hook".to_string(),
            secret: String::new(),
            is_active: true,
            events: vec!["form.submitted".to_string()],
        },
    )
    .await
    .expect("webhook created");

    let event = create_event(&pool, &tenant.slug, "content.published").await;

    let runner = PipelineRunner::new(pool.clone(), test_config()).expect("runner builds");
    runner.run_for_tenant(&tenant.slug).await.expect("run succeeds");

    let event = DomainEvent::find_by_id(&pool, event.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, "skipped");
    assert_eq!(
        event.last_error.as_deref(),
        Some("no webhook subscription matches event type")
    );
}

#[tokio::test]
async fn test_failed_delivery_retries_and_succeeds() {
    let pool = setup_pool().await;
    let tenant = create_test_tenant(&pool).await;

    let server = MockServer::start().await;
    // First attempt fails, later attempts succeed.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    Webhook::create(
        &pool,
        CreateWebhook {
            tenant_ref: tenant.slug.clone(),
            url: server.uri(),
            secret: "s3cr3t".to_string(),
            is_active: true,
            events: vec!["*".to_string()],
        },
    )
    .await
    .expect("webhook created");

    let event = create_event(&pool, &tenant.slug, "content.published").await;

    let runner = PipelineRunner::new(pool.clone(), test_config()).expect("runner builds");

    // First run: delivery fails, job lands in failed with one attempt spent.
    let first = runner.run_for_tenant(&tenant.slug).await.expect("run succeeds");
    assert_eq!(first.dispatch.failed, 1);

    let jobs = WebhookOutboxJob::list_for_event(&pool, event.id).await.unwrap();
    assert_eq!(jobs[0].status, "failed");
    assert_eq!(jobs[0].retry_count, 1);
    assert_eq!(jobs[0].last_error.as_deref(), Some("HTTP 500"));

    // Second run: zero backoff makes the job requeue-eligible immediately.
    let second = runner.run_for_tenant(&tenant.slug).await.expect("run succeeds");
    assert_eq!(second.retry.requeued, 1);
    assert_eq!(second.dispatch.succeeded, 1);

    let jobs = WebhookOutboxJob::list_for_event(&pool, event.id).await.unwrap();
    assert_eq!(jobs[0].status, "done");
    assert!(jobs[0].last_error.is_none());
}

#[tokio::test]
async fn test_exhausted_job_is_terminal_and_purgeable() {
    let pool = setup_pool().await;
    let tenant = create_test_tenant(&pool).await;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    Webhook::create(
        &pool,
        CreateWebhook {
            tenant_ref: tenant.slug.clone(),
            url: server.uri(),
            secret: String::new(),
            is_active: true,
            events: vec!["*".to_string()],
        },
    )
    .await
    .expect("webhook created");

    let event = create_event(&pool, &tenant.slug, "content.published").await;

    let mut config = test_config();
    config.max_attempts = 1;
    let runner = PipelineRunner::new(pool.clone(), config).expect("runner builds");
    runner.run_for_tenant(&tenant.slug).await.expect("run succeeds");

    let jobs = WebhookOutboxJob::list_for_event(&pool, event.id).await.unwrap();
    assert_eq!(jobs[0].status, "failed");
    assert_eq!(jobs[0].retry_count, 1);
    let error = jobs[0].last_error.as_deref().unwrap();
    assert!(error.contains("terminal: retry budget exhausted"), "{error}");

    // Under budget nothing requeues it; with a zero grace period the
    // dead-letter purge deletes it.
    let requeued = WebhookOutboxJob::requeue_eligible(&pool, 1, 0, None)
        .await
        .unwrap();
    assert_eq!(requeued, 0);

    let purged = WebhookOutboxJob::purge_dead_letters(&pool, 1, 0, None)
        .await
        .unwrap();
    assert!(purged >= 1);
    let jobs = WebhookOutboxJob::list_for_event(&pool, event.id).await.unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn test_concurrent_fanout_claims_event_exactly_once() {
    let pool = setup_pool().await;
    let tenant = create_test_tenant(&pool).await;

    Webhook::create(
        &pool,
        CreateWebhook {
            tenant_ref: tenant.slug.clone(),
            url: "https://example.com/hook".to_string(),
            secret: String::new(),
            is_active: true,
            events: vec!["*".to_string()],
        },
    )
    .await
    .expect("webhook created");

    let event = create_event(&pool, &tenant.slug, "content.published").await;

    // Two workers race on the same pending event; the conditional claim must
    // let exactly one of them expand it.
    let resolver = Arc::new(TenantRefResolver::new(pool.clone()));
    let first = FanoutProcessor::new(pool.clone(), Arc::clone(&resolver), 5);
    let second = FanoutProcessor::new(pool.clone(), resolver, 5);

    let (a, b) = tokio::join!(
        first.run(10, Some(&tenant.slug)),
        second.run(10, Some(&tenant.slug))
    );
    let (a, b) = (a.expect("first run succeeds"), b.expect("second run succeeds"));

    assert_eq!(a.queued + b.queued, 1);
    assert_eq!(a.failed + b.failed, 0);
    assert_eq!(
        WebhookOutboxJob::count_for_event(&pool, event.id).await.unwrap(),
        1
    );

    let event = DomainEvent::find_by_id(&pool, event.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, "queued");
}

#[tokio::test]
async fn test_run_all_reports_cross_tenant_aggregates() {
    let pool = setup_pool().await;
    let tenant = create_test_tenant(&pool).await;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    Webhook::create(
        &pool,
        CreateWebhook {
            tenant_ref: tenant.slug.clone(),
            url: server.uri(),
            secret: "s3cr3t".to_string(),
            is_active: true,
            events: vec!["*".to_string()],
        },
    )
    .await
    .expect("webhook created");

    create_event(&pool, &tenant.slug, "content.published").await;
    create_event(&pool, &tenant.slug, "content.deleted").await;

    let runner = PipelineRunner::new(pool.clone(), test_config()).expect("runner builds");
    let report = runner.run_all().await.expect("run succeeds");

    // The report totals are exactly the sums over its per-tenant entries,
    // whatever other tenants the shared database holds.
    assert_eq!(
        report.events_processed,
        report.tenants.iter().map(|t| t.fanout.processed).sum::<u64>()
    );
    assert_eq!(
        report.events_queued,
        report.tenants.iter().map(|t| t.fanout.queued).sum::<u64>()
    );
    assert_eq!(
        report.jobs_delivered,
        report.tenants.iter().map(|t| t.dispatch.succeeded).sum::<u64>()
    );
    assert_eq!(
        report.jobs_failed,
        report.tenants.iter().map(|t| t.dispatch.failed).sum::<u64>()
    );
    assert_eq!(
        report.retries_requeued,
        report.tenants.iter().map(|t| t.retry.requeued).sum::<u64>()
    );
    assert_eq!(
        report.dead_letters_purged,
        report.tenants.iter().map(|t| t.cleanup.purged).sum::<u64>()
    );

    let mine = report
        .tenants
        .iter()
        .find(|t| t.tenant_ref == tenant.slug)
        .expect("tenant appears in the report");
    assert_eq!(mine.fanout.queued, 2);
    assert_eq!(mine.dispatch.succeeded, 2);
    assert_eq!(mine.dispatch.failed, 0);
}

#[tokio::test]
async fn test_inactive_webhook_is_ignored_by_fanout() {
    let pool = setup_pool().await;
    let tenant = create_test_tenant(&pool).await;

    Webhook::create(
        &pool,
        CreateWebhook {
            tenant_ref: tenant.slug.clone(),
            url: "https://example.com/hook".to_string(),
            secret: String::new(),
            is_active: false,
            events: vec!["*".to_string()],
        },
    )
    .await
    .expect("webhook created");

    let event = create_event(&pool, &tenant.slug, "content.published").await;

    let runner = PipelineRunner::new(pool.clone(), test_config()).expect("runner builds");
    runner.run_for_tenant(&tenant.slug).await.expect("run succeeds");

    let event = DomainEvent::find_by_id(&pool, event.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, "skipped");
    assert_eq!(
        WebhookOutboxJob::count_for_event(&pool, event.id).await.unwrap(),
        0
    );
}
