//! Integration tests for the derived-artifact cache orchestrator
//!
//! Covers single-flight derivation, cache-hit idempotence, cross-key
//! independence, failure cleanup, self-healing after external file loss,
//! and cancellation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use jrm_md::cache::{
    BackendError, CacheError, CachedArtifact, DerivationBackend, DerivationResult, DeriveRequest,
    MediaCache, ResourceKind,
};
use jrm_md::db::SqliteArtifactStore;

/// Scripted derivation backend that writes a fixed payload
///
/// Counts invocations, optionally sleeps (to hold the per-key lock),
/// optionally leaves partial output and fails.
struct MockBackend {
    calls: AtomicUsize,
    payload: &'static [u8],
    delay: Duration,
    fail: AtomicBool,
    needs_raw: bool,
    with_thumbnail: bool,
    title: Option<&'static str>,
}

impl MockBackend {
    fn new(payload: &'static [u8]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            payload,
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            needs_raw: true,
            with_thumbnail: false,
            title: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    fn remote(mut self) -> Self {
        self.needs_raw = false;
        self.with_thumbnail = true;
        self.title = Some("Mock Video");
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DerivationBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn extension(&self) -> &'static str {
        "bin"
    }

    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn needs_raw_source(&self) -> bool {
        self.needs_raw
    }

    async fn derive(&self, request: &DeriveRequest) -> Result<DerivationResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        // Partial output appears on disk before the outcome is known,
        // like a real external process writing incrementally
        tokio::fs::write(&request.target_path, b"partial").await?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Failed {
                tool: "mock",
                stderr: "simulated failure".to_string(),
            });
        }

        tokio::fs::write(&request.target_path, self.payload).await?;

        let thumbnail_path = if self.with_thumbnail {
            let path = request.target_path.with_extension("jpg");
            tokio::fs::write(&path, b"thumb").await?;
            Some(path)
        } else {
            None
        };

        Ok(DerivationResult {
            artifact_path: request.target_path.clone(),
            thumbnail_path,
            title: self.title.map(str::to_string),
        })
    }
}

struct TestCache {
    pool: SqlitePool,
    cache: Arc<MediaCache>,
    // Keeps the cache directory alive for the duration of the test
    cache_dir: TempDir,
    raw_dir: TempDir,
}

async fn setup() -> TestCache {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    jrm_common::db::init::create_schema(&pool).await.expect("schema");

    let dir = TempDir::new().expect("cache dir");
    let store = Arc::new(SqliteArtifactStore::new(pool.clone()));
    let cache = Arc::new(MediaCache::new(dir.path().to_path_buf(), store));

    TestCache {
        pool,
        cache,
        cache_dir: dir,
        raw_dir: TempDir::new().expect("raw dir"),
    }
}

/// Insert a record with a real raw file on disk, as the library-scan
/// ingester would
async fn seed_raw(t: &TestCache, kind: ResourceKind, key: &str) -> PathBuf {
    let raw_path = t.raw_dir.path().join(format!("{}.raw", key));
    tokio::fs::write(&raw_path, b"raw source bytes")
        .await
        .expect("write raw file");

    sqlx::query("INSERT INTO media_artifacts (kind, key, raw_path) VALUES (?, ?, ?)")
        .bind(kind.as_str())
        .bind(key)
        .bind(raw_path.display().to_string())
        .execute(&t.pool)
        .await
        .expect("seed record");

    raw_path
}

async fn read_all(artifact: CachedArtifact) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut file = artifact.file;
    file.read_to_end(&mut bytes).await.expect("read artifact");
    bytes
}

async fn derived_path_in_db(t: &TestCache, kind: ResourceKind, key: &str) -> Option<String> {
    sqlx::query_scalar("SELECT derived_path FROM media_artifacts WHERE kind = ? AND key = ?")
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&t.pool)
        .await
        .expect("query derived_path")
        .flatten()
}

// ============================================================================
// Scenarios A/B: first call derives, second call is a pure cache hit
// ============================================================================

#[tokio::test]
async fn first_call_derives_and_persists_second_call_hits_cache() {
    let t = setup().await;
    let backend = MockBackend::new(b"opus bytes");
    let cancel = CancellationToken::new();
    seed_raw(&t, ResourceKind::Audio, "song-1").await;

    // First call transcodes
    let artifact = t
        .cache
        .fetch(ResourceKind::Audio, "song-1", &backend, &cancel)
        .await
        .expect("first fetch");
    assert_eq!(artifact.content_type, "application/octet-stream");
    assert_eq!(read_all(artifact).await, b"opus bytes");
    assert_eq!(backend.calls(), 1);

    // Record now carries the derived locator
    let derived = derived_path_in_db(&t, ResourceKind::Audio, "song-1")
        .await
        .expect("derived path persisted");
    assert!(derived.ends_with("song-1.bin"));

    // Second call never reaches the backend
    let artifact = t
        .cache
        .fetch(ResourceKind::Audio, "song-1", &backend, &cancel)
        .await
        .expect("second fetch");
    assert_eq!(read_all(artifact).await, b"opus bytes");
    assert_eq!(backend.calls(), 1);
}

// ============================================================================
// P1: at most one derivation under concurrent requests for the same key
// ============================================================================

#[tokio::test]
async fn concurrent_requests_share_one_derivation() {
    let t = setup().await;
    let backend = Arc::new(MockBackend::new(b"shared payload").with_delay(Duration::from_millis(50)));
    let cancel = CancellationToken::new();
    seed_raw(&t, ResourceKind::Audio, "song-n").await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&t.cache);
        let backend = Arc::clone(&backend);
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let artifact = cache
                .fetch(ResourceKind::Audio, "song-n", backend.as_ref(), &cancel)
                .await
                .expect("concurrent fetch");
            read_all(artifact).await
        }));
    }

    for task in tasks {
        let bytes = task.await.expect("task completed");
        assert_eq!(bytes, b"shared payload");
    }
    assert_eq!(backend.calls(), 1);
}

// ============================================================================
// P2: a derivation in flight for one key does not delay another key
// ============================================================================

#[tokio::test]
async fn derivation_for_one_key_does_not_block_another() {
    let t = setup().await;
    let slow = Arc::new(MockBackend::new(b"slow").with_delay(Duration::from_millis(300)));
    let fast = MockBackend::new(b"fast");
    let cancel = CancellationToken::new();
    seed_raw(&t, ResourceKind::Audio, "slow-song").await;
    seed_raw(&t, ResourceKind::Audio, "fast-song").await;

    let slow_task = {
        let cache = Arc::clone(&t.cache);
        let slow = Arc::clone(&slow);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cache
                .fetch(ResourceKind::Audio, "slow-song", slow.as_ref(), &cancel)
                .await
        })
    };

    // Let the slow derivation take its lock first
    tokio::time::sleep(Duration::from_millis(30)).await;

    let started = Instant::now();
    t.cache
        .fetch(ResourceKind::Audio, "fast-song", &fast, &cancel)
        .await
        .expect("fast fetch");
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "unrelated key was delayed by an in-flight derivation"
    );

    slow_task
        .await
        .expect("slow task completed")
        .expect("slow fetch succeeded");
}

// ============================================================================
// Scenarios C/D: missing record and missing raw source
// ============================================================================

#[tokio::test]
async fn missing_record_is_not_found() {
    let t = setup().await;
    let backend = MockBackend::new(b"unused");
    let cancel = CancellationToken::new();

    let err = t
        .cache
        .fetch(ResourceKind::Audio, "no-such-song", &backend, &cancel)
        .await
        .expect_err("should fail");
    assert!(matches!(err, CacheError::NotFound(_)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn missing_raw_file_is_not_found() {
    let t = setup().await;
    let backend = MockBackend::new(b"unused");
    let cancel = CancellationToken::new();

    // Record exists but its raw file does not
    sqlx::query(
        "INSERT INTO media_artifacts (kind, key, raw_path) VALUES ('audio', 'gone', '/nonexistent/gone.flac')",
    )
    .execute(&t.pool)
    .await
    .expect("seed record");

    let err = t
        .cache
        .fetch(ResourceKind::Audio, "gone", &backend, &cancel)
        .await
        .expect_err("should fail");
    assert!(matches!(err, CacheError::NotFound(_)));
    assert_eq!(backend.calls(), 0);
}

// ============================================================================
// Scenario E / P4: failure leaves no corrupt cache, next call retries
// ============================================================================

#[tokio::test]
async fn backend_failure_cleans_up_and_next_call_retries() {
    let t = setup().await;
    let backend = MockBackend::new(b"eventually fine").failing();
    let cancel = CancellationToken::new();
    seed_raw(&t, ResourceKind::Cover, "album-1").await;

    let err = t
        .cache
        .fetch(ResourceKind::Cover, "album-1", &backend, &cancel)
        .await
        .expect_err("should fail");
    assert!(matches!(err, CacheError::Internal(_)));
    assert_eq!(backend.calls(), 1);

    // No partial file at the target path, no derived locator persisted
    let target = t.cache_dir.path().join("cover").join("album-1.bin");
    assert!(!target.exists(), "partial artifact was left behind");
    assert_eq!(derived_path_in_db(&t, ResourceKind::Cover, "album-1").await, None);

    // A later request re-attempts derivation from scratch and succeeds
    backend.fail.store(false, Ordering::SeqCst);
    let artifact = t
        .cache
        .fetch(ResourceKind::Cover, "album-1", &backend, &cancel)
        .await
        .expect("retry succeeds");
    assert_eq!(read_all(artifact).await, b"eventually fine");
    assert_eq!(backend.calls(), 2);
}

// ============================================================================
// P5: self-healing when the cached file disappears externally
// ============================================================================

#[tokio::test]
async fn externally_deleted_artifact_is_rederived() {
    let t = setup().await;
    let backend = MockBackend::new(b"derived twice");
    let cancel = CancellationToken::new();
    seed_raw(&t, ResourceKind::Audio, "song-h").await;

    let artifact = t
        .cache
        .fetch(ResourceKind::Audio, "song-h", &backend, &cancel)
        .await
        .expect("first fetch");
    let cached_path = artifact.path.clone();
    drop(artifact);
    assert_eq!(backend.calls(), 1);

    // Someone deletes the cache file out from under us
    tokio::fs::remove_file(&cached_path).await.expect("delete cached file");

    let artifact = t
        .cache
        .fetch(ResourceKind::Audio, "song-h", &backend, &cancel)
        .await
        .expect("re-derive after external deletion");
    assert_eq!(read_all(artifact).await, b"derived twice");
    assert_eq!(backend.calls(), 2);
}

// ============================================================================
// Cancellation: clean abort, cleanup still runs
// ============================================================================

#[tokio::test]
async fn cancellation_during_derivation_cleans_up() {
    let t = setup().await;
    let backend = Arc::new(MockBackend::new(b"never written").with_delay(Duration::from_secs(5)));
    let cancel = CancellationToken::new();
    seed_raw(&t, ResourceKind::Audio, "song-c").await;

    let task = {
        let cache = Arc::clone(&t.cache);
        let backend = Arc::clone(&backend);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cache
                .fetch(ResourceKind::Audio, "song-c", backend.as_ref(), &cancel)
                .await
        })
    };

    // Cancel mid-derivation (the mock has already written partial output)
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = task.await.expect("task completed");
    assert!(matches!(result, Err(CacheError::Cancelled)));

    // Partial output removed, nothing persisted
    let target = t.cache_dir.path().join("audio").join("song-c.bin");
    assert!(!target.exists(), "partial artifact survived cancellation");
    assert_eq!(derived_path_in_db(&t, ResourceKind::Audio, "song-c").await, None);

    // The key is usable again afterwards
    let fresh = MockBackend::new(b"after cancel");
    let artifact = t
        .cache
        .fetch(ResourceKind::Audio, "song-c", &fresh, &CancellationToken::new())
        .await
        .expect("fetch after cancellation");
    assert_eq!(read_all(artifact).await, b"after cancel");
}

#[tokio::test]
async fn cancelled_wait_for_the_lock_never_derives() {
    let t = setup().await;
    let holder = Arc::new(MockBackend::new(b"holder").with_delay(Duration::from_millis(300)));
    let waiter_backend = MockBackend::new(b"waiter");
    seed_raw(&t, ResourceKind::Audio, "song-w").await;

    let holder_task = {
        let cache = Arc::clone(&t.cache);
        let holder = Arc::clone(&holder);
        tokio::spawn(async move {
            cache
                .fetch(
                    ResourceKind::Audio,
                    "song-w",
                    holder.as_ref(),
                    &CancellationToken::new(),
                )
                .await
        })
    };

    // Holder takes the lock, waiter queues on it, then withdraws
    tokio::time::sleep(Duration::from_millis(30)).await;
    let waiter_cancel = CancellationToken::new();
    let waiter = {
        let cache = Arc::clone(&t.cache);
        let cancel = waiter_cancel.clone();
        tokio::spawn(async move {
            cache
                .fetch(ResourceKind::Audio, "song-w", &waiter_backend, &cancel)
                .await
                .map(|_| ())
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    waiter_cancel.cancel();

    let waited = waiter.await.expect("waiter completed");
    assert!(matches!(waited, Err(CacheError::Cancelled)));

    // The holder is unaffected and completes exactly one derivation
    holder_task
        .await
        .expect("holder completed")
        .expect("holder fetch succeeded");
    assert_eq!(holder.calls(), 1);
}

// ============================================================================
// Remote fetch: no raw precondition, record created by the fetch itself
// ============================================================================

#[tokio::test]
async fn remote_fetch_creates_record_with_thumbnail_and_title() {
    let t = setup().await;
    let backend = MockBackend::new(b"video bytes").remote();
    let cancel = CancellationToken::new();

    // No record exists for this key; a raw-source backend would fail here
    let artifact = t
        .cache
        .fetch(ResourceKind::Video, "vid-42", &backend, &cancel)
        .await
        .expect("remote fetch");
    assert_eq!(read_all(artifact).await, b"video bytes");
    assert_eq!(backend.calls(), 1);

    let (thumbnail, title): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT thumbnail_path, title FROM media_artifacts WHERE kind = 'video' AND key = 'vid-42'",
    )
    .fetch_one(&t.pool)
    .await
    .expect("record created by fetch");
    assert!(thumbnail.expect("thumbnail persisted").ends_with("vid-42.jpg"));
    assert_eq!(title.as_deref(), Some("Mock Video"));

    // Second call is a cache hit
    t.cache
        .fetch(ResourceKind::Video, "vid-42", &backend, &cancel)
        .await
        .expect("cached fetch");
    assert_eq!(backend.calls(), 1);
}

// ============================================================================
// Stale partial output from a crashed attempt is discarded before deriving
// ============================================================================

#[tokio::test]
async fn stale_partial_at_target_path_is_replaced() {
    let t = setup().await;
    let backend = MockBackend::new(b"clean output");
    let cancel = CancellationToken::new();
    seed_raw(&t, ResourceKind::Audio, "song-s").await;

    // A previous attempt died and left garbage at the target path
    let target_dir = t.cache_dir.path().join("audio");
    tokio::fs::create_dir_all(&target_dir).await.expect("mkdir");
    tokio::fs::write(target_dir.join("song-s.bin"), b"garbage")
        .await
        .expect("write stale partial");

    let artifact = t
        .cache
        .fetch(ResourceKind::Audio, "song-s", &backend, &cancel)
        .await
        .expect("fetch");
    assert_eq!(read_all(artifact).await, b"clean output");
}
