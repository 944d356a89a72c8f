#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end behavior of submit and list over in-memory stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Barrier;
use wds_signups::{
    Fetched, MemoryStore, RecordKind, RecordStore, RetryPolicy, SignupError, Signups, StoreError,
    VersionToken,
};

const WAITLIST: &str = "data/waitlist.csv";
const SPONSORS: &str = "data/sponsors.csv";

fn signups(store: Arc<dyn RecordStore>) -> Signups {
    Signups::new(store).with_retry(RetryPolicy::immediate())
}

fn data_lines(content: &str) -> Vec<&str> {
    content.lines().skip(1).filter(|l| !l.is_empty()).collect()
}

#[tokio::test]
async fn valid_waitlist_submission_adds_exactly_one_trimmed_row() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(WAITLIST, "timestamp,name,email,role,note\nt0,Al,al@x.com,Ops,\n")
        .await;
    let signups = signups(store.clone());

    let submitted = signups
        .submit(
            "waitlist",
            &json!({"name": "  Jo Lee ", "email": " jo@x.com\t", "role": "Dev"}),
        )
        .await
        .unwrap();
    assert!(!submitted.bot);
    assert_eq!(submitted.attempts, 1);

    let content = store.content(WAITLIST).await.unwrap();
    assert_eq!(data_lines(&content).len(), 2);

    let table = signups.list("waitlist").await.unwrap();
    let last = table.rows.last().unwrap();
    assert_eq!(last.get("name"), Some("Jo Lee"));
    assert_eq!(last.get("email"), Some("jo@x.com"));
    assert_eq!(last.get("role"), Some("Dev"));
    assert!(last.get("timestamp").unwrap().ends_with('Z'));
}

#[tokio::test]
async fn first_append_creates_file_with_header() {
    let store = Arc::new(MemoryStore::new());
    let signups = signups(store.clone());

    signups
        .submit("sponsor", &json!({"org": "Acme", "name": "Jo", "email": "jo@x.com"}))
        .await
        .unwrap();

    let content = store.content(SPONSORS).await.unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("timestamp,org,name,email,phone,subject,message,budget,interests")
    );
    assert!(lines.next().unwrap().ends_with(",Acme,Jo,jo@x.com,,,,,"));
    assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn honeypot_never_persists_even_when_invalid() {
    let store = Arc::new(MemoryStore::new());
    let signups = signups(store.clone());

    let submitted = signups
        .submit("waitlist", &json!({"honey": "filled", "email": ""}))
        .await
        .unwrap();
    assert!(submitted.bot);

    let submitted = signups
        .submit("sponsor", &json!({"honeypot": "yes", "org": "A", "name": "B", "email": "c"}))
        .await
        .unwrap();
    assert!(submitted.bot);

    assert_eq!(store.content(WAITLIST).await, None);
    assert_eq!(store.content(SPONSORS).await, None);
}

#[tokio::test]
async fn missing_fields_are_named_and_file_is_unmodified() {
    let store = Arc::new(MemoryStore::new());
    let original = "timestamp,name,email,role,note\nt0,Al,al@x.com,Ops,\n";
    store.insert(WAITLIST, original).await;
    let signups = signups(store.clone());

    let err = signups
        .submit("waitlist", &json!({"name": "Jo", "email": "   "}))
        .await
        .unwrap_err();
    match err {
        SignupError::MissingFields { kind, fields } => {
            assert_eq!(kind, RecordKind::Waitlist);
            assert_eq!(fields, vec!["email"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = signups.submit("sponsor", &json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        SignupError::MissingFields { ref fields, .. } if fields == &vec!["org", "name", "email"]
    ));

    assert_eq!(store.content(WAITLIST).await.as_deref(), Some(original));
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
    let signups = signups(Arc::new(MemoryStore::new()));
    assert!(matches!(
        signups.submit("volunteer", &json!({"name": "Jo"})).await,
        Err(SignupError::UnknownKind(kind)) if kind == "volunteer"
    ));
    assert!(matches!(
        signups.list("volunteer").await,
        Err(SignupError::UnknownKind(_))
    ));
}

#[tokio::test]
async fn quoted_values_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let signups = signups(store);
    let note = "Hi, \"friend\"\nsecond line";

    signups
        .submit(
            "waitlist",
            &json!({"name": "Jo", "email": "jo@x.com", "note": note}),
        )
        .await
        .unwrap();

    let table = signups.list("waitlist").await.unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows[0].get("note"), Some(note));
}

#[tokio::test]
async fn listing_missing_file_returns_canonical_header() {
    let signups = signups(Arc::new(MemoryStore::new()));
    let table = signups.list("waitlist").await.unwrap();
    assert!(table.is_empty());
    assert_eq!(table.columns, vec!["timestamp", "name", "email", "role", "note"]);
    assert_eq!(table.to_csv(), "timestamp,name,email,role,note\n");
}

#[tokio::test]
async fn legacy_ua_ip_columns_are_redacted_for_every_row() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(
            SPONSORS,
            "timestamp,org,name,email,phone,subject,message,budget,interests,ua,ip\n\
             t1,Acme,Jo,jo@x.com,,,,,,Mozilla/5.0,10.0.0.1\n\
             t2,Beta,Al,al@x.com,,,,,\n",
        )
        .await;
    let signups = signups(store);

    let table = signups.list("sponsor").await.unwrap();
    assert_eq!(table.columns.len(), 9);
    assert!(!table.columns.iter().any(|c| c == "ua" || c == "ip"));
    assert_eq!(table.len(), 2);
    for row in &table.rows {
        assert_eq!(row.iter().count(), 9);
    }
    let csv = table.to_csv();
    assert!(!csv.contains("Mozilla"));
    assert!(!csv.contains("10.0.0.1"));
}

#[tokio::test]
async fn append_to_legacy_file_rewrites_header_only() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(
            WAITLIST,
            "timestamp,name,email,role,note,ua,ip\nt1,Al,al@x.com,Ops,,Mozilla,10.0.0.1\n",
        )
        .await;
    let signups = signups(store.clone());

    signups
        .submit("waitlist", &json!({"name": "Jo", "email": "jo@x.com"}))
        .await
        .unwrap();

    let content = store.content(WAITLIST).await.unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "timestamp,name,email,role,note");
    assert_eq!(lines[1], "t1,Al,al@x.com,Ops,,Mozilla,10.0.0.1");
    assert_eq!(lines.len(), 3);

    let table = signups.list("waitlist").await.unwrap();
    assert_eq!(table.rows[0].get("note"), Some(""));
    assert!(!table.to_csv().contains("Mozilla"));
}

#[tokio::test]
async fn append_keeps_ua_ip_hidden_when_header_lacks_timestamp() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(WAITLIST, "name,email,ua,ip\nAl,al@x.com,Mozilla,1.2.3.4\n")
        .await;
    let signups = signups(store.clone());

    signups
        .submit("waitlist", &json!({"name": "Jo", "email": "jo@x.com"}))
        .await
        .unwrap();

    let content = store.content(WAITLIST).await.unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("name,email,timestamp,role,note"));
    assert_eq!(lines.next(), Some("Al,al@x.com"));
    assert!(!content.contains("Mozilla"));
    assert!(!content.contains("1.2.3.4"));

    let table = signups.list("waitlist").await.unwrap();
    assert_eq!(table.columns, vec!["name", "email", "timestamp", "role", "note"]);
    assert_eq!(table.len(), 2);
    let legacy = &table.rows[0];
    assert_eq!(legacy.get("name"), Some("Al"));
    assert_eq!(legacy.get("email"), Some("al@x.com"));
    assert_eq!(legacy.get("timestamp"), Some(""));
    assert_eq!(legacy.get("role"), Some(""));
    assert_eq!(table.rows[1].get("name"), Some("Jo"));
    assert!(!table.to_csv().contains("Mozilla"));
}

#[tokio::test]
async fn sponsor_aliases_are_stored_under_canonical_columns() {
    let store = Arc::new(MemoryStore::new());
    let signups = signups(store);

    signups
        .submit(
            "sponsor",
            &json!({"company": "Acme", "contact": "Jo", "contact_email": "jo@x.com"}),
        )
        .await
        .unwrap();

    let table = signups.list("sponsor").await.unwrap();
    let row = &table.rows[0];
    assert_eq!(row.get("org"), Some("Acme"));
    assert_eq!(row.get("name"), Some("Jo"));
    assert_eq!(row.get("email"), Some("jo@x.com"));
}

#[tokio::test]
async fn legacy_payload_shapes_are_accepted() {
    let store = Arc::new(MemoryStore::new());
    let signups = signups(store);

    signups
        .submit_payload(&json!({
            "type": "waitlist",
            "name": "Jo",
            "email": "jo@x.com",
            "discipline": "Design",
            "notes": "see you",
        }))
        .await
        .unwrap();

    let table = signups.list("waitlist").await.unwrap();
    assert_eq!(table.rows[0].get("role"), Some("Design"));
    assert_eq!(table.rows[0].get("note"), Some("see you"));
}

/// Lets the first `racers` fetches through only once all of them have read,
/// so every racer writes against the same version.
struct RacingStore {
    inner: MemoryStore,
    barrier: Barrier,
    racers: usize,
    fetches: AtomicUsize,
    writes: AtomicUsize,
}

impl RacingStore {
    fn new(racers: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            barrier: Barrier::new(racers),
            racers,
            fetches: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordStore for RacingStore {
    async fn fetch(&self, path: &str) -> Result<Fetched, StoreError> {
        let fetched = self.inner.fetch(path).await;
        if self.fetches.fetch_add(1, Ordering::SeqCst) < self.racers {
            self.barrier.wait().await;
        }
        fetched
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        version: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(path, content, version).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_appends_to_empty_file_both_land() {
    let store = Arc::new(RacingStore::new(2));
    let signups = signups(store.clone());

    let a = json!({"name": "A", "email": "a@x.com"});
    let b = json!({"name": "B", "email": "b@x.com"});
    let (first, second) = tokio::join!(
        signups.submit("waitlist", &a),
        signups.submit("waitlist", &b),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    let mut attempts = [first.attempts, second.attempts];
    attempts.sort_unstable();
    assert_eq!(attempts, [1, 2]);
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);

    let content = store.inner.content(WAITLIST).await.unwrap();
    assert_eq!(data_lines(&content).len(), 2);
    let table = signups.list("waitlist").await.unwrap();
    let mut names: Vec<&str> = table.rows.iter().filter_map(|r| r.get("name")).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["A", "B"]);
}

/// Every write loses to a phantom concurrent writer.
#[derive(Default)]
struct AlwaysConflicts {
    writes: AtomicUsize,
}

#[async_trait]
impl RecordStore for AlwaysConflicts {
    async fn fetch(&self, _path: &str) -> Result<Fetched, StoreError> {
        Ok(Fetched::Missing)
    }

    async fn write(
        &self,
        path: &str,
        _content: &str,
        _version: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Conflict {
            path: path.to_string(),
        })
    }
}

#[tokio::test]
async fn exhausted_retries_surface_write_conflict() {
    let store = Arc::new(AlwaysConflicts::default());
    let signups = signups(store.clone());

    let err = signups
        .submit("waitlist", &json!({"name": "Jo", "email": "jo@x.com"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SignupError::WriteConflict { ref path, attempts: 3 } if path == WAITLIST
    ));
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);
}

/// Reads fail with a server error; writes must never be attempted.
#[derive(Default)]
struct BrokenReads {
    fetches: AtomicUsize,
    writes: AtomicUsize,
}

#[async_trait]
impl RecordStore for BrokenReads {
    async fn fetch(&self, _path: &str) -> Result<Fetched, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Transient {
            status: Some(503),
            message: "unavailable".to_string(),
        })
    }

    async fn write(
        &self,
        _path: &str,
        _content: &str,
        _version: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(VersionToken::new("never"))
    }
}

#[tokio::test]
async fn transient_read_failure_is_not_retried() {
    let store = Arc::new(BrokenReads::default());
    let signups = signups(store.clone());

    let err = signups
        .submit("waitlist", &json!({"name": "Jo", "email": "jo@x.com"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SignupError::Fetch(StoreError::Transient { .. })));
    assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);

    assert!(matches!(
        signups.list("sponsor").await,
        Err(SignupError::Fetch(_))
    ));
    assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
}
