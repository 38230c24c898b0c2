use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode, header};
use bytes::Bytes;
use futures::{StreamExt, stream};
use http_body_util::BodyExt;
use igv_file_proxy::models::{
    object::{ObjectHandle, ObjectPath},
    range::RangeSpec,
};
use igv_file_proxy::routes::routes::routes;
use igv_file_proxy::services::{
    proxy_service::ProxyService,
    responder::StreamingResponder,
    store::{ByteStream, ObjectStore, RemoteObjectStore, StoreResult},
};
use object_store::{ObjectStore as _, PutPayload, memory::InMemory, path::Path};
use tower::ServiceExt;

/// Real in-memory backend that counts how often each operation runs.
struct CountingStore {
    inner: RemoteObjectStore,
    resolves: AtomicUsize,
    fetches: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn resolve(&self, path: &ObjectPath) -> StoreResult<ObjectHandle> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(path).await
    }

    async fn fetch(&self, handle: &ObjectHandle, range: &RangeSpec) -> StoreResult<ByteStream> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(handle, range).await
    }

    async fn check_ready(&self) -> StoreResult<()> {
        self.inner.check_ready().await
    }
}

/// Claims every object exists with `size` bytes and serves whatever
/// `body` produces.
struct ScriptedStore {
    size: u64,
    body: Box<dyn Fn() -> ByteStream + Send + Sync>,
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn resolve(&self, path: &ObjectPath) -> StoreResult<ObjectHandle> {
        Ok(ObjectHandle::new(
            path.clone(),
            Path::from(path.as_str()),
            self.size,
        ))
    }

    async fn fetch(&self, _handle: &ObjectHandle, _range: &RangeSpec) -> StoreResult<ByteStream> {
        Ok((self.body)())
    }

    async fn check_ready(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn counting_app(objects: &[(&str, Vec<u8>)]) -> (Router, Arc<CountingStore>) {
    let backend = Arc::new(InMemory::new());
    for (key, data) in objects {
        backend
            .put(&Path::from(*key), PutPayload::from(data.clone()))
            .await
            .unwrap();
    }
    let store = Arc::new(CountingStore {
        inner: RemoteObjectStore::new(backend, Path::default()),
        resolves: AtomicUsize::new(0),
        fetches: AtomicUsize::new(0),
    });
    let shared: Arc<dyn ObjectStore> = store.clone();
    let app = routes().with_state(ProxyService::new(shared, StreamingResponder::default()));
    (app, store)
}

fn scripted_app(store: ScriptedStore) -> Router {
    routes().with_state(ProxyService::new(
        Arc::new(store),
        StreamingResponder::default(),
    ))
}

async fn send(app: &Router, method: Method, uri: &str, range: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(range) = range {
        builder = builder.header(header::RANGE, range);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(res: Response<Body>) -> Bytes {
    res.into_body().collect().await.unwrap().to_bytes()
}

fn header_str<'a>(res: &'a Response<Body>, name: header::HeaderName) -> Option<&'a str> {
    res.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn partial_range_returns_exact_span() {
    let data = sample_data(1000);
    let (app, _) = counting_app(&[("sample.bam", data.clone())]).await;

    let res = send(&app, Method::GET, "/files/sample.bam", Some("bytes=100-199")).await;

    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&res, header::CONTENT_RANGE),
        Some("bytes 100-199/1000")
    );
    assert_eq!(header_str(&res, header::CONTENT_LENGTH), Some("100"));
    assert_eq!(header_str(&res, header::ACCEPT_RANGES), Some("bytes"));
    assert_eq!(body_bytes(res).await.as_ref(), &data[100..200]);
}

#[tokio::test]
async fn open_ended_range_runs_to_end() {
    let data = sample_data(1000);
    let (app, _) = counting_app(&[("sample.bam", data.clone())]).await;

    let res = send(&app, Method::GET, "/files/sample.bam", Some("bytes=900-")).await;

    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&res, header::CONTENT_RANGE),
        Some("bytes 900-999/1000")
    );
    assert_eq!(header_str(&res, header::CONTENT_LENGTH), Some("100"));
    assert_eq!(body_bytes(res).await.as_ref(), &data[900..]);
}

#[tokio::test]
async fn ranges_match_slices_of_the_full_object() {
    let data = sample_data(1000);
    let (app, _) = counting_app(&[("sample.bam", data.clone())]).await;

    for (a, b) in [(0u64, 0u64), (1, 998), (500, 500), (999, 999), (123, 456)] {
        let range = format!("bytes={}-{}", a, b);
        let res = send(&app, Method::GET, "/files/sample.bam", Some(range.as_str())).await;
        assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_str(&res, header::CONTENT_RANGE).map(str::to_string),
            Some(format!("bytes {}-{}/1000", a, b))
        );
        let body = body_bytes(res).await;
        assert_eq!(body.len() as u64, b - a + 1);
        assert_eq!(body.as_ref(), &data[a as usize..=b as usize]);
    }
}

#[tokio::test]
async fn no_range_and_whole_range_serve_the_same_bytes() {
    let data = sample_data(1000);
    let (app, _) = counting_app(&[("sample.bam", data.clone())]).await;

    let plain = send(&app, Method::GET, "/files/sample.bam", None).await;
    assert_eq!(plain.status(), StatusCode::OK);
    assert_eq!(header_str(&plain, header::CONTENT_LENGTH), Some("1000"));
    assert_eq!(header_str(&plain, header::ACCEPT_RANGES), Some("bytes"));
    assert!(plain.headers().get(header::CONTENT_RANGE).is_none());
    let plain_body = body_bytes(plain).await;

    let ranged = send(&app, Method::GET, "/files/sample.bam", Some("bytes=0-")).await;
    assert!(ranged.status().is_success());
    let ranged_body = body_bytes(ranged).await;

    assert_eq!(plain_body.as_ref(), data.as_slice());
    assert_eq!(plain_body, ranged_body);
}

#[tokio::test]
async fn unsatisfiable_range_streams_nothing() {
    let (app, store) = counting_app(&[("sample.bam", sample_data(1000))]).await;

    for range in ["bytes=1000-1050", "bytes=500-100", "bytes=1000-", "bytes=0-1000"] {
        let res = send(&app, Method::GET, "/files/sample.bam", Some(range)).await;
        assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{range}");
        assert_eq!(header_str(&res, header::CONTENT_RANGE), Some("bytes */1000"));
        assert!(body_bytes(res).await.is_empty());
    }
    assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_range_is_rejected() {
    let (app, store) = counting_app(&[("sample.bam", sample_data(1000))]).await;

    for range in ["bytes=0-10,20-30", "bytes=-100", "items=0-10", "bytes=x-"] {
        let res = send(&app, Method::GET, "/files/sample.bam", Some(range)).await;
        assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{range}");
        assert!(body_bytes(res).await.is_empty());
    }
    assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn head_reports_size_without_body() {
    let (app, store) = counting_app(&[("sample.bam", sample_data(1000))]).await;

    let head = send(&app, Method::HEAD, "/files/sample.bam", None).await;
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(header_str(&head, header::CONTENT_LENGTH), Some("1000"));
    assert!(body_bytes(head).await.is_empty());
    assert_eq!(store.fetches.load(Ordering::SeqCst), 0);

    let get = send(&app, Method::GET, "/files/sample.bam", None).await;
    assert_eq!(header_str(&get, header::CONTENT_LENGTH), Some("1000"));
}

#[tokio::test]
async fn missing_objects_are_404_without_fetching() {
    let (app, store) = counting_app(&[("sample.bam", sample_data(10))]).await;

    let head = send(&app, Method::HEAD, "/files/missing.bam", None).await;
    assert_eq!(head.status(), StatusCode::NOT_FOUND);
    assert!(head.headers().get(header::CONTENT_LENGTH).is_none());
    assert!(body_bytes(head).await.is_empty());

    let get = send(&app, Method::GET, "/files/missing.bam", Some("bytes=0-5")).await;
    assert_eq!(get.status(), StatusCode::NOT_FOUND);
    assert!(body_bytes(get).await.is_empty());

    assert_eq!(store.resolves.load(Ordering::SeqCst), 2);
    assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn nested_keys_are_one_path() {
    let (app, _) = counting_app(&[("runs/2024/sample.bam", b"nested bytes".to_vec())]).await;

    let res = send(&app, Method::GET, "/files/runs/2024/sample.bam", Some("bytes=7-11")).await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(res).await.as_ref(), b"bytes");
}

#[tokio::test]
async fn paths_are_not_normalized() {
    let (app, store) = counting_app(&[("sample.bam", sample_data(1000))]).await;

    for uri in ["/files/sample.bam/", "/files//sample.bam"] {
        let get = send(&app, Method::GET, uri, None).await;
        assert_eq!(get.status(), StatusCode::NOT_FOUND, "{uri}");
        assert!(body_bytes(get).await.is_empty());

        let head = send(&app, Method::HEAD, uri, None).await;
        assert_eq!(head.status(), StatusCode::NOT_FOUND, "{uri}");
    }
    assert_eq!(store.fetches.load(Ordering::SeqCst), 0);

    let exact = send(&app, Method::GET, "/files/sample.bam", None).await;
    assert_eq!(exact.status(), StatusCode::OK);
}

/// Metadata probe that never answers.
struct StalledStore;

#[async_trait]
impl ObjectStore for StalledStore {
    async fn resolve(&self, _path: &ObjectPath) -> StoreResult<ObjectHandle> {
        futures::future::pending().await
    }

    async fn fetch(&self, _handle: &ObjectHandle, _range: &RangeSpec) -> StoreResult<ByteStream> {
        unreachable!("nothing resolves")
    }

    async fn check_ready(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_probe_times_out_as_not_found() {
    let responder = StreamingResponder::new(
        8192,
        Duration::from_secs(5),
        Duration::from_secs(5),
    );
    let app = routes().with_state(ProxyService::new(Arc::new(StalledStore), responder));

    let head = send(&app, Method::HEAD, "/files/sample.bam", None).await;
    assert_eq!(head.status(), StatusCode::NOT_FOUND);

    let get = send(&app, Method::GET, "/files/sample.bam", Some("bytes=0-9")).await;
    assert_eq!(get.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn every_request_resolves_again() {
    let (app, store) = counting_app(&[("sample.bam", sample_data(10))]).await;

    send(&app, Method::HEAD, "/files/sample.bam", None).await;
    send(&app, Method::HEAD, "/files/sample.bam", None).await;
    assert_eq!(store.resolves.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn backend_failure_mid_stream_truncates_the_body() {
    let app = scripted_app(ScriptedStore {
        size: 8,
        body: Box::new(|| {
            stream::iter(vec![
                Ok(Bytes::from_static(b"abcd")),
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            ])
            .boxed()
        }),
    });

    let res = send(&app, Method::GET, "/files/sample.bam", None).await;
    // headers were already committed
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header_str(&res, header::CONTENT_LENGTH), Some("8"));
    assert!(res.into_body().collect().await.is_err());
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn client_disconnect_releases_backend_stream() {
    let released = Arc::new(AtomicBool::new(false));
    let flag = released.clone();
    let app = scripted_app(ScriptedStore {
        size: 1 << 30,
        body: Box::new(move || {
            let guard = DropFlag(flag.clone());
            stream::unfold(guard, |guard| async move {
                Some((Ok::<_, std::io::Error>(Bytes::from(vec![0u8; 4096])), guard))
            })
            .boxed()
        }),
    });

    let res = send(&app, Method::GET, "/files/huge.bam", None).await;
    let mut body = res.into_body();
    let first = body.frame().await.unwrap().unwrap();
    assert!(first.is_data());
    drop(body);

    for _ in 0..100 {
        if released.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn health_and_readiness() {
    let (app, _) = counting_app(&[]).await;

    let health = send(&app, Method::GET, "/healthz", None).await;
    assert_eq!(health.status(), StatusCode::OK);

    let ready = send(&app, Method::GET, "/readyz", None).await;
    assert_eq!(ready.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(ready).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["backend"]["ok"], true);
}
