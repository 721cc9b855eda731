use qrshare::catalog::DownloadCatalog;
use qrshare::config::Config;
use qrshare::models::{ProgressResponse, UploadResponse};
use qrshare::network::Fixed;
use qrshare::server::{ServerStatus, StopOutcome, TransferServer};
use qrshare::state::AppState;
use qrshare::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

fn test_config(dir: &Path) -> Config {
    Config {
        bind_host: IpAddr::from([127, 0, 0, 1]),
        port: 0,
        upload_dir: dir.to_path_buf(),
        shutdown_timeout: Duration::from_secs(2),
        ..Config::default()
    }
}

fn test_server(dir: &Path) -> (TransferServer, Arc<AppState>) {
    let config = test_config(dir);
    let state = Arc::new(AppState::from_config(&config, Arc::new(DownloadCatalog::new())));
    let server = TransferServer::new(state.clone(), &config)
        .with_lan_source(Fixed(IpAddr::from([192, 168, 1, 50])));
    (server, state)
}

async fn accepts_connections(addr: SocketAddr) -> bool {
    TcpStream::connect(addr).await.is_ok()
}

#[tokio::test]
async fn test_start_and_stop() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, _state) = test_server(temp_dir.path());
    assert_eq!(server.status(), ServerStatus::Stopped);

    let started = server.start(0).await.unwrap();
    assert_ne!(started.addr.port(), 0);
    assert_eq!(server.status(), ServerStatus::Running(started.clone()));
    assert_eq!(server.local_addr(), Some(started.addr));
    assert!(accepts_connections(started.addr).await);

    let page = reqwest::get(format!("http://{}/", started.addr))
        .await
        .unwrap();
    assert_eq!(page.status(), 200);
    assert!(page.text().await.unwrap().contains("<h1>Upload files</h1>"));

    assert_eq!(server.stop().await.unwrap(), StopOutcome::Stopped);
    assert_eq!(server.status(), ServerStatus::Stopped);
    assert_eq!(server.session_url(), None);
    assert!(!accepts_connections(started.addr).await);

    // stopping again is not an error
    assert_eq!(server.stop().await.unwrap(), StopOutcome::NothingRunning);
}

#[tokio::test]
async fn test_start_while_running_closes_old_listener() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, _state) = test_server(temp_dir.path());

    let first = server.start(0).await.unwrap();
    let second = server.start(0).await.unwrap();
    assert_ne!(first.addr, second.addr);

    assert!(!accepts_connections(first.addr).await);
    assert!(accepts_connections(second.addr).await);

    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_leave_one_listener() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, _state) = test_server(temp_dir.path());

    let (a, b) = tokio::join!(server.start(0), server.start(0));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.addr, b.addr);

    let a_open = accepts_connections(a.addr).await;
    let b_open = accepts_connections(b.addr).await;
    assert!(a_open ^ b_open, "exactly one listener should remain");

    let last = if a_open { a } else { b };
    assert_eq!(server.status(), ServerStatus::Running(last.clone()));
    assert_eq!(server.local_addr(), Some(last.addr));

    assert_eq!(server.stop().await.unwrap(), StopOutcome::Stopped);
    assert!(!accepts_connections(last.addr).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_and_stop_do_not_interleave() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, _state) = test_server(temp_dir.path());
    let first = server.start(0).await.unwrap();

    for _ in 0..10 {
        let (restarted, stopped) = tokio::join!(server.restart(), server.stop());
        let restarted = restarted.unwrap();
        assert_eq!(restarted.addr, first.addr);

        // whichever ran last decides the final state
        match (server.status(), stopped.unwrap()) {
            (ServerStatus::Running(info), _) => {
                assert_eq!(info, restarted);
                assert!(accepts_connections(info.addr).await);
            }
            (ServerStatus::Stopped, StopOutcome::Stopped) => {
                assert!(!accepts_connections(first.addr).await);
            }
            (other, outcome) => panic!("unexpected {other:?} after {outcome:?}"),
        }
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_reuses_port() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, _state) = test_server(temp_dir.path());

    let first = server.start(0).await.unwrap();
    server.stop().await.unwrap();
    let again = server.restart().await.unwrap();
    assert_eq!(again.addr, first.addr);
    assert!(accepts_connections(again.addr).await);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, _state) = test_server(temp_dir.path());

    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let result = server.start(port).await;
    assert!(matches!(result, Err(Error::Bind { addr, .. }) if addr.port() == port));
    assert_eq!(server.status(), ServerStatus::Stopped);

    // the server is still usable afterwards
    let started = server.start(0).await.unwrap();
    assert!(accepts_connections(started.addr).await);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_session_url_follows_catalog_at_start() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, state) = test_server(temp_dir.path());

    let started = server.start(0).await.unwrap();
    assert_eq!(
        started.url,
        format!("http://192.168.1.50:{}", started.addr.port())
    );

    // adding a file while running does not change the url
    let path = temp_dir.path().join("movie.mkv");
    std::fs::write(&path, b"frames").unwrap();
    state.catalog.add_path(&path).unwrap();
    assert_eq!(server.session_url(), Some(started.url.clone()));

    let restarted = server.restart().await.unwrap();
    assert_eq!(
        restarted.url,
        format!("http://192.168.1.50:{}/download-page", restarted.addr.port())
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_advertise_host_overrides_discovery() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config {
        advertise_host: Some("share.lan".to_string()),
        ..test_config(temp_dir.path())
    };
    let state = Arc::new(AppState::from_config(&config, Arc::new(DownloadCatalog::new())));
    let server = TransferServer::new(state, &config);

    let started = server.start(0).await.unwrap();
    assert_eq!(started.url, format!("http://share.lan:{}", started.addr.port()));
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_download_over_http() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, state) = test_server(temp_dir.path());

    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let path = temp_dir.path().join("archive.zip");
    std::fs::write(&path, &content).unwrap();
    state.catalog.add_path(&path).unwrap();

    let started = server.start(0).await.unwrap();
    let response = reqwest::get(format!("http://{}/download?file=archive.zip", started.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-disposition"]
            .to_str()
            .unwrap(),
        "attachment; filename=\"archive.zip\"; filename*=UTF-8''archive%2Ezip"
    );
    assert_eq!(response.bytes().await.unwrap().to_vec(), content);

    let missing = reqwest::get(format!("http://{}/download?file=Archive.zip", started.addr))
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_progress_poll_during_streamed_upload() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, state) = test_server(temp_dir.path());
    let started = server.start(0).await.unwrap();
    let base = format!("http://{}", started.addr);

    const CHUNK: usize = 64 * 1024;
    const CHUNKS: usize = 16;
    let total = (CHUNK * CHUNKS) as u64;
    let upload_id = uuid::Uuid::new_v4().to_string();

    let (tx, rx) = tokio::sync::mpsc::channel::<Vec<u8>>(1);
    let body = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
    });
    let part = reqwest::multipart::Part::stream(reqwest::Body::wrap_stream(body))
        .file_name("slow.bin");
    let form = reqwest::multipart::Form::new().part("file", part);

    let client = reqwest::Client::new();
    let upload = tokio::spawn({
        let client = client.clone();
        let url = format!("{base}/upload?uploadId={upload_id}&size={total}");
        async move { client.post(url).multipart(form).send().await }
    });

    let poll = |client: reqwest::Client, url: String| async move {
        client
            .get(url)
            .send()
            .await
            .unwrap()
            .json::<ProgressResponse>()
            .await
            .unwrap()
    };
    let progress_url = format!("{base}/progress?uploadId={upload_id}");

    let mut last = 0u64;
    let mut saw_partial = false;
    for i in 0..CHUNKS {
        tx.send(vec![(i % 256) as u8; CHUNK]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let progress = poll(client.clone(), progress_url.clone()).await;
        if progress.total != 0 {
            assert_eq!(progress.total, total);
            assert!(progress.uploaded <= progress.total);
            assert!(progress.uploaded >= last, "progress went backwards");
            last = progress.uploaded;
            saw_partial |= progress.uploaded > 0 && progress.uploaded < total;
        }
    }
    drop(tx);

    let response = tokio::time::timeout(Duration::from_secs(10), upload)
        .await
        .expect("upload did not finish")
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), 200);
    let saved: UploadResponse = response.json().await.unwrap();
    assert_eq!(saved.size, total);
    assert!(saw_partial, "never observed an in-flight upload");

    assert_eq!(
        poll(client.clone(), progress_url).await,
        ProgressResponse::default()
    );
    assert!(state.sessions.is_empty());
    assert_eq!(
        std::fs::metadata(temp_dir.path().join("slow.bin")).unwrap().len(),
        total
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_abandoned_upload_ends_session() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (server, state) = test_server(temp_dir.path());
    let started = server.start(0).await.unwrap();

    let (tx, rx) = tokio::sync::mpsc::channel::<Vec<u8>>(1);
    let body = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
    });
    let part = reqwest::multipart::Part::stream(reqwest::Body::wrap_stream(body))
        .file_name("abandoned.bin");
    let form = reqwest::multipart::Form::new().part("file", part);
    let url = format!("http://{}/upload?uploadId=gone&size=1000000", started.addr);
    let upload = tokio::spawn(async move { reqwest::Client::new().post(url).multipart(form).send().await });

    tx.send(vec![1u8; 32 * 1024]).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.sessions.snapshot("gone").is_none() {
        assert!(tokio::time::Instant::now() < deadline, "upload never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // abandon the request mid-body
    upload.abort();
    drop(tx);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !state.sessions.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "session leaked");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // nothing half-written is left behind
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

    server.stop().await.unwrap();
}
