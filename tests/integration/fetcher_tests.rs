use crate::fast_fetcher_config;
use catalog_harvest::crawler::{AdaptiveFetcher, FetchFailure, FetchResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_rate_limit_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cat/engine/assy/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cat/engine/assy/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = AdaptiveFetcher::new(&fast_fetcher_config(5)).unwrap();
    let result = fetcher
        .fetch(&format!("{}/cat/engine/assy/", server.uri()))
        .await;

    assert!(result.is_ok(), "expected success, got {:?}", result.error());
    assert_eq!(result.into_body().as_deref(), Some("<html>ok</html>"));
    assert_eq!(fetcher.delay().failure_count(), 3);
    assert_eq!(fetcher.delay().success_count(), 1);
}

#[tokio::test]
async fn test_rate_limit_exhausts_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let mut fetcher = AdaptiveFetcher::new(&fast_fetcher_config(2)).unwrap();
    let result = fetcher.fetch(&format!("{}/cat/a/b/", server.uri())).await;

    assert!(matches!(
        result,
        FetchResult::Failure(FetchFailure::RateLimited { attempts: 2 })
    ));
    assert_eq!(result.status(), Some(429));
    assert_eq!(fetcher.delay().failure_count(), 2);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = AdaptiveFetcher::new(&fast_fetcher_config(5)).unwrap();
    let result = fetcher.fetch(&format!("{}/missing/", server.uri())).await;

    assert!(matches!(
        result,
        FetchResult::Failure(FetchFailure::Http { status: 404 })
    ));
    // Only rate limits and network errors grow the delay
    assert_eq!(fetcher.delay().failure_count(), 0);
}

#[tokio::test]
async fn test_session_carries_cookies_and_referer() {
    let server = MockServer::start().await;
    let first = format!("{}/cat/engine/assy/", server.uri());

    Mock::given(method("GET"))
        .and(path("/cat/engine/assy/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "sid=abc123; Path=/")
                .set_body_string("<html>first</html>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cat/engine/oil-pan/"))
        .and(header("cookie", "sid=abc123"))
        .and(header("referer", first.as_str()))
        .and(header("sec-fetch-site", "same-origin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>second</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = AdaptiveFetcher::new(&fast_fetcher_config(1)).unwrap();
    assert!(fetcher.fetch(&first).await.is_ok());
    assert_eq!(fetcher.session().cookie_count(), 1);

    let second = fetcher
        .fetch(&format!("{}/cat/engine/oil-pan/", server.uri()))
        .await;
    assert!(second.is_ok(), "session headers missing: {:?}", second.error());
}

#[tokio::test]
async fn test_image_fetch_keeps_referer_anchor() {
    let server = MockServer::start().await;
    let page = format!("{}/cat/engine/assy/", server.uri());

    Mock::given(method("GET"))
        .and(path("/cat/engine/assy/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/head.png"))
        .and(header("sec-fetch-dest", "image"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
        .mount(&server)
        .await;

    let mut fetcher = AdaptiveFetcher::new(&fast_fetcher_config(1)).unwrap();
    assert!(fetcher.fetch(&page).await.is_ok());

    let image = fetcher
        .fetch_image(&format!("{}/img/head.png", server.uri()))
        .await;
    assert_eq!(image.into_body(), Some(vec![0x89, b'P', b'N', b'G']));
    assert_eq!(fetcher.session().last_url(), Some(page.as_str()));
}

/// Announces 100 body bytes, sends 3, then drops the connection
const TRUNCATED_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
    Content-Length: 100\r\n\
    Set-Cookie: sid=broken\r\n\
    \r\n\
    abc";

const FULL_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
    Content-Length: 15\r\n\
    Connection: close\r\n\
    \r\n\
    <html>ok</html>";

/// Serves one canned response per connection, in order
async fn spawn_raw_server(responses: Vec<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            read_request_head(&mut socket).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}/cat/engine/assy/", addr)
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }
}

#[tokio::test]
async fn test_body_cut_off_is_retried() {
    let url = spawn_raw_server(vec![TRUNCATED_RESPONSE, FULL_RESPONSE]).await;

    let mut fetcher = AdaptiveFetcher::new(&fast_fetcher_config(5)).unwrap();
    let result = fetcher.fetch(&url).await;

    assert!(result.is_ok(), "expected retry to succeed, got {:?}", result.error());
    assert_eq!(result.into_body().as_deref(), Some("<html>ok</html>"));
    assert_eq!(fetcher.delay().failure_count(), 1);
    assert_eq!(fetcher.delay().success_count(), 1);
    assert_eq!(fetcher.session().last_url(), Some(url.as_str()));
    // Cookies from the broken exchange are not kept
    assert!(fetcher.session().cookie("sid").is_none());
}

#[tokio::test]
async fn test_body_cut_off_on_every_attempt() {
    let url = spawn_raw_server(vec![TRUNCATED_RESPONSE, TRUNCATED_RESPONSE]).await;

    let mut fetcher = AdaptiveFetcher::new(&fast_fetcher_config(2)).unwrap();
    let result = fetcher.fetch(&url).await;

    assert!(matches!(
        result,
        FetchResult::Failure(FetchFailure::Network { .. })
    ));
    assert_eq!(fetcher.delay().failure_count(), 2);
    assert_eq!(fetcher.delay().success_count(), 0);
    assert!(fetcher.session().last_url().is_none());
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_fails() {
    // Bind a port, then free it so nothing is listening there
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let mut fetcher = AdaptiveFetcher::new(&fast_fetcher_config(3)).unwrap();
    let result = fetcher
        .fetch(&format!("http://{}/cat/engine/assy/", addr))
        .await;

    assert!(matches!(
        result,
        FetchResult::Failure(FetchFailure::Network { .. })
    ));
    assert_eq!(result.status(), None);
    assert_eq!(fetcher.delay().failure_count(), 3);
    assert_eq!(fetcher.delay().success_count(), 0);
}
