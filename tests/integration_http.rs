use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures_util::StreamExt;
use http::StatusCode;
use reqchain::prelude::*;
use serde::Deserialize;

#[derive(Clone)]
struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Duration,
}

impl MockResponse {
    fn new(
        status: u16,
        headers: Vec<(&str, &str)>,
        body: impl Into<Vec<u8>>,
        delay: Duration,
    ) -> Self {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
            body: body.into(),
            delay,
        }
    }

    fn json(status: u16, body: &str) -> Self {
        Self::new(
            status,
            vec![("Content-Type", "application/json")],
            body,
            Duration::ZERO,
        )
    }
}

#[derive(Clone, Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

struct MockServer {
    base_url: String,
    served: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    join: Option<JoinHandle<()>>,
}

impl MockServer {
    fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let address = listener.local_addr().expect("read local address");
        listener
            .set_nonblocking(true)
            .expect("set listener nonblocking");

        let served = Arc::new(AtomicUsize::new(0));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let served_clone = Arc::clone(&served);
        let captured_clone = Arc::clone(&captured);

        let join = thread::spawn(move || {
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            let mut response_index = 0;

            while response_index < responses.len() && std::time::Instant::now() < deadline {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        if let Ok(request) = read_request(&mut stream) {
                            captured_clone
                                .lock()
                                .expect("lock captured requests")
                                .push(request);
                        }

                        served_clone.fetch_add(1, Ordering::SeqCst);
                        let response = &responses[response_index];
                        response_index += 1;

                        if !response.delay.is_zero() {
                            thread::sleep(response.delay);
                        }

                        let _ = write_response(&mut stream, response);
                    }
                    Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{address}/v1/"),
            served,
            captured,
            join: Some(join),
        }
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.captured
            .lock()
            .expect("lock captured requests")
            .clone()
    }

    fn served_count(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<CapturedRequest> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(1)))?;

    let mut raw = Vec::new();
    loop {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);
        if find_header_end(&raw).is_some() {
            break;
        }
    }

    let header_end = find_header_end(&raw).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "malformed request without header terminator",
        )
    })?;

    let header_text = String::from_utf8_lossy(&raw[..header_end]);
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "missing request line")
    })?;
    let mut request_line_parts = request_line.split_whitespace();
    let method = request_line_parts.next().unwrap_or_default().to_owned();
    let path = request_line_parts.next().unwrap_or_default().to_owned();

    let mut headers = BTreeMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = raw[header_end + 4..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn write_response(stream: &mut TcpStream, response: &MockResponse) -> std::io::Result<()> {
    let body = &response.body;
    let mut raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        status_text(response.status),
        body.len()
    );
    for (name, value) in &response.headers {
        raw.push_str(name);
        raw.push_str(": ");
        raw.push_str(value);
        raw.push_str("\r\n");
    }
    raw.push_str("\r\n");

    stream.write_all(raw.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::builder()
        .base_url(server.base_url.clone())
        .client_name("integration")
        .request_timeout(Duration::from_secs(1))
        .try_build()
        .expect("client should build")
}

#[derive(Debug, Deserialize)]
struct Listing {
    items: Vec<String>,
}

struct ListingQuery {
    page: u32,
    tags: Vec<&'static str>,
}

impl Fields for ListingQuery {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::scalar("page", self.page),
            Field::sequence("tag", &self.tags),
        ]
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_and_headers_reach_the_server() {
    let server = MockServer::start(vec![MockResponse::json(200, r#"{"items":["a","b"]}"#)]);
    let client = client_for(&server);

    let listing: Listing = client
        .get("items")
        .query(&ListingQuery {
            page: 2,
            tags: vec!["new", "hot"],
        })
        .expect("query should flatten")
        .include_header("x-request-source", "integration")
        .expect("header should parse")
        .send_json()
        .await
        .expect("listing should decode");
    assert_eq!(listing.items, vec!["a", "b"]);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(
        requests[0].path,
        "/v1/items?page=2&tag%5B%5D=new&tag%5B%5D=hot"
    );
    assert_eq!(
        requests[0]
            .headers
            .get("x-request-source")
            .map(String::as_str),
        Some("integration")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_unavailable_is_retried_then_succeeds() {
    let server = MockServer::start(vec![
        MockResponse::json(503, r#"{"error":"busy"}"#),
        MockResponse::json(200, r#"{"items":[]}"#),
    ]);
    let client = client_for(&server);

    let response = client
        .post("jobs")
        .body("payload")
        .retry(2, Duration::from_millis(10))
        .send()
        .await
        .expect("second attempt should be accepted");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.served_count(), 2);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|request| request.body == b"payload"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_request_is_not_retried() {
    let server = MockServer::start(vec![MockResponse::json(400, r#"{"error":"bad"}"#)]);
    let client = client_for(&server);

    let body = client
        .post("jobs")
        .retry(3, Duration::from_millis(10))
        .send_text_or_else(|failure| async move {
            match failure.into_response() {
                Some(response) => response.text().await,
                None => Ok(String::new()),
            }
        })
        .await
        .expect("error continuation should read the body");
    assert_eq!(body, r#"{"error":"bad"}"#);
    assert_eq!(server.served_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multipart_upload_is_posted() {
    struct Upload {
        title: &'static str,
        avatar: FileData,
    }

    impl Fields for Upload {
        fn fields(&self) -> Vec<Field<'_>> {
            vec![
                Field::scalar("title", self.title),
                Field::file("avatar", &self.avatar),
            ]
        }
    }

    let server = MockServer::start(vec![MockResponse::json(201, "{}")]);
    let client = client_for(&server);

    client
        .post("avatars")
        .form(&Upload {
            title: "portrait",
            avatar: FileData::new(&b"pixels"[..])
                .with_file_name("me.png")
                .with_content_type("image/png"),
        })
        .expect("form should assemble")
        .send()
        .await
        .expect("upload should be accepted");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let content_type = requests[0]
        .headers
        .get("content-type")
        .expect("content type header");
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("Content-Disposition: form-data; name=\"title\"\r\n\r\nportrait\r\n"));
    assert!(body.contains(
        "Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\npixels\r\n"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn url_encoded_form_sets_content_type() {
    struct Login {
        user: &'static str,
        password: &'static str,
    }

    impl Fields for Login {
        fn fields(&self) -> Vec<Field<'_>> {
            vec![
                Field::scalar("user", self.user),
                Field::scalar("password", self.password),
            ]
        }
    }

    let server = MockServer::start(vec![MockResponse::json(200, "{}")]);
    let client = client_for(&server);

    client
        .post("login")
        .form(&Login {
            user: "ada",
            password: "p&ss word",
        })
        .expect("form should encode")
        .send()
        .await
        .expect("login should be accepted");

    let requests = server.requests();
    assert_eq!(
        requests[0].headers.get("content-type").map(String::as_str),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(requests[0].body, b"user=ada&password=p%26ss+word");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_reads_body_after_headers() {
    let payload = "chunk".repeat(64);
    let server = MockServer::start(vec![MockResponse::new(
        200,
        vec![("Content-Type", "text/plain")],
        payload.clone(),
        Duration::ZERO,
    )]);
    let client = client_for(&server);

    let mut stream = client
        .get("download")
        .send_stream()
        .await
        .expect("stream should open");
    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        received.extend_from_slice(&chunk.expect("chunk should read"));
    }
    assert_eq!(received, payload.as_bytes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_response_times_out() {
    let server = MockServer::start(vec![MockResponse::new(
        200,
        vec![],
        "late",
        Duration::from_millis(300),
    )]);
    let client = HttpClient::builder()
        .base_url(server.base_url.clone())
        .request_timeout(Duration::from_millis(50))
        .try_build()
        .expect("client should build");

    let error = client
        .get("slow")
        .send()
        .await
        .expect_err("slow response should time out");
    assert!(matches!(error, Error::Timeout { .. }), "{error}");
    assert_eq!(error.code(), ErrorCode::Timeout);
    assert!(error.is_transport());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connection_is_a_transport_fault() {
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
        listener.local_addr().expect("read probe address")
    };
    let client = HttpClient::builder()
        .base_url(format!("http://{address}/"))
        .try_build()
        .expect("client should build");

    let error = client
        .get("nothing")
        .retry(1, Duration::from_millis(5))
        .send()
        .await
        .expect_err("closed port should refuse");
    assert!(matches!(error, Error::Transport { .. }), "{error}");
    assert_eq!(client.metrics_snapshot().attempts, 2);
    assert_eq!(client.metrics_snapshot().transport_faults, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_body_is_rejected() {
    let server = MockServer::start(vec![MockResponse::new(
        200,
        vec![],
        vec![b'x'; 64],
        Duration::ZERO,
    )]);
    let client = HttpClient::builder()
        .base_url(server.base_url.clone())
        .max_response_body_bytes(8)
        .try_build()
        .expect("client should build");

    let error = client
        .get("big")
        .send_bytes()
        .await
        .expect_err("body over the limit should fail");
    assert!(
        matches!(
            error,
            Error::ResponseBodyTooLarge {
                limit_bytes: 8,
                ..
            }
        ),
        "{error}"
    );
}

#[test]
fn base_url_with_query_is_rejected() {
    let error = HttpClient::builder()
        .base_url("http://localhost/v1/?token=1")
        .try_build()
        .expect_err("query in base url should be rejected");
    assert!(error.is_configuration());
}
