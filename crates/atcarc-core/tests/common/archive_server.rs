//! Minimal HTTP/1.1 server standing in for the LiveATC site in integration tests.
//!
//! Routes are matched on the full request target (path plus query). Each
//! connection serves one request and is closed.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
enum Reply {
    Body {
        content_type: &'static str,
        body: Vec<u8>,
    },
    Status(u16),
    /// Answers `status` for the first `failures` hits, then `body`.
    Flaky {
        failures: u32,
        status: u16,
        body: Vec<u8>,
    },
}

#[derive(Default)]
pub struct ArchiveServerBuilder {
    routes: HashMap<String, Reply>,
}

impl ArchiveServerBuilder {
    pub fn page(mut self, target: &str, html: &str) -> Self {
        self.routes.insert(
            target.to_string(),
            Reply::Body {
                content_type: "text/html; charset=utf-8",
                body: html.as_bytes().to_vec(),
            },
        );
        self
    }

    pub fn segment(mut self, target: &str, body: Vec<u8>) -> Self {
        self.routes.insert(
            target.to_string(),
            Reply::Body {
                content_type: "audio/mpeg",
                body,
            },
        );
        self
    }

    pub fn status(mut self, target: &str, code: u16) -> Self {
        self.routes.insert(target.to_string(), Reply::Status(code));
        self
    }

    pub fn flaky(mut self, target: &str, failures: u32, status: u16, body: Vec<u8>) -> Self {
        self.routes.insert(
            target.to_string(),
            Reply::Flaky {
                failures,
                status,
                body,
            },
        );
        self
    }

    /// Starts serving in a background thread until the process exits.
    pub fn start(self) -> ArchiveServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let routes = Arc::new(self.routes);
        let hits: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
        let server_hits = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let hits = Arc::clone(&server_hits);
                thread::spawn(move || handle(stream, &routes, &hits));
            }
        });
        ArchiveServer {
            base: format!("http://127.0.0.1:{}", port),
            hits,
        }
    }
}

pub struct ArchiveServer {
    base: String,
    hits: Arc<Mutex<HashMap<String, u32>>>,
}

impl ArchiveServer {
    pub fn builder() -> ArchiveServerBuilder {
        ArchiveServerBuilder::default()
    }

    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:40000`.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Number of requests received for `target`.
    pub fn hits(&self, target: &str) -> u32 {
        self.hits.lock().unwrap().get(target).copied().unwrap_or(0)
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    routes: &HashMap<String, Reply>,
    hits: &Mutex<HashMap<String, u32>>,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let Some(target) = request_target(request) else {
        return;
    };
    let hit = {
        let mut hits = hits.lock().unwrap();
        let count = hits.entry(target.to_string()).or_insert(0);
        *count += 1;
        *count
    };

    let (code, content_type, body): (u16, &str, &[u8]) = match routes.get(target) {
        Some(Reply::Body { content_type, body }) => (200, content_type, body),
        Some(Reply::Status(code)) => (*code, "text/plain", b""),
        Some(Reply::Flaky {
            failures,
            status,
            body,
        }) => {
            if hit <= *failures {
                (*status, "text/plain", b"")
            } else {
                (200, "audio/mpeg", body)
            }
        }
        None => (404, "text/plain", b""),
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        code,
        reason(code),
        content_type,
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body);
}

/// Target of a `GET <target> HTTP/1.1` request line.
fn request_target(request: &str) -> Option<&str> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    if !method.eq_ignore_ascii_case("GET") {
        return None;
    }
    parts.next()
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
