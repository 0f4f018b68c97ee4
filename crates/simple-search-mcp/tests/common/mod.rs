#![allow(dead_code)]

use axum::Router;
use std::net::SocketAddr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub const PAGE: &str = r#"<html><body>
<div class="results">
  <div class="result results_links web-result">
    <div class="links_main result__body">
      <h2 class="result__title">
        <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F">Rust Programming Language</a>
      </h2>
      <a class="result__snippet" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F">A language empowering <b>everyone</b>.</a>
    </div>
  </div>
  <div class="result results_links web-result">
    <div class="links_main result__body">
      <h2 class="result__title">
        <a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The Rust Book</a>
      </h2>
      <a class="result__snippet" href="https://doc.rust-lang.org/book/">Learn Rust.</a>
    </div>
  </div>
</div>
</body></html>"#;

pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn call_line(id: u64, query: &str) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": "search_web", "arguments": {"query": query}}
    })
    .to_string()
}

pub struct Session {
    pub status: ExitStatus,
    pub stdout: Vec<serde_json::Value>,
    pub stderr: Vec<serde_json::Value>,
}

impl Session {
    pub fn response(&self, id: u64) -> &serde_json::Value {
        self.stdout
            .iter()
            .find(|v| v["id"].as_u64() == Some(id))
            .unwrap_or_else(|| panic!("no response for id {id}: {:?}", self.stdout))
    }

    pub fn tool_text(&self, id: u64) -> String {
        self.response(id)["result"]["content"][0]["text"]
            .as_str()
            .expect("text content")
            .to_string()
    }
}

/// Frames are the JSON lines; anything else on stderr is log output.
fn frames(bytes: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|l| l.starts_with('{'))
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

/// Spawn the server, feed `lines` (pausing `idle` before the first one), close stdin,
/// and collect every frame it wrote.
pub async fn run_session(args: &[&str], idle: Duration, lines: &[String]) -> Session {
    let bin = assert_cmd::cargo::cargo_bin!("simple-search");
    let mut child = tokio::process::Command::new(bin)
        .args(args)
        .env("SIMPLE_SEARCH_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .expect("spawn simple-search");

    let mut stdin = child.stdin.take().expect("stdin");
    if !idle.is_zero() {
        tokio::time::sleep(idle).await;
    }
    for line in lines {
        stdin.write_all(line.as_bytes()).await.unwrap();
        stdin.write_all(b"\n").await.unwrap();
    }
    stdin.flush().await.unwrap();
    drop(stdin);

    let out = tokio::time::timeout(Duration::from_secs(60), child.wait_with_output())
        .await
        .expect("server exits after stdin closes")
        .expect("collect output");
    Session {
        status: out.status,
        stdout: frames(&out.stdout),
        stderr: frames(&out.stderr),
    }
}
