use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use hbnssi_fetcher::error::HbnError;
use hbnssi_fetcher::retrieval::{FileRetriever, HttpRetriever, RetrievalRequest};

const BODY: &[u8] = b"ABCDEF";

/// Serves exactly `connections` requests, one per connection, and hands back
/// the lowercased request heads it saw.
fn serve<F>(connections: usize, respond: F) -> (String, JoinHandle<Vec<String>>)
where
    F: Fn(usize, &str) -> Vec<u8> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/file", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let mut heads = Vec::with_capacity(connections);
        for idx in 0..connections {
            let (mut stream, _) = listener.accept().unwrap();
            let head = read_head(&mut stream);
            stream.write_all(&respond(idx, &head)).unwrap();
            stream.flush().unwrap();
            heads.push(head);
        }
        heads
    });
    (url, handle)
}

fn read_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).unwrap();
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}

fn response(status: &str, headers: &[(&str, String)], body: &[u8]) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 {status}\r\nconnection: close\r\ncontent-length: {}\r\n",
        body.len()
    );
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

fn range_start(head: &str) -> Option<usize> {
    head.lines()
        .find_map(|line| line.strip_prefix("range: bytes="))
        .and_then(|rest| rest.trim().trim_end_matches('-').parse().ok())
}

/// A well-behaved server: 206 for a range request, 200 otherwise.
fn honor_range(head: &str) -> Vec<u8> {
    match range_start(head) {
        Some(start) => response(
            "206 Partial Content",
            &[(
                "content-range",
                format!("bytes {start}-{}/{}", BODY.len() - 1, BODY.len()),
            )],
            &BODY[start..],
        ),
        None => response("200 OK", &[], BODY),
    }
}

struct Scratch {
    _temp: tempfile::TempDir,
    target: Utf8PathBuf,
    partial: Utf8PathBuf,
}

fn scratch(partial_content: Option<&[u8]>) -> Scratch {
    let temp = tempfile::tempdir().unwrap();
    let target =
        Utf8PathBuf::from_path_buf(temp.path().join("derivatives").join("sub-A001_runs.csv"))
            .unwrap();
    let partial = HttpRetriever::partial_path(&target);
    if let Some(content) = partial_content {
        fs::create_dir_all(target.parent().unwrap().as_std_path()).unwrap();
        fs::write(partial.as_std_path(), content).unwrap();
    }
    Scratch {
        _temp: temp,
        target,
        partial,
    }
}

fn request(url: &str, scratch: &Scratch, resume: bool) -> RetrievalRequest {
    RetrievalRequest {
        url: url.to_string(),
        target: scratch.target.clone(),
        resume,
    }
}

fn read(path: &Utf8PathBuf) -> Vec<u8> {
    fs::read(path.as_std_path()).unwrap()
}

#[test]
fn fresh_download_moves_partial_into_place() {
    let scratch = scratch(None);
    let (url, server) = serve(1, |_, head| honor_range(head));

    let path = HttpRetriever::new()
        .unwrap()
        .retrieve(&request(&url, &scratch, true))
        .unwrap();

    assert_eq!(path, scratch.target);
    assert_eq!(read(&scratch.target), BODY);
    assert!(!scratch.partial.as_std_path().exists());
    let heads = server.join().unwrap();
    assert!(!heads[0].contains("range:"));
}

#[test]
fn resume_appends_matching_range() {
    let scratch = scratch(Some(b"ABC"));
    let (url, server) = serve(1, |_, head| honor_range(head));

    HttpRetriever::new()
        .unwrap()
        .retrieve(&request(&url, &scratch, true))
        .unwrap();

    assert_eq!(read(&scratch.target), BODY);
    assert!(!scratch.partial.as_std_path().exists());
    let heads = server.join().unwrap();
    assert!(heads[0].contains("range: bytes=3-"));
}

#[test]
fn resume_disabled_ignores_partial() {
    let scratch = scratch(Some(b"XYZ"));
    let (url, server) = serve(1, |_, head| honor_range(head));

    HttpRetriever::new()
        .unwrap()
        .retrieve(&request(&url, &scratch, false))
        .unwrap();

    assert_eq!(read(&scratch.target), BODY);
    let heads = server.join().unwrap();
    assert!(!heads[0].contains("range:"));
}

#[test]
fn full_body_answer_restarts_partial() {
    let scratch = scratch(Some(b"XYZ"));
    let (url, server) = serve(1, |_, _| response("200 OK", &[], BODY));

    HttpRetriever::new()
        .unwrap()
        .retrieve(&request(&url, &scratch, true))
        .unwrap();

    assert_eq!(read(&scratch.target), BODY);
    server.join().unwrap();
}

#[test]
fn mismatched_content_range_restarts_download() {
    let scratch = scratch(Some(b"ABC"));
    let (url, server) = serve(2, |idx, _| match idx {
        0 => response(
            "206 Partial Content",
            &[("content-range", "bytes 0-5/6".to_string())],
            BODY,
        ),
        _ => response("200 OK", &[], BODY),
    });

    HttpRetriever::new()
        .unwrap()
        .retrieve(&request(&url, &scratch, true))
        .unwrap();

    assert_eq!(read(&scratch.target), BODY);
    let heads = server.join().unwrap();
    assert!(heads[0].contains("range: bytes=3-"));
    assert!(!heads[1].contains("range:"));
}

#[test]
fn unsatisfiable_range_completes_whole_partial() {
    let scratch = scratch(Some(BODY));
    let (url, server) = serve(1, |_, _| {
        response(
            "416 Range Not Satisfiable",
            &[("content-range", format!("bytes */{}", BODY.len()))],
            b"",
        )
    });

    HttpRetriever::new()
        .unwrap()
        .retrieve(&request(&url, &scratch, true))
        .unwrap();

    assert_eq!(read(&scratch.target), BODY);
    assert!(!scratch.partial.as_std_path().exists());
    server.join().unwrap();
}

#[test]
fn stale_partial_longer_than_remote_is_replaced() {
    let scratch = scratch(Some(b"STALE-GARBAGE-LONGER-THAN-REMOTE"));
    let (url, server) = serve(2, |idx, _| match idx {
        0 => response(
            "416 Range Not Satisfiable",
            &[("content-range", format!("bytes */{}", BODY.len()))],
            b"",
        ),
        _ => response("200 OK", &[], BODY),
    });

    HttpRetriever::new()
        .unwrap()
        .retrieve(&request(&url, &scratch, true))
        .unwrap();

    assert_eq!(read(&scratch.target), BODY);
    let heads = server.join().unwrap();
    assert!(!heads[1].contains("range:"));
}

#[test]
fn error_status_is_reported() {
    let scratch = scratch(None);
    let (url, server) = serve(1, |_, _| response("404 Not Found", &[], b"missing"));

    let err = HttpRetriever::new()
        .unwrap()
        .retrieve(&request(&url, &scratch, true))
        .unwrap_err();

    assert_matches!(err, HbnError::RetrievalStatus { status: 404, .. });
    assert!(!scratch.target.as_std_path().exists());
    server.join().unwrap();
}

#[test]
fn interrupted_transfer_leaves_partial_for_resume() {
    let scratch = scratch(None);
    let (url, server) = serve(2, |idx, head| match idx {
        // Promises six bytes, sends three, then hangs up.
        0 => b"HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 6\r\n\r\nABC".to_vec(),
        _ => honor_range(head),
    });
    let retriever = HttpRetriever::new().unwrap();

    let err = retriever
        .retrieve(&request(&url, &scratch, true))
        .unwrap_err();
    assert_matches!(err, HbnError::Retrieval { .. });
    assert!(!scratch.target.as_std_path().exists());
    assert!(scratch.partial.as_std_path().is_file());

    retriever.retrieve(&request(&url, &scratch, true)).unwrap();
    assert_eq!(read(&scratch.target), BODY);
    server.join().unwrap();
}
