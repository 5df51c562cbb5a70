use std::fs::{self, OpenOptions};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_RANGE, HeaderMap, HeaderValue, RANGE, USER_AGENT};
use tracing::{debug, info, warn};

use crate::error::HbnError;

/// One file to bring to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub url: String,
    pub target: Utf8PathBuf,
    pub resume: bool,
}

/// Retrieval contract shared by every download in a fetch run.
///
/// An existing file at `target` counts as complete and must be returned
/// without network I/O. Otherwise the implementation downloads (continuing a
/// partial transfer when `resume` is set) and only moves the finished file to
/// `target`, so a crash never leaves a truncated file under the final name.
pub trait FileRetriever: Send + Sync {
    fn retrieve(&self, request: &RetrievalRequest) -> Result<Utf8PathBuf, HbnError>;
}

impl<T: FileRetriever + ?Sized> FileRetriever for &T {
    fn retrieve(&self, request: &RetrievalRequest) -> Result<Utf8PathBuf, HbnError> {
        (**self).retrieve(request)
    }
}

impl<T: FileRetriever + ?Sized> FileRetriever for Arc<T> {
    fn retrieve(&self, request: &RetrievalRequest) -> Result<Utf8PathBuf, HbnError> {
        (**self).retrieve(request)
    }
}

#[derive(Clone)]
pub struct HttpRetriever {
    client: Client,
}

impl HttpRetriever {
    pub fn new() -> Result<Self, HbnError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("hbnssi-fetch/", env!("CARGO_PKG_VERSION"))),
        );
        // Whole-request timeout; the functional runs are a few hundred MB each.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60 * 60))
            .build()
            .map_err(|err| HbnError::HttpClient(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn partial_path(target: &Utf8Path) -> Utf8PathBuf {
        let name = target.file_name().unwrap_or("download");
        target.with_file_name(format!("{name}.part"))
    }

    fn send_with_retries<F>(&self, url: &str, mut make_req: F) -> Result<Response, HbnError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        warn!(url, status, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        warn!(url, error = %err, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(HbnError::Retrieval {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn get(&self, url: &str, offset: Option<u64>) -> Result<Response, HbnError> {
        self.send_with_retries(url, || {
            let builder = self.client.get(url);
            match offset {
                Some(offset) => builder.header(RANGE, format!("bytes={offset}-")),
                None => builder,
            }
        })
    }

    /// Tries to continue `partial` from `offset`. `None` means the server's
    /// answer does not line up with the local bytes and a full download is needed.
    fn try_resume(
        &self,
        url: &str,
        partial: &Utf8Path,
        target: &Utf8Path,
        offset: u64,
    ) -> Result<Option<Utf8PathBuf>, HbnError> {
        let response = self.get(url, Some(offset))?;
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                if content_range
                    .as_deref()
                    .and_then(range_start)
                    .is_some_and(|start| start == offset)
                {
                    info!(%target, offset, "resuming partial download");
                    write_body(response, url, partial, true)?;
                    return finish(partial, target).map(Some);
                }
                warn!(
                    %target,
                    offset,
                    content_range = content_range.as_deref().unwrap_or("none"),
                    "server sent a different range, restarting"
                );
                Ok(None)
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                if content_range.as_deref().and_then(unsatisfied_total) == Some(offset) {
                    return finish(partial, target).map(Some);
                }
                warn!(
                    %target,
                    offset,
                    content_range = content_range.as_deref().unwrap_or("none"),
                    "partial file does not match remote size, restarting"
                );
                Ok(None)
            }
            status if status.is_success() => {
                info!(%target, url, "server ignored range, downloading from start");
                write_body(response, url, partial, false)?;
                finish(partial, target).map(Some)
            }
            status => Err(HbnError::RetrievalStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

impl FileRetriever for HttpRetriever {
    fn retrieve(&self, request: &RetrievalRequest) -> Result<Utf8PathBuf, HbnError> {
        let target = &request.target;
        if target.as_std_path().is_file() {
            debug!(%target, "already present, skipping download");
            return Ok(target.clone());
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| HbnError::Filesystem(format!("create {parent}: {err}")))?;
        }

        let partial = Self::partial_path(target);
        let offset = if request.resume {
            fs::metadata(partial.as_std_path())
                .map(|meta| meta.len())
                .unwrap_or(0)
        } else {
            0
        };

        let url = request.url.as_str();
        if offset > 0
            && let Some(done) = self.try_resume(url, &partial, target, offset)?
        {
            return Ok(done);
        }

        let response = self.get(url, None)?;
        let status = response.status();
        if !status.is_success() {
            return Err(HbnError::RetrievalStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        info!(%target, url, "downloading");
        write_body(response, url, &partial, false)?;
        finish(&partial, target)
    }
}

fn write_body(
    mut response: Response,
    url: &str,
    partial: &Utf8Path,
    append: bool,
) -> Result<(), HbnError> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(partial.as_std_path())
        .map_err(|err| HbnError::Filesystem(format!("open {partial}: {err}")))?;
    response
        .copy_to(&mut file)
        .map_err(|err| HbnError::Retrieval {
            url: url.to_string(),
            message: err.to_string(),
        })?;
    Ok(())
}

fn finish(partial: &Utf8Path, target: &Utf8Path) -> Result<Utf8PathBuf, HbnError> {
    fs::rename(partial.as_std_path(), target.as_std_path())
        .map_err(|err| HbnError::Filesystem(format!("move {partial} to {target}: {err}")))?;
    debug!(%target, "download complete");
    Ok(target.to_path_buf())
}

/// First byte of a `bytes <start>-<end>/<total>` header.
fn range_start(content_range: &str) -> Option<u64> {
    let (start, _) = content_range.trim().strip_prefix("bytes ")?.split_once('-')?;
    start.trim().parse().ok()
}

/// Remote length from the `bytes */<total>` form sent with a 416.
fn unsatisfied_total(content_range: &str) -> Option<u64> {
    content_range.trim().strip_prefix("bytes */")?.trim().parse().ok()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
