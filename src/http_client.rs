//! Bounded downloads of remote model and label files.

use std::io::Read;
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before each retry; the download is attempted once more than this has entries.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(250), Duration::from_secs(1)];

/// Why a model file could not be downloaded.
#[derive(Debug, Error)]
pub(crate) enum DownloadError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("GET {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: usize },
    #[error("Reading {url} failed: {source}")]
    Body {
        url: String,
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Server-side and connection failures may succeed on a later attempt.
    fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Transport { .. } => true,
            Self::TooLarge { .. } | Self::Body { .. } => false,
        }
    }
}

fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build()
    })
}

/// Download `url` into memory, refusing bodies over `max_bytes`.
///
/// Transient failures are retried after each delay in [`RETRY_DELAYS`].
pub(crate) fn download(url: &str, max_bytes: usize) -> Result<Vec<u8>, DownloadError> {
    let mut delays = RETRY_DELAYS.iter();
    loop {
        match download_once(url, max_bytes) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.is_transient() => match delays.next() {
                Some(delay) => {
                    warn!("{err}; retrying in {delay:?}");
                    std::thread::sleep(*delay);
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

fn download_once(url: &str, max_bytes: usize) -> Result<Vec<u8>, DownloadError> {
    let response = agent().get(url).call().map_err(|err| match err {
        ureq::Error::Status(status, _) => DownloadError::Status {
            url: url.to_string(),
            status,
        },
        ureq::Error::Transport(transport) => DownloadError::Transport {
            url: url.to_string(),
            reason: transport.to_string(),
        },
    })?;
    let too_large = || DownloadError::TooLarge {
        url: url.to_string(),
        limit: max_bytes,
    };
    let declared = response
        .header("Content-Length")
        .and_then(|length| length.parse::<u64>().ok());
    if declared.is_some_and(|length| length > max_bytes as u64) {
        return Err(too_large());
    }
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|source| DownloadError::Body {
            url: url.to_string(),
            source,
        })?;
    if bytes.len() > max_bytes {
        return Err(too_large());
    }
    Ok(bytes)
}
