// ABOUTME: Direct HTTP/1 probe built on hyper over a tokio TCP stream.
// ABOUTME: Plain http:// only; returns the status code and body text.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper::header::{HOST, USER_AGENT};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

/// Response of a probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// Largest body kept for substring matching.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Issue `GET url` and collect the response.
pub async fn get(url: &str) -> Result<ProbeResponse, String> {
    let uri: hyper::Uri = url.parse().map_err(|e| format!("invalid url {}: {}", url, e))?;

    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => {
            return Err(format!(
                "{} probes are not supported directly; set via_target to probe with curl",
                other
            ));
        }
        None => return Err(format!("url {} has no scheme", url)),
    }

    let host = uri
        .host()
        .ok_or_else(|| format!("url {} has no host", url))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = uri.port_u16().unwrap_or(80);
    let authority = uri
        .authority()
        .map(|a| a.to_string())
        .unwrap_or_else(|| host.clone());
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| format!("connect {}:{}: {}", host, port, e))?;

    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| format!("handshake with {}: {}", authority, e))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!("probe connection closed with error: {}", e);
        }
    });

    let request = Request::get(path)
        .header(HOST, authority)
        .header(USER_AGENT, concat!("deckhand/", env!("CARGO_PKG_VERSION")))
        .body(Empty::<Bytes>::new())
        .map_err(|e| format!("building request: {}", e))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| format!("GET {}: {}", url, e))?;

    let status = response.status().as_u16();
    let mut body = response.into_body();
    let mut kept = Vec::new();
    while kept.len() < MAX_BODY_BYTES {
        let Some(frame) = body.frame().await else {
            break;
        };
        let frame = frame.map_err(|e| format!("reading body of {}: {}", url, e))?;
        if let Ok(data) = frame.into_data() {
            let room = MAX_BODY_BYTES - kept.len();
            kept.extend_from_slice(&data[..data.len().min(room)]);
        }
    }

    Ok(ProbeResponse {
        status,
        body: String::from_utf8_lossy(&kept).into_owned(),
    })
}

/// Parse output of `curl -sS -w '\n%{http_code}'`: body lines then the status code.
pub fn parse_curl_output(stdout: &str) -> Result<ProbeResponse, String> {
    let trimmed = stdout.trim_end_matches('\n');
    let (body, code) = match trimmed.rfind('\n') {
        Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
        None => ("", trimmed),
    };
    let status = code
        .trim()
        .parse::<u16>()
        .map_err(|_| format!("unexpected curl output: {:?}", code))?;
    if status == 0 {
        return Err("no HTTP response".to_string());
    }
    Ok(ProbeResponse {
        status,
        body: body.to_string(),
    })
}
