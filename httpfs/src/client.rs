use anyhow::{anyhow, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::http::{CRLF, PROTOCOL_VERSION};

pub type RequestHeaders = Vec<(String, String)>;

const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub protocol: String,
    pub status_code: u16,
    pub headers: String,
    pub body: String,
}

impl Response {
    /// Parses a response text into status line, headers and body.
    pub fn parse(raw: &str) -> anyhow::Result<Response> {
        let (head, body) = raw
            .split_once(&format!("{CRLF}{CRLF}"))
            .ok_or_else(|| anyhow!("response has no header/body separator"))?;

        let mut lines = head.lines();
        let status_line = lines.next().ok_or_else(|| anyhow!("empty response"))?;
        if !status_line.starts_with("HTTP") {
            bail!("response has no status line");
        }

        let mut parts = status_line.split(' ');
        let protocol = parts.next().unwrap_or_default().to_string();
        let status_code = parts
            .next()
            .ok_or_else(|| anyhow!("status line has no code"))?
            .parse::<u16>()?;

        Ok(Response {
            protocol,
            status_code,
            headers: lines.collect::<Vec<_>>().join("\n"),
            body: body.to_string(),
        })
    }
}

struct Target {
    host: String,
    port: String,
    request_uri: String,
}

impl Target {
    fn parse(url: &str) -> anyhow::Result<Target> {
        let rest = match url.strip_prefix("http://") {
            Some(rest) => rest,
            None if url.contains("://") => bail!("unsupported scheme in url {:?}", url),
            None => url,
        };

        let (authority, request_uri) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (host, port),
            None => (authority, "80"),
        };
        if host.is_empty() {
            bail!("url {:?} has no host", url);
        }

        Ok(Target {
            host: host.to_string(),
            port: port.to_string(),
            request_uri: request_uri.to_string(),
        })
    }

    fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub async fn get(url: &str, headers: &RequestHeaders) -> anyhow::Result<String> {
    let target = Target::parse(url)?;
    debug!("GET {}", url);

    let request = format!(
        "GET {} {PROTOCOL_VERSION}{CRLF}{}{CRLF}",
        target.request_uri,
        stringify_headers(headers)
    );
    roundtrip(&target, &request).await
}

pub async fn post(url: &str, headers: &RequestHeaders, body: &str) -> anyhow::Result<String> {
    let target = Target::parse(url)?;
    debug!("POST {} ({} body bytes)", url, body.len());

    let mut headers = headers.clone();
    headers.push(("Content-Length".to_string(), body.len().to_string()));
    let request = format!(
        "POST {} {PROTOCOL_VERSION}{CRLF}{}{CRLF}{}",
        target.request_uri,
        stringify_headers(&headers),
        body
    );
    roundtrip(&target, &request).await
}

/// Follows up to five 301-303 redirects via the Location header, re-issuing
///  a GET each time. Returns the final response text.
pub async fn follow_redirects(
    mut response_text: String,
    headers: &RequestHeaders,
) -> anyhow::Result<String> {
    for _ in 0..MAX_REDIRECTS {
        let response = Response::parse(&response_text)?;
        if !(301..=303).contains(&response.status_code) {
            return Ok(response_text);
        }

        let location = extract_redirect_target(&response.headers)
            .ok_or_else(|| anyhow!("bad redirect URI in Location header"))?;
        info!("status {} - redirecting to {}", response.status_code, location);
        response_text = get(&location, headers).await?;
    }
    bail!("exceeded {} redirects", MAX_REDIRECTS)
}

fn extract_redirect_target(headers: &str) -> Option<String> {
    for line in headers.lines() {
        let Some((key, value)) = line.split_once(':') else {
            break;
        };
        if key == "Location" {
            return Some(value.trim().to_string());
        }
    }
    None
}

fn stringify_headers(headers: &RequestHeaders) -> String {
    headers
        .iter()
        .map(|(key, value)| format!("{key}:{value}{CRLF}"))
        .collect()
}

async fn roundtrip(target: &Target, request: &str) -> anyhow::Result<String> {
    let mut stream = TcpStream::connect(target.socket_addr()).await?;
    stream.write_all(request.as_bytes()).await?;

    // HTTP/1.0: the server closes the connection after the response
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bare_host("localhost", "localhost", "80", "/")]
    #[case::with_port("localhost:8080", "localhost", "8080", "/")]
    #[case::with_path("localhost:8080/a.txt", "localhost", "8080", "/a.txt")]
    #[case::with_scheme("http://localhost:8080/a.txt", "localhost", "8080", "/a.txt")]
    #[case::scheme_no_port("http://example.org/x", "example.org", "80", "/x")]
    fn test_target_parse(
        #[case] url: &str,
        #[case] host: &str,
        #[case] port: &str,
        #[case] request_uri: &str,
    ) {
        let target = Target::parse(url).unwrap();
        assert_eq!(target.host, host);
        assert_eq!(target.port, port);
        assert_eq!(target.request_uri, request_uri);
    }

    #[rstest]
    #[case::https("https://example.org/")]
    #[case::empty("")]
    #[case::no_host("http:///x")]
    fn test_target_parse_rejects(#[case] url: &str) {
        assert!(Target::parse(url).is_err());
    }

    #[test]
    fn test_response_parse() {
        let raw = "HTTP/1.0 200 OK \r\nContent-Length:2\r\nContent-Disposition:inline\r\n\r\nhi";
        let response = Response::parse(raw).unwrap();

        assert_eq!(response.protocol, "HTTP/1.0");
        assert_eq!(response.status_code, 200);
        assert!(response.headers.contains("Content-Length:2"));
        assert_eq!(response.body, "hi");
    }

    #[rstest]
    #[case::no_separator("HTTP/1.0 200 OK \r\nContent-Length:2")]
    #[case::no_status_line("hello\r\n\r\nbody")]
    #[case::bad_code("HTTP/1.0 two-hundred OK \r\n\r\nbody")]
    fn test_response_parse_rejects(#[case] raw: &str) {
        assert!(Response::parse(raw).is_err());
    }

    #[rstest]
    #[case::present("Content-Length:0\nLocation: http://example.org/next \nX:y", Some("http://example.org/next"))]
    #[case::absent("Content-Length:0\nX:y", None)]
    #[case::stops_at_non_header("not a header\nLocation:http://example.org/", None)]
    fn test_extract_redirect_target(#[case] headers: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            extract_redirect_target(headers).as_deref(),
            expected
        );
    }

    #[test]
    fn test_follow_redirects_passes_through_non_redirect() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let raw = "HTTP/1.0 200 OK \r\n\r\nbody".to_string();
            let result = follow_redirects(raw.clone(), &Vec::new()).await.unwrap();
            assert_eq!(result, raw);
        });
    }
}
