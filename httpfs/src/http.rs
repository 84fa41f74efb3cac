use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{anyhow, bail};

pub const CRLF: &str = "\r\n";
pub const PROTOCOL_VERSION: &str = "HTTP/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Method, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            other => Err(anyhow!("unsupported method {:?}", other)),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub route: String,
    pub headers: Vec<String>,
    pub body: Option<String>,
}

/// Parses an HTTP/1.0 request text: a request line, zero or more header
///  lines, a blank-line separator, and an optional body.
pub fn parse_request(raw: &str) -> anyhow::Result<Request> {
    let (head, body) = raw
        .split_once(&format!("{CRLF}{CRLF}"))
        .ok_or_else(|| anyhow!("request has no header/body separator"))?;

    let mut lines = head.split(CRLF).filter(|line| !line.is_empty());
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;

    let mut parts = request_line.split(' ');
    let method: Method = parts
        .next()
        .ok_or_else(|| anyhow!("request line has no method"))?
        .parse()?;
    let route = parts
        .next()
        .ok_or_else(|| anyhow!("request line has no target"))?
        .to_string();
    if route.is_empty() || !route.starts_with('/') {
        bail!("invalid request target {:?}", route);
    }

    let headers = lines.map(str::to_owned).collect();
    let body = match method {
        Method::Post => Some(body.to_string()),
        Method::Get => None,
    };

    Ok(Request {
        method,
        route,
        headers,
        body,
    })
}

pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Formats the response text: status line, headers, blank-line separator,
///  body. The status line keeps the original server's trailing space.
pub fn format_response(body: &str, status_code: u16, headers: &str) -> String {
    format!(
        "{PROTOCOL_VERSION} {status_code} {reason} {CRLF}{headers}{CRLF}{CRLF}{body}",
        reason = reason_phrase(status_code)
    )
}
