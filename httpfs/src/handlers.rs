use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use rudp::request_handler::RequestHandler;

use crate::http::{format_response, parse_request, Method, Request, CRLF};

/// The file-serving routes over the served directory. The root path is fixed
///  at startup and passed in explicitly - there is no process-global state.
pub struct FileHandlers {
    root: PathBuf,
}

enum Route<'a> {
    Root,
    File(&'a str),
    /// any target whose depth exceeds one segment
    Forbidden(&'a str),
}

fn classify_route(route: &str) -> Route<'_> {
    if route == "/" {
        return Route::Root;
    }
    match route.strip_prefix('/') {
        Some(name) if !name.is_empty() && !name.contains('/') => Route::File(name),
        _ => Route::Forbidden(route),
    }
}

fn make_headers(body: &str) -> String {
    format!("Content-Length:{}{}Content-Disposition:inline", body.len(), CRLF)
}

fn content_type_header(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some("json") => "Content-Type:application/json",
        Some("xml") => "Content-Type:application/xml",
        Some("html") => "Content-Type:text/html",
        _ => "Content-Type:text/plain",
    }
}

fn forbidden(route: &str) -> (String, u16, String) {
    let body = format!("Access Forbidden: '{}' is outside server root directory", route);
    let headers = make_headers(&body);
    (body, 403, headers)
}

impl FileHandlers {
    pub fn new(root: PathBuf) -> FileHandlers {
        FileHandlers { root }
    }

    /// Routes a parsed request to its handler and returns the response triple
    ///  of body text, status code and headers text.
    pub fn dispatch(&self, request: &Request) -> (String, u16, String) {
        match (request.method, classify_route(&request.route)) {
            (Method::Get, Route::Root) => self.list_files(),
            (Method::Get, Route::File(name)) => self.read_file(name),
            (Method::Post, Route::File(name)) => {
                self.write_file(name, request.body.as_deref().unwrap_or(""))
            }
            (Method::Post, Route::Root) => {
                let body = "Cannot write to the server root".to_string();
                let headers = make_headers(&body);
                (body, 500, headers)
            }
            (_, Route::Forbidden(route)) => forbidden(route),
        }
    }

    fn list_files(&self) -> (String, u16, String) {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to list {:?}: {}", self.root, e);
                return (String::new(), 500, make_headers(""));
            }
        };

        let mut names = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();

        let body = names.join(",");
        let headers = make_headers(&body);
        (body, 200, headers)
    }

    fn read_file(&self, name: &str) -> (String, u16, String) {
        match fs::read(self.root.join(name)) {
            Ok(raw) => {
                let body = String::from_utf8_lossy(&raw).replace(CRLF, "\n");
                let headers = format!("{}{}{}", make_headers(&body), CRLF, content_type_header(name));
                (body, 200, headers)
            }
            Err(_) => {
                let body = format!("No file exists with name '{}'", name);
                let headers = make_headers(&body);
                (body, 404, headers)
            }
        }
    }

    fn write_file(&self, name: &str, contents: &str) -> (String, u16, String) {
        match fs::write(self.root.join(name), contents) {
            Ok(()) => {
                let body = "Successfully written content to file".to_string();
                let headers = make_headers(&body);
                (body, 200, headers)
            }
            Err(e) => {
                warn!("failed to write {:?}: {}", self.root.join(name), e);
                let body = format!("Failed to write to file '{}'", name);
                let headers = make_headers(&body);
                (body, 500, headers)
            }
        }
    }
}

/// The bridge the datagram transport calls with a reassembled request text.
#[async_trait]
impl RequestHandler for FileHandlers {
    async fn handle(&self, raw_request: &str) -> String {
        let (body, status_code, headers) = match parse_request(raw_request) {
            Ok(request) => {
                debug!("handling {} {}", request.method, request.route);
                self.dispatch(&request)
            }
            Err(e) => {
                warn!("unparseable request: {}", e);
                let body = format!("Bad request: {}", e);
                let headers = make_headers(&body);
                (body, 500, headers)
            }
        };

        format_response(&body, status_code, &headers)
    }
}
