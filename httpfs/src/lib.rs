//! HTTP/1.0 glue around the [rudp] transport: request/response text handling,
//!  the file-serving handlers, the conventional stream (TCP) transport
//!  variant, and a small client library that issues requests and follows
//!  redirects.

pub mod client;
pub mod handlers;
pub mod http;
pub mod stream_server;

#[cfg(test)]
mod tests {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
