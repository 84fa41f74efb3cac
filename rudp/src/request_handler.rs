use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

/// This trait decouples the transport from the handling of a fully reassembled
///  request. The transport hands over the raw HTTP request text and transmits
///  whatever response text comes back, without looking inside either.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, raw_request: &str) -> String;
}
