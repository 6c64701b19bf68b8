//! The request-sending capability the monitor decorates.

use std::future::Future;

/// Something that sends a request and yields a response.
///
/// Decorators implement this too, so they stack: a monitored sender can
/// wrap another monitored sender or any other `Sender`.
pub trait Sender: Send + Sync {
    type Request: Send;
    type Response: Send;
    type Error: Send;

    fn send(
        &self,
        request: Self::Request,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

/// [`Sender`] over a `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpSender {
    client: reqwest::Client,
}

impl HttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Sender for HttpSender {
    type Request = reqwest::Request;
    type Response = reqwest::Response;
    type Error = reqwest::Error;

    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, reqwest::Error> {
        self.client.execute(request).await
    }
}
