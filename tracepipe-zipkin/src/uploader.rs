//! Zipkin span uploader.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;

use tracepipe::record::SpanRecord;

use crate::Error;

#[derive(Debug)]
pub(crate) enum Uploader {
    Http(JsonV1Client),
}

impl Uploader {
    /// Create a new http uploader.
    pub(crate) fn new(client: Client, collector_endpoint: Url) -> Self {
        Uploader::Http(JsonV1Client {
            client,
            collector_endpoint,
        })
    }

    /// Upload one batch of records to the collector.
    pub(crate) fn upload(&self, batch: Vec<SpanRecord>) -> Result<(), Error> {
        match self {
            Uploader::Http(client) => client.upload(batch),
        }
    }
}

#[derive(Debug)]
pub(crate) struct JsonV1Client {
    client: Client,
    collector_endpoint: Url,
}

impl JsonV1Client {
    fn upload(&self, batch: Vec<SpanRecord>) -> Result<(), Error> {
        self.client
            .post(self.collector_endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&batch).unwrap_or_default())
            .send()?
            .error_for_status()?;
        Ok(())
    }
}
