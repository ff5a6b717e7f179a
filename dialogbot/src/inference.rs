use crate::APP_USER_AGENT;

pub(crate) mod completion;

pub use completion::{CompletionRequest, CompletionResponse};

#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
}

/// HTTP client for an inference server exposing `/completion`.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Config {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn client(&self) -> Result<Client, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()?;

        Ok(Client {
            http,
            base_url: self.base_url.clone(),
        })
    }
}

impl Client {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
