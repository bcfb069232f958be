use super::{KV_PREFIX, MISSING_HEADER, NodeClient, OWNER_HEADER, RemoteGet, RemotePut};
use crate::{DynamiteError, Member, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Reaches a storage node over HTTP. Every request is bounded by `timeout`.
pub struct HttpNodeClient {
    member: Member,
    base_url: Url,
    client: reqwest::Client,
}

impl HttpNodeClient {
    pub fn new(member: Member, timeout: Duration) -> Result<Self> {
        let address = member.as_str();
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        let base_url = Url::parse(&base)
            .map_err(|e| DynamiteError::Config(format!("invalid member address {}: {}", address, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DynamiteError::Http(e.to_string()))?;

        Ok(Self {
            member,
            base_url,
            client,
        })
    }

    fn key_url(&self, key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DynamiteError::Http(format!("cannot build key url from {}", self.base_url)))?
            .pop_if_empty()
            .push(KV_PREFIX)
            .push(key);
        Ok(url)
    }
}

fn owner_from(response: &reqwest::Response) -> Option<Member> {
    response
        .headers()
        .get(OWNER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(Member::from)
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    fn member(&self) -> &Member {
        &self.member
    }

    async fn get(&self, key: &str) -> Result<RemoteGet> {
        let response = self
            .client
            .get(self.key_url(key)?)
            .send()
            .await
            .map_err(|e| DynamiteError::Http(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| DynamiteError::Http(e.to_string()))?;
                Ok(RemoteGet::Found(body))
            }
            StatusCode::NOT_FOUND if response.headers().contains_key(MISSING_HEADER) => {
                Ok(RemoteGet::NotFound)
            }
            StatusCode::MISDIRECTED_REQUEST => Ok(RemoteGet::NotOwner(owner_from(&response))),
            status => Err(DynamiteError::Http(format!(
                "get failed: node={} status={} key={}",
                self.member, status, key
            ))),
        }
    }

    async fn put(&self, key: &str, value: Bytes, context: Option<&str>) -> Result<RemotePut> {
        let mut request = self.client.put(self.key_url(key)?).body(value);
        if let Some(context) = context {
            request = request.query(&[("context", context)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DynamiteError::Http(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(RemotePut::Accepted),
            StatusCode::BAD_REQUEST => {
                let reason = response.text().await.unwrap_or_default();
                Ok(RemotePut::Rejected(reason))
            }
            StatusCode::MISDIRECTED_REQUEST => Ok(RemotePut::NotOwner(owner_from(&response))),
            status => Err(DynamiteError::Http(format!(
                "put failed: node={} status={} key={}",
                self.member, status, key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(address: &str) -> HttpNodeClient {
        HttpNodeClient::new(Member::from(address), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_key_url() {
        let node = client("127.0.0.1:25000");
        assert_eq!(
            node.key_url("foo").unwrap().as_str(),
            "http://127.0.0.1:25000/kv/foo"
        );
    }

    #[test]
    fn test_key_url_empty_key() {
        let node = client("127.0.0.1:25000");
        assert_eq!(
            node.key_url("").unwrap().as_str(),
            "http://127.0.0.1:25000/kv/"
        );
    }

    #[test]
    fn test_key_url_escapes_key() {
        let node = client("http://node-a:25000/");
        assert_eq!(
            node.key_url("users/42 x").unwrap().as_str(),
            "http://node-a:25000/kv/users%2F42%20x"
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_is_an_error() {
        // Port 9 (discard) on localhost is assumed closed.
        let node = HttpNodeClient::new(Member::from("127.0.0.1:9"), Duration::from_millis(200))
            .unwrap();
        assert!(matches!(node.get("foo").await, Err(DynamiteError::Http(_))));
    }
}
