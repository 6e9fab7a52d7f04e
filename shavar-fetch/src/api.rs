use std::collections::BTreeMap;

use bytes::Bytes;
use compact_str::CompactString;
use shavar_store::PathPrefix;
use shavar_verifier::{FullHash, FullHashResolver};

use crate::config::Config;
use crate::error::Error;
use crate::protocol::{gethash_request, parse_gethash_response, parse_list_response};
use crate::transport::Transport;

/// The three shavar endpoints plus redirect fetches, over some [`Transport`].
pub struct ApiClient<T> {
    transport: T,
    base_url: String,
    query: String,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        let query = format!(
            "client={}&apikey={}&appver={}&pver={}",
            config.client, config.api_key, config.app_version, config.protocol_version
        );
        Self { transport, base_url: config.base_url.clone(), query }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `<base_url><function>?client=..&apikey=..&appver=..&pver=..`
    pub fn endpoint(&self, function: &str) -> String {
        format!("{}{function}?{}", self.base_url, self.query)
    }

    /// Names of the lists the service offers.
    pub async fn list(&self) -> Result<Vec<CompactString>, Error> {
        let body = self.transport.post(&self.endpoint("list"), Bytes::new()).await?;
        Ok(parse_list_response(&String::from_utf8_lossy(&body)))
    }

    /// Sends a `downloads` request and returns the raw response.
    pub async fn downloads(&self, request: String) -> Result<Bytes, Error> {
        self.transport.post(&self.endpoint("downloads"), Bytes::from(request)).await
    }

    /// Fetches one redirect body. Redirect URLs usually come without a scheme.
    pub async fn redirect(&self, url: &str) -> Result<Bytes, Error> {
        let url = if url.contains("://") { url.to_string() } else { format!("http://{url}") };
        self.transport.post(&url, Bytes::new()).await
    }

    /// Asks for the full hashes behind `prefixes`, one request per prefix length.
    pub async fn gethash(&self, prefixes: &[PathPrefix]) -> Result<Vec<FullHash>, Error> {
        let mut by_len: BTreeMap<usize, Vec<&PathPrefix>> = BTreeMap::new();
        for prefix in prefixes.iter().filter(|p| !p.is_host_level()) {
            by_len.entry(prefix.len()).or_default().push(prefix);
        }

        let mut hashes = Vec::new();
        for (len, group) in by_len {
            let body = gethash_request(len, &group);
            let response = self.transport.post(&self.endpoint("gethash"), Bytes::from(body)).await?;
            hashes.extend(parse_gethash_response(&response)?);
        }
        tracing::debug!(prefixes = prefixes.len(), full_hashes = hashes.len(), "gethash done");
        Ok(hashes)
    }
}

impl<T: Transport> FullHashResolver for ApiClient<T> {
    type Error = Error;

    async fn full_hashes(&self, prefixes: &[PathPrefix]) -> Result<Vec<FullHash>, Error> {
        self.gethash(prefixes).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<(String, Bytes)>>,
    }

    impl Transport for Recorder {
        async fn post(&self, url: &str, body: Bytes) -> Result<Bytes, Error> {
            self.requests.lock().unwrap().push((url.to_string(), body));
            Ok(Bytes::new())
        }
    }

    fn client() -> ApiClient<Recorder> {
        let config = Config {
            api_key: "k3y".into(),
            app_version: "1.0".into(),
            base_url: "http://sb.test/safebrowsing/".into(),
            ..Config::default()
        };
        ApiClient::new(Recorder::default(), &config)
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            client().endpoint("downloads"),
            "http://sb.test/safebrowsing/downloads?client=api&apikey=k3y&appver=1.0&pver=2.2"
        );
    }

    #[tokio::test]
    async fn test_redirect_gets_scheme() {
        let api = client();
        api.redirect("cache.test/r1").await.unwrap();
        api.redirect("https://cache.test/r2").await.unwrap();

        let requests = api.transport().requests.lock().unwrap();
        assert_eq!(requests[0].0, "http://cache.test/r1");
        assert_eq!(requests[1].0, "https://cache.test/r2");
        assert!(requests[0].1.is_empty());
    }

    #[tokio::test]
    async fn test_gethash_groups_by_prefix_length() {
        let api = client();
        let prefixes = [
            PathPrefix::new([1u8, 1, 1, 1]),
            PathPrefix::new([2u8; 32]),
            PathPrefix::new([3u8, 3, 3, 3]),
            PathPrefix::host_level(),
        ];
        let hashes = api.gethash(&prefixes).await.unwrap();
        assert!(hashes.is_empty());

        let requests = api.transport().requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].0.starts_with("http://sb.test/safebrowsing/gethash?"));
        assert_eq!(&requests[0].1[..], &[&b"4:8\n"[..], &[1u8, 1, 1, 1, 3, 3, 3, 3]].concat()[..]);
        assert_eq!(&requests[1].1[..5], b"32:32");
    }
}
