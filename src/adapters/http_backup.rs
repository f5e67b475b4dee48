use crate::domain::ports::RemoteBackup;
use crate::domain::snapshot::{RemoteEnvelope, StateDocument};
use crate::utils::error::{AuctionError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Client for the backup service (`POST /save-state`, `GET /load-state`).
#[derive(Debug, Clone)]
pub struct HttpBackup {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpBackup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        crate::utils::validation::validate_url("remote.base_url", base_url)?;
        let mut base_url = Url::parse(base_url).map_err(|e| AuctionError::InvalidConfigValueError {
            field: "remote.base_url".to_string(),
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;
        // Url::join replaces the last segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AuctionError::ConfigError {
                message: format!("Cannot build backup URL for {}: {}", path, e),
            })
    }
}

#[async_trait]
impl RemoteBackup for HttpBackup {
    async fn save_state(&self, document: &StateDocument) -> Result<()> {
        let url = self.endpoint("save-state")?;
        tracing::debug!("Posting backup to: {}", url);

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(document)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AuctionError::RemoteStatus {
                status: response.status().as_u16(),
            })
        }
    }

    async fn load_state(&self) -> Result<Option<RemoteEnvelope>> {
        let url = self.endpoint("load-state")?;
        tracing::debug!("Fetching backup from: {}", url);

        let response = self.client.get(url).timeout(self.timeout).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<RemoteEnvelope>().await?)),
            status => Err(AuctionError::RemoteStatus {
                status: status.as_u16(),
            }),
        }
    }
}
