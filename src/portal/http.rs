//! HTTP implementation of the portal capability
//!
//! This module handles:
//! - Building HTTP clients with the configured user agent
//! - Loading the search listing for one application
//! - Following the listing's next-page control
//! - Fetching artifacts into the artifact store
//! - Bounding every network step with the configured timeouts

use crate::config::{PortalConfig, TimeoutConfig};
use crate::portal::markup::{ListingMarkup, ListingSelectors, NextControl};
use crate::portal::{IndicatorHandle, Portal, PortalError, ResolveError};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with the harvester's defaults
///
/// Cookies are kept for the lifetime of the client, which makes one client
/// one browsing context. Per-request bounds are applied by the caller; the
/// client-wide timeout only guards against a request that never completes.
pub fn build_http_client(user_agent: &str, timeouts: &TimeoutConfig) -> Result<Client, reqwest::Error> {
    let ceiling = timeouts.navigation.max(timeouts.download).max(timeouts.resolve);

    Client::builder()
        .user_agent(user_agent)
        .cookie_store(true)
        .timeout(Duration::from_millis(ceiling))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// The listing page currently shown
#[derive(Debug, Clone)]
struct LoadedPage {
    /// Final URL after redirects; relative links resolve against it
    url: Url,
    html: String,
}

/// Portal backed by plain HTTP requests
pub struct HttpPortal {
    client: Client,
    config: PortalConfig,
    selectors: ListingSelectors,
    timeouts: TimeoutConfig,
    current: Option<LoadedPage>,
}

impl HttpPortal {
    pub fn new(config: &PortalConfig, timeouts: &TimeoutConfig) -> crate::Result<Self> {
        let selectors = ListingSelectors::from_config(config)?;
        let client = build_http_client(&config.user_agent, timeouts)?;

        Ok(Self {
            client,
            config: config.clone(),
            selectors,
            timeouts: timeouts.clone(),
            current: None,
        })
    }

    /// Search URL for one application
    pub fn search_url(&self, item_id: &str) -> Result<Url, url::ParseError> {
        let mut params: Vec<(&str, &str)> = self
            .config
            .search_params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        params.push((self.config.item_param.as_str(), item_id.trim()));

        let page_size = self.config.page_size.to_string();
        if let Some(param) = &self.config.page_size_param {
            params.push((param.as_str(), page_size.as_str()));
        }

        Url::parse_with_params(&self.config.base_url, params)
    }

    async fn load_page(&self, url: Url) -> Result<LoadedPage, PortalError> {
        let request = async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|source| PortalError::Http {
                    url: url.to_string(),
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(PortalError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let final_url = response.url().clone();
            let html = response.text().await.map_err(|source| PortalError::Http {
                url: url.to_string(),
                source,
            })?;

            Ok(LoadedPage {
                url: final_url,
                html,
            })
        };

        match tokio::time::timeout(self.timeouts.navigation(), request).await {
            Ok(result) => result,
            Err(_) => Err(PortalError::Timeout {
                stage: "loading listing page",
                after_ms: self.timeouts.navigation,
            }),
        }
    }

    fn current_page(&self) -> Result<&LoadedPage, PortalError> {
        self.current.as_ref().ok_or(PortalError::NoListing)
    }

    fn read_summary(&self) -> Option<String> {
        let page = self.current.as_ref()?;
        ListingMarkup::parse(&page.html, &page.url, &self.selectors).summary_text()
    }

    fn read_indicators(&self) -> Result<Vec<IndicatorHandle>, PortalError> {
        let page = self.current_page()?;
        Ok(ListingMarkup::parse(&page.html, &page.url, &self.selectors).indicators())
    }

    fn read_next_control(&self) -> Result<NextControl, PortalError> {
        let page = self.current_page()?;
        Ok(ListingMarkup::parse(&page.html, &page.url, &self.selectors).next_control())
    }

    async fn fetch_artifact(&self, target: &str, destination: &Path) -> Result<String, ResolveError> {
        let response = match tokio::time::timeout(
            self.timeouts.resolve(),
            self.client.get(target).send(),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(ResolveError::Http {
                    url: target.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ResolveError::Timeout {
                    after_ms: self.timeouts.resolve,
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status {
                url: target.to_string(),
                status: status.as_u16(),
            });
        }

        let locator = response.url().to_string();
        let body = match tokio::time::timeout(self.timeouts.download(), response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(source)) => {
                return Err(ResolveError::Http {
                    url: locator,
                    source,
                })
            }
            Err(_) => {
                return Err(ResolveError::Timeout {
                    after_ms: self.timeouts.download,
                })
            }
        };

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write beside the destination first so a half-written file never
        // looks like a stored artifact
        let partial = destination.with_extension("part");
        tokio::fs::write(&partial, &body).await?;
        tokio::fs::rename(&partial, destination).await?;

        tracing::debug!("Stored {} bytes from {} at {}", body.len(), locator, destination.display());
        Ok(locator)
    }
}

#[async_trait]
impl Portal for HttpPortal {
    async fn open_listing(&mut self, item_id: &str) -> Result<(), PortalError> {
        self.current = None;
        let url = self.search_url(item_id)?;
        tracing::debug!("Opening listing {}", url);

        let page = self.load_page(url).await?;
        self.current = Some(page);
        Ok(())
    }

    async fn summary_text(&mut self) -> Option<String> {
        self.read_summary()
    }

    async fn indicators(&mut self) -> Result<Vec<IndicatorHandle>, PortalError> {
        self.read_indicators()
    }

    async fn resolve_artifact(
        &mut self,
        indicator: &IndicatorHandle,
        destination: &Path,
    ) -> Result<String, ResolveError> {
        let target = indicator.target.as_deref().ok_or(ResolveError::NoTarget)?;
        self.fetch_artifact(target, destination).await
    }

    async fn next_page(&mut self) -> Result<bool, PortalError> {
        let next = match self.read_next_control()? {
            NextControl::Link(url) => url,
            NextControl::Unfollowable => {
                tracing::debug!("Next control has no followable link; treating page as last");
                return Ok(false);
            }
            NextControl::Absent | NextControl::Disabled => return Ok(false),
        };

        let url = Url::parse(&next)?;
        let page = self.load_page(url).await?;
        self.current = Some(page);
        Ok(true)
    }

    async fn recycle(&mut self) -> Result<(), PortalError> {
        self.current = None;
        self.client = build_http_client(&self.config.user_agent, &self.timeouts)?;
        tracing::debug!("Browsing context recycled");
        Ok(())
    }
}
