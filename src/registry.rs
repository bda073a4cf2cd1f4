use crate::auth;
use crate::errors::*;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::{Client, Reference};

/// Looks up the digest an image tag currently points to
#[allow(async_fn_in_trait)]
pub trait DigestFetcher {
    /// `reference` is `repository[:tag]` or `host/repository[:tag]`,
    /// the returned digest is `sha256:<hex>`.
    async fn fetch_digest(&self, reference: &str) -> Result<String>;
}

pub struct RegistryClient {
    client: Client,
}

impl RegistryClient {
    pub fn new(insecure_registries: &[String]) -> Self {
        let protocol = if insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(insecure_registries.to_vec())
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });
        RegistryClient { client }
    }
}

impl DigestFetcher for RegistryClient {
    async fn fetch_digest(&self, reference: &str) -> Result<String> {
        let image = Reference::try_from(reference)
            .with_context(|| anyhow!("Failed to parse reference {reference:?}"))?;
        let auth = auth::resolve_auth(image.registry()).await;

        debug!("Requesting manifest for {:?}", image.whole());
        let (_manifest, digest) = self
            .client
            .pull_manifest(&image, &auth)
            .await
            .with_context(|| anyhow!("Failed to fetch manifest for {reference:?}"))?;
        Ok(digest)
    }
}
