use crate::errors::*;
use crate::extract::FromCommand;
use crate::registry::DigestFetcher;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Look up the current digest of every image, one after another.
///
/// `timeout` is shared by the whole batch. Any digest already present is
/// replaced, images that fail to resolve are left without a digest.
/// Returns the number of resolved images.
pub async fn resolve_digests<F: DigestFetcher>(
    fetcher: &F,
    commands: &mut [FromCommand<'_>],
    timeout: Duration,
) -> usize {
    let deadline = Instant::now() + timeout;
    let mut resolved = 0;

    for cmd in commands.iter_mut() {
        let image = &mut cmd.image;
        let reference = image.fully_qualified();
        info!(
            "Fetching latest digest for {reference:?} from {:?}",
            image.registry
        );

        let digest = match time::timeout_at(deadline, fetcher.fetch_digest(&reference)).await {
            Ok(Ok(digest)) => digest,
            Ok(Err(err)) => {
                warn!("Failed to fetch digest for {:?}: {:#}", image.original, err);
                image.digest.clear();
                continue;
            }
            Err(_) => {
                warn!(
                    "Failed to fetch digest for {:?}: deadline of {:?} exceeded",
                    image.original, timeout
                );
                image.digest.clear();
                continue;
            }
        };

        info!("Found latest digest for {:?}: {digest:?}", image.original);
        image.digest = digest;
        resolved += 1;
    }

    resolved
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::containerfile;
    use crate::extract;
    use crate::stages::StageSet;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves digests from a map, unknown references fail
    #[derive(Debug, Default)]
    pub struct MockFetcher {
        pub digests: HashMap<String, String>,
        pub requests: RefCell<Vec<String>>,
    }

    impl MockFetcher {
        pub fn new(digests: &[(&str, &str)]) -> Self {
            let digests = digests
                .iter()
                .map(|(reference, digest)| (reference.to_string(), digest.to_string()))
                .collect();
            MockFetcher {
                digests,
                requests: RefCell::default(),
            }
        }
    }

    impl DigestFetcher for MockFetcher {
        async fn fetch_digest(&self, reference: &str) -> Result<String> {
            self.requests.borrow_mut().push(reference.to_string());
            self.digests
                .get(reference)
                .cloned()
                .with_context(|| anyhow!("manifest unknown: {reference:?}"))
        }
    }

    struct HangingFetcher;

    impl DigestFetcher for HangingFetcher {
        async fn fetch_digest(&self, _reference: &str) -> Result<String> {
            time::sleep(Duration::from_secs(3600)).await;
            bail!("unreachable")
        }
    }

    #[tokio::test]
    async fn test_resolve_digests() -> Result<()> {
        let result = containerfile::parse(
            "FROM ubuntu:20.04 AS base\nFROM base\nFROM gcr.io/distroless/static:nonroot\n",
        )?;
        let mut commands = extract::extract_from_commands(&result.ast, &mut StageSet::default());
        let fetcher = MockFetcher::new(&[
            ("library/ubuntu:20.04", "sha256:ubuntu"),
            ("gcr.io/distroless/static:nonroot", "sha256:static"),
        ]);

        let resolved = resolve_digests(&fetcher, &mut commands, Duration::from_secs(30)).await;
        assert_eq!(resolved, 2);
        assert_eq!(commands[0].image.digest, "sha256:ubuntu");
        assert_eq!(commands[1].image.digest, "sha256:static");
        assert_eq!(
            *fetcher.requests.borrow(),
            &["library/ubuntu:20.04", "gcr.io/distroless/static:nonroot"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_batch() -> Result<()> {
        let result = containerfile::parse("FROM private/app:1\nFROM alpine:3.19\n")?;
        let mut commands = extract::extract_from_commands(&result.ast, &mut StageSet::default());
        let fetcher = MockFetcher::new(&[("library/alpine:3.19", "sha256:alpine")]);

        let resolved = resolve_digests(&fetcher, &mut commands, Duration::from_secs(30)).await;
        assert_eq!(resolved, 1);
        assert_eq!(commands[0].image.digest, "");
        assert_eq!(commands[1].image.digest, "sha256:alpine");
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_digest_is_replaced() -> Result<()> {
        let result = containerfile::parse("FROM alpine:3.19@sha256:stale\n")?;
        let mut commands = extract::extract_from_commands(&result.ast, &mut StageSet::default());
        assert_eq!(commands[0].image.digest, "sha256:stale");
        let fetcher = MockFetcher::new(&[("library/alpine:3.19", "sha256:fresh")]);

        resolve_digests(&fetcher, &mut commands, Duration::from_secs(30)).await;
        assert_eq!(commands[0].image.digest, "sha256:fresh");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_refresh_drops_existing_digest() -> Result<()> {
        let result = containerfile::parse("FROM alpine:3.19@sha256:stale\n")?;
        let mut commands = extract::extract_from_commands(&result.ast, &mut StageSet::default());
        let fetcher = MockFetcher::default();

        let resolved = resolve_digests(&fetcher, &mut commands, Duration::from_secs(30)).await;
        assert_eq!(resolved, 0);
        assert_eq!(commands[0].image.digest, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_deadline_is_per_reference_failure() -> Result<()> {
        let result = containerfile::parse("FROM alpine\nFROM debian\n")?;
        let mut commands = extract::extract_from_commands(&result.ast, &mut StageSet::default());

        let resolved =
            resolve_digests(&HangingFetcher, &mut commands, Duration::from_millis(20)).await;
        assert_eq!(resolved, 0);
        assert!(commands.iter().all(|cmd| cmd.image.digest.is_empty()));
        Ok(())
    }
}
