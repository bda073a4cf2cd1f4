use crate::args::DEFAULT_TIMEOUT_SECS;
use crate::containerfile;
use crate::errors::*;
use crate::extract;
use crate::registry::DigestFetcher;
use crate::resolve;
use crate::rewrite;
use crate::stages::StageSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// State of a single update run over one Containerfile
#[derive(Debug)]
pub struct ContainerfileUpdater {
    path: PathBuf,
    timeout: Duration,
    build_stages: StageSet,
}

impl ContainerfileUpdater {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        ContainerfileUpdater {
            path: path.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            build_stages: StageSet::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build_stages(&self) -> &StageSet {
        &self.build_stages
    }

    /// Pin every registry image in the file to its current digest.
    ///
    /// The file is rewritten in place after a copy of it was saved to
    /// `<path>.backup`. Returns the number of pinned images.
    pub async fn update_with_latest_digests<F: DigestFetcher>(
        &mut self,
        fetcher: &F,
    ) -> Result<usize> {
        info!("Processing Containerfile: {:?}", self.path);

        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| anyhow!("Failed to read Containerfile: {:?}", self.path))?;
        let result = containerfile::parse(&text).context("Failed to parse Containerfile")?;
        for warning in &result.warnings {
            warn!("Parser warning: {warning}");
        }

        self.build_stages = StageSet::default();
        let mut commands = extract::extract_from_commands(&result.ast, &mut self.build_stages);
        if commands.is_empty() {
            info!("No FROM commands found in Containerfile");
            return Ok(0);
        }
        info!("Found {} FROM command(s)", commands.len());

        let pinned = resolve::resolve_digests(fetcher, &mut commands, self.timeout).await;

        let lines = text.lines().collect::<Vec<_>>();
        let updated = rewrite::reconstruct(&lines, &commands);
        rewrite::write_with_backup(&self.path, &updated)
            .await
            .context("Failed to write updated Containerfile")?;

        info!(
            "Successfully updated {pinned} of {} image reference(s) in {:?}",
            commands.len(),
            self.path
        );
        Ok(pinned)
    }
}
