use crate::errors::*;
use std::fmt;
use std::str::FromStr;

pub const DOCKER_HUB: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";
const OFFICIAL_NAMESPACE: &str = "library/";
const DIGEST_MARKER: &str = "@sha256:";

/// An image reference as found in a FROM instruction, canonicalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
    /// Empty until resolved, or the digest already written in the file
    pub digest: String,
    /// The reference exactly as written, used to locate it on its line
    pub original: String,
}

impl ImageReference {
    pub fn is_docker_hub(&self) -> bool {
        self.registry == DOCKER_HUB
    }

    /// The `[registry/]repository:tag` string used to look up the current digest.
    ///
    /// Docker Hub references omit the registry host.
    pub fn fully_qualified(&self) -> String {
        if self.is_docker_hub() {
            format!("{}:{}", self.repository, self.tag)
        } else {
            format!("{}/{}:{}", self.registry, self.repository, self.tag)
        }
    }

    /// The digest pinned form written back into the file, `None` while unresolved.
    pub fn pinned(&self) -> Option<String> {
        if self.digest.is_empty() {
            None
        } else if self.is_docker_hub() {
            Some(format!("{}@{}", self.repository, self.digest))
        } else {
            Some(format!(
                "{}/{}@{}",
                self.registry, self.repository, self.digest
            ))
        }
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            bail!("Image reference is empty");
        }
        if s.chars().any(|c| c.is_whitespace() || c == '$') {
            bail!("Unsupported characters in image reference: {s:?}");
        }

        if s.contains(DIGEST_MARKER) {
            let parts = s.split('@').collect::<Vec<_>>();
            let [base, digest] = parts[..] else {
                bail!("Invalid digest reference format: {s:?}");
            };
            let mut image = base.parse::<ImageReference>()?;
            image.digest = digest.to_string();
            image.original = s.to_string();
            return Ok(image);
        }

        let (registry, repository, tag) = match split_registry(s) {
            Some((registry, remainder)) => {
                let (repository, tag) = split_tag(remainder);
                (registry.to_string(), repository.to_string(), tag)
            }
            None => {
                let (repository, tag) = split_tag(s);
                let repository = if repository.contains('/') {
                    repository.to_string()
                } else {
                    format!("{OFFICIAL_NAMESPACE}{repository}")
                };
                (DOCKER_HUB.to_string(), repository, tag)
            }
        };

        if repository.is_empty() || repository.ends_with('/') {
            bail!("Image reference has no repository: {s:?}");
        }
        if tag.is_empty() {
            bail!("Image reference has an empty tag: {s:?}");
        }

        Ok(ImageReference {
            registry,
            repository,
            tag: tag.to_string(),
            digest: String::new(),
            original: s.to_string(),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)?;
        if !self.digest.is_empty() {
            write!(f, "@{}", self.digest)?;
        }
        Ok(())
    }
}

/// Returns `(host, remainder)` if the leading path segment names a registry.
///
/// The host must look like `[a-zA-Z0-9.-]+(:[0-9]+)?` and additionally
/// contain a `.` or a `:`, or be `localhost`. Anything else is a Docker Hub
/// namespace, like `user` in `user/repo:tag`.
fn split_registry(s: &str) -> Option<(&str, &str)> {
    let (host, remainder) = s.split_once('/')?;
    if remainder.is_empty() {
        return None;
    }

    let (name, port) = match host.split_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return None;
    }
    if let Some(port) = port {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }

    if host.contains('.') || host.contains(':') || host == "localhost" {
        Some((host, remainder))
    } else {
        None
    }
}

fn split_tag(s: &str) -> (&str, &str) {
    s.rsplit_once(':').unwrap_or((s, DEFAULT_TAG))
}
