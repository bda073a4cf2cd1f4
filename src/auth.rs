//! Registry credentials from the same places the docker and podman CLIs keep them.

use crate::errors::*;
use crate::reference::DOCKER_HUB;
use data_encoding::BASE64;
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// The server name credential helpers expect for Docker Hub
const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";
const DOCKER_HUB_ALIASES: &[&str] = &["docker.io", "index.docker.io", "registry-1.docker.io"];

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub auths: HashMap<String, AuthEntry>,
    pub creds_store: Option<String>,
    #[serde(default)]
    pub cred_helpers: HashMap<String, String>,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
pub struct AuthEntry {
    pub auth: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperCredentials {
    username: String,
    secret: String,
}

impl AuthConfig {
    pub fn deserialize(buf: &str) -> Result<Self> {
        let config = serde_json::from_str(buf).context("Failed to parse registry auth file")?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let buf = fs::read_to_string(path)
            .await
            .with_context(|| anyhow!("Failed to read registry auth file: {path:?}"))?;
        Self::deserialize(&buf)
    }

    /// Credentials stored directly in the `auths` section of the file.
    pub fn inline_credentials(&self, registry: &str) -> Result<Option<(String, String)>> {
        let server = normalize_server(registry);
        let Some(entry) = self
            .auths
            .iter()
            .find(|(key, _)| normalize_server(key) == server)
            .map(|(_, entry)| entry)
        else {
            return Ok(None);
        };

        if let Some(auth) = &entry.auth {
            let decoded = BASE64
                .decode(auth.as_bytes())
                .with_context(|| anyhow!("Failed to decode credentials for {registry:?} as base64"))?;
            let decoded = String::from_utf8(decoded)?;
            let (username, password) = decoded
                .split_once(':')
                .with_context(|| anyhow!("Credentials for {registry:?} are not username:password"))?;
            return Ok(Some((username.to_string(), password.to_string())));
        }

        match (&entry.username, &entry.password) {
            (Some(username), Some(password)) => Ok(Some((username.clone(), password.clone()))),
            _ => Ok(None),
        }
    }

    /// The credential helper responsible for this registry, if any.
    pub fn helper_for(&self, registry: &str) -> Option<&str> {
        let server = normalize_server(registry);
        self.cred_helpers
            .iter()
            .find(|(key, _)| normalize_server(key) == server)
            .map(|(_, helper)| helper.as_str())
            .or(self.creds_store.as_deref())
    }

    pub async fn credentials(&self, registry: &str) -> Result<Option<(String, String)>> {
        if let Some(helper) = self.helper_for(registry) {
            if let Some(credentials) = credential_helper(helper, registry).await? {
                return Ok(Some(credentials));
            }
        }
        self.inline_credentials(registry)
    }
}

/// `example.com:5000`, `https://example.com:5000/v2/` and `EXAMPLE.COM:5000` are the same server.
pub fn normalize_server(server: &str) -> String {
    let server = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"))
        .unwrap_or(server);
    let host = server.split('/').next().unwrap_or(server).to_lowercase();
    if DOCKER_HUB_ALIASES.contains(&host.as_str()) {
        DOCKER_HUB.to_string()
    } else {
        host
    }
}

/// Docker's config comes first, podman's auth files are only consulted after it.
pub fn auth_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(docker_config) = env::var_os("DOCKER_CONFIG") {
        candidates.push(Path::new(&docker_config).join("config.json"));
    } else if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".docker/config.json"));
    }
    if let Some(path) = env::var_os("REGISTRY_AUTH_FILE") {
        candidates.push(PathBuf::from(path));
    }
    if let Some(runtime_dir) = env::var_os("XDG_RUNTIME_DIR") {
        candidates.push(Path::new(&runtime_dir).join("containers/auth.json"));
    }
    candidates
}

async fn credential_helper(helper: &str, registry: &str) -> Result<Option<(String, String)>> {
    let bin = format!("docker-credential-{helper}");
    let server = if normalize_server(registry) == DOCKER_HUB {
        DOCKER_HUB_SERVER
    } else {
        registry
    };
    run_credential_helper(Path::new(&bin), server).await
}

/// The helper process is killed if this future is dropped before it exits.
async fn run_credential_helper(bin: &Path, server: &str) -> Result<Option<(String, String)>> {
    let mut cmd = Command::new(bin);
    cmd.arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    debug!("Spawning credential helper: {bin:?} get ({server:?})");
    let mut child = cmd
        .spawn()
        .with_context(|| anyhow!("Failed to execute credential helper {bin:?}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(server.as_bytes()).await?;
    }

    let out = child.wait_with_output().await?;
    debug!("Credential helper exited: {:?}", out.status);
    if !out.status.success() {
        // helpers exit non-zero when they have nothing stored for this server
        return Ok(None);
    }

    let credentials = serde_json::from_slice::<HelperCredentials>(&out.stdout)
        .with_context(|| anyhow!("Failed to parse output of {bin:?}"))?;
    Ok(Some((credentials.username, credentials.secret)))
}

/// Find credentials for `registry`, falling back to anonymous access.
pub async fn resolve_auth(registry: &str) -> RegistryAuth {
    resolve_auth_from(&auth_file_candidates(), registry).await
}

/// The first auth file with credentials for `registry` wins.
pub async fn resolve_auth_from<P: AsRef<Path>>(candidates: &[P], registry: &str) -> RegistryAuth {
    for path in candidates {
        let path = path.as_ref();
        if !path.exists() {
            continue;
        }
        debug!("Checking registry auth file: {path:?}");
        let credentials = match AuthConfig::load(path).await {
            Ok(config) => config.credentials(registry).await,
            Err(err) => Err(err),
        };
        match credentials {
            Ok(Some((username, password))) => {
                debug!("Found credentials for {registry:?} in {path:?}");
                return RegistryAuth::Basic(username, password);
            }
            Ok(None) => debug!("No credentials for {registry:?} in {path:?}"),
            Err(err) => {
                debug!("Failed to look up credentials for {registry:?} in {path:?}: {err:#}")
            }
        }
    }
    debug!("No credentials for {registry:?}, using anonymous access");
    RegistryAuth::Anonymous
}
