use async_trait::async_trait;
use std::path::Path;

use super::ytdlp::YtDlp;
use super::{FetchError, MediaFetcher, SourceKind};

/// Instagram video fetcher. Instagram refuses anonymous downloads, so a login is required.
pub struct InstagramFetcher {
    ytdlp: YtDlp,
    username: Option<String>,
    password: Option<String>,
}

impl InstagramFetcher {
    pub fn new(ytdlp: YtDlp, username: Option<String>, password: Option<String>) -> Self {
        Self {
            ytdlp,
            username,
            password,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), FetchError> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Ok((user, pass)),
            _ => Err(FetchError::CredentialsMissing(
                "Instagram credentials missing in environment variables".to_string(),
            )),
        }
    }
}

#[async_trait]
impl MediaFetcher for InstagramFetcher {
    fn source(&self) -> SourceKind {
        SourceKind::Instagram
    }

    fn ready(&self) -> Result<(), FetchError> {
        self.credentials().map(|_| ())
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let (username, password) = self.credentials()?;
        tracing::info!(url = %url, "Fetching Instagram video");

        let args = [
            "--format".to_string(),
            "best".to_string(),
            "--username".to_string(),
            username.to_string(),
            "--password".to_string(),
            password.to_string(),
        ];
        self.ytdlp.download(url, dest, &args).await
    }
}
