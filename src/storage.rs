use std::{fmt, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client as S3Client,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::{config::AppConfig, validation::UploadedFile};

pub const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()>;

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

/// The three files a note can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSlot {
    Original,
    Report,
    Attested,
}

impl FileSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSlot::Original => "original",
            FileSlot::Report => "report",
            FileSlot::Attested => "attested",
        }
    }
}

impl fmt::Display for FileSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileSlot {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "original" => Ok(FileSlot::Original),
            "report" => Ok(FileSlot::Report),
            "attested" => Ok(FileSlot::Attested),
            other => Err(format!(
                "unknown file kind '{other}'. Allowed kinds: original, report, attested"
            )),
        }
    }
}

/// A file that made it into storage.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub key: String,
    pub filename: String,
    pub mime: String,
    pub checksum: String,
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "arquivo".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `notes/{note_id}/{slot}/{unique}-{filename}`; a fresh segment per upload keeps an
/// attestation that is reverted and redone from overwriting the earlier blob.
pub fn note_file_key(note_id: Uuid, slot: FileSlot, filename: &str) -> String {
    let encoded = utf8_percent_encode(&sanitize_filename(filename), NON_ALPHANUMERIC).to_string();
    format!("notes/{note_id}/{slot}/{}-{encoded}", Uuid::new_v4().simple())
}

pub fn inline_content_disposition(filename: &str) -> String {
    let sanitized = sanitize_filename(filename);
    let encoded = utf8_percent_encode(&sanitized, NON_ALPHANUMERIC);
    format!("inline; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

pub fn checksum_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub async fn store_note_file(
    storage: &dyn ObjectStorage,
    note_id: Uuid,
    slot: FileSlot,
    file: UploadedFile,
) -> Result<StoredBlob> {
    let filename = sanitize_filename(&file.filename);
    let key = note_file_key(note_id, slot, &filename);
    let checksum = checksum_hex(&file.bytes);
    storage
        .put_object(
            &key,
            file.bytes,
            Some(file.mime.clone()),
            Some(inline_content_disposition(&filename)),
        )
        .await
        .with_context(|| format!("failed to store {slot} file for note {note_id}"))?;
    Ok(StoredBlob {
        key,
        filename,
        mime: file.mime,
        checksum,
    })
}

/// Deletes blobs that no row references any more. Failures only leave garbage behind.
pub async fn discard_blobs<I>(storage: &dyn ObjectStorage, keys: I)
where
    I: IntoIterator<Item = String>,
{
    for key in keys {
        if let Err(err) = storage.delete_object(&key).await {
            warn!(key = %key, error = %err, "failed to delete unreferenced blob");
        }
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Path-style addressing so MinIO and other S3-compatible endpoints work.
    pub async fn from_config(config: &AppConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()));

        if let Some(endpoint) = &config.aws_endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) =
            (&config.aws_access_key_id, &config.aws_secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "ateste-env",
            ));
        }

        let shared = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&shared).force_path_style(true).build();
        Self::new(S3Client::from_conf(s3_config), config.s3_bucket.clone())
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        if let Some(content_disposition) = content_disposition {
            request = request.content_disposition(content_disposition);
        }

        request
            .send()
            .await
            .context("failed to upload note file to S3")?;
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .context("failed to build S3 presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .context("failed to presign note file URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to download note file from S3")?;

        Ok(response
            .body
            .collect()
            .await
            .context("failed to read note file stream")?
            .into_bytes()
            .to_vec())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete note file from S3")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_live_under_the_note_folder() {
        let note_id = Uuid::new_v4();
        let key = note_file_key(note_id, FileSlot::Attested, "nota atestada.pdf");
        assert!(key.starts_with(&format!("notes/{note_id}/attested/")));
        assert!(key.ends_with("-nota%20atestada%2Epdf"));
        assert_ne!(key, note_file_key(note_id, FileSlot::Attested, "nota atestada.pdf"));
    }

    #[test]
    fn filenames_lose_paths_and_quotes() {
        assert_eq!(sanitize_filename("C:\\docs\\nota\".pdf"), "nota_.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("   "), "arquivo");
    }

    #[test]
    fn disposition_carries_utf8_name() {
        assert_eq!(
            inline_content_disposition("relatório.pdf"),
            "inline; filename=\"relatório.pdf\"; filename*=UTF-8''relat%C3%B3rio%2Epdf"
        );
    }

    #[test]
    fn file_slots_parse_from_path() {
        assert_eq!("report".parse::<FileSlot>().unwrap(), FileSlot::Report);
        assert!("thumbnail".parse::<FileSlot>().is_err());
    }
}
