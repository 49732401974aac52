//! Remote store for any S3-compatible bucket

use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use super::remote::{parse_batch_timestamp, RemoteAccount, RemoteObject, RemoteStore};
use crate::config::{S3Config, S3Credentials};
use crate::error::{Error, Result};
use crate::util::now_millis;

/// Key prefix used when the config does not name one
pub const SYNC_PREFIX: &str = "cellarbook-sync/";

const DEFAULT_REGION: &str = "auto";

/// Sync batches stored under one key prefix of an S3-compatible bucket.
#[derive(Clone, Debug)]
pub struct S3RemoteStore {
    config: S3Config,
    credentials: S3Credentials,
    prefix: String,
}

impl S3RemoteStore {
    #[must_use]
    pub fn new(config: S3Config, credentials: &S3Credentials) -> Self {
        let prefix = normalize_prefix(config.prefix.as_deref());
        Self {
            config,
            credentials: credentials.clone(),
            prefix,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &S3Config {
        &self.config
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn object_key(&self, name: &str) -> Result<String> {
        let name = name.trim().trim_matches('/');
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidInput(format!(
                "Invalid remote object name '{name}'"
            )));
        }
        Ok(format!("{}{name}", self.prefix))
    }

    fn s3_client(&self) -> Client {
        build_s3_client(&self.config, &self.credentials)
    }

    /// Accept either a bare object name or a full key under our prefix.
    fn resolve_key(&self, id: &str) -> Result<String> {
        id.strip_prefix(self.prefix.as_str())
            .map_or_else(|| self.object_key(id), |name| self.object_key(name))
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    let prefix = prefix.map(|value| value.trim().trim_matches('/')).unwrap_or_default();
    if prefix.is_empty() {
        SYNC_PREFIX.to_string()
    } else {
        format!("{prefix}/")
    }
}

fn build_s3_client(config: &S3Config, credentials: &S3Credentials) -> Client {
    let credentials = Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        None,
        None,
        "cellarbook-s3-remote",
    );

    let region = config
        .region
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let mut builder = aws_sdk_s3::config::Builder::new()
        .region(Region::new(region))
        .credentials_provider(credentials)
        .force_path_style(true);
    if let Some(endpoint_url) = config.endpoint_url.as_deref() {
        builder = builder.endpoint_url(endpoint_url.trim_end_matches('/'));
    }

    Client::from_conf(builder.build())
}

fn storage_error(
    operation: &str,
    bucket: &str,
    object_key: Option<&str>,
    error: impl std::fmt::Display,
) -> Error {
    let target = object_key.map_or_else(|| bucket.to_string(), |key| format!("{bucket}/{key}"));
    Error::Storage(format!("S3 {operation} failed for {target}: {error}"))
}

impl RemoteStore for S3RemoteStore {
    async fn account(&self) -> Result<Option<RemoteAccount>> {
        Ok(Some(RemoteAccount {
            id: self.config.bucket.clone(),
            display_name: format!("s3://{}/{}", self.config.bucket, self.prefix),
        }))
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>> {
        let bucket = &self.config.bucket;
        let client = self.s3_client();
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(&self.prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|error| storage_error("list_objects_v2", bucket, None, error))?;

            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let name = key.strip_prefix(self.prefix.as_str()).unwrap_or(key);
                if name.is_empty() || name.contains('/') {
                    continue;
                }
                let created_at = parse_batch_timestamp(name)
                    .or_else(|| object.last_modified().and_then(|time| time.to_millis().ok()))
                    .unwrap_or_default();
                objects.push(RemoteObject {
                    id: key.to_string(),
                    name: name.to_string(),
                    created_at,
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(objects)
    }

    async fn get_object(&self, id: &str) -> Result<Vec<u8>> {
        let key = self.resolve_key(id)?;
        let bucket = &self.config.bucket;

        let response = self
            .s3_client()
            .get_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .map_err(|error| storage_error("get_object", bucket, Some(&key), error))?;

        let payload = response
            .body
            .collect()
            .await
            .map_err(|error| storage_error("get_object_body", bucket, Some(&key), error))?;
        Ok(payload.into_bytes().to_vec())
    }

    async fn put_object(&self, name: &str, bytes: Vec<u8>) -> Result<RemoteObject> {
        let key = self.object_key(name)?;
        let bucket = &self.config.bucket;

        self.s3_client()
            .put_object()
            .bucket(bucket)
            .key(&key)
            .content_type("application/json")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|error| storage_error("put_object", bucket, Some(&key), error))?;

        Ok(RemoteObject {
            id: key,
            name: name.to_string(),
            created_at: parse_batch_timestamp(name).unwrap_or_else(now_millis),
        })
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        let key = self.resolve_key(id)?;
        let bucket = &self.config.bucket;

        self.s3_client()
            .delete_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .map_err(|error| storage_error("delete_object", bucket, Some(&key), error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store(prefix: Option<&str>) -> S3RemoteStore {
        S3RemoteStore::new(
            S3Config {
                bucket: "cellar".into(),
                endpoint_url: Some("http://localhost:9000/".into()),
                region: None,
                prefix: prefix.map(ToOwned::to_owned),
            },
            &S3Credentials {
                access_key_id: "AKID".into(),
                secret_access_key: "SECRET".into(),
            },
        )
    }

    #[test]
    fn prefix_defaults_to_app_folder() {
        assert_eq!(store(None).prefix(), SYNC_PREFIX);
        assert_eq!(store(Some("  ")).prefix(), SYNC_PREFIX);
        assert_eq!(store(Some("/devices/shared/")).prefix(), "devices/shared/");
    }

    #[test]
    fn keys_stay_under_prefix() {
        let store = store(None);
        assert_eq!(
            store.object_key("batch-1-a.json").unwrap(),
            "cellarbook-sync/batch-1-a.json"
        );
        assert_eq!(
            store.resolve_key("cellarbook-sync/batch-1-a.json").unwrap(),
            "cellarbook-sync/batch-1-a.json"
        );
        assert_eq!(
            store.resolve_key("batch-1-a.json").unwrap(),
            "cellarbook-sync/batch-1-a.json"
        );
        assert!(store.object_key("../other/x.json").is_err());
        assert!(store.object_key("   ").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn account_names_the_bucket() {
        let account = store(None).account().await.unwrap().unwrap();
        assert_eq!(account.id, "cellar");
        assert_eq!(account.display_name, "s3://cellar/cellarbook-sync/");
    }

    #[test]
    fn storage_error_names_target() {
        let error = storage_error("put_object", "cellar", Some("k"), "boom");
        assert_eq!(error.to_string(), "Storage error: S3 put_object failed for cellar/k: boom");
    }
}
