use super::retention::{select_expired, RemoteEntry};
use super::{file_name_of, io_err, partial_name, remote_join, PruneOutcome, Result, StorageBackend, StorageError};
use crate::config::S3Config;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;
use tracing::{debug, info};

const NAME: &str = "s3";

/// S3-compatible object storage (AWS, MinIO, ...)
///
/// The SDK is async; this backend owns a current-thread runtime and blocks on it, so it
/// must be driven from a thread outside any other runtime (the main thread or the
/// blocking pool).
pub struct S3Storage {
    client: Client,
    runtime: Runtime,
    bucket: String,
    prefix: String,
}

/// Add a scheme to bare `host:port` endpoints
fn normalize_endpoint(endpoint: &str, disable_ssl: bool) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else if disable_ssl {
        format!("http://{}", endpoint)
    } else {
        format!("https://{}", endpoint)
    }
}

fn transfer_err<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Transfer {
        backend: NAME,
        message: DisplayErrorContext(err).to_string(),
    }
}

impl S3Storage {
    pub fn connect(config: &S3Config) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Connection {
                backend: NAME,
                message: format!("failed to start runtime: {}", e),
            })?;

        let endpoint = normalize_endpoint(&config.endpoint, config.disable_ssl);
        debug!("Connecting to S3 endpoint {} (bucket {})", endpoint, config.bucket);

        let shared = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .endpoint_url(endpoint)
                .credentials_provider(Credentials::new(
                    config.access_key.expose(),
                    config.secret_key.expose(),
                    None,
                    None,
                    "volume-backup",
                ))
                .load(),
        );

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            runtime,
            bucket: config.bucket.clone(),
            prefix: config.remote_path.trim_matches('/').to_string(),
        })
    }

    fn key(&self, name: &str) -> String {
        remote_join(&self.prefix, name)
    }

    fn list(&self) -> Result<Vec<RemoteEntry>> {
        let list_prefix = if self.prefix.is_empty() {
            None
        } else {
            Some(format!("{}/", self.prefix))
        };

        let mut entries = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .runtime
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .set_prefix(list_prefix.clone())
                        .set_continuation_token(token.take())
                        .send(),
                )
                .map_err(transfer_err)?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                let name = match &list_prefix {
                    Some(prefix) => key.strip_prefix(prefix.as_str()).unwrap_or(key),
                    None => key,
                };
                // Only direct children of the prefix
                if name.is_empty() || name.contains('/') {
                    continue;
                }
                let Some(modified) = object
                    .last_modified()
                    .and_then(|t| Utc.timestamp_opt(t.secs(), 0).single())
                else {
                    continue;
                };
                entries.push(RemoteEntry {
                    name: name.to_string(),
                    modified,
                });
            }

            match output.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        Ok(entries)
    }

    async fn fetch(&self, key: &str, remote_name: &str, partial: &Path) -> Result<()> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => StorageError::NotFound {
                    backend: NAME,
                    name: remote_name.to_string(),
                },
                _ => transfer_err(e),
            })?;

        let body = output.body.into_async_read();
        tokio::pin!(body);

        let mut file = tokio::fs::File::create(partial).await.map_err(io_err(partial))?;
        tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(io_err(partial))?;
        file.flush().await.map_err(io_err(partial))?;
        Ok(())
    }
}

impl StorageBackend for S3Storage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn location(&self, file_name: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key(file_name))
    }

    fn upload(&self, local_path: &Path) -> Result<()> {
        let name = file_name_of(local_path)?;
        let key = self.key(&name);
        info!("Uploading backup archive to remote storage S3 ...");

        let body = self
            .runtime
            .block_on(ByteStream::from_path(local_path))
            .map_err(transfer_err)?;

        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .body(body)
                    .send(),
            )
            .map_err(transfer_err)?;

        info!("Uploading backup archive to remote storage S3 ... done");
        debug!("Stored s3://{}/{}", self.bucket, key);
        Ok(())
    }

    fn download(&self, remote_name: &str, local_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(local_dir).map_err(io_err(local_dir))?;
        let target = local_dir.join(remote_name);
        let partial = local_dir.join(partial_name(remote_name));
        let key = self.key(remote_name);

        info!("Downloading backup from S3...");
        if let Err(e) = self.runtime.block_on(self.fetch(&key, remote_name, &partial)) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        fs::rename(&partial, &target).map_err(io_err(&target))?;
        info!("Downloading backup from S3...done");

        Ok(target)
    }

    fn prune(&self, retention_days: u32) -> Result<PruneOutcome> {
        let expired = select_expired(&self.list()?, Utc::now(), retention_days);

        let mut deleted = Vec::with_capacity(expired.len());
        for entry in expired {
            self.runtime
                .block_on(
                    self.client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(self.key(&entry.name))
                        .send(),
                )
                .map_err(transfer_err)?;
            deleted.push(entry.name);
        }

        Ok(PruneOutcome::Pruned { deleted })
    }
}
