//! Amazon S3 Glacier vault API.
//!
//! The SDK is async; the pipeline is not. Every call is driven to completion
//! on a private current-thread runtime. SDK-level retries are disabled so the
//! session's [`RetryPolicy`](crate::upload::RetryPolicy) is the only one.

use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_sdk_glacier::Client;
use aws_sdk_glacier::config::Region;
use aws_sdk_glacier::config::http::HttpResponse;
use aws_sdk_glacier::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_glacier::primitives::ByteStream;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use super::{ArchiveMeta, ArchiveService, ByteRange, IncompleteUpload, now_rfc3339};
use crate::error::{GrsyncError, Result};
use crate::hash::hash_part;

/// Account id meaning "the account owning the credentials".
const ACCOUNT: &str = "-";

/// Error codes the service uses for load shedding.
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "RequestTimeoutException",
    "ServiceUnavailableException",
    "SlowDown",
];

pub struct GlacierVault {
    client: Client,
    runtime: Runtime,
}

impl GlacierVault {
    /// Build a client for `region` from the default credential chain.
    pub fn connect(region: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GrsyncError::Configuration(format!("async runtime: {e}")))?;
        let conf = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .retry_config(RetryConfig::disabled())
                .load(),
        );
        info!(region, "glacier client ready");
        Ok(Self {
            client: Client::new(&conf),
            runtime,
        })
    }

    /// Create `vault`; succeeds if it already exists. Returns its location.
    pub fn create_vault(&self, vault: &str) -> Result<String> {
        let out = self
            .runtime
            .block_on(self.client.create_vault().account_id(ACCOUNT).vault_name(vault).send())
            .map_err(|e| sdk_failure("create_vault", e))?;
        let location = out.location().unwrap_or_default().to_string();
        info!(vault, %location, "vault ready");
        Ok(location)
    }
}

impl ArchiveService for GlacierVault {
    fn initiate_upload(&self, vault: &str, part_size: u64, description: &str) -> Result<String> {
        const OP: &str = "initiate_upload";
        let out = self
            .runtime
            .block_on(
                self.client
                    .initiate_multipart_upload()
                    .account_id(ACCOUNT)
                    .vault_name(vault)
                    .part_size(part_size.to_string())
                    .archive_description(description)
                    .send(),
            )
            .map_err(|e| sdk_failure(OP, e))?;
        let upload_id = out
            .upload_id()
            .ok_or_else(|| GrsyncError::service(OP, "response carried no upload id"))?;
        debug!(vault, upload_id, part_size, "upload initiated");
        Ok(upload_id.to_string())
    }

    fn upload_part(&self, vault: &str, upload_id: &str, range: ByteRange, body: &[u8]) -> Result<String> {
        const OP: &str = "upload_part";
        let out = self
            .runtime
            .block_on(
                self.client
                    .upload_multipart_part()
                    .account_id(ACCOUNT)
                    .vault_name(vault)
                    .upload_id(upload_id)
                    .range(range.header())
                    .checksum(hash_part(body))
                    .body(ByteStream::from(body.to_vec()))
                    .send(),
            )
            .map_err(|e| sdk_failure(OP, e))?;
        out.checksum()
            .map(str::to_string)
            .ok_or_else(|| GrsyncError::service(OP, "response carried no checksum"))
    }

    fn complete_upload(
        &self,
        vault: &str,
        upload_id: &str,
        total_size: u64,
        root_checksum: &str,
    ) -> Result<ArchiveMeta> {
        const OP: &str = "complete_upload";
        let out = self
            .runtime
            .block_on(
                self.client
                    .complete_multipart_upload()
                    .account_id(ACCOUNT)
                    .vault_name(vault)
                    .upload_id(upload_id)
                    .archive_size(total_size.to_string())
                    .checksum(root_checksum)
                    .send(),
            )
            .map_err(|e| sdk_failure(OP, e))?;
        let archive_id = out
            .archive_id()
            .ok_or_else(|| GrsyncError::service(OP, "response carried no archive id"))?;
        Ok(ArchiveMeta {
            archive_id: archive_id.to_string(),
            location: out.location().unwrap_or_default().to_string(),
            checksum: out.checksum().unwrap_or(root_checksum).to_string(),
            timestamp: now_rfc3339(OP)?,
        })
    }

    fn abort_upload(&self, vault: &str, upload_id: &str) -> Result<()> {
        self.runtime
            .block_on(
                self.client
                    .abort_multipart_upload()
                    .account_id(ACCOUNT)
                    .vault_name(vault)
                    .upload_id(upload_id)
                    .send(),
            )
            .map_err(|e| sdk_failure("abort_upload", e))?;
        Ok(())
    }

    fn list_incomplete_uploads(&self, vault: &str) -> Result<Vec<IncompleteUpload>> {
        const OP: &str = "list_incomplete_uploads";
        let mut uploads = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .runtime
                .block_on(
                    self.client
                        .list_multipart_uploads()
                        .account_id(ACCOUNT)
                        .vault_name(vault)
                        .set_marker(marker.take())
                        .send(),
                )
                .map_err(|e| sdk_failure(OP, e))?;
            uploads.extend(page.uploads_list().iter().map(|u| IncompleteUpload {
                upload_id: u.multipart_upload_id().unwrap_or_default().to_string(),
                description: u.archive_description().unwrap_or_default().to_string(),
                created_at: u.creation_date().unwrap_or_default().to_string(),
                part_size: u64::try_from(u.part_size_in_bytes()).unwrap_or(0),
            }));
            match page.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(uploads)
    }
}

pub(crate) fn sdk_failure<E>(op: &'static str, err: SdkError<E, HttpResponse>) -> GrsyncError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => GrsyncError::transient(op, message),
        _ => classify(op, status, code.as_deref(), message),
    }
}

/// Throttling and server-side faults may be retried; anything else is final.
pub(crate) fn classify(op: &'static str, status: Option<u16>, code: Option<&str>, message: String) -> GrsyncError {
    let throttled = code.is_some_and(|c| TRANSIENT_CODES.contains(&c));
    let server_fault = status.is_some_and(|s| s == 429 || (500..600).contains(&s));
    if throttled || server_fault {
        GrsyncError::transient(op, message)
    } else {
        GrsyncError::service(op, message)
    }
}
