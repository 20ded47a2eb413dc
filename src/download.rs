//! Chunked file download with CRC-32 verification.
//!
//! Flow: StartDownload → N × DownloadChunk (until `is_last_chunk`) →
//! size check → write to disk → GetFileChecksum compare.
//!
//! A local file whose checksum already matches the badge's copy is not
//! transferred again.

use std::path::Path;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::messages::MAX_CHUNK_SIZE;
use crate::protocol::{FileEntry, checksum_file, crc32};
use crate::session::{BadgeSession, Transport};

/// Progress report after each received chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub received_bytes: usize,
    pub expected_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The file was transferred and written.
    Downloaded {
        bytes: usize,
        chunks: u32,
        verified: bool,
    },
    /// A local copy with a matching checksum already existed.
    AlreadyPresent { checksum: u32 },
}

/// Aggregate result of downloading every file on a badge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadSummary {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
    pub failures: Vec<(String, Error)>,
}

/// Host-side state of one transfer.
struct DownloadSession {
    expected_size: u32,
    total_chunks: u32,
    received: Vec<u8>,
    next_chunk_index: u32,
}

/// Upper bound on the buffer reserved up front; larger files grow on demand.
const PREALLOC_LIMIT: usize = 64 * 1024;

impl DownloadSession {
    fn new(expected_size: u32, total_chunks: u32) -> Self {
        let capacity = (expected_size as usize)
            .min(Self::max_bytes(total_chunks).try_into().unwrap_or(usize::MAX))
            .min(PREALLOC_LIMIT);
        Self {
            expected_size,
            total_chunks,
            received: Vec::with_capacity(capacity),
            next_chunk_index: 0,
        }
    }

    fn max_bytes(total_chunks: u32) -> u64 {
        u64::from(total_chunks) * MAX_CHUNK_SIZE as u64
    }

    /// Whether the advertised chunks can carry the advertised size at all.
    fn size_is_reachable(&self) -> bool {
        u64::from(self.expected_size) <= Self::max_bytes(self.total_chunks)
    }

    fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            chunk_index: self.next_chunk_index.saturating_sub(1),
            total_chunks: self.total_chunks,
            received_bytes: self.received.len(),
            expected_size: self.expected_size,
        }
    }
}

/// Badge file names become local path components; reject anything that
/// could escape the output directory.
fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// File listing and transfer on top of a connected session.
pub struct DownloadManager<'s, T: Transport> {
    session: &'s mut BadgeSession<T>,
    page_size: u8,
}

impl<'s, T: Transport> DownloadManager<'s, T> {
    pub fn new(session: &'s mut BadgeSession<T>) -> Self {
        let page_size = session.config().list_page_size;
        Self { session, page_size }
    }

    pub fn session(&mut self) -> &mut BadgeSession<T> {
        self.session
    }

    /// All files stored on the badge, in listing order.
    pub async fn list_files(&mut self) -> Result<Vec<FileEntry>> {
        self.list_files_from(0).await
    }

    pub async fn list_files_from(&mut self, start_index: u8) -> Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        let mut start = u16::from(start_index);
        loop {
            let page = self
                .session
                .list_files_page(start as u8, self.page_size)
                .await?;
            files.extend(page.files.iter().cloned());

            let next = start + u16::from(page.file_count);
            if page.file_count == 0 || next >= u16::from(page.total_files) {
                break;
            }
            start = next;
        }
        debug!(
            "DOWNLOAD[{}]: listed {} files",
            self.session.label(),
            files.len()
        );
        Ok(files)
    }

    async fn remote_checksum(&mut self, filename: &str) -> Result<u32> {
        let response = self.session.get_file_checksum(filename).await?;
        if !response.success {
            return Err(Error::ChecksumUnavailable(
                response.error_message.as_str().to_owned(),
            ));
        }
        Ok(response.checksum)
    }

    pub async fn download_file(
        &mut self,
        filename: &str,
        local_path: &Path,
        verify_checksum: bool,
    ) -> Result<DownloadOutcome> {
        self.download_file_with_progress(filename, local_path, verify_checksum, |_| {})
            .await
    }

    /// Download `filename` to `local_path`, calling `progress` after each chunk.
    ///
    /// `ChecksumMismatch` is returned after the file has been written; the
    /// caller decides whether to retry.
    pub async fn download_file_with_progress(
        &mut self,
        filename: &str,
        local_path: &Path,
        verify_checksum: bool,
        mut progress: impl FnMut(&DownloadProgress),
    ) -> Result<DownloadOutcome> {
        let label = self.session.label().to_owned();

        if verify_checksum && local_path.exists() {
            let local = checksum_file(local_path)?;
            match self.remote_checksum(filename).await {
                Ok(remote) if remote == local => {
                    info!(
                        "DOWNLOAD[{}]: {} already present ({:#010x})",
                        label, filename, local
                    );
                    return Ok(DownloadOutcome::AlreadyPresent { checksum: local });
                }
                Ok(remote) => info!(
                    "DOWNLOAD[{}]: {} differs (badge {:#010x}, local {:#010x}), fetching again",
                    label, filename, remote, local
                ),
                Err(e @ Error::ChecksumUnavailable(_)) => {
                    warn!("DOWNLOAD[{}]: {}: {}", label, filename, e);
                }
                Err(e) => return Err(e),
            }
        }

        let start = self.session.start_download(filename).await?;
        if !start.success {
            return Err(Error::DownloadRejected {
                filename: filename.to_owned(),
            });
        }
        info!(
            "DOWNLOAD[{}]: {} ({} bytes, {} chunks)",
            label, filename, start.file_size, start.total_chunks
        );

        let mut transfer = DownloadSession::new(start.file_size, start.total_chunks);
        if !transfer.size_is_reachable() {
            warn!(
                "DOWNLOAD[{}]: {} claims {} bytes in only {} chunks",
                label, filename, start.file_size, start.total_chunks
            );
            return Err(Error::SizeMismatch {
                expected: transfer.expected_size,
                actual: 0,
            });
        }
        while transfer.next_chunk_index < transfer.total_chunks {
            let index = transfer.next_chunk_index;
            let chunk = self.session.download_chunk(index).await?;
            if chunk.chunk_size() == 0 {
                return Err(Error::EmptyChunk { index });
            }
            transfer.received.extend_from_slice(&chunk.data);
            transfer.next_chunk_index += 1;
            progress(&transfer.progress());

            if chunk.is_last_chunk {
                debug!("DOWNLOAD[{}]: last chunk at index {}", label, index);
                break;
            }
        }

        if transfer.received.len() != transfer.expected_size as usize {
            return Err(Error::SizeMismatch {
                expected: transfer.expected_size,
                actual: transfer.received.len(),
            });
        }
        std::fs::write(local_path, &transfer.received)?;

        if verify_checksum {
            let local = crc32(&transfer.received);
            let remote = self.remote_checksum(filename).await?;
            if remote != local {
                warn!(
                    "DOWNLOAD[{}]: {} checksum mismatch (badge {:#010x}, local {:#010x})",
                    label, filename, remote, local
                );
                return Err(Error::ChecksumMismatch {
                    expected: remote,
                    actual: local,
                });
            }
        }

        Ok(DownloadOutcome::Downloaded {
            bytes: transfer.received.len(),
            chunks: transfer.next_chunk_index,
            verified: verify_checksum,
        })
    }

    /// Download every listed file into `output_dir`, verifying each.
    ///
    /// One file failing does not stop the others.
    pub async fn download_all_files(&mut self, output_dir: &Path) -> Result<DownloadSummary> {
        let files = self.list_files().await?;
        let mut summary = DownloadSummary {
            total: files.len(),
            ..DownloadSummary::default()
        };
        if files.is_empty() {
            return Ok(summary);
        }
        std::fs::create_dir_all(output_dir)?;

        for entry in &files {
            let name = entry.filename.as_str();
            let outcome = if is_safe_filename(name) {
                self.download_file(name, &output_dir.join(name), true).await
            } else {
                Err(Error::Io(format!("refusing unsafe file name {name:?}")))
            };
            match outcome {
                Ok(_) => summary.success += 1,
                Err(e) => {
                    warn!(
                        "DOWNLOAD[{}]: {} failed: {}",
                        self.session.label(),
                        name,
                        e
                    );
                    summary.failed += 1;
                    summary.failures.push((name.to_owned(), e));
                }
            }
        }

        info!(
            "DOWNLOAD[{}]: {}/{} files downloaded",
            self.session.label(),
            summary.success,
            summary.total
        );
        Ok(summary)
    }
}
