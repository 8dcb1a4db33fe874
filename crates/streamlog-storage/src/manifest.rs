//! Partition Manifest
//!
//! Each partition directory carries a tiny `MANIFEST` file recording the
//! partition's offset state, rewritten after every appended batch:
//!
//! ```text
//! base_offset: 0
//! next_offset: 1042
//! high_watermark: 1042
//! timestamp_ms: 1700000000000
//! ```
//!
//! The manifest is a hint, not the source of truth: the segments themselves
//! are the authoritative log. Manifest I/O failures are logged by callers and
//! never fail the enclosing append, and a corrupted manifest surfaces as a
//! parse error so the caller rebuilds it from segment state.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const MANIFEST_FILE: &str = "MANIFEST";

/// Offset state of one partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionManifest {
    /// Base offset of the partition's active segment
    pub base_offset: i64,

    /// Next offset a future append will receive
    pub next_offset: i64,

    /// Greatest committed (fetch-visible) offset boundary
    pub high_watermark: i64,

    /// Last update time, milliseconds since epoch
    pub timestamp_ms: i64,
}

impl PartitionManifest {
    fn to_text(self) -> String {
        format!(
            "base_offset: {}\nnext_offset: {}\nhigh_watermark: {}\ntimestamp_ms: {}\n",
            self.base_offset, self.next_offset, self.high_watermark, self.timestamp_ms
        )
    }

    fn parse(content: &str) -> Result<Self> {
        let mut manifest = PartitionManifest::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(Error::ManifestParse(format!("line without key: {line:?}")));
            };
            let value: i64 = value.trim().parse().map_err(|_| {
                Error::ManifestParse(format!("non-integer value for {}: {:?}", key.trim(), value))
            })?;
            match key.trim() {
                "base_offset" => manifest.base_offset = value,
                "next_offset" => manifest.next_offset = value,
                "high_watermark" => manifest.high_watermark = value,
                "timestamp_ms" => manifest.timestamp_ms = value,
                // Unknown keys are ignored for forward compatibility
                _ => {}
            }
        }
        Ok(manifest)
    }
}

/// Reads and writes the `MANIFEST` file of one partition directory
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new<P: AsRef<Path>>(partition_dir: P) -> Self {
        Self {
            path: partition_dir.as_ref().join(MANIFEST_FILE),
        }
    }

    /// Load the manifest. `ManifestNotFound` if the file does not exist,
    /// `ManifestParse` if it cannot be understood.
    pub async fn load(&self) -> Result<PartitionManifest> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ManifestNotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        PartitionManifest::parse(&content)
    }

    pub async fn save(&self, manifest: PartitionManifest) -> Result<()> {
        tokio::fs::write(&self.path, manifest.to_text()).await?;
        Ok(())
    }

    /// Read-modify-write of the offset fields. A missing or corrupt manifest
    /// is replaced wholesale from the given values.
    pub async fn update_offsets(
        &self,
        base_offset: i64,
        next_offset: i64,
        high_watermark: i64,
    ) -> Result<()> {
        let mut manifest = self.load().await.unwrap_or(PartitionManifest {
            base_offset,
            ..Default::default()
        });
        manifest.base_offset = base_offset;
        manifest.next_offset = next_offset;
        manifest.high_watermark = high_watermark;
        manifest.timestamp_ms = chrono::Utc::now().timestamp_millis();
        self.save(manifest).await
    }
}
