use std::time::Duration;

use serde::Serialize;

use super::UploadReceipt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IngestPhase {
    Idle,
    Profiling,
    Compressing,
    Uploading,
    Paused,
    Finished,
    Cancelled,
}

impl Default for IngestPhase {
    fn default() -> Self {
        IngestPhase::Idle
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum CompressionReport {
    Compressed {
        original_bytes: usize,
        compressed_bytes: usize,
    },
    /// The original bytes were uploaded instead.
    Fallback { reason: String },
    /// The source could not be read, so nothing was uploaded.
    Unreadable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum UploadReport {
    Uploaded { receipt: UploadReceipt },
    Failed { reason: String },
    Skipped,
}

/// Outcome of one input file, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub index: usize,
    pub name: String,
    pub compression: CompressionReport,
    pub upload: UploadReport,
}

impl ItemReport {
    pub fn is_uploaded(&self) -> bool {
        matches!(self.upload, UploadReport::Uploaded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub total_files: usize,
    pub uploaded: usize,
    pub failed: Vec<FailedItem>,
    pub items: Vec<ItemReport>,
    pub compression_fallbacks: usize,
    pub batches: usize,
    pub final_batch_size: usize,
    pub cleanup_hints: usize,
    pub pauses: usize,
    pub cancelled: bool,
    pub exceeded_safe_capacity: bool,
    pub elapsed: Duration,
}

impl IngestSummary {
    /// True only when every input file failed. Whether that fails the whole
    /// operation is the caller's call.
    pub fn all_failed(&self) -> bool {
        self.total_files > 0 && self.uploaded == 0 && self.failed.len() == self.total_files
    }

    pub(crate) fn record(&mut self, item: ItemReport) {
        if item.is_uploaded() {
            self.uploaded += 1;
        } else if let (CompressionReport::Unreadable { reason }, _)
        | (_, UploadReport::Failed { reason }) = (&item.compression, &item.upload)
        {
            self.failed.push(FailedItem {
                index: item.index,
                name: item.name.clone(),
                reason: reason.clone(),
            });
        }
        if matches!(item.compression, CompressionReport::Fallback { .. }) {
            self.compression_fallbacks += 1;
        }
        self.items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(index: usize, upload: UploadReport) -> ItemReport {
        ItemReport {
            index,
            name: format!("{index}.jpg"),
            compression: CompressionReport::Fallback {
                reason: "no size reduction".into(),
            },
            upload,
        }
    }

    #[test]
    fn records_split_into_uploaded_and_failed() {
        let mut summary = IngestSummary {
            total_files: 2,
            ..IngestSummary::default()
        };
        summary.record(report(
            0,
            UploadReport::Uploaded {
                receipt: UploadReceipt {
                    url: "u".into(),
                    filename: "f".into(),
                    id: "i".into(),
                },
            },
        ));
        summary.record(report(
            1,
            UploadReport::Failed {
                reason: "offline".into(),
            },
        ));

        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.compression_fallbacks, 2);
        assert_eq!(summary.failed[0].name, "1.jpg");
        assert!(!summary.all_failed());
    }

    #[test]
    fn all_failed_requires_every_item_to_fail() {
        let mut summary = IngestSummary {
            total_files: 1,
            ..IngestSummary::default()
        };
        assert!(!summary.all_failed());
        summary.record(report(
            0,
            UploadReport::Failed {
                reason: "offline".into(),
            },
        ));
        assert!(summary.all_failed());
    }
}
