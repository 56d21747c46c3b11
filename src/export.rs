// src/export.rs
//
// Export helpers over queue snapshots: download names, archive manifests,
// batch summaries, human readable sizes.

use crate::options::CompressionFormat;
use crate::pipeline::entry::EntryStatus;
use crate::pipeline::store::{EntryView, QueueSnapshot};
use chrono::{DateTime, TimeZone};
use std::collections::HashSet;
use std::sync::Arc;

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// `1536` -> `"1.5 KB"`. One decimal below 10, none above.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        return format!("{bytes} B");
    }
    if value < 10.0 {
        format!("{value:.1} {}", UNITS[unit])
    } else {
        format!("{value:.0} {}", UNITS[unit])
    }
}

/// Name without its last extension. A trailing dot is kept as part of the
/// stem, so `"a."` stays `"a."` and `".png"` becomes `""`.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() => &name[..dot],
        _ => name,
    }
}

pub fn download_name(name: &str, format: CompressionFormat, suffix: &str) -> String {
    let stem = match file_stem(name) {
        "" => "image",
        stem => stem,
    };
    format!("{stem}{suffix}.{}", format.extension())
}

/// Name of the `position`-th (1-based) finished entry inside an archive.
pub fn archive_entry_name(name: &str, format: CompressionFormat, position: usize) -> String {
    match file_stem(name) {
        "" => format!("image-{position}.{}", format.extension()),
        stem => format!("{stem}.{}", format.extension()),
    }
}

/// Archive members must not shadow each other: a taken name gets the first
/// free `-2`, `-3`, ... suffix.
fn claim_unique_name(
    taken: &mut HashSet<String>,
    name: String,
    format: CompressionFormat,
) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let stem = file_stem(&name).to_string();
    let mut n = 2usize;
    loop {
        let candidate = format!("{stem}-{n}.{}", format.extension());
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

pub fn archive_name<Tz: TimeZone>(prefix: &str, at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{prefix}-{}.zip", at.format("%Y%m%d%H%M%S"))
}

/// A single finished entry ready to be saved.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadItem {
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: Arc<[u8]>,
}

/// `None` unless the entry is done.
pub fn download_item(view: &EntryView, suffix: &str) -> Option<DownloadItem> {
    if view.status != EntryStatus::Done {
        return None;
    }
    let result = view.result.as_ref()?;
    Some(DownloadItem {
        filename: download_name(&view.name, result.format, suffix),
        mime_type: result.format.mime_type(),
        bytes: result.bytes.clone(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

/// What a zip writer needs: the archive name and its files in store order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveManifest {
    pub name: String,
    pub files: Vec<ArchiveFile>,
}

impl ArchiveManifest {
    pub fn from_snapshot<Tz: TimeZone>(
        snapshot: &QueueSnapshot,
        prefix: &str,
        at: DateTime<Tz>,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut taken = HashSet::new();
        let files = snapshot
            .entries
            .iter()
            .filter(|e| e.status == EntryStatus::Done)
            .filter_map(|e| e.result.as_ref().map(|r| (e, r)))
            .enumerate()
            .map(|(i, (entry, result))| {
                let name = archive_entry_name(&entry.name, result.format, i + 1);
                ArchiveFile {
                    name: claim_unique_name(&mut taken, name, result.format),
                    bytes: result.bytes.clone(),
                }
            })
            .collect();
        Self {
            name: archive_name(prefix, at),
            files,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes.len() as u64).sum()
    }
}

/// Batch-level counters for a status bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
    /// Sum over done entries of source minus result size; may be negative.
    pub saved_bytes: i64,
    pub is_processing: bool,
}

impl BatchSummary {
    pub fn from_snapshot(snapshot: &QueueSnapshot) -> Self {
        let mut summary = Self {
            total: snapshot.entries.len(),
            ..Self::default()
        };
        for entry in &snapshot.entries {
            match entry.status {
                EntryStatus::Queued => summary.queued += 1,
                EntryStatus::Processing => summary.processing += 1,
                EntryStatus::Done => {
                    summary.done += 1;
                    summary.saved_bytes += entry.saved_bytes().unwrap_or(0);
                }
                EntryStatus::Error => summary.error += 1,
            }
        }
        summary.is_processing = summary.processing > 0;
        summary
    }

    /// Every entry finished successfully.
    pub fn all_done(&self) -> bool {
        self.total > 0 && self.done == self.total
    }

    pub fn saved_display(&self) -> String {
        let formatted = format_file_size(self.saved_bytes.unsigned_abs());
        if self.saved_bytes < 0 {
            format!("-{formatted}")
        } else {
            formatted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::entry::EntryId;
    use crate::pipeline::store::ResultView;
    use chrono::Utc;

    fn view(name: &str, size: u64, status: EntryStatus, result: Option<u64>) -> EntryView {
        EntryView {
            id: EntryId::next(),
            name: name.to_string(),
            mime_type: "image/png".to_string(),
            width: 10,
            height: 10,
            size,
            locator: "blob:test".to_string(),
            status,
            result: result.map(|n| ResultView {
                locator: "blob:out".to_string(),
                size: n,
                format: CompressionFormat::WebP,
                bytes: vec![0u8; n as usize].into(),
            }),
            failure_reason: None,
            has_edit: false,
        }
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024), "10 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024 + 1024 * 512), "5.5 MB");
        assert_eq!(format_file_size(300 * 1024 * 1024 * 1024), "300 GB");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("photo.jpg"), "photo");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem("trailing."), "trailing.");
        assert_eq!(file_stem(".png"), "");
    }

    #[test]
    fn test_download_name() {
        assert_eq!(
            download_name("holiday.png", CompressionFormat::WebP, "_compressed"),
            "holiday_compressed.webp"
        );
        assert_eq!(
            download_name("scan.PNG", CompressionFormat::MozJpeg, "_min"),
            "scan_min.jpg"
        );
        assert_eq!(
            download_name(".png", CompressionFormat::OxiPng, "_compressed"),
            "image_compressed.png"
        );
    }

    #[test]
    fn test_download_item_requires_done() {
        let done = view("a.png", 100, EntryStatus::Done, Some(40));
        let item = download_item(&done, "_compressed").unwrap();
        assert_eq!(item.filename, "a_compressed.webp");
        assert_eq!(item.mime_type, "image/webp");
        assert_eq!(item.bytes.len(), 40);

        let queued = view("b.png", 100, EntryStatus::Queued, None);
        assert!(download_item(&queued, "_compressed").is_none());
    }

    #[test]
    fn test_archive_manifest() {
        let snapshot = QueueSnapshot {
            version: 3,
            entries: vec![
                view("a.png", 100, EntryStatus::Done, Some(40)),
                view("b.png", 100, EntryStatus::Error, None),
                view(".jpg", 100, EntryStatus::Done, Some(10)),
            ],
            active: None,
            last_enqueue_error: None,
        };
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let manifest = ArchiveManifest::from_snapshot(&snapshot, "tinypress", at);
        assert_eq!(manifest.name, "tinypress-20240309140507.zip");
        let names: Vec<_> = manifest.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.webp", "image-2.webp"]);
        assert_eq!(manifest.total_bytes(), 50);
    }

    #[test]
    fn test_archive_names_are_unique() {
        let mut jpeg = view("image.jpg", 100, EntryStatus::Done, Some(5));
        jpeg.mime_type = "image/jpeg".to_string();
        let snapshot = QueueSnapshot {
            version: 1,
            entries: vec![
                view("image.png", 100, EntryStatus::Done, Some(10)),
                view("image.png", 100, EntryStatus::Done, Some(20)),
                jpeg,
                view("image-2.png", 100, EntryStatus::Done, Some(30)),
            ],
            active: None,
            last_enqueue_error: None,
        };
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let manifest = ArchiveManifest::from_snapshot(&snapshot, "tinypress", at);
        let names: Vec<_> = manifest.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            ["image.webp", "image-2.webp", "image-3.webp", "image-2-2.webp"]
        );
        assert_eq!(manifest.files[1].bytes.len(), 20);
    }

    #[test]
    fn test_summary() {
        let snapshot = QueueSnapshot {
            version: 1,
            entries: vec![
                view("a.png", 100, EntryStatus::Done, Some(40)),
                view("b.png", 100, EntryStatus::Done, Some(130)),
                view("c.png", 100, EntryStatus::Processing, None),
                view("d.png", 100, EntryStatus::Queued, None),
            ],
            active: None,
            last_enqueue_error: None,
        };
        let summary = BatchSummary::from_snapshot(&snapshot);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.done, 2);
        assert_eq!(summary.saved_bytes, 30);
        assert!(summary.is_processing);
        assert!(!summary.all_done());

        let empty = BatchSummary::from_snapshot(&QueueSnapshot::default());
        assert!(!empty.all_done());
        assert_eq!(empty.saved_display(), "0 B");
    }
}
