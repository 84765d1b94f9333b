//! Media discovery for the signage directory.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use tracing::warn;
use walkdir::WalkDir;

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
const VIDEO_EXTS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// One playable catalog entry, immutable after the scan that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub path: PathBuf,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Classify a path by its extension against the fixed allow-list.
/// Returns `None` for anything the player cannot display.
pub fn media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)?;
    if IMAGE_EXTS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Scan a flat media directory, non-recursively, in directory-listing order.
///
/// Non-matching files and subdirectories are ignored. A missing or
/// unreadable directory yields an empty catalog with a warning, never an
/// error.
pub fn scan_media(dir: &Path) -> Vec<MediaItem> {
    let mut items = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), "media directory unreadable: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(kind) = media_kind(entry.path()) {
            items.push(MediaItem::new(entry.path(), kind));
        }
    }
    items
}

/// Randomly permute a scanned catalog in place.
pub fn shuffle_items<R: rand::Rng + ?Sized>(items: &mut [MediaItem], rng: &mut R) {
    items.shuffle(rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn names(items: &[MediaItem]) -> Vec<String> {
        let mut names: Vec<String> = items
            .iter()
            .map(|i| i.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn scan_honors_extension_allow_list() {
        let tmp = tempdir().unwrap();
        for name in ["a.jpg", "b.mp4", "c.png", "d.txt", "e.JPEG", "f.exe"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let items = scan_media(tmp.path());
        assert_eq!(names(&items), vec!["a.jpg", "b.mp4", "c.png", "e.JPEG"]);
    }

    #[test]
    fn scan_classifies_images_and_videos() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("clip.mkv"), b"x").unwrap();
        fs::write(tmp.path().join("still.bmp"), b"x").unwrap();
        let items = scan_media(tmp.path());
        for item in items {
            match item.path.extension().unwrap().to_str().unwrap() {
                "mkv" => assert_eq!(item.kind, MediaKind::Video),
                "bmp" => assert_eq!(item.kind, MediaKind::Image),
                other => panic!("unexpected extension {other}"),
            }
        }
    }

    #[test]
    fn scan_ignores_subdirectories() {
        let tmp = tempdir().unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("deep.jpg"), b"x").unwrap();
        fs::write(tmp.path().join("top.jpg"), b"x").unwrap();
        let items = scan_media(tmp.path());
        assert_eq!(names(&items), vec!["top.jpg"]);
    }

    #[test]
    fn scan_of_missing_directory_is_empty() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("does-not-exist");
        assert!(scan_media(&missing).is_empty());
    }

    #[test]
    fn rescan_of_unchanged_directory_yields_equal_set() {
        let tmp = tempdir().unwrap();
        for name in ["a.jpg", "b.mp4", "c.png"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let first = scan_media(tmp.path());
        let second = scan_media(tmp.path());
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn media_kind_rejects_extensionless_paths() {
        assert_eq!(media_kind(Path::new("/tmp/nofile")), None);
        assert_eq!(media_kind(Path::new("/tmp/archive.tar.gz")), None);
    }
}
