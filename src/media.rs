use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::style::Rgba8;

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "m4v", "mkv", "webm"];
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// What a phase shows behind its captions.
#[derive(Debug, Clone, PartialEq)]
pub enum Visual {
    Video(PathBuf),
    Image(PathBuf),
    Solid(Rgba8),
}

impl Visual {
    /// Classify a media file by extension. Unknown extensions are treated as
    /// stills.
    pub fn from_path(path: &Path) -> Self {
        match extension(path) {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Self::Video(path.to_path_buf()),
            _ => Self::Image(path.to_path_buf()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Video(path) | Self::Image(path) => path.display().to_string(),
            Self::Solid(color) => format!("solid {color}"),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_media_file(path: &Path) -> bool {
    extension(path).is_some_and(|ext| {
        VIDEO_EXTENSIONS.contains(&ext.as_str()) || IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
}

pub trait MediaSource {
    /// Up to `count` files matching `keyword`. An empty result is not an
    /// error.
    fn search(&self, keyword: &str, count: usize) -> Result<Vec<PathBuf>>;
}

/// No media at all; every phase falls back to the placeholder or a solid
/// frame.
pub struct NoMedia;

impl MediaSource for NoMedia {
    fn search(&self, _keyword: &str, _count: usize) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Already-downloaded files under a directory, matched on file stems.
#[derive(Debug, Clone)]
pub struct LocalMediaLibrary {
    files: Vec<PathBuf>,
}

impl LocalMediaLibrary {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("media library is not a directory: {}", root.display());
        }
        let mut files = Vec::new();
        collect_media(root, &mut files)?;
        files.sort();
        debug!(files = files.len(), "indexed media library {}", root.display());
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn collect_media(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read media dir {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list media dir {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_media(&path, files)?;
        } else if is_media_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Number of keyword tokens found among the stem's tokens.
pub fn match_score(keyword: &str, path: &Path) -> usize {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem_tokens = tokens(&stem);
    tokens(keyword)
        .iter()
        .filter(|token| stem_tokens.contains(token))
        .count()
}

impl MediaSource for LocalMediaLibrary {
    fn search(&self, keyword: &str, count: usize) -> Result<Vec<PathBuf>> {
        let mut scored = self
            .files
            .iter()
            .filter_map(|path| {
                let score = match_score(keyword, path);
                (score > 0).then_some((score, path))
            })
            .collect::<Vec<_>>();
        scored.sort_by(|(a_score, a_path), (b_score, b_path)| {
            b_score.cmp(a_score).then_with(|| a_path.cmp(b_path))
        });
        Ok(scored
            .into_iter()
            .take(count)
            .map(|(_, path)| path.clone())
            .collect())
    }
}

/// Specific keyword first, then the generic keyword. Search errors are logged
/// and treated as no results.
pub fn source_media(
    media: &dyn MediaSource,
    keyword: &str,
    generic_keyword: &str,
    count: usize,
) -> Vec<PathBuf> {
    for candidate in [keyword, generic_keyword] {
        if candidate.trim().is_empty() {
            continue;
        }
        match media.search(candidate, count) {
            Ok(found) if !found.is_empty() => return found,
            Ok(_) => debug!(keyword = candidate, "no media found"),
            Err(error) => warn!(keyword = candidate, "media search failed: {error:#}"),
        }
    }
    warn!(keyword, "no media for keyword or generic fallback");
    Vec::new()
}

/// Rotating supply of visuals; once empty it hands out the placeholder or a
/// solid color.
#[derive(Debug, Clone)]
pub struct MediaDeck {
    items: Vec<PathBuf>,
    cursor: usize,
    placeholder: Option<PathBuf>,
    solid: Rgba8,
}

impl MediaDeck {
    pub fn new(items: Vec<PathBuf>, placeholder: Option<PathBuf>, solid: Rgba8) -> Self {
        Self {
            items,
            cursor: 0,
            placeholder,
            solid,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add files not already in the deck.
    pub fn extend(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            if !self.items.contains(&path) {
                self.items.push(path);
            }
        }
    }

    pub fn fallback(&self) -> Visual {
        match &self.placeholder {
            Some(path) => Visual::from_path(path),
            None => Visual::Solid(self.solid),
        }
    }

    pub fn next_visual(&mut self) -> Visual {
        if self.items.is_empty() {
            return self.fallback();
        }
        let path = &self.items[self.cursor % self.items.len()];
        self.cursor = (self.cursor + 1) % self.items.len();
        Visual::from_path(path)
    }
}
