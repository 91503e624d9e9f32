use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use fontdue::{Font, FontSettings};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::layout::{GlyphBitmap, GlyphSource, LineMetrics};

/// A TrueType/OpenType caption font loaded through fontdue.
pub struct FontFace {
    font: Font,
    path: PathBuf,
    sha256: String,
}

impl FontFace {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read font file '{}'", path.display()))?;
        Self::from_bytes(bytes, path)
    }

    pub fn from_bytes(bytes: Vec<u8>, path: &Path) -> Result<Self> {
        if bytes.is_empty() {
            bail!("font file '{}' is empty", path.display());
        }
        let sha256 = sha256_hex(&bytes);
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font '{}': {error}", path.display()))?;
        debug!(font = %path.display(), sha256 = %sha256, "loaded caption font");
        Ok(Self {
            font,
            path: path.to_path_buf(),
            sha256,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content fingerprint, printed by `check` so builds can be traced back
    /// to an exact font file.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn missing_codepoints(&self, text: &str) -> Vec<char> {
        let mut missing = Vec::new();
        for ch in text.chars() {
            if ch.is_whitespace() || missing.contains(&ch) {
                continue;
            }
            if self.font.lookup_glyph_index(ch) == 0 {
                missing.push(ch);
            }
        }
        missing
    }

    /// Missing glyphs render as the font's notdef box; this only reports them.
    pub fn warn_unsupported_codepoints(&self, text: &str, context: &str) {
        for ch in self.missing_codepoints(text) {
            warn!(
                "font '{}' has no glyph for U+{:04X} ({}) in {context}",
                self.path.display(),
                ch as u32,
                ch.escape_default()
            );
        }
    }
}

impl GlyphSource for FontFace {
    fn advance(&self, ch: char, px: f32) -> f32 {
        self.font.metrics(ch, px).advance_width
    }

    fn line_metrics(&self, px: f32) -> LineMetrics {
        match self.font.horizontal_line_metrics(px) {
            Some(metrics) => LineMetrics {
                ascent: metrics.ascent,
                descent: -metrics.descent,
            },
            None => LineMetrics {
                ascent: px * 0.8,
                descent: px * 0.2,
            },
        }
    }

    fn rasterize(&self, ch: char, px: f32) -> GlyphBitmap {
        let (metrics, coverage) = self.font.rasterize(ch, px);
        GlyphBitmap {
            width: metrics.width,
            height: metrics.height,
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            coverage,
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{sha256_hex, FontFace};

    #[test]
    fn sha256_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn garbage_bytes_are_not_a_font() {
        let err = FontFace::from_bytes(b"not a font".to_vec(), Path::new("bogus.ttf"))
            .err()
            .map(|error| error.to_string())
            .unwrap_or_default();
        assert!(err.contains("failed to parse font 'bogus.ttf'"), "got: {err}");
    }

    #[test]
    fn missing_font_file_reports_path() {
        let err = FontFace::load(Path::new("/definitely/missing.ttf"))
            .err()
            .map(|error| error.to_string())
            .unwrap_or_default();
        assert!(err.contains("/definitely/missing.ttf"), "got: {err}");
    }
}
