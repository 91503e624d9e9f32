use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::schema::Manifest;
use crate::style::StyleTable;

pub fn load_and_validate_manifest(path: &Path) -> Result<Manifest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let mut manifest: Manifest = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;

    validate_manifest(&mut manifest, path)?;
    Ok(manifest)
}

/// The manifest's style overrides applied over the built-in table.
pub fn style_table(manifest: &Manifest) -> Result<StyleTable> {
    StyleTable::from_config(&manifest.style).context("invalid style configuration")
}

fn validate_manifest(manifest: &mut Manifest, manifest_path: &Path) -> Result<()> {
    manifest.environment.validate()?;
    manifest.voice.validate()?;
    manifest.media.validate()?;
    manifest.captions.validate()?;
    manifest.encoding.validate()?;
    manifest.script.validate()?;

    let styles = style_table(manifest)?;
    if styles.semantic_color(&manifest.captions.hook_color).is_none() {
        bail!(
            "captions.hook_color '{}' does not name a style semantic set",
            manifest.captions.hook_color
        );
    }

    let manifest_dir = manifest_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    manifest.environment.font =
        resolve_existing_file(&manifest_dir, &manifest.environment.font, "environment.font")?;
    manifest.environment.work_dir = resolve(&manifest_dir, &manifest.environment.work_dir);

    if let Some(library) = &manifest.media.library {
        let resolved = resolve(&manifest_dir, library);
        if !resolved.is_dir() {
            bail!(
                "media.library is not a directory: {}",
                resolved.display()
            );
        }
        manifest.media.library = Some(resolved);
    }
    if let Some(placeholder) = &manifest.media.placeholder {
        manifest.media.placeholder = Some(resolve_existing_file(
            &manifest_dir,
            placeholder,
            "media.placeholder",
        )?);
    }

    Ok(())
}

fn resolve(manifest_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        manifest_dir.join(path)
    }
}

fn resolve_existing_file(manifest_dir: &Path, path: &Path, field_name: &str) -> Result<PathBuf> {
    let resolved = resolve(manifest_dir, path);

    if !resolved.exists() {
        bail!("{} does not exist: {}", field_name, resolved.display());
    }

    if !resolved.is_file() {
        bail!("{} is not a file: {}", field_name, resolved.display());
    }

    Ok(resolved)
}
