//! Static assets: footer image path and the base64 logo for the index.
//!
//! Missing assets never fail a run. A missing footer image yields an empty
//! footer overlay, a missing logo renders the index without it.

use crate::config::AssemblyConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Footer image used when neither the config nor the environment names one.
pub const DEFAULT_FOOTER_IMAGE: &str = "assets/icons/rodape.png";
/// Logo embedded in the index page when none is configured.
pub const DEFAULT_LOGO_IMAGE: &str = "assets/icons/IZE-SIMBOLO-1.png";

/// Assets resolved once per run and shared by every render.
#[derive(Debug, Clone, Default)]
pub struct Assets {
    /// `file://` URL of the footer image, if it exists.
    pub footer_image_url: Option<String>,
    /// `data:` URI of the logo, if it could be read.
    pub logo_data_uri: Option<String>,
}

impl Assets {
    pub fn load(config: &AssemblyConfig) -> Self {
        let footer = config
            .footer_image
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FOOTER_IMAGE));
        let logo = config
            .logo_image
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOGO_IMAGE));

        Self {
            footer_image_url: resolve_image(&footer).map(|p| file_url(&p)),
            logo_data_uri: load_data_uri(&logo),
        }
    }
}

/// Absolute path of an existing image, or `None` with a warning.
pub fn resolve_image(path: &Path) -> Option<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(p) if p.is_file() => Some(p),
        Ok(p) => {
            warn!("Asset {} is not a file; continuing without it", p.display());
            None
        }
        Err(e) => {
            warn!("Asset {} unavailable ({}); continuing without it", path.display(), e);
            None
        }
    }
}

/// `file:///…` URL the converter can load with local file access enabled.
pub fn file_url(path: &Path) -> String {
    let s = path.display().to_string().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

/// Read an image and wrap it as a base64 `data:` URI.
pub fn load_data_uri(path: &Path) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(b) if !b.is_empty() => b,
        Ok(_) => {
            warn!("Asset {} is empty; continuing without it", path.display());
            return None;
        }
        Err(e) => {
            warn!("Asset {} unavailable ({}); continuing without it", path.display(), e);
            return None;
        }
    };
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());
    Some(format!("data:{};base64,{}", mime_for(path), b64))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}
