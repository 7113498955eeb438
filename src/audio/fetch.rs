use anyhow::{Context, Result};

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// File extension of the URL path, ignoring query and fragment, for use as a
/// format hint.
pub fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

pub fn fetch_audio(url: &str) -> Result<Vec<u8>> {
    log::info!("Fetching audio: {}", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to fetch audio from {}", url))?
        .error_for_status()
        .with_context(|| format!("Server refused audio request for {}", url))?;
    let bytes = response
        .bytes()
        .with_context(|| format!("Failed to read audio body from {}", url))?;
    log::debug!("Fetched {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
