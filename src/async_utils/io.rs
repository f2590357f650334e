//! I/O utilities.
//!
//! This module is responsible for writing our result files. Every writer
//! goes through here so that error messages name the file that failed.

use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::prelude::*;

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a string to a file, replacing anything already there.
pub async fn write_text(path: &Path, text: &str) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(Some(path)).await?);
    writer
        .write_all(text.as_bytes())
        .await
        .with_context(|| format!("Failed to write to {:?}", path))?;
    writer
        .flush()
        .await
        .with_context(|| format!("Failed to flush {:?}", path))?;
    Ok(())
}

/// Write a value as pretty-printed JSON. Non-ASCII text is written as-is.
pub async fn write_json_pretty<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize JSON for {:?}", path))?;
    write_text(path, &json).await
}
