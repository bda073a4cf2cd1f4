use crate::errors::*;
use crate::extract::FromCommand;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Replace the image reference on every line that has a resolved digest.
///
/// Only the first occurrence of the reference as written on the FROM line is
/// replaced, everything else on the line (flags, `AS` clauses, comments) is kept.
pub fn reconstruct<S: AsRef<str>>(lines: &[S], commands: &[FromCommand<'_>]) -> Vec<String> {
    let updates = commands
        .iter()
        .filter_map(|cmd| Some((cmd.line_start, (cmd, cmd.image.pinned()?))))
        .collect::<HashMap<_, _>>();

    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            let line = line.as_ref();
            let line_num = idx + 1;
            let Some((cmd, pinned)) = updates.get(&line_num) else {
                return line.to_string();
            };

            let updated = line.replacen(&cmd.image.original, pinned, 1);
            if updated == line {
                warn!(
                    "Could not find {:?} on line {line_num}, leaving it unchanged",
                    cmd.image.original
                );
            } else {
                info!("Updated line {line_num}: {line:?} -> {updated:?}");
            }
            updated
        })
        .collect()
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".backup");
    PathBuf::from(backup)
}

/// Copy the original file to `<path>.backup`, then replace it with `lines`.
///
/// Failing to create the backup is not fatal.
pub async fn write_with_backup<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    let backup = backup_path(path);
    match fs::copy(path, &backup).await {
        Ok(_) => info!("Created backup: {backup:?}"),
        Err(err) => warn!("Failed to create backup {backup:?}: {err:#}"),
    }

    let file = fs::File::create(path)
        .await
        .with_context(|| anyhow!("Failed to create updated Containerfile: {path:?}"))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writer.write_all(line.as_ref().as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer
        .flush()
        .await
        .with_context(|| anyhow!("Failed to write updated Containerfile: {path:?}"))?;

    Ok(())
}
