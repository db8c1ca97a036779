//! Batched signed-URL upload protocol.
//!
//! Uploading a local directory is a three-step dance with the backend:
//!
//! 1. request signed upload slots for up to [`MAX_PATHS_PER_BATCH`] relative
//!    paths at a time;
//! 2. PUT each file to its signed URL — concurrently within a batch, with
//!    batches awaited sequentially;
//! 3. register the upload directory as a `localdir` data source.
//!
//! A failed file is logged to stderr and excluded from the completed set;
//! there is no retry and no abort. The registration happens once per upload,
//! after every batch has settled.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::client::FoundryClient;
use crate::config::{Config, UploadConfig};
use crate::models::{DataSource, DataSourceType};
use crate::validate;

/// The signed-slot endpoint rejects requests with more paths than this.
pub const MAX_PATHS_PER_BATCH: usize = 50;

/// A file selected for upload.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Path relative to the upload root, forward-slashed.
    pub relative: String,
    pub absolute: PathBuf,
    pub size: u64,
}

/// Result of one upload: the registered data source plus which relative
/// paths made it and which did not.
#[derive(Debug)]
pub struct UploadOutcome {
    pub data_source: DataSource,
    pub upload_name: String,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

/// Scan `root` for files matching the configured globs, sorted by relative
/// path for deterministic batching.
pub fn scan_upload_dir(root: &Path, config: &UploadConfig) -> Result<Vec<LocalFile>> {
    if !root.is_dir() {
        bail!("upload root is not a directory: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.DS_Store".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let size = entry.metadata()?.len();
        files.push(LocalFile {
            relative: rel_str,
            absolute: path.to_path_buf(),
            size,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Split files into slot-request batches. `batch_size` is clamped to
/// `1..=`[`MAX_PATHS_PER_BATCH`].
pub fn partition_batches<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    let size = batch_size.clamp(1, MAX_PATHS_PER_BATCH);
    items.chunks(size).map(|c| c.to_vec()).collect()
}

/// Upload a directory and register it as a data source.
pub async fn upload_directory(
    client: &FoundryClient,
    config: &UploadConfig,
    dir: &Path,
    upload_name: Option<String>,
) -> Result<UploadOutcome> {
    let files = scan_upload_dir(dir, config)?;
    if files.is_empty() {
        bail!("no files matched under {}", dir.display());
    }

    let total_bytes: u64 = files.iter().map(|f| f.size).sum();
    validate::check_upload_size(total_bytes, config.max_file_mb)?;

    let upload_name = upload_name.unwrap_or_else(|| format!("upload-{}", Uuid::new_v4()));

    let mut completed = Vec::new();
    let mut failed = Vec::new();

    for batch in partition_batches(&files, config.batch_size) {
        let paths: Vec<String> = batch.iter().map(|f| f.relative.clone()).collect();
        let slots = client
            .request_upload_slots(&upload_name, &paths)
            .await
            .context("signed upload slot request failed")?;

        let mut tasks: JoinSet<(String, Result<()>)> = JoinSet::new();
        for file in batch {
            let Some(url) = slots.get(&file.relative).cloned() else {
                eprintln!("Warning: no upload slot returned for {}", file.relative);
                failed.push(file.relative.clone());
                continue;
            };
            let http = client.http_client();
            let relative = file.relative.clone();
            let absolute = file.absolute.clone();
            tasks.spawn(async move {
                let result = put_file(&http, &url, &absolute).await;
                (relative, result)
            });
        }

        // The whole batch settles before the next slot request goes out.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((relative, Ok(()))) => completed.push(relative),
                Ok((relative, Err(e))) => {
                    eprintln!("Warning: upload failed for {}: {}", relative, e);
                    failed.push(relative);
                }
                Err(e) => eprintln!("Warning: upload task aborted: {}", e),
            }
        }
    }

    completed.sort();
    failed.sort();

    if completed.is_empty() {
        bail!("no files uploaded successfully; not registering a data source");
    }

    let data_source = client
        .create_data_source(
            DataSourceType::Localdir,
            &upload_name,
            serde_json::json!({ "file_count": completed.len() }),
        )
        .await
        .context("registering uploaded directory failed")?;

    Ok(UploadOutcome {
        data_source,
        upload_name,
        completed,
        failed,
    })
}

async fn put_file(http: &reqwest::Client, url: &str, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let resp = http.put(url).body(bytes).send().await?;
    if !resp.status().is_success() {
        bail!("signed upload returned {}", resp.status());
    }
    Ok(())
}

/// CLI entry: upload a directory and print a summary.
pub async fn run_upload(config: &Config, dir: &Path, name: Option<String>) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    let outcome = upload_directory(&client, &config.upload, dir, name).await?;

    println!("upload {}", outcome.upload_name);
    println!("  uploaded: {} files", outcome.completed.len());
    if !outcome.failed.is_empty() {
        println!("  failed: {} files", outcome.failed.len());
        for path in &outcome.failed {
            println!("    {}", path);
        }
    }
    println!("  data source: {}", outcome.data_source.fqn);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_respect_the_slot_cap() {
        let paths: Vec<String> = (0..120).map(|i| format!("f{}", i)).collect();
        let batches = partition_batches(&paths, 50);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[2].len(), 20);

        // Oversized requests get clamped, zero is bumped to one per batch
        assert_eq!(partition_batches(&paths, 500)[0].len(), 50);
        assert_eq!(partition_batches(&paths[..2], 0).len(), 2);
    }

    #[test]
    fn scan_is_sorted_and_filtered() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("b.md"), "b").unwrap();
        std::fs::write(tmp.path().join("a.md"), "a").unwrap();
        std::fs::write(tmp.path().join("sub/c.txt"), "c").unwrap();
        std::fs::write(tmp.path().join("skip.log"), "x").unwrap();

        let config = UploadConfig {
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            ..UploadConfig::default()
        };
        let files = scan_upload_dir(tmp.path(), &config).unwrap();
        let rel: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rel, vec!["a.md", "b.md", "sub/c.txt"]);
    }
}
