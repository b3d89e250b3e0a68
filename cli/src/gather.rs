use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use hoist_core::TransferRequest;
use walkdir::WalkDir;

/// Expand the command-line paths into one request per regular file.
///
/// A file argument becomes a single task keyed by its file name; a directory
/// argument is walked and every file below it is keyed by its path relative
/// to the argument. Symlinks are skipped. Keys always use forward slashes.
pub fn gather_requests(
    paths: &[PathBuf],
    bucket: &str,
    prefix: &str,
) -> anyhow::Result<Vec<TransferRequest>> {
    let mut requests = Vec::new();

    for path in paths {
        if path.is_symlink() {
            tracing::warn!(path = %path.display(), "skipping symlink argument");
            continue;
        }
        if path.is_file() {
            let name = path
                .file_name()
                .with_context(|| format!("no file name in {}", path.display()))?
                .to_string_lossy();
            requests.push(request_for(path, bucket, &join_key(prefix, &name))?);
        } else if path.is_dir() {
            collect_dir(path, bucket, prefix, &mut requests)?;
        } else {
            bail!("no such file or directory: {}", path.display());
        }
    }

    Ok(requests)
}

fn collect_dir(
    root: &Path,
    bucket: &str,
    prefix: &str,
    out: &mut Vec<TransferRequest>,
) -> anyhow::Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if entry.file_type().is_dir() || entry.file_type().is_symlink() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("walk entries stay under their root")
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        out.push(request_for(entry.path(), bucket, &join_key(prefix, &relative))?);
    }
    Ok(())
}

fn request_for(path: &Path, bucket: &str, key: &str) -> anyhow::Result<TransferRequest> {
    let metadata = path
        .metadata()
        .with_context(|| format!("reading metadata of {}", path.display()))?;

    Ok(TransferRequest {
        source_path: path.to_string_lossy().into_owned(),
        bucket: bucket.to_string(),
        key: key.to_string(),
        size_bytes: metadata.len() as i64,
    })
}

fn join_key(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn single_file_keyed_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("report.pdf");
        fs::write(&file, "x".repeat(10)).unwrap();

        let reqs = gather_requests(&[file], "b", "").unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].key, "report.pdf");
        assert_eq!(reqs[0].size_bytes, 10);
        assert_eq!(reqs[0].bucket, "b");
    }

    #[test]
    fn directory_walked_with_relative_keys() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sub/deep")).unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join("sub/deep/b.txt"), "bb").unwrap();

        let mut reqs = gather_requests(&[tmp.path().to_path_buf()], "b", "backup").unwrap();
        reqs.sort_by(|x, y| x.key.cmp(&y.key));

        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].key, "backup/a.txt");
        assert_eq!(reqs[1].key, "backup/sub/deep/b.txt");
    }

    #[test]
    fn prefix_slashes_normalized() {
        assert_eq!(join_key("p/", "k"), "p/k");
        assert_eq!(join_key("p", "k"), "p/k");
        assert_eq!(join_key("", "k"), "k");
    }

    #[test]
    fn missing_path_is_an_error() {
        let err = gather_requests(&[PathBuf::from("/definitely/not/here")], "b", "");
        assert!(err.is_err());
    }
}
