/// Local temp-file cleanup
///
/// Runs after every ingestion regardless of outcome. Missing files count as
/// already cleaned, so calling it twice is fine. Failures are logged and
/// never propagated.
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Remove the uploaded source and the per-video work directory
pub async fn cleanup_ingest_files(upload_path: &Path, work_dir: &Path) {
    remove_file(upload_path).await;
    remove_dir(work_dir).await;
}

pub async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed temp file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp file"),
    }
}

pub async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "removed work dir"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove work dir"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_removes_files_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("upload.mp4");
        let work = dir.path().join("work");
        tokio::fs::write(&upload, b"data").await.unwrap();
        tokio::fs::create_dir_all(work.join("hls/720p")).await.unwrap();
        tokio::fs::write(work.join("hls/720p/segment_000.ts"), b"ts")
            .await
            .unwrap();

        cleanup_ingest_files(&upload, &work).await;
        assert!(!upload.exists());
        assert!(!work.exists());

        // second run sees nothing to delete
        cleanup_ingest_files(&upload, &work).await;
    }
}
