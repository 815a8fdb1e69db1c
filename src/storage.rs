//! On-disk layout for uploads, converted audio and synthesized replies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, VoxError};
use crate::jobs::JobId;

pub const DEFAULT_UPLOAD_EXTENSION: &str = "webm";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Save an uploaded chunk as `{session}_{job}_chunk.{ext}` and return its
    /// path. An empty body is rejected; nothing is written for it.
    pub fn stage_upload(
        &self,
        session: &str,
        job_id: &JobId,
        extension: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        if bytes.is_empty() {
            return Err(VoxError::InputInvalid(format!(
                "upload for session {session} is empty"
            )));
        }
        let stem = chunk_stem(session, job_id)?;
        let ext = extension
            .map(|e| e.trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .map(sanitize)
            .transpose()?
            .unwrap_or_else(|| DEFAULT_UPLOAD_EXTENSION.to_string());

        self.ensure()?;
        let path = self.root.join(format!("{stem}.{ext}"));
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "upload staged");
        Ok(path)
    }

    /// Where the converted WAV for one uploaded chunk goes.
    pub fn converted_path(&self, session: &str, job_id: &JobId) -> Result<PathBuf> {
        Ok(self.root.join(format!("{}.wav", chunk_stem(session, job_id)?)))
    }

    pub fn reply_path(&self, job_id: &JobId) -> PathBuf {
        self.root.join(format!("reply_{job_id}.wav"))
    }

    /// Delete chunks and replies last modified more than `max_age` ago.
    /// Other files in the directory are left alone. Returns how many went.
    pub fn sweep_older_than(&self, max_age: Duration) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "artifact sweep skipped");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("reply_") || name.contains("_chunk.")) {
                continue;
            }
            let expired = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .is_some_and(|age| age >= max_age);
            if !expired {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "could not remove artifact"),
            }
        }
        if removed > 0 {
            info!(removed, "swept expired artifacts");
        }
        removed
    }
}

fn chunk_stem(session: &str, job_id: &JobId) -> Result<String> {
    Ok(format!(
        "{}_{}_chunk",
        sanitize(session)?,
        sanitize(job_id.as_str())?
    ))
}

// Session ids come from clients; keep them to a single safe path segment.
fn sanitize(name: &str) -> Result<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        return Err(VoxError::InputInvalid("empty session or extension".into()));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_naming() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("static"));
        let job = JobId::from("j1");

        let path = store.stage_upload("abc123", &job, Some("ogg"), b"OggS").unwrap();
        assert_eq!(path, dir.path().join("static/abc123_j1_chunk.ogg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"OggS");

        let path = store.stage_upload("abc123", &job, None, b"\x1a\x45").unwrap();
        assert_eq!(path.file_name().unwrap(), "abc123_j1_chunk.webm");

        let path = store.stage_upload("abc123", &job, Some(".mp4"), b"x").unwrap();
        assert_eq!(path.file_name().unwrap(), "abc123_j1_chunk.mp4");
    }

    #[test]
    fn chunks_of_one_session_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let (first, second) = (JobId::new(), JobId::new());

        let a = store.stage_upload("sess", &first, None, b"FIRST").unwrap();
        let b = store.stage_upload("sess", &second, None, b"SECOND").unwrap();
        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), b"FIRST");
        assert_ne!(
            store.converted_path("sess", &first).unwrap(),
            store.converted_path("sess", &second).unwrap()
        );
    }

    #[test]
    fn empty_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = store
            .stage_upload("s1", &JobId::from("j1"), None, b"")
            .unwrap_err();
        assert!(matches!(err, VoxError::InputInvalid(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn session_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let job = JobId::from("j1");
        let path = store.stage_upload("../../etc/passwd", &job, None, b"x").unwrap();
        assert_eq!(path.parent().unwrap(), dir.path());
        assert!(store.converted_path("  ", &job).is_err());
    }

    #[test]
    fn derived_paths() {
        let store = ArtifactStore::new("static");
        let id = JobId::from("42");
        assert_eq!(
            store.converted_path("abc", &id).unwrap(),
            PathBuf::from("static/abc_42_chunk.wav")
        );
        assert_eq!(store.reply_path(&id), PathBuf::from("static/reply_42.wav"));
    }

    #[test]
    fn sweep_removes_only_expired_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let id = JobId::from("7");
        std::fs::write(store.reply_path(&id), b"RIFF").unwrap();
        store.stage_upload("s", &id, None, b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        assert_eq!(store.sweep_older_than(Duration::from_secs(3600)), 0);
        assert_eq!(store.sweep_older_than(Duration::ZERO), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert!(!store.reply_path(&id).exists());
    }

    #[test]
    fn sweep_of_missing_root_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("never-created"));
        assert_eq!(store.sweep_older_than(Duration::ZERO), 0);
    }
}
