//! Shared helpers for upload handler integration tests

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dropwatch_core::{
    config::{ConfigProfile, ConfigStore},
    ports::EventHandler,
};
use dropwatch_handlers::{upload::UPLOAD_PROFILE, HttpUploadHandler};
use wiremock::MockServer;

/// Bucket used by every test
pub const BUCKET: &str = "drops";

/// Folder inside the bucket used by every test
pub const EXT_DIR: &str = "incoming";

/// Backoff base small enough to keep retry tests fast
pub const FAST_BACKOFF_SECS: &str = "0.01";

/// Store holding an upload profile that points at `server`
pub fn upload_store(
    server: &MockServer,
    retry_attempts: u32,
    extra: &[(&str, &str)],
) -> ConfigStore {
    let mut pairs: Vec<(String, String)> = vec![
        ("endpoint".into(), server.uri()),
        ("bucketName".into(), BUCKET.into()),
        ("extDir".into(), EXT_DIR.into()),
        ("retryAttemptsNumber".into(), retry_attempts.to_string()),
        ("retryBackoffBaseSecs".into(), FAST_BACKOFF_SECS.into()),
        ("requestTimeoutSecs".into(), "5".into()),
    ];
    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    ConfigStore::in_memory().with_profile(ConfigProfile::new(UPLOAD_PROFILE, pairs))
}

/// Upload handler configured against `server`
pub fn upload_handler(server: &MockServer, retry_attempts: u32) -> Arc<dyn EventHandler> {
    HttpUploadHandler::from_config(&upload_store(server, retry_attempts, &[]))
        .expect("upload handler builds")
}

/// Regex matching the object path of `file_name` for any date
pub fn object_path_regex(file_name: &str) -> String {
    format!(
        r"^/{BUCKET}/{EXT_DIR}/\d{{4}}-\d{{2}}-\d{{2}}/{}$",
        regex_escape(file_name)
    )
}

fn regex_escape(raw: &str) -> String {
    raw.chars()
        .flat_map(|c| {
            let escape = !c.is_ascii_alphanumeric() && c != '_' && c != '-';
            escape.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect()
}

/// Writes a file to drop into the watched directory
pub fn drop_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write drop file");
    path
}
