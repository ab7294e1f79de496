use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))
}

/// Lowercase hex digest of the file's bytes, streamed so large stores are not
/// loaded into memory.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open {} for hashing", path.display()))?,
    );
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("failed to hash {}", path.display()))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Writes `value` as pretty JSON plus a trailing newline, creating parent
/// directories as needed.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize json into {}", path.display()))?;
    writeln!(writer)
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("abtest-util-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn round_to_uses_half_away_from_zero() {
        assert_eq!(round_to(12.345_6, 2), 12.35);
        assert_eq!(round_to(0.125, 2), 0.13);
        assert_eq!(round_to(7.0, 2), 7.0);
    }

    #[test]
    fn sha256_file_matches_known_digest() {
        let dir = scratch_dir("sha");
        ensure_directory(&dir).expect("scratch dir should be created");
        let path = dir.join("payload.txt");
        fs::write(&path, b"abc").expect("payload should write");

        let digest = sha256_file(&path).expect("file should hash");

        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        fs::remove_dir_all(&dir).expect("scratch dir should be removed");
    }

    #[test]
    fn sha256_file_reports_missing_files() {
        let path = scratch_dir("missing").join("absent.sqlite");
        let err = sha256_file(&path).expect_err("missing file should fail");
        assert!(format!("{err:#}").contains("absent.sqlite"));
    }

    #[test]
    fn write_json_pretty_creates_parents_and_ends_with_newline() {
        let dir = scratch_dir("json");
        let path = dir.join("nested").join("manifest.json");

        write_json_pretty(&path, &json!({ "manifest_version": 1 }))
            .expect("manifest should write");

        let written = fs::read_to_string(&path).expect("manifest should be readable");
        assert!(written.ends_with("}\n"));
        let value: serde_json::Value =
            serde_json::from_str(&written).expect("manifest should be valid json");
        assert_eq!(value["manifest_version"], 1);
        fs::remove_dir_all(&dir).expect("scratch dir should be removed");
    }
}
