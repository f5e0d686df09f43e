//! JSON file persistence helpers shared by the stores.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read a JSON document, returning `T::default()` if the file does not exist.
pub fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match std::fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write `value` as pretty JSON, replacing the file in a single rename.
pub fn write_json_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_default() {
        let dir = tempfile::tempdir().unwrap();
        let v: Vec<String> = read_json_or_default(&dir.path().join("nope.json")).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn test_blank_file_reads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.json");
        std::fs::write(&path, "  \n").unwrap();
        let v: Vec<u32> = read_json_or_default(&path).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/values.json");
        write_json_atomic(&path, &vec![1u32, 2, 3]).unwrap();
        let v: Vec<u32> = read_json_or_default(&path).unwrap();
        assert_eq!(v, vec![1, 2, 3]);
        assert!(!dir.path().join("nested/values.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(read_json_or_default::<Vec<u32>>(&path).is_err());
    }
}
