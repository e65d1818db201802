use crate::errors::ApiError;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Uploaded files kept flat in one directory.
///
/// There is no locking: two uploads with the same name race and the last
/// write wins.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// The directory is created lazily on first write or listing.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `data` under the final path component of `filename` and
    /// returns the name it was stored as.
    pub fn save(&self, filename: &str, data: &[u8]) -> Result<String, ApiError> {
        let name = base_name(filename)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid filename: {filename}")))?;

        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(name), data)?;

        Ok(name.to_owned())
    }

    /// Reads a stored file. Names that point outside the directory are refused.
    pub fn load(&self, filename: &str) -> Result<Vec<u8>, ApiError> {
        if base_name(filename) != Some(filename) {
            return Err(ApiError::BadRequest("Invalid filename".into()));
        }

        fs::read(self.dir.join(filename)).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ApiError::NotFound("File not found"),
            _ => err.into(),
        })
    }

    /// Names of the regular files in the directory, sorted.
    pub fn list(&self) -> Result<Vec<String>, ApiError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.dir)?;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Last component of a client-supplied path, accepting `/` and `\` as separators.
fn base_name(filename: &str) -> Option<&str> {
    let name = filename.rsplit(['/', '\\']).next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_names() {
        #[rustfmt::skip]
        let cases = [
            ("a.png",              Some("a.png")),
            ("dir/a.png",          Some("a.png")),
            ("../../etc/passwd",   Some("passwd")),
            ("C:\\Users\\me\\a.b", Some("a.b")),
            ("..",                 None),
            ("dir/",               None),
            ("",                   None),
        ];

        for (input, expected) in cases {
            assert_eq!(base_name(input), expected, "{input:?}");
        }
    }

    #[test]
    fn save_load_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("uploads"));

        assert_eq!(store.list().unwrap(), Vec::<String>::new());
        assert!(store.dir().is_dir());

        assert_eq!(store.save("../b.bin", &[0, 1, 2]).unwrap(), "b.bin");
        assert_eq!(store.save("a.txt", b"hi").unwrap(), "a.txt");
        fs::create_dir(store.dir().join("nested")).unwrap();

        assert_eq!(store.list().unwrap(), ["a.txt", "b.bin"]);
        assert_eq!(store.load("b.bin").unwrap(), [0, 1, 2]);
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert_eq!(store.load("missing.txt"), Err(ApiError::NotFound("File not found")));
        assert!(matches!(store.load("../secret"), Err(ApiError::BadRequest(_))));
        assert!(matches!(store.load(".."), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn last_upload_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save("same.txt", b"first").unwrap();
        store.save("same.txt", b"second").unwrap();

        assert_eq!(store.load("same.txt").unwrap(), b"second");
    }
}
