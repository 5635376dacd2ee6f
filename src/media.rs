use std::path::{Path, PathBuf};

/// Where referenced videos are looked up.
pub trait MediaLibrary {
    fn exists(&self, name: &str) -> bool;
    fn path_of(&self, name: &str) -> PathBuf;
}

/// Videos stored as plain files under one directory.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl MediaLibrary for DirectoryLibrary {
    fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}
