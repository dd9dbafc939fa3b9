//! The filesystem/subprocess boundary the loader calls through.
//!
//! `spec.md` §1 explicitly carves "file I/O primitives ... platform-specific
//! console handling" out of this core's scope, but the *interface* the
//! loader and `exec_script`/`read_file`/`write_file` call through is not
//! excluded — it's the seam that lets tests substitute an in-memory world
//! instead of touching a real filesystem or spawning real processes.
//! Grounded on `n2o5`'s `World` trait + `LocalWorld` (`src/world.rs`).

use std::path::Path;
use std::process::{Command, Output};

/// Everything the loader needs from the outside world. Implementations run
/// on whichever thread calls them (worker or main); see `loader.rs`.
pub trait World: Send + Sync {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;
    fn write(&self, path: &Path, contents: &str) -> std::io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Runs `executable` with `args` (the loader has already worked out
    /// whether that means an interpreter with the script path prepended, or
    /// the script itself run directly) and captures its output.
    fn run_script(&self, executable: &Path, args: &[String]) -> std::io::Result<Output>;
}

/// The production implementation: real files, real processes.
pub struct LocalWorld;

impl World for LocalWorld {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn run_script(&self, executable: &Path, args: &[String]) -> std::io::Result<Output> {
        Command::new(executable).args(args).output()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// An in-memory world for tests: no real files, no real processes.
    #[derive(Default)]
    pub struct MemoryWorld {
        files: Mutex<HashMap<PathBuf, String>>,
    }

    impl MemoryWorld {
        pub fn new(files: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
            let files = files.into_iter().map(|(p, c)| (PathBuf::from(p), c.to_string())).collect();
            Self { files: Mutex::new(files) }
        }
    }

    impl World for MemoryWorld {
        fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("{path:?} not found")))
        }

        fn write(&self, path: &Path, contents: &str) -> std::io::Result<()> {
            self.files.lock().unwrap().insert(path.to_path_buf(), contents.to_string());
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        fn run_script(&self, _executable: &Path, _args: &[String]) -> std::io::Result<Output> {
            Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "MemoryWorld cannot run scripts"))
        }
    }
}
