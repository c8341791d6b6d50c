use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub vectorstore_dir: PathBuf,
    pub log_dir: PathBuf,
    pub seed_path: PathBuf,
    pub index_path: PathBuf,
    pub corpus_path: PathBuf,
    pub manifest_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let data_dir = discover_data_dir(&project_root);
        Self::with_data_dir(&project_root, &data_dir)
    }

    /// Builds the full layout under an explicit data directory. Tests point
    /// this at a temp dir to keep the filesystem isolated.
    pub fn with_data_dir(project_root: &Path, data_dir: &Path) -> Self {
        let documents_dir = data_dir.join("documents");
        let uploads_dir = documents_dir.join("uploads");
        let vectorstore_dir = data_dir.join("vectorstore");
        let log_dir = data_dir.join("logs");
        let seed_path = documents_dir.join("sample.txt");
        let index_path = vectorstore_dir.join("index.bin");
        let corpus_path = vectorstore_dir.join("documents.json");
        let manifest_path = vectorstore_dir.join("manifest.json");

        for dir in [&documents_dir, &uploads_dir, &vectorstore_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root: project_root.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            documents_dir,
            uploads_dir,
            vectorstore_dir,
            log_dir,
            seed_path,
            index_path,
            corpus_path,
            manifest_path,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.project_root.join("config.yml")
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("VIRLAW_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("VIRLAW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return project_root.to_path_buf();
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("VirLaw");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("VirLaw");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("virlaw")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
