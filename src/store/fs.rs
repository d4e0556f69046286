//! Flat-file build store: `prds/*.md`, `progress.txt`, `AGENTS.md`.
//!
//! Every read goes back to disk so corruption is noticed on the next
//! iteration rather than hidden behind a cache.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::domain::prd::priority_from_file_name;
use crate::domain::progress::PROGRESS_HEADER;
use crate::domain::{
    ItemRef, KnowledgeBase, KnowledgeEntry, Prd, PrdSet, ProgressEntry, ProgressLog, knowledge,
};
use crate::error::{Result, TelosError};

use super::traits::BuildStore;

/// Where the build files live, relative to the project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub prds_dir: PathBuf,
    pub progress_file: PathBuf,
    pub knowledge_file: PathBuf,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            prds_dir: PathBuf::from("prds"),
            progress_file: PathBuf::from("progress.txt"),
            knowledge_file: PathBuf::from("AGENTS.md"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    prds_dir: PathBuf,
    progress_path: PathBuf,
    knowledge_path: PathBuf,
}

impl FileStore {
    /// Open the store for a project without creating anything.
    pub fn new(project_dir: impl AsRef<Path>, layout: &StoreLayout) -> Self {
        let root = project_dir.as_ref();
        Self {
            prds_dir: root.join(&layout.prds_dir),
            progress_path: root.join(&layout.progress_file),
            knowledge_path: root.join(&layout.knowledge_file),
        }
    }

    /// Open the store and seed `progress.txt` and `AGENTS.md` if missing.
    pub fn open(project_dir: impl AsRef<Path>, layout: &StoreLayout) -> Result<Self> {
        let store = Self::new(project_dir, layout);

        if !store.progress_path.exists() {
            write_new(&store.progress_path, PROGRESS_HEADER)?;
            info!("Created progress log at {}", store.progress_path.display());
        }
        if !store.knowledge_path.exists() {
            write_new(&store.knowledge_path, &knowledge::template())?;
            info!("Seeded knowledge base at {}", store.knowledge_path.display());
        }
        Ok(store)
    }

    pub fn prds_dir(&self) -> &Path {
        &self.prds_dir
    }

    pub fn progress_path(&self) -> &Path {
        &self.progress_path
    }

    pub fn knowledge_path(&self) -> &Path {
        &self.knowledge_path
    }

    fn prd_path(&self, file_name: &str) -> PathBuf {
        self.prds_dir.join(file_name)
    }
}

fn write_new(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Write via a sibling temp file and rename so readers never see half a file.
fn replace_file(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl BuildStore for FileStore {
    fn prds(&self) -> Result<PrdSet> {
        if !self.prds_dir.is_dir() {
            return Err(TelosError::Prd(format!(
                "PRD directory {} does not exist",
                self.prds_dir.display()
            )));
        }

        let pattern = self.prds_dir.join("*.md");
        let paths = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| TelosError::Prd(format!("bad PRD glob: {}", e)))?;

        let mut prds = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| TelosError::Prd(format!("unreadable PRD path: {}", e)))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| TelosError::Prd(format!("bad PRD path {}", path.display())))?;

            if priority_from_file_name(&file_name).is_none() {
                warn!("Skipping {}: no numeric priority prefix", file_name);
                continue;
            }

            let content = fs::read_to_string(&path)
                .map_err(|e| TelosError::Prd(format!("{}: {}", file_name, e)))?;
            prds.push(Prd::parse(&file_name, content)?);
        }

        debug!("Loaded {} PRD(s) from {}", prds.len(), self.prds_dir.display());
        Ok(PrdSet::new(prds))
    }

    fn mark_done(&mut self, item: &ItemRef) -> Result<bool> {
        let path = self.prd_path(item.prd.as_str());
        let content = fs::read_to_string(&path)
            .map_err(|e| TelosError::Prd(format!("{}: {}", item.prd, e)))?;

        let mut prd = Prd::parse(item.prd.as_str(), content)?;
        let changed = prd.mark_done(item.index)?;
        if changed {
            replace_file(&path, prd.content())?;
            info!("Checked {}", item);
        }
        Ok(changed)
    }

    fn progress(&self) -> Result<ProgressLog> {
        match fs::read_to_string(&self.progress_path) {
            Ok(text) => ProgressLog::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProgressLog::new()),
            Err(e) => Err(TelosError::ProgressLog(format!(
                "{}: {}",
                self.progress_path.display(),
                e
            ))),
        }
    }

    fn append_progress(&mut self, entry: ProgressEntry) -> Result<()> {
        let mut log = self.progress()?;
        let block = entry.to_block();
        log.append(entry)?;

        let needs_header = !self.progress_path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.progress_path)?;
        if needs_header {
            file.write_all(PROGRESS_HEADER.as_bytes())?;
        }
        file.write_all(block.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn knowledge(&self) -> Result<KnowledgeBase> {
        match fs::read_to_string(&self.knowledge_path) {
            Ok(text) => Ok(KnowledgeBase::parse(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(KnowledgeBase::parse(knowledge::template()))
            }
            Err(e) => Err(TelosError::Knowledge(format!(
                "{}: {}",
                self.knowledge_path.display(),
                e
            ))),
        }
    }

    fn append_knowledge(&mut self, entry: &KnowledgeEntry) -> Result<bool> {
        let mut kb = self.knowledge()?;
        if !kb.append(entry) {
            return Ok(false);
        }
        if let Some(parent) = self.knowledge_path.parent() {
            fs::create_dir_all(parent)?;
        }
        replace_file(&self.knowledge_path, kb.content())?;
        debug!("Appended {} entry: {}", entry.category, entry.text);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KnowledgeCategory, PrdRef, VerdictKind};
    use tempfile::TempDir;

    fn project_with(prds: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let prds_dir = dir.path().join("prds");
        fs::create_dir_all(&prds_dir).unwrap();
        for (name, text) in prds {
            fs::write(prds_dir.join(name), text).unwrap();
        }
        dir
    }

    #[test]
    fn test_open_seeds_progress_and_knowledge() {
        let dir = project_with(&[]);
        let store = FileStore::open(dir.path(), &StoreLayout::default()).unwrap();
        assert_eq!(fs::read_to_string(store.progress_path()).unwrap(), PROGRESS_HEADER);
        let kb = fs::read_to_string(store.knowledge_path()).unwrap();
        assert!(kb.contains("## Gotchas"));
    }

    #[test]
    fn test_open_keeps_existing_knowledge() {
        let dir = project_with(&[]);
        fs::write(dir.path().join("AGENTS.md"), "# Mine\n").unwrap();
        FileStore::open(dir.path(), &StoreLayout::default()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("AGENTS.md")).unwrap(), "# Mine\n");
    }

    #[test]
    fn test_prds_sorted_and_unprefixed_skipped() {
        let dir = project_with(&[
            ("02-b.md", "- [ ] b\n"),
            ("01-a.md", "- [ ] a\n"),
            ("README.md", "- [ ] not a prd\n"),
        ]);
        let store = FileStore::open(dir.path(), &StoreLayout::default()).unwrap();
        let prds = store.prds().unwrap();
        let names: Vec<&str> = prds.prds().iter().map(|p| p.reference.as_str()).collect();
        assert_eq!(names, vec!["01-a.md", "02-b.md"]);
    }

    #[test]
    fn test_missing_prds_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path(), &StoreLayout::default()).unwrap();
        assert!(matches!(store.prds(), Err(TelosError::Prd(_))));
    }

    #[test]
    fn test_mark_done_rewrites_only_the_checkbox() {
        let original = "# A\n\nIntro  with  odd   spacing\n- [ ] one\n- [ ] two\n\ntrailing\n";
        let dir = project_with(&[("01-a.md", original)]);
        let mut store = FileStore::open(dir.path(), &StoreLayout::default()).unwrap();

        let item = ItemRef::new(PrdRef::new("01-a.md"), 1);
        assert!(store.mark_done(&item).unwrap());
        assert!(!store.mark_done(&item).unwrap());

        let written = fs::read_to_string(dir.path().join("prds/01-a.md")).unwrap();
        assert_eq!(written, original.replace("- [ ] two", "- [x] two"));
    }

    #[test]
    fn test_append_progress_is_append_only() {
        let dir = project_with(&[("01-a.md", "- [ ] a\n")]);
        let mut store = FileStore::open(dir.path(), &StoreLayout::default()).unwrap();
        let item = ItemRef::new(PrdRef::new("01-a.md"), 0);

        store
            .append_progress(ProgressEntry::new(1, item.clone(), "a", VerdictKind::Denied, "tests fail"))
            .unwrap();
        let after_one = fs::read_to_string(store.progress_path()).unwrap();

        store
            .append_progress(ProgressEntry::new(2, item.clone(), "a", VerdictKind::Approved, "ok"))
            .unwrap();
        let after_two = fs::read_to_string(store.progress_path()).unwrap();

        assert!(after_two.starts_with(&after_one));
        assert_eq!(store.progress().unwrap().len(), 2);

        let err = store.append_progress(ProgressEntry::new(5, item, "a", VerdictKind::Approved, "ok"));
        assert!(err.is_err());
        assert_eq!(fs::read_to_string(store.progress_path()).unwrap(), after_two);
    }

    #[test]
    fn test_corrupt_progress_is_an_error() {
        let dir = project_with(&[]);
        fs::write(dir.path().join("progress.txt"), "## Iteration x\n").unwrap();
        let store = FileStore::open(dir.path(), &StoreLayout::default()).unwrap();
        assert!(matches!(store.progress(), Err(TelosError::ProgressLog(_))));
    }

    #[test]
    fn test_append_knowledge_persists() {
        let dir = project_with(&[]);
        let mut store = FileStore::open(dir.path(), &StoreLayout::default()).unwrap();
        let entry = KnowledgeEntry::new(KnowledgeCategory::Gotchas, "port 3000 is taken");

        assert!(store.append_knowledge(&entry).unwrap());
        assert!(!store.append_knowledge(&entry).unwrap());

        let reopened = FileStore::new(dir.path(), &StoreLayout::default());
        assert_eq!(
            reopened.knowledge().unwrap().entries(KnowledgeCategory::Gotchas),
            vec!["port 3000 is taken"]
        );
    }
}
