//! In-memory build store for tests and embedding.

use crate::domain::{
    ItemRef, KnowledgeBase, KnowledgeEntry, Prd, PrdSet, ProgressEntry, ProgressLog, knowledge,
};
use crate::error::Result;

use super::traits::BuildStore;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    prds: PrdSet,
    progress: ProgressLog,
    knowledge: KnowledgeBase,
}

impl MemoryStore {
    /// Build a store from `(file_name, markdown)` pairs.
    pub fn from_documents<'a>(docs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let prds = docs
            .into_iter()
            .map(|(name, text)| Prd::parse(name, text))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prds: PrdSet::new(prds),
            progress: ProgressLog::new(),
            knowledge: KnowledgeBase::parse(knowledge::template()),
        })
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }
}

impl BuildStore for MemoryStore {
    fn prds(&self) -> Result<PrdSet> {
        Ok(self.prds.clone())
    }

    fn mark_done(&mut self, item: &ItemRef) -> Result<bool> {
        self.prds.mark_done(item)
    }

    fn progress(&self) -> Result<ProgressLog> {
        Ok(self.progress.clone())
    }

    fn append_progress(&mut self, entry: ProgressEntry) -> Result<()> {
        self.progress.append(entry)
    }

    fn knowledge(&self) -> Result<KnowledgeBase> {
        Ok(self.knowledge.clone())
    }

    fn append_knowledge(&mut self, entry: &KnowledgeEntry) -> Result<bool> {
        Ok(self.knowledge.append(entry))
    }
}
