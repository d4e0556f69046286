//! Planning phases that run before a build: transcript to plan, plan to PRDs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::agent::{AgentRuntime, CapabilityPolicy, SubagentIdentity, SubagentRunner};
use crate::config::Config;
use crate::domain::PrdSet;
use crate::error::{Result, TelosError};
use crate::prompt::{PromptRenderer, templates};
use crate::store::{BuildStore, FileStore, StoreLayout};

pub const PLAN_FILE: &str = "plan.md";

/// Checkbox count a generated PRD should land in
pub const PRD_ITEMS_MIN: usize = 8;
pub const PRD_ITEMS_MAX: usize = 15;

#[derive(Serialize)]
struct PlanContext<'a> {
    transcript: &'a str,
}

#[derive(Serialize)]
struct PrdsContext<'a> {
    plan: &'a str,
    prds_dir: String,
    min_items: usize,
    max_items: usize,
}

pub struct Planner {
    runner: SubagentRunner,
    policy: CapabilityPolicy,
    renderer: Arc<PromptRenderer>,
    project_dir: PathBuf,
    layout: StoreLayout,
}

impl Planner {
    pub fn new(
        runner: SubagentRunner,
        policy: CapabilityPolicy,
        renderer: Arc<PromptRenderer>,
        project_dir: impl Into<PathBuf>,
        layout: StoreLayout,
    ) -> Self {
        Self {
            runner,
            policy,
            renderer,
            project_dir: project_dir.into(),
            layout,
        }
    }

    pub fn from_config(runtime: Arc<dyn AgentRuntime>, config: &Config, project_dir: impl Into<PathBuf>) -> Result<Self> {
        let project_dir = project_dir.into();
        let runner = SubagentRunner::new(runtime, &project_dir).with_model(config.planning.model.clone());
        let policy = config.policy_set()?.get(SubagentIdentity::Planner);
        Ok(Self::new(
            runner,
            policy,
            Arc::new(PromptRenderer::new()?),
            project_dir,
            config.build.layout(),
        ))
    }

    pub fn plan_path(&self) -> PathBuf {
        self.project_dir.join(PLAN_FILE)
    }

    /// Turn an interview transcript into `plan.md`.
    pub async fn generate_plan(&self, transcript: &str) -> Result<PathBuf> {
        if transcript.trim().is_empty() {
            return Err(TelosError::InvalidState("interview transcript is empty".to_string()));
        }
        let prompt = self.renderer.render(templates::PLAN, &PlanContext { transcript })?;

        log::info!("Generating plan in {}", self.project_dir.display());
        let output = self.invoke(&prompt).await?;
        let plan = strip_fence(&output);
        if plan.trim().is_empty() {
            return Err(TelosError::Runtime("planner returned an empty plan".to_string()));
        }

        let path = self.plan_path();
        fs::write(&path, format!("{}\n", plan.trim_end()))?;
        log::info!("Wrote {}", path.display());
        Ok(path)
    }

    /// Split `plan.md` into numbered PRD files and return the parsed set.
    pub async fn generate_prds(&self) -> Result<PrdSet> {
        let plan_path = self.plan_path();
        if !plan_path.exists() {
            return Err(TelosError::InvalidState(format!(
                "no plan found at {}; run generate-plan first",
                plan_path.display()
            )));
        }
        let plan = fs::read_to_string(&plan_path)?;

        let store = FileStore::new(&self.project_dir, &self.layout);
        fs::create_dir_all(store.prds_dir())?;

        let prompt = self.renderer.render(
            templates::PRDS,
            &PrdsContext {
                plan: &plan,
                prds_dir: self.layout.prds_dir.display().to_string(),
                min_items: PRD_ITEMS_MIN,
                max_items: PRD_ITEMS_MAX,
            },
        )?;

        log::info!("Generating PRDs into {}", store.prds_dir().display());
        let summary = self.invoke(&prompt).await?;
        log::debug!("Planner summary: {}", summary);

        let prds = store.prds()?;
        if prds.is_empty() {
            return Err(TelosError::Prd(format!(
                "planner wrote no parseable PRDs into {}",
                store.prds_dir().display()
            )));
        }
        for prd in prds.prds() {
            let n = prd.items.len();
            if !(PRD_ITEMS_MIN..=PRD_ITEMS_MAX).contains(&n) {
                log::warn!("{} has {} checklist items, outside {}-{}", prd.reference, n, PRD_ITEMS_MIN, PRD_ITEMS_MAX);
            }
        }
        let (_, total) = prds.counts();
        log::info!("Generated {} PRDs with {} items", prds.prds().len(), total);
        Ok(prds)
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let result = self.runner.invoke(SubagentIdentity::Planner, prompt, &self.policy).await;
        match result.error_message() {
            Some(msg) if !result.success => Err(TelosError::Runtime(format!("planner failed: {}", msg))),
            _ => Ok(result.output),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}

/// Drop a surrounding ```markdown fence if the whole output is wrapped in one.
fn strip_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    match body.split_once('\n') {
        Some((_lang, body)) => body.trim(),
        None => trimmed,
    }
}
