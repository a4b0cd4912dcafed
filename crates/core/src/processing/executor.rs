//! Runs one task end to end.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::ProcessingBackend;
use crate::config::ProcessorConfig;
use crate::granule::{GranuleName, Level};
use crate::layout::DataLayout;
use crate::store::{EntityKind, EntityStore};

use super::types::{Task, TaskError};

/// Turns a group of retrieved products into their mapped target.
///
/// The binned intermediate is written under the layout's work directory and
/// the mapped artifact straight to its final path. The store is updated only
/// after the artifact has been checked, and source files are removed only
/// after the store commit.
pub struct TaskExecutor {
    config: ProcessorConfig,
    layout: DataLayout,
    store: Arc<dyn EntityStore>,
    backend: Arc<dyn ProcessingBackend>,
}

impl TaskExecutor {
    pub fn new(
        config: ProcessorConfig,
        layout: DataLayout,
        store: Arc<dyn EntityStore>,
        backend: Arc<dyn ProcessingBackend>,
    ) -> Self {
        Self {
            config,
            layout,
            store,
            backend,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Process `task`, returning the location of the mapped artifact.
    pub async fn execute(&self, task: &Task) -> Result<PathBuf, TaskError> {
        let inputs = self.resolve_inputs(task)?;

        let target = GranuleName::parse(&task.target)?;
        let binned_name = target
            .at_level(Level::L3Binned)
            .ok_or_else(|| TaskError::NotLevel3(task.target.clone()))?;
        let binned = self.layout.work_path(&binned_name);
        let output = self.layout.path_for(EntityKind::Derivative, &target);

        tokio::fs::create_dir_all(self.layout.work_dir()).await?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let product = self.config.product_for_suite(target.suite());
        let resolution = self.config.resolution.as_str();

        debug!(
            target = %task.target,
            backend = self.backend.name(),
            inputs = inputs.len(),
            product,
            resolution,
            "Binning"
        );
        self.backend.bin(&inputs, &binned, product, resolution).await?;

        debug!(target = %task.target, binned = %binned.display(), "Mapping");
        if let Err(e) = self.backend.map(&binned, &output, product, resolution).await {
            remove_quietly(&output).await;
            return Err(e.into());
        }

        if let Err(e) = check_artifact(&output).await {
            remove_quietly(&output).await;
            return Err(e);
        }

        if let Err(e) = self
            .store
            .complete_task(&task.product_ids, &task.target, &output)
        {
            remove_quietly(&output).await;
            return Err(e.into());
        }

        for input in inputs.iter().chain(std::iter::once(&binned)) {
            if let Err(e) = tokio::fs::remove_file(input).await {
                warn!(path = %input.display(), error = %e, "Failed to remove processed file");
            }
        }

        info!(
            target = %task.target,
            products = task.product_ids.len(),
            location = %output.display(),
            "Target produced"
        );
        Ok(output)
    }

    /// Locations of every product in the task, in task order.
    fn resolve_inputs(&self, task: &Task) -> Result<Vec<PathBuf>, TaskError> {
        task.product_ids
            .iter()
            .map(|id| {
                let product = self
                    .store
                    .get_product(id)?
                    .ok_or_else(|| TaskError::UnknownProduct(id.clone()))?;
                let location = product
                    .location
                    .ok_or_else(|| TaskError::MissingLocation(id.clone()))?;
                if !location.is_file() {
                    return Err(TaskError::MissingInput(location));
                }
                Ok(location)
            })
            .collect()
    }
}

async fn check_artifact(path: &Path) -> Result<(), TaskError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(TaskError::EmptyOutput(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TaskError::MissingOutput(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove rejected artifact");
        }
    }
}
