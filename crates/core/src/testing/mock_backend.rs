//! Mock processing backend for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::{BackendError, ProcessingBackend, Stage};

/// A recorded stage invocation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub stage: Stage,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub product: String,
    pub resolution: String,
}

/// Mock implementation of the ProcessingBackend trait.
///
/// Stages write small placeholder files instead of running anything:
/// binning writes the list of inputs, mapping copies the binned file.
/// Failures can be injected per target (matched on the mapped output's file
/// name) or for the next call only.
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: Arc<RwLock<Vec<BackendCall>>>,
    next_error: Arc<RwLock<Option<BackendError>>>,
    failing_targets: Arc<RwLock<HashSet<String>>>,
    panicking_targets: Arc<RwLock<HashSet<String>>>,
    empty_output: Arc<RwLock<bool>>,
    stage_duration_ms: Arc<RwLock<u64>>,
    /// Running stage count per output file name.
    in_flight: Arc<Mutex<HashMap<String, usize>>>,
    max_per_target: Arc<Mutex<usize>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls, in call order.
    pub async fn recorded_calls(&self) -> Vec<BackendCall> {
        self.calls.read().await.clone()
    }

    /// Configure the next stage call to fail with the given error.
    pub async fn set_next_error(&self, error: BackendError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every mapping run producing `target` fail.
    pub async fn fail_target(&self, target: &str) {
        self.failing_targets.write().await.insert(target.to_string());
    }

    /// Make every mapping run producing `target` panic.
    pub async fn panic_on_target(&self, target: &str) {
        self.panicking_targets
            .write()
            .await
            .insert(target.to_string());
    }

    /// Make mapping write a zero-length artifact.
    pub async fn set_empty_output(&self, empty: bool) {
        *self.empty_output.write().await = empty;
    }

    /// Set the simulated duration of each stage.
    pub async fn set_stage_duration(&self, duration: Duration) {
        *self.stage_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Highest number of overlapping stage runs observed for one output.
    pub async fn max_concurrent_per_target(&self) -> usize {
        *lock(&self.max_per_target)
    }

    async fn record(
        &self,
        stage: Stage,
        inputs: Vec<PathBuf>,
        output: &Path,
        product: &str,
        resolution: &str,
    ) {
        self.calls.write().await.push(BackendCall {
            stage,
            inputs,
            output: output.to_path_buf(),
            product: product.to_string(),
            resolution: resolution.to_string(),
        });
    }

    /// Run `work` while counting it as in flight for `output`.
    async fn tracked<F>(&self, output: &Path, work: F) -> Result<(), BackendError>
    where
        F: std::future::Future<Output = Result<(), BackendError>>,
    {
        let key = file_name(output);
        {
            let mut in_flight = lock(&self.in_flight);
            let count = in_flight.entry(key.clone()).or_insert(0);
            *count += 1;
            let mut max = lock(&self.max_per_target);
            *max = (*max).max(*count);
        }

        let duration_ms = *self.stage_duration_ms.read().await;
        if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }
        let result = work.await;

        if let Some(count) = lock(&self.in_flight).get_mut(&key) {
            *count -= 1;
        }
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl ProcessingBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn bin(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        product: &str,
        resolution: &str,
    ) -> Result<(), BackendError> {
        self.record(Stage::Bin, inputs.to_vec(), output, product, resolution)
            .await;
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        self.tracked(output, async {
            let listing: String = inputs
                .iter()
                .map(|p| format!("{}\n", p.display()))
                .collect();
            tokio::fs::write(output, listing).await?;
            Ok(())
        })
        .await
    }

    async fn map(
        &self,
        input: &Path,
        output: &Path,
        product: &str,
        resolution: &str,
    ) -> Result<(), BackendError> {
        self.record(
            Stage::Map,
            vec![input.to_path_buf()],
            output,
            product,
            resolution,
        )
        .await;
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        let target = file_name(output);
        if self.panicking_targets.read().await.contains(&target) {
            panic!("mock backend panic for {}", target);
        }
        if self.failing_targets.read().await.contains(&target) {
            return Err(BackendError::process_failed(
                Stage::Map,
                Some(1),
                format!("mock failure for {}", target),
            ));
        }

        let empty = *self.empty_output.read().await;
        self.tracked(output, async {
            if empty {
                tokio::fs::write(output, b"").await?;
            } else {
                tokio::fs::copy(input, output).await?;
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stages_write_files() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("a.L2.OC.nc");
        std::fs::write(&input, b"a").unwrap();
        let binned = temp.path().join("x.L3b.nc");
        let mapped = temp.path().join("x.L3m.nc");

        let backend = MockBackend::new();
        backend
            .bin(&[input.clone()], &binned, "chlor_a", "1km")
            .await
            .unwrap();
        backend.map(&binned, &mapped, "chlor_a", "1km").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&mapped).unwrap(),
            format!("{}\n", input.display())
        );
        assert_eq!(backend.recorded_calls().await.len(), 2);
        assert_eq!(backend.max_concurrent_per_target().await, 1);
    }

    #[tokio::test]
    async fn test_next_error_is_one_shot() {
        let temp = TempDir::new().unwrap();
        let backend = MockBackend::new();
        backend
            .set_next_error(BackendError::process_failed(Stage::Bin, Some(2), "x"))
            .await;

        let out = temp.path().join("b.nc");
        assert!(backend.bin(&[], &out, "sst", "4km").await.is_err());
        assert!(backend.bin(&[], &out, "sst", "4km").await.is_ok());
    }
}
