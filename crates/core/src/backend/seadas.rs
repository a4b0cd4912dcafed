//! SeaDAS (`l2bin` / `l3mapgen`) backend implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::error::BackendError;
use super::traits::{ProcessingBackend, Stage};

/// Backend shelling out to the SeaDAS OCSSW binaries.
pub struct SeadasBackend {
    l2bin_path: PathBuf,
    l3mapgen_path: PathBuf,
}

impl SeadasBackend {
    pub fn new(l2bin_path: impl Into<PathBuf>, l3mapgen_path: impl Into<PathBuf>) -> Self {
        Self {
            l2bin_path: l2bin_path.into(),
            l3mapgen_path: l3mapgen_path.into(),
        }
    }

    /// `l2bin` wants its resolution as a bare code (`1km` → `1`).
    fn bin_resolution(resolution: &str) -> &str {
        resolution.strip_suffix("km").unwrap_or(resolution)
    }

    /// Path of the list file naming every input of a binning run.
    fn input_list_path(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".inputs.txt");
        PathBuf::from(name)
    }

    fn build_bin_args(list: &Path, output: &Path, product: &str, resolution: &str) -> Vec<String> {
        vec![
            format!("ifile={}", list.display()),
            format!("ofile={}", output.display()),
            format!("l3bprod={}", product),
            format!("resolution={}", Self::bin_resolution(resolution)),
            "prodtype=regional".to_string(),
        ]
    }

    fn build_map_args(input: &Path, output: &Path, product: &str, resolution: &str) -> Vec<String> {
        vec![
            format!("ifile={}", input.display()),
            format!("ofile={}", output.display()),
            format!("product={}", product),
            format!("resolution={}", resolution),
            "projection=platecarree".to_string(),
            "interp=area".to_string(),
        ]
    }

    async fn run(&self, stage: Stage, binary: &Path, args: &[String]) -> Result<(), BackendError> {
        debug!(%stage, binary = %binary.display(), ?args, "Running processing stage");

        let output = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::BinaryNotFound {
                        stage,
                        path: binary.to_path_buf(),
                    }
                } else {
                    BackendError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(BackendError::process_failed(
                stage,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl ProcessingBackend for SeadasBackend {
    fn name(&self) -> &str {
        "seadas"
    }

    async fn bin(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        product: &str,
        resolution: &str,
    ) -> Result<(), BackendError> {
        for input in inputs {
            if !input.is_file() {
                return Err(BackendError::InputNotFound {
                    path: input.clone(),
                });
            }
        }

        let list = Self::input_list_path(output);
        let contents: String = inputs
            .iter()
            .map(|p| format!("{}\n", p.display()))
            .collect();
        tokio::fs::write(&list, contents).await?;

        let args = Self::build_bin_args(&list, output, product, resolution);
        let result = self.run(Stage::Bin, &self.l2bin_path, &args).await;

        let _ = tokio::fs::remove_file(&list).await;
        result
    }

    async fn map(
        &self,
        input: &Path,
        output: &Path,
        product: &str,
        resolution: &str,
    ) -> Result<(), BackendError> {
        if !input.is_file() {
            return Err(BackendError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        let args = Self::build_map_args(input, output, product, resolution);
        self.run(Stage::Map, &self.l3mapgen_path, &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bin_resolution() {
        assert_eq!(SeadasBackend::bin_resolution("1km"), "1");
        assert_eq!(SeadasBackend::bin_resolution("4km"), "4");
        assert_eq!(SeadasBackend::bin_resolution("HQ"), "HQ");
    }

    #[test]
    fn test_build_args() {
        let args = SeadasBackend::build_bin_args(
            Path::new("/w/x.inputs.txt"),
            Path::new("/w/x.L3b.nc"),
            "chlor_a",
            "1km",
        );
        assert_eq!(args[0], "ifile=/w/x.inputs.txt");
        assert_eq!(args[1], "ofile=/w/x.L3b.nc");
        assert_eq!(args[2], "l3bprod=chlor_a");
        assert_eq!(args[3], "resolution=1");

        let args = SeadasBackend::build_map_args(
            Path::new("/w/x.L3b.nc"),
            Path::new("/d/x.L3m.nc"),
            "chlor_a",
            "1km",
        );
        assert!(args.contains(&"product=chlor_a".to_string()));
        assert!(args.contains(&"resolution=1km".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in.nc");
        std::fs::write(&input, b"x").unwrap();

        let backend = SeadasBackend::new("/nonexistent/l2bin", "/nonexistent/l3mapgen");
        let result = backend
            .map(&input, &temp.path().join("out.nc"), "chlor_a", "1km")
            .await;
        assert!(matches!(
            result,
            Err(BackendError::BinaryNotFound {
                stage: Stage::Map,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let temp = TempDir::new().unwrap();
        let backend = SeadasBackend::new("l2bin", "l3mapgen");
        let result = backend
            .bin(
                &[temp.path().join("absent.nc")],
                &temp.path().join("out.nc"),
                "chlor_a",
                "1km",
            )
            .await;
        assert!(matches!(result, Err(BackendError::InputNotFound { .. })));
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stage_failure_captures_stderr() {
        let temp = TempDir::new().unwrap();
        let l2bin = write_script(temp.path(), "l2bin", "echo 'no valid pixels' >&2\nexit 3");
        let input = temp.path().join("in.L2.nc");
        std::fs::write(&input, b"x").unwrap();

        let backend = SeadasBackend::new(l2bin, "l3mapgen");
        let err = backend
            .bin(&[input], &temp.path().join("out.L3b.nc"), "chlor_a", "1km")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BackendError::ProcessFailed {
                stage: Stage::Bin,
                code: Some(3),
                ..
            }
        ));
        assert!(err.stderr().unwrap().contains("no valid pixels"));
        assert!(!temp.path().join("out.L3b.nc.inputs.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stages_write_outputs() {
        let temp = TempDir::new().unwrap();
        // Each fake binary copies the `ifile=` argument's contents into `ofile=`.
        let body = r#"for arg in "$@"; do
  case "$arg" in
    ifile=*) in="${arg#ifile=}" ;;
    ofile=*) out="${arg#ofile=}" ;;
  esac
done
cat "$in" > "$out""#;
        let l2bin = write_script(temp.path(), "l2bin", body);
        let l3mapgen = write_script(temp.path(), "l3mapgen", body);

        let a = temp.path().join("a.L2.nc");
        let b = temp.path().join("b.L2.nc");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        let binned = temp.path().join("x.L3b.nc");
        let mapped = temp.path().join("x.L3m.nc");

        let backend = SeadasBackend::new(l2bin, l3mapgen);
        backend
            .bin(&[a.clone(), b.clone()], &binned, "chlor_a", "1km")
            .await
            .unwrap();
        backend.map(&binned, &mapped, "chlor_a", "1km").await.unwrap();

        let listed = std::fs::read_to_string(&mapped).unwrap();
        assert_eq!(
            listed,
            format!("{}\n{}\n", a.display(), b.display())
        );
    }
}
