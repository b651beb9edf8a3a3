//! External separation engine
//!
//! The separator is an opaque, long-running step. The worker hands it an
//! input file and a scratch directory and gets back the directory holding one
//! file per [`TrackPart`]. Nothing about the engine's internals is inspected.

use async_trait::async_trait;
use demix_common::types::TrackPart;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

use super::config::WorkerConfig;

/// Longest stderr excerpt carried in a failure.
const STDERR_TAIL_BYTES: usize = 2000;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to start separator: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Separator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Separator produced no output directory at {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Where the separated parts of one input were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatedOutput {
    pub dir: PathBuf,
    pub extension: String,
}

impl SeparatedOutput {
    pub fn part_path(&self, part: TrackPart) -> PathBuf {
        self.dir.join(format!("{}.{}", part.as_str(), self.extension))
    }
}

#[async_trait]
pub trait SeparationEngine: Send + Sync {
    /// Separate `input`, writing anything needed under `work_dir`.
    async fn separate(&self, input: &Path, work_dir: &Path) -> Result<SeparatedOutput, EngineError>;
}

/// Runs a demucs-compatible command line:
/// `<command> -n <model> --out <dir> [--mp3] <input>`.
///
/// Output is expected at `<dir>/<model>/<input stem>/<part>.<ext>`.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    model: String,
    output_ext: String,
}

impl CommandEngine {
    pub fn new(command: &str, model: impl Into<String>, output_ext: impl Into<String>) -> Self {
        let mut words = command.split_whitespace().map(str::to_string);
        Self {
            program: words.next().unwrap_or_default(),
            args: words.collect(),
            model: model.into(),
            output_ext: output_ext.into(),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            &config.separator_command,
            config.separator_model.clone(),
            config.separator_output_ext.clone(),
        )
    }

    fn output_dir(&self, out_root: &Path, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        out_root.join(&self.model).join(stem)
    }
}

fn tail(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - max;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

#[async_trait]
impl SeparationEngine for CommandEngine {
    #[instrument(skip(self), fields(program = %self.program, model = %self.model))]
    async fn separate(&self, input: &Path, work_dir: &Path) -> Result<SeparatedOutput, EngineError> {
        let out_root = work_dir.join("separated");

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg("-n")
            .arg(&self.model)
            .arg("--out")
            .arg(&out_root);
        if self.output_ext == "mp3" {
            command.arg("--mp3");
        }
        command.arg(input).kill_on_drop(true);

        debug!(?command, "Running separator");

        let output = command.output().await.map_err(EngineError::Spawn)?;
        if !output.status.success() {
            return Err(EngineError::Failed {
                status: output.status.to_string(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_BYTES),
            });
        }

        let dir = self.output_dir(&out_root, input);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(EngineError::MissingOutput(dir));
        }

        Ok(SeparatedOutput {
            dir,
            extension: self.output_ext.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        let engine = CommandEngine::new("python3 -m demucs.separate", "htdemucs", "mp3");
        assert_eq!(engine.program, "python3");
        assert_eq!(engine.args, vec!["-m".to_string(), "demucs.separate".to_string()]);
    }

    #[test]
    fn test_output_dir_layout() {
        let engine = CommandEngine::new("demucs", "htdemucs", "mp3");
        let dir = engine.output_dir(Path::new("/w/separated"), Path::new("/w/song_3.mp3"));
        assert_eq!(dir, PathBuf::from("/w/separated/htdemucs/song_3"));

        let output = SeparatedOutput {
            dir,
            extension: "mp3".to_string(),
        };
        assert_eq!(
            output.part_path(TrackPart::Vocals),
            PathBuf::from("/w/separated/htdemucs/song_3/vocals.mp3")
        );
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("  short  ", 10), "short");
        assert_eq!(tail("abcdefghij", 4), "ghij");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let engine = CommandEngine::new("demix-no-such-separator", "htdemucs", "mp3");
        let dir = tempfile::tempdir().unwrap();
        let err = engine
            .separate(&dir.path().join("in.mp3"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let engine = CommandEngine::new("false", "htdemucs", "mp3");
        let dir = tempfile::tempdir().unwrap();
        let err = engine
            .separate(&dir.path().join("in.mp3"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Failed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_output_is_located() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake_demucs.sh");
        std::fs::write(
            &script,
            r#"
model="$2"
out="$4"
for last; do input="$last"; done
stem=$(basename "$input" .mp3)
mkdir -p "$out/$model/$stem"
for part in bass drums vocals other; do
  printf '%s' "$part" > "$out/$model/$stem/$part.mp3"
done
"#,
        )
        .unwrap();

        let input = dir.path().join("song_9.mp3");
        std::fs::write(&input, b"audio").unwrap();

        let engine = CommandEngine::new(&format!("sh {}", script.display()), "htdemucs", "mp3");
        let output = engine.separate(&input, dir.path()).await.unwrap();

        assert_eq!(output.dir, dir.path().join("separated/htdemucs/song_9"));
        let bass = std::fs::read(output.part_path(TrackPart::Bass)).unwrap();
        assert_eq!(bass, b"bass");
    }
}
