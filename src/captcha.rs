//! Human-in-the-loop CAPTCHA solving.
//!
//! The crawler only depends on [`CaptchaSolver`]; the console
//! implementation saves the image, opens it in the platform viewer and
//! blocks on a line of stdin.

use async_trait::async_trait;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("no answer was entered")]
    NoInput,
    #[error("invalid input {solution:?}: must be {expected} characters")]
    InvalidLength { solution: String, expected: usize },
}

/// Turns a CAPTCHA image into the text typed back to the site.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, image: &[u8]) -> Result<String, CaptchaError>;
}

/// Uppercases the answer, drops everything outside `[A-Z0-9]` and checks
/// the length.
pub fn normalize_solution(raw: &str, expected_len: usize) -> Result<String, CaptchaError> {
    let solution: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();

    if solution.chars().count() != expected_len {
        return Err(CaptchaError::InvalidLength {
            solution,
            expected: expected_len,
        });
    }
    Ok(solution)
}

/// Asks the operator at the terminal.
#[derive(Debug, Clone)]
pub struct ConsoleSolver {
    image_path: PathBuf,
    open_viewer: bool,
    solution_length: usize,
}

impl ConsoleSolver {
    pub fn new(image_path: impl Into<PathBuf>, open_viewer: bool, solution_length: usize) -> Self {
        Self {
            image_path: image_path.into(),
            open_viewer,
            solution_length,
        }
    }

    async fn show(&self) {
        info!(path = %self.image_path.display(), "Opening CAPTCHA image...");
        match viewer_command(&self.image_path).status().await {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(%status, "image viewer exited with an error; open the file manually"),
            Err(err) => warn!(error = %err, "could not launch image viewer; open the file manually"),
        }
    }
}

#[async_trait]
impl CaptchaSolver for ConsoleSolver {
    async fn solve(&self, image: &[u8]) -> Result<String, CaptchaError> {
        tokio::fs::write(&self.image_path, image).await?;
        if self.open_viewer {
            self.show().await;
        }

        prompt(self.solution_length);
        let answer = tokio::task::spawn_blocking(|| read_answer(io::stdin().lock()))
            .await
            .map_err(io::Error::other)??;
        answer.ok_or(CaptchaError::NoInput)
    }
}

/// Emitted as log events, so the prompt is part of the log transcript.
fn prompt(solution_length: usize) {
    info!("Please solve the CAPTCHA ({solution_length} characters, uppercase + numbers)");
    info!("    Enter CAPTCHA:");
}

fn read_answer(mut input: impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    let read = input.read_line(&mut line)?;
    Ok((read > 0).then_some(line))
}

fn viewer_command(path: &Path) -> Command {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(path);
        command
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]).arg(path);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(path);
        command
    }
}
