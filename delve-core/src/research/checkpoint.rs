//! Snapshots of a run taken at iteration boundaries.
//!
//! A checkpoint holds everything needed to continue a run later: the topic,
//! the Q&A that shaped the plan, and the loop state.

use crate::error::Result;
use crate::persistence;
use crate::research::session::ResearchState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub topic: String,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub state: ResearchState,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        topic: impl Into<String>,
        questions: Vec<String>,
        answers: Vec<String>,
        state: ResearchState,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            topic: topic.into(),
            questions,
            answers,
            state,
            saved_at: Utc::now(),
        }
    }

    /// Replace the state and refresh the timestamp.
    pub fn update(&mut self, state: &ResearchState) {
        self.state = state.clone();
        self.saved_at = Utc::now();
    }

    /// Atomically write this checkpoint as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        persistence::atomic_write_json(path, self)?;
        debug!(
            path = %path.display(),
            iteration = self.state.iteration_count,
            records = self.state.collected.len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        persistence::load_json(path)?.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("checkpoint not found: {}", path.display()),
            )
            .into()
        })
    }

    /// Default checkpoint location for a topic inside `dir`.
    pub fn default_path(dir: &Path, topic: &str) -> PathBuf {
        dir.join(format!("checkpoint_{}.json", persistence::file_stem(topic)))
    }
}
