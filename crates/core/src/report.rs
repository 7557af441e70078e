use crate::error::ReportError;
use crate::models::QueryResult;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Durable sink for answered questions: one JSON object per line, appended
/// so repeated analysis runs accumulate in the same file. The core hands
/// records off here; presentation stays with the caller.
pub struct JsonlReportWriter {
    path: PathBuf,
}

impl JsonlReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, result: &QueryResult) -> Result<(), ReportError> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;

        info!(path = %self.path.display(), question = %result.question, "recorded query result");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn result(question: &str) -> QueryResult {
        QueryResult {
            question: question.to_string(),
            answer: "An answer.".to_string(),
            passages: Vec::new(),
            sources: vec!["nda.txt".to_string()],
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn appends_one_line_per_result() {
        let dir = tempdir().unwrap();
        let writer = JsonlReportWriter::new(dir.path().join("results.jsonl"));

        writer.append(&result("first question")).unwrap();
        writer.append(&result("second question")).unwrap();

        let contents = std::fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: QueryResult = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.question, "first question");
        assert_eq!(parsed.sources, vec!["nda.txt".to_string()]);
    }
}
