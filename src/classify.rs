//! Classification stage: score every message and append one record per line.

use crate::data::types::ClassificationRecord;
use crate::data::writer::JsonLinesWriter;
use crate::data::DataError;
use crate::perspective::ToxicityScorer;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Log progress every this many messages.
const PROGRESS_EVERY: usize = 100;

/// Outcome of one classification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    /// Messages scored successfully
    pub classified: usize,
    /// Messages whose scoring call failed (recorded inline)
    pub failed: usize,
    /// Records that could not be serialized and were left out
    pub skipped: usize,
    /// The run stopped before the last message
    pub interrupted: bool,
}

impl ClassificationSummary {
    /// Lines that made it into the output.
    pub fn written(&self) -> usize {
        self.classified + self.failed
    }
}

/// Sequential classifier that can be stopped from another thread.
pub struct Classifier {
    running: Arc<AtomicBool>,
}

impl Classifier {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self { running }
    }

    /// Score `messages` in order, appending each record to `sink`.
    ///
    /// Scoring failures do not stop the run. IO failures on the sink do.
    pub fn run<S, W>(
        &self,
        messages: &[String],
        scorer: &S,
        sink: &mut JsonLinesWriter<W>,
    ) -> Result<ClassificationSummary, DataError>
    where
        S: ToxicityScorer + ?Sized,
        W: Write,
    {
        let mut summary = ClassificationSummary::default();
        info!("Classifying {} messages", messages.len());

        for (i, message) in messages.iter().enumerate() {
            if !self.running.load(Ordering::SeqCst) {
                info!("Interrupted after {} of {} messages", i, messages.len());
                summary.interrupted = true;
                break;
            }

            let outcome = scorer.score(message).map_err(|e| {
                debug!("Scoring message {} failed: {}", i, e);
                e.to_string()
            });
            let record = ClassificationRecord::from_outcome(message.as_str(), outcome);

            match sink.write_record(&record) {
                Ok(()) if record.is_failure() => summary.failed += 1,
                Ok(()) => summary.classified += 1,
                Err(DataError::Json(e)) => {
                    warn!("Skipping message {}: {}", i, e);
                    summary.skipped += 1;
                }
                Err(e) => return Err(e),
            }

            if (i + 1) % PROGRESS_EVERY == 0 {
                info!("Classified {} of {} messages", i + 1, messages.len());
            }
        }

        info!(
            "Classification finished: {} scored, {} failed, {} skipped",
            summary.classified, summary.failed, summary.skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perspective::PerspectiveError;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    /// Scores by message length; fails on messages containing "fail".
    struct ScriptedScorer {
        calls: Cell<usize>,
        stop_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl ScriptedScorer {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
                stop_after: None,
            }
        }
    }

    impl ToxicityScorer for ScriptedScorer {
        type Response = serde_json::Value;

        fn score(&self, text: &str) -> Result<serde_json::Value, PerspectiveError> {
            self.calls.set(self.calls.get() + 1);
            if let Some((n, running)) = &self.stop_after {
                if self.calls.get() >= *n {
                    running.store(false, Ordering::SeqCst);
                }
            }
            if text.contains("fail") {
                return Err(PerspectiveError::Server {
                    status: 400,
                    message: "unsupported language".to_string(),
                });
            }
            Ok(serde_json::json!({
                "attributeScores": {
                    "TOXICITY": { "summaryScore": { "value": text.len() as f64 / 100.0 } }
                }
            }))
        }
    }

    fn messages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    fn lines(buffer: Vec<u8>) -> Vec<ClassificationRecord> {
        String::from_utf8(buffer)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_failures_recorded_inline() {
        let classifier = Classifier::new(Arc::new(AtomicBool::new(true)));
        let mut sink = JsonLinesWriter::new(Vec::new());

        let summary = classifier
            .run(
                &messages(&["hello", "please fail", "bye"]),
                &ScriptedScorer::new(),
                &mut sink,
            )
            .unwrap();

        assert_eq!(summary.classified, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.interrupted);

        let records = lines(sink.finish().unwrap());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].toxicity_score(), Some(0.05));
        assert!(records[1].is_failure());
        assert_eq!(records[1].message, "please fail");
        assert_eq!(records[2].message, "bye");
    }

    #[test]
    fn test_stops_when_flag_cleared() {
        let running = Arc::new(AtomicBool::new(true));
        let classifier = Classifier::new(running.clone());
        let scorer = ScriptedScorer {
            calls: Cell::new(0),
            stop_after: Some((2, running)),
        };
        let mut sink = JsonLinesWriter::new(Vec::new());

        let summary = classifier
            .run(&messages(&["a", "b", "c", "d"]), &scorer, &mut sink)
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.written(), 2);
        assert_eq!(scorer.calls.get(), 2);
        assert_eq!(lines(sink.finish().unwrap()).len(), 2);
    }

    /// Replies with a map keyed by tuples, which JSON cannot represent.
    struct TupleKeyedScorer;

    impl ToxicityScorer for TupleKeyedScorer {
        type Response = BTreeMap<(u8, u8), f64>;

        fn score(&self, text: &str) -> Result<Self::Response, PerspectiveError> {
            if text == "plain" {
                return Ok(BTreeMap::new());
            }
            Ok(BTreeMap::from([((0, 1), 0.5)]))
        }
    }

    #[test]
    fn test_unserializable_reply_is_skipped() {
        let classifier = Classifier::new(Arc::new(AtomicBool::new(true)));
        let mut sink = JsonLinesWriter::new(Vec::new());

        let summary = classifier
            .run(&messages(&["plain", "keyed", "plain"]), &TupleKeyedScorer, &mut sink)
            .unwrap();

        assert_eq!(summary.classified, 2);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.interrupted);

        let output = String::from_utf8(sink.finish().unwrap()).unwrap();
        assert_eq!(output.lines().count(), 2);
        assert!(output.lines().all(|l| l.contains("\"plain\"")));
    }

    #[test]
    fn test_empty_input() {
        let classifier = Classifier::new(Arc::new(AtomicBool::new(true)));
        let mut sink = JsonLinesWriter::new(Vec::new());
        let summary = classifier.run(&[], &ScriptedScorer::new(), &mut sink).unwrap();
        assert_eq!(summary, ClassificationSummary::default());
    }
}
