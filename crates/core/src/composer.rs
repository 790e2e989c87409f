use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::error::AnswerError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::models::{Answer, ScoreReading, VectorIndex};
use crate::prompts::{build_query, build_user_prompt, PromptSet, RECRUITER_SYSTEM_PROMPT, SCORE_QUESTION_KEY};
use crate::retriever::retrieve;
use crate::score::read_score;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Answers questions about one resume index, each from its own retrieval and
/// a single stateless model call.
pub struct AnswerComposer {
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
}

#[derive(Debug)]
pub struct QuestionOutcome {
    pub key: String,
    pub question: String,
    pub result: Result<Answer, AnswerError>,
    /// Only set for the score question, and only when it was answered.
    pub score: Option<ScoreReading>,
}

impl QuestionOutcome {
    pub fn answer_text(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|answer| answer.text.as_str())
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub document_id: String,
    pub prompt_version: &'static str,
    pub outcomes: Vec<QuestionOutcome>,
    /// Keys never asked because the batch was cancelled.
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn outcome(&self, key: &str) -> Option<&QuestionOutcome> {
        self.outcomes.iter().find(|outcome| outcome.key == key)
    }

    pub fn score(&self) -> Option<ScoreReading> {
        self.outcome(SCORE_QUESTION_KEY).and_then(|outcome| outcome.score)
    }

    pub fn failures(&self) -> impl Iterator<Item = &QuestionOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }

    pub fn was_cancelled(&self) -> bool {
        !self.skipped.is_empty()
    }
}

impl AnswerComposer {
    pub fn new(embedder: Arc<dyn Embedder>, model: Arc<dyn LanguageModel>, config: &RagConfig) -> Self {
        Self {
            embedder,
            model,
            top_k: config.top_k,
        }
    }

    pub async fn answer(
        &self,
        index: &VectorIndex,
        job_description: &str,
        question: &str,
    ) -> Result<Answer, AnswerError> {
        let query = build_query(job_description, question);
        let sources = retrieve(self.embedder.as_ref(), index, &query, self.top_k).await?;
        let prompt = build_user_prompt(&sources.joined_text(), &query);

        debug!(model = %self.model.model_id(), %prompt, "prompt sent to model");
        let text = self
            .model
            .complete(&CompletionRequest {
                system: RECRUITER_SYSTEM_PROMPT,
                prompt: &prompt,
            })
            .await?;
        debug!(response = %text, "response from model");

        Ok(Answer { text, sources })
    }

    /// Asks every question of `prompt_set` in order. A failed question is
    /// recorded and the batch moves on. `cancel` is checked before each
    /// question; once set, the remaining keys are reported as skipped.
    pub async fn answer_all(
        &self,
        index: &VectorIndex,
        job_description: &str,
        prompt_set: &PromptSet,
        cancel: &AtomicBool,
    ) -> BatchReport {
        let mut report = BatchReport {
            document_id: index.document_id.clone(),
            prompt_version: prompt_set.version,
            outcomes: Vec::with_capacity(prompt_set.questions.len()),
            skipped: Vec::new(),
        };

        for &(key, question) in &prompt_set.questions {
            if cancel.load(Ordering::Acquire) {
                report.skipped.push(key.to_string());
                continue;
            }

            info!(question = key, document = %index.document_id, "answering question");
            let result = self.answer(index, job_description, question).await;

            let score = match &result {
                Ok(answer) if key == SCORE_QUESTION_KEY => {
                    let reading = read_score(&answer.text);
                    if !reading.reliable {
                        warn!(question = key, response = %answer.text, "no score in model output");
                    }
                    Some(reading)
                }
                Ok(_) => None,
                Err(error) => {
                    warn!(question = key, document = %index.document_id, %error, "question failed");
                    None
                }
            };

            report.outcomes.push(QuestionOutcome {
                key: key.to_string(),
                question: question.to_string(),
                result,
                score,
            });
        }

        if report.was_cancelled() {
            info!(skipped = report.skipped.len(), "batch cancelled");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::models::Document;
    use crate::prompts::prompt_set;
    use crate::score::extract_score;
    use crate::store::IndexStore;
    use crate::test_support::{resume_text, CountingEmbedder, ScriptedModel};
    use std::sync::atomic::AtomicUsize;
    use tempfile::{tempdir, TempDir};

    const JOB_DESCRIPTION: &str = "Senior Platform Engineer: Rust, Kubernetes, PostgreSQL.";

    async fn resume_index(
        embedder: Arc<CountingEmbedder>,
    ) -> Result<(TempDir, VectorIndex), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path(), embedder, &RagConfig::default());
        let index = store
            .get_or_build(&Document::new("jane.pdf", resume_text(3_000)))
            .await?;
        Ok((dir, index))
    }

    #[tokio::test]
    async fn grounded_answer_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(CountingEmbedder::default());
        let (_dir, index) = resume_index(embedder.clone()).await?;
        assert_eq!(index.len(), 3);

        let model = Arc::new(ScriptedModel::answering("82"));
        let composer = AnswerComposer::new(embedder, model.clone(), &RagConfig::default());
        let answer = composer
            .answer(
                &index,
                JOB_DESCRIPTION,
                "What programming languages does the candidate know?",
            )
            .await?;

        assert_eq!(answer.sources.len(), 3);
        assert!(!answer.text.is_empty());
        assert_eq!(extract_score(&answer.text), 82);

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        let (system, prompt) = &prompts[0];
        assert_eq!(system, RECRUITER_SYSTEM_PROMPT);
        assert!(prompt.contains(JOB_DESCRIPTION));
        assert!(prompt.contains("What programming languages does the candidate know?"));
        assert!(prompt.contains(&answer.sources.hits[0].chunk.text));
        Ok(())
    }

    #[tokio::test]
    async fn full_batch_reports_every_question_and_the_score() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(CountingEmbedder::default());
        let (_dir, index) = resume_index(embedder.clone()).await?;
        let model = Arc::new(ScriptedModel::new(|prompt| {
            if prompt.contains("Just the number") {
                Ok("82".to_string())
            } else {
                Ok("Strong Rust background.".to_string())
            }
        }));
        let composer = AnswerComposer::new(embedder, model, &RagConfig::default());
        let questions = prompt_set("v2").expect("v2 exists");

        let report = composer
            .answer_all(&index, JOB_DESCRIPTION, &questions, &AtomicBool::new(false))
            .await;

        assert_eq!(report.outcomes.len(), 9);
        assert!(!report.was_cancelled());
        assert_eq!(report.failures().count(), 0);
        assert_eq!(
            report.score(),
            Some(ScoreReading {
                value: 82,
                reliable: true
            })
        );
        assert!(report
            .outcomes
            .iter()
            .filter(|outcome| outcome.key != SCORE_QUESTION_KEY)
            .all(|outcome| outcome.score.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn one_failed_question_does_not_stop_the_batch() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(CountingEmbedder::default());
        let (_dir, index) = resume_index(embedder.clone()).await?;
        let model = Arc::new(ScriptedModel::new(|prompt| {
            if prompt.contains("Red Flags") {
                Err(GenerationError::Fatal("400 context length exceeded".to_string()))
            } else {
                Ok("fine".to_string())
            }
        }));
        let composer = AnswerComposer::new(embedder, model.clone(), &RagConfig::default());
        let questions = prompt_set("v2").expect("v2 exists");

        let report = composer
            .answer_all(&index, JOB_DESCRIPTION, &questions, &AtomicBool::new(false))
            .await;

        assert_eq!(report.outcomes.len(), 9);
        assert_eq!(model.prompts().len(), 9);
        let failed: Vec<&str> = report.failures().map(|outcome| outcome.key.as_str()).collect();
        assert_eq!(failed, vec!["q6"]);
        assert!(matches!(
            report.outcome("q6").map(|outcome| &outcome.result),
            Some(Err(AnswerError::Generation(GenerationError::Fatal(_))))
        ));
        assert_eq!(report.outcome("q7").and_then(QuestionOutcome::answer_text), Some("fine"));
        Ok(())
    }

    #[tokio::test]
    async fn unparseable_scores_are_flagged() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(CountingEmbedder::default());
        let (_dir, index) = resume_index(embedder.clone()).await?;
        let model = Arc::new(ScriptedModel::answering("Not mentioned in resume"));
        let composer = AnswerComposer::new(embedder, model, &RagConfig::default());
        let questions = prompt_set("v1").expect("v1 exists");

        let report = composer
            .answer_all(&index, JOB_DESCRIPTION, &questions, &AtomicBool::new(false))
            .await;

        assert_eq!(
            report.score(),
            Some(ScoreReading {
                value: 0,
                reliable: false
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn questions_do_not_see_earlier_answers() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(CountingEmbedder::default());
        let (_dir, index) = resume_index(embedder.clone()).await?;
        let counter = Arc::new(AtomicUsize::new(0));
        let replies = counter.clone();
        let model = Arc::new(ScriptedModel::new(move |_| {
            Ok(format!("ANSWER-{}", replies.fetch_add(1, Ordering::SeqCst)))
        }));
        let composer = AnswerComposer::new(embedder, model.clone(), &RagConfig::default());
        let questions = prompt_set("v2").expect("v2 exists");

        composer
            .answer_all(&index, JOB_DESCRIPTION, &questions, &AtomicBool::new(false))
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 9);
        assert!(model
            .prompts()
            .iter()
            .all(|(_, prompt)| !prompt.contains("ANSWER-")));
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_is_honoured_between_questions() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = Arc::new(CountingEmbedder::default());
        let (_dir, index) = resume_index(embedder.clone()).await?;
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let model = Arc::new(ScriptedModel::new(move |prompt| {
            if prompt.contains("Fit Decision") {
                flag.store(true, Ordering::Release);
            }
            Ok("done".to_string())
        }));
        let composer = AnswerComposer::new(embedder, model.clone(), &RagConfig::default());
        let questions = prompt_set("v2").expect("v2 exists");

        let report = composer
            .answer_all(&index, JOB_DESCRIPTION, &questions, &cancel)
            .await;

        let answered: Vec<&str> = report.outcomes.iter().map(|outcome| outcome.key.as_str()).collect();
        assert_eq!(answered, vec!["q1", "q2"]);
        assert_eq!(report.outcome("q2").and_then(QuestionOutcome::answer_text), Some("done"));
        assert_eq!(report.skipped.len(), 7);
        assert_eq!(model.prompts().len(), 2);
        assert_eq!(report.score(), None);
        Ok(())
    }

    #[tokio::test]
    async fn retrieval_failures_are_reported_per_question() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, index) = resume_index(Arc::new(CountingEmbedder::default())).await?;
        let broken = Arc::new(CountingEmbedder::failing());
        let model = Arc::new(ScriptedModel::answering("unused"));
        let composer = AnswerComposer::new(broken, model.clone(), &RagConfig::default());
        let questions = prompt_set("v1").expect("v1 exists");

        let report = composer
            .answer_all(&index, JOB_DESCRIPTION, &questions, &AtomicBool::new(false))
            .await;

        assert_eq!(report.outcomes.len(), 9);
        assert!(report
            .outcomes
            .iter()
            .all(|outcome| matches!(outcome.result, Err(AnswerError::Retrieval(_)))));
        assert!(model.prompts().is_empty());
        Ok(())
    }
}
