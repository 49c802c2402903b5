use std::{any::Any, str::FromStr, sync::Arc};

use secrecy::SecretString;
use serde::Serialize;
use thiserror::Error;
use utils::{
    diff::{ERROR_HTML, MATCH_HTML, RenderedDiff, render},
    text::{outputs_match, preview},
};

use crate::services::{
    config::AppConfig,
    generative::{
        ClientProvider, ConfigurationError, GenerationConfig, GenerationError, GenerativeClient,
    },
    upload::{UploadBatch, UploadError, UploadService, UploadedFile},
};

/// How much of an input is quoted in a failure notice.
const NOTICE_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid file type for system message. Only {0} allowed.")]
    InvalidSystemMessageType(String),
    #[error("Please upload at least one input message file.")]
    MissingInputFiles,
    #[error(
        "The number of input files must match the number of expected output files ({inputs} inputs, {expected} expected outputs)."
    )]
    PairCountMismatch { inputs: usize, expected: usize },
    #[error(
        "Invalid file type detected. Only {0} files are allowed for all inputs and expected outputs."
    )]
    InvalidFileType(String),
    #[error("Invalid value for {name} ('{value}'). Please enter numbers.")]
    InvalidParameter { name: &'static str, value: String },
    #[error("Could not read uploaded file: {0}")]
    Upload(UploadError),
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UploadError> for EvaluationError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Io(e) => EvaluationError::Io(e),
            other => EvaluationError::Validation(ValidationError::Upload(other)),
        }
    }
}

/// Failure of a single pair. Never aborts the rest of the batch.
#[derive(Debug, Error)]
pub enum PairError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Comparison failed: {0}")]
    Comparison(String),
}

/// Form submission, as extracted from the multipart body.
#[derive(Debug, Default)]
pub struct EvaluationRequest {
    pub api_key: String,
    pub model: Option<String>,
    pub system_message: Option<UploadedFile>,
    pub input_files: Vec<UploadedFile>,
    pub expected_files: Vec<UploadedFile>,
    pub temperature: Option<String>,
    pub top_p: Option<String>,
    pub top_k: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonPair {
    pub input_text: String,
    pub expected_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultStatus {
    Match,
    Mismatch,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    pub input_text: String,
    pub expected_text: String,
    pub actual_text: String,
    pub status: ResultStatus,
    pub diff: Option<RenderedDiff>,
    pub diff_html: String,
    pub error: Option<String>,
}

impl ResultRecord {
    fn matched(pair: ComparisonPair, actual_text: String) -> Self {
        Self {
            input_text: pair.input_text,
            expected_text: pair.expected_text,
            actual_text,
            status: ResultStatus::Match,
            diff: None,
            diff_html: MATCH_HTML.to_string(),
            error: None,
        }
    }

    fn mismatched(pair: ComparisonPair, actual_text: String, diff: RenderedDiff) -> Self {
        Self {
            input_text: pair.input_text,
            expected_text: pair.expected_text,
            actual_text,
            status: ResultStatus::Mismatch,
            diff_html: diff.to_html(),
            diff: Some(diff),
            error: None,
        }
    }

    fn failed(pair: ComparisonPair, err: &PairError) -> Self {
        Self {
            input_text: pair.input_text,
            expected_text: pair.expected_text,
            actual_text: format!("Error: {err}"),
            status: ResultStatus::Error,
            diff: None,
            diff_html: ERROR_HTML.to_string(),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub errored: usize,
}

impl EvaluationSummary {
    fn from_results(results: &[ResultRecord]) -> Self {
        let count = |status: ResultStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            matched: count(ResultStatus::Match),
            mismatched: count(ResultStatus::Mismatch),
            errored: count(ResultStatus::Error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub model: String,
    pub summary: EvaluationSummary,
    pub results: Vec<ResultRecord>,
    /// User-facing messages about pairs that failed.
    pub notices: Vec<String>,
}

#[derive(Debug)]
pub enum Comparison {
    Match,
    Mismatch(RenderedDiff),
}

/// Decides the status of a generated output and renders the diff on mismatch.
pub fn compare_outputs(expected: &str, actual: &str) -> Result<Comparison, PairError> {
    if outputs_match(expected, actual) {
        return Ok(Comparison::Match);
    }
    std::panic::catch_unwind(|| render(expected, actual))
        .map(Comparison::Mismatch)
        .map_err(|panic| PairError::Comparison(panic_message(panic)))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic while rendering diff".to_string()
    }
}

fn parse_param<T: FromStr>(
    name: &'static str,
    raw: Option<&str>,
    default: T,
) -> Result<T, ValidationError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ValidationError::InvalidParameter {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_finite(
    name: &'static str,
    raw: Option<&str>,
    default: f32,
) -> Result<f32, ValidationError> {
    let value = parse_param(name, raw, default)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::InvalidParameter {
            name,
            value: raw.unwrap_or_default().trim().to_string(),
        })
    }
}

#[derive(Clone)]
pub struct EvaluationService {
    uploads: UploadService,
    provider: Arc<dyn ClientProvider>,
    default_model: String,
    defaults: GenerationConfig,
}

impl EvaluationService {
    pub fn new(config: &AppConfig, provider: Arc<dyn ClientProvider>) -> Result<Self, UploadError> {
        Ok(Self {
            uploads: UploadService::new(config)?,
            provider,
            default_model: config.default_model.clone(),
            defaults: config.generation,
        })
    }

    /// Reads the sampling parameters from the form, using configured defaults
    /// for anything left blank.
    pub fn generation_config(
        &self,
        request: &EvaluationRequest,
    ) -> Result<GenerationConfig, ValidationError> {
        Ok(GenerationConfig {
            temperature: parse_finite(
                "temperature",
                request.temperature.as_deref(),
                self.defaults.temperature,
            )?,
            top_p: parse_finite("top_p", request.top_p.as_deref(), self.defaults.top_p)?,
            top_k: parse_param("top_k", request.top_k.as_deref(), self.defaults.top_k)?,
            max_output_tokens: self.defaults.max_output_tokens,
        })
    }

    /// Validates the submission, then generates and compares every pair in
    /// upload order. Request-level problems abort with an error before any
    /// generation call; per-pair failures become `Error` records.
    pub async fn run(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationReport, EvaluationError> {
        if request.api_key.trim().is_empty() {
            return Err(ConfigurationError::MissingApiKey.into());
        }

        let system_message = match &request.system_message {
            Some(file) if file.is_unselected() => None,
            Some(file) if !self.uploads.is_allowed(&file.file_name) => {
                return Err(
                    ValidationError::InvalidSystemMessageType(self.uploads.allowed_list()).into(),
                );
            }
            other => other.as_ref(),
        };

        let inputs: Vec<&UploadedFile> = request
            .input_files
            .iter()
            .filter(|f| !f.is_unselected())
            .collect();
        let expected: Vec<&UploadedFile> = request
            .expected_files
            .iter()
            .filter(|f| !f.is_unselected())
            .collect();
        if inputs.is_empty() {
            return Err(ValidationError::MissingInputFiles.into());
        }
        if inputs.len() != expected.len() {
            return Err(ValidationError::PairCountMismatch {
                inputs: inputs.len(),
                expected: expected.len(),
            }
            .into());
        }
        if inputs
            .iter()
            .chain(expected.iter())
            .any(|f| !self.uploads.is_allowed(&f.file_name))
        {
            return Err(ValidationError::InvalidFileType(self.uploads.allowed_list()).into());
        }

        let generation = self.generation_config(&request)?;

        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str())
            .to_string();
        let client = self
            .provider
            .client(SecretString::from(request.api_key.clone()), &model)?;

        let mut batch = self.uploads.begin_batch().await?;
        let stored = read_submission(&mut batch, system_message, &inputs, &expected).await;
        batch.cleanup().await;
        let (preamble, pairs) = stored?;

        tracing::info!("Evaluating {} pair(s) with model {}", pairs.len(), model);
        let report = evaluate_pairs(
            client.as_ref(),
            &model,
            preamble.as_deref(),
            pairs,
            &generation,
        )
        .await;
        tracing::info!(
            "Evaluation finished: {} matched, {} mismatched, {} failed",
            report.summary.matched,
            report.summary.mismatched,
            report.summary.errored
        );
        Ok(report)
    }
}

async fn read_submission(
    batch: &mut UploadBatch,
    system_message: Option<&UploadedFile>,
    inputs: &[&UploadedFile],
    expected: &[&UploadedFile],
) -> Result<(Option<String>, Vec<ComparisonPair>), UploadError> {
    // an empty system message means no preamble at all
    let preamble = match system_message {
        Some(file) => Some(batch.store_text(file).await?).filter(|text| !text.is_empty()),
        None => None,
    };

    let mut pairs = Vec::with_capacity(inputs.len());
    for (input, expected) in inputs.iter().zip(expected) {
        pairs.push(ComparisonPair {
            input_text: batch.store_text(input).await?,
            expected_text: batch.store_text(expected).await?,
        });
    }
    Ok((preamble, pairs))
}

async fn evaluate_pair(
    client: &dyn GenerativeClient,
    pair: &ComparisonPair,
    preamble: Option<&str>,
    config: &GenerationConfig,
) -> Result<(String, Comparison), PairError> {
    let actual = client.generate(&pair.input_text, preamble, config).await?;
    let comparison = compare_outputs(&pair.expected_text, &actual)?;
    Ok((actual, comparison))
}

/// Runs the pairs one after another against `client`.
pub async fn evaluate_pairs(
    client: &dyn GenerativeClient,
    model: &str,
    preamble: Option<&str>,
    pairs: Vec<ComparisonPair>,
    config: &GenerationConfig,
) -> EvaluationReport {
    let mut results = Vec::with_capacity(pairs.len());
    let mut notices = Vec::new();

    for (index, pair) in pairs.into_iter().enumerate() {
        let record = match evaluate_pair(client, &pair, preamble, config).await {
            Ok((actual, Comparison::Match)) => ResultRecord::matched(pair, actual),
            Ok((actual, Comparison::Mismatch(diff))) => {
                tracing::debug!("Pair {} does not match expected output", index + 1);
                ResultRecord::mismatched(pair, actual, diff)
            }
            Err(e) => {
                tracing::warn!("Pair {} failed: {}", index + 1, e);
                notices.push(format!(
                    "Error processing input: '{}...' - {}",
                    preview(&pair.input_text, NOTICE_PREVIEW_CHARS),
                    e
                ));
                ResultRecord::failed(pair, &e)
            }
        };
        results.push(record);
    }

    EvaluationReport {
        model: model.to_string(),
        summary: EvaluationSummary::from_results(&results),
        results,
        notices,
    }
}
