use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use services::services::{
    config::AppConfig,
    evaluation::{EvaluationError, EvaluationRequest, EvaluationService, ResultStatus, ValidationError},
    generative::{
        ClientProvider, ConfigurationError, GenerationConfig, GenerationError, GenerativeClient,
    },
    upload::UploadedFile,
};
use tempfile::TempDir;
use utils::diff::{DiffLineKind, ERROR_HTML, MATCH_HTML};

#[derive(Debug, Clone)]
struct Call {
    prompt: String,
    preamble: Option<String>,
    config: GenerationConfig,
}

/// Echoes prompts minus their `echo ` prefix; prompts starting with `fail` error out.
#[derive(Default)]
struct ScriptedProvider {
    calls: Arc<Mutex<Vec<Call>>>,
    clients_built: AtomicUsize,
    models: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

struct ScriptedClient {
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl GenerativeClient for ScriptedClient {
    async fn generate(
        &self,
        prompt: &str,
        preamble: Option<&str>,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(Call {
            prompt: prompt.to_string(),
            preamble: preamble.map(str::to_string),
            config: *config,
        });
        if prompt.starts_with("fail") {
            return Err(GenerationError::Api {
                status: 503,
                message: "model overloaded".to_string(),
            });
        }
        Ok(prompt.replace("echo ", ""))
    }
}

impl ClientProvider for ScriptedProvider {
    fn client(
        &self,
        api_key: SecretString,
        model: &str,
    ) -> Result<Box<dyn GenerativeClient>, ConfigurationError> {
        if api_key.expose_secret() == "bad-key" {
            return Err(ConfigurationError::Client("API key not valid".to_string()));
        }
        self.clients_built.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(model.to_string());
        Ok(Box::new(ScriptedClient {
            calls: self.calls.clone(),
        }))
    }
}

fn setup() -> (TempDir, Arc<ScriptedProvider>, EvaluationService) {
    let dir = TempDir::new().unwrap();
    let config = AppConfig {
        upload_dir: dir.path().join("uploads"),
        ..AppConfig::default()
    };
    let provider = Arc::new(ScriptedProvider::default());
    let service = EvaluationService::new(&config, provider.clone()).unwrap();
    (dir, provider, service)
}

fn txt(name: &str, content: &str) -> UploadedFile {
    UploadedFile::new(name.to_string(), content.as_bytes().to_vec())
}

fn request(pairs: &[(&str, &str)]) -> EvaluationRequest {
    EvaluationRequest {
        api_key: "test-key".to_string(),
        input_files: pairs
            .iter()
            .enumerate()
            .map(|(i, (input, _))| txt(&format!("input{i}.txt"), input))
            .collect(),
        expected_files: pairs
            .iter()
            .enumerate()
            .map(|(i, (_, expected))| txt(&format!("expected{i}.txt"), expected))
            .collect(),
        ..EvaluationRequest::default()
    }
}

#[tokio::test]
async fn matching_and_mismatching_pairs_keep_upload_order() {
    let (dir, provider, service) = setup();
    let report = service
        .run(request(&[
            ("echo line1\nline2\n", "line1\nline2\n"),
            ("echo foo\nbaz\n", "foo\nbar\n"),
            ("echo  hi\n", "hi"),
        ]))
        .await
        .unwrap();

    let statuses: Vec<_> = report.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![ResultStatus::Match, ResultStatus::Mismatch, ResultStatus::Match]
    );
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.matched, 2);
    assert!(report.notices.is_empty());
    assert_eq!(report.model, AppConfig::default().default_model);

    let matched = &report.results[0];
    assert_eq!(matched.diff_html, MATCH_HTML);
    assert!(matched.diff.is_none());

    let mismatch = &report.results[1];
    assert_eq!(mismatch.expected_text, "foo\nbar\n");
    assert_eq!(mismatch.actual_text, "foo\nbaz\n");
    let diff = mismatch.diff.as_ref().unwrap();
    let lines: Vec<_> = diff
        .lines
        .iter()
        .filter(|l| l.kind != DiffLineKind::Hint)
        .map(|l| (l.kind, l.content.as_str()))
        .collect();
    assert_eq!(
        lines,
        vec![
            (DiffLineKind::Unchanged, "foo\n"),
            (DiffLineKind::Removed, "bar\n"),
            (DiffLineKind::Added, "baz\n"),
        ]
    );
    assert!(mismatch.diff_html.starts_with("<pre>"));

    assert_eq!(provider.calls().len(), 3);
    assert_eq!(provider.calls()[0].config, GenerationConfig::default());

    // scratch files are removed once the texts are read
    let leftovers = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn generation_failure_marks_only_that_pair() {
    let (_dir, provider, service) = setup();
    let report = service
        .run(request(&[
            ("fail please", "anything"),
            ("echo ok", "ok"),
        ]))
        .await
        .unwrap();

    assert_eq!(report.results[0].status, ResultStatus::Error);
    assert_eq!(report.results[0].diff_html, ERROR_HTML);
    assert_eq!(
        report.results[0].actual_text,
        "Error: API returned 503: model overloaded"
    );
    assert_eq!(report.results[1].status, ResultStatus::Match);
    assert_eq!(
        report.notices,
        vec!["Error processing input: 'fail please...' - API returned 503: model overloaded".to_string()]
    );
    assert_eq!(provider.calls().len(), 2);
}

#[tokio::test]
async fn pair_count_mismatch_makes_no_generation_calls() {
    let (_dir, provider, service) = setup();
    let mut req = request(&[("a", "a"), ("b", "b")]);
    req.input_files.push(txt("input2.txt", "c"));

    let err = service.run(req).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Validation(ValidationError::PairCountMismatch {
            inputs: 3,
            expected: 2
        })
    ));
    assert!(provider.calls().is_empty());
    assert_eq!(provider.clients_built.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_api_key_is_a_configuration_error() {
    let (dir, provider, service) = setup();
    let mut req = request(&[("a", "a")]);
    req.api_key = "   ".to_string();

    let err = service.run(req).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Configuration(ConfigurationError::MissingApiKey)
    ));
    assert_eq!(provider.clients_built.load(Ordering::SeqCst), 0);
    let written = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
    assert_eq!(written, 0);
}

#[tokio::test]
async fn rejected_api_key_aborts_the_request() {
    let (_dir, provider, service) = setup();
    let mut req = request(&[("a", "a")]);
    req.api_key = "bad-key".to_string();

    let err = service.run(req).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Configuration(ConfigurationError::Client(_))
    ));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn request_level_validation() {
    let (_dir, provider, service) = setup();

    let err = service.run(request(&[])).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Validation(ValidationError::MissingInputFiles)
    ));

    // an unselected file input arrives as a nameless part
    let mut req = request(&[]);
    req.input_files.push(UploadedFile::new("", Vec::<u8>::new()));
    req.expected_files.push(UploadedFile::new("", Vec::<u8>::new()));
    let err = service.run(req).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Validation(ValidationError::MissingInputFiles)
    ));

    let mut req = request(&[("a", "a")]);
    req.expected_files[0] = txt("expected.md", "a");
    let err = service.run(req).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Validation(ValidationError::InvalidFileType(_))
    ));

    let mut req = request(&[("a", "a")]);
    req.system_message = Some(txt("system.json", "{}"));
    let err = service.run(req).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Validation(ValidationError::InvalidSystemMessageType(_))
    ));

    let mut req = request(&[("a", "a")]);
    req.temperature = Some("warm".to_string());
    let err = service.run(req).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Validation(ValidationError::InvalidParameter {
            name: "temperature",
            ..
        })
    ));

    let mut req = request(&[("a", "a")]);
    req.input_files[0] = UploadedFile::new("input.txt", vec![0xc3u8, 0x28]);
    let err = service.run(req).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Validation(ValidationError::Upload(_))
    ));

    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn system_message_and_parameters_reach_the_client() {
    let (_dir, provider, service) = setup();
    let mut req = request(&[("echo x", "x")]);
    req.system_message = Some(txt("system.txt", "Answer tersely."));
    req.model = Some("gemini-2.5-flash".to_string());
    req.temperature = Some("0.7".to_string());
    req.top_p = Some("0.5".to_string());
    req.top_k = Some("12".to_string());

    let report = service.run(req).await.unwrap();
    assert_eq!(report.model, "gemini-2.5-flash");

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].prompt, "echo x");
    assert_eq!(calls[0].preamble.as_deref(), Some("Answer tersely."));
    assert_eq!(
        calls[0].config,
        GenerationConfig {
            temperature: 0.7,
            top_p: 0.5,
            top_k: 12,
            max_output_tokens: 8192,
        }
    );
    assert_eq!(
        provider.models.lock().unwrap().clone(),
        vec!["gemini-2.5-flash".to_string()]
    );
}

#[tokio::test]
async fn unselected_system_message_is_ignored() {
    let (_dir, provider, service) = setup();
    let mut req = request(&[("echo x", "x")]);
    req.system_message = Some(UploadedFile::new("", Vec::<u8>::new()));

    service.run(req).await.unwrap();
    assert_eq!(provider.calls()[0].preamble, None);
}

#[tokio::test]
async fn empty_system_message_sends_no_preamble() {
    let (_dir, provider, service) = setup();
    let mut req = request(&[("echo x", "x"), ("echo y", "y")]);
    req.system_message = Some(txt("system.txt", ""));

    let report = service.run(req).await.unwrap();
    assert_eq!(report.summary.matched, 2);
    assert!(provider.calls().iter().all(|call| call.preamble.is_none()));
}
