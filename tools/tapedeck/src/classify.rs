use crate::config::VerifyConfig;
use crate::runtime::{ProcessRequest, ProcessRunner};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    OkUncertain,
    Incomplete,
    Unknown,
    Error,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::OkUncertain => "OK?",
            Verdict::Incomplete => "INCOMPLETE",
            Verdict::Unknown => "UNKNOWN",
            Verdict::Error => "ERROR",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Verdict::Ok => "✓",
            Verdict::OkUncertain => "~",
            Verdict::Incomplete => "✗",
            Verdict::Unknown | Verdict::Error => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub reason: String,
}

/// Maps a recognized last frame to a verdict. Total over its input: every
/// branch lands on a verdict, and failure patterns always take precedence
/// over success patterns, first match wins within each list.
pub fn classify(
    extracted: bool,
    text: &str,
    failure_patterns: &[String],
    success_patterns: &[String],
) -> Classification {
    if !extracted {
        return Classification {
            verdict: Verdict::Error,
            reason: "could not extract last frame".to_string(),
        };
    }

    let text = text.to_lowercase();
    if text.trim().is_empty() {
        return Classification {
            verdict: Verdict::Unknown,
            reason: "recognizer returned no text".to_string(),
        };
    }

    // Patterns come from config and may carry any casing; containment is
    // case-insensitive on both sides.
    for pattern in failure_patterns {
        if text.contains(pattern.to_lowercase().as_str()) {
            return Classification {
                verdict: Verdict::Incomplete,
                reason: format!("found: \"{pattern}\""),
            };
        }
    }

    if success_patterns
        .iter()
        .any(|pattern| text.contains(pattern.to_lowercase().as_str()))
    {
        return Classification {
            verdict: Verdict::Ok,
            reason: "response completed".to_string(),
        };
    }

    // Optimistic default: imperfect recognizer output should not flag a
    // healthy artifact.
    Classification {
        verdict: Verdict::OkUncertain,
        reason: "has text, no failure patterns detected".to_string(),
    }
}

/// Text recognition over a still image. The recognizer runs from the still's
/// directory and a failed invocation degrades to empty text rather than an
/// error, which classification then reports as `UNKNOWN`.
pub struct OcrClient<'a> {
    runner: &'a dyn ProcessRunner,
    program: String,
    timeout: Duration,
}

impl<'a> OcrClient<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, cfg: &VerifyConfig) -> Self {
        Self {
            runner,
            program: cfg.ocr.clone(),
            timeout: Duration::from_secs(cfg.ocr_timeout_seconds),
        }
    }

    pub fn recognize(&self, still: &Path) -> String {
        let file = still
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| still.display().to_string());
        let mut request =
            ProcessRequest::new(self.program.clone(), vec![file, "stdout".to_string()]);
        request.cwd = still.parent().map(|dir| dir.to_path_buf());

        match self.runner.run_with_timeout(request, self.timeout) {
            Ok(out) if out.exit_code == 0 => out.stdout,
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, OcrClient, Verdict};
    use crate::config::AppConfig;
    use crate::runtime::FakeProcessRunner;
    use std::path::{Path, PathBuf};

    fn patterns() -> (Vec<String>, Vec<String>) {
        let cfg = AppConfig::default();
        (cfg.verify.failure_patterns, cfg.verify.success_patterns)
    }

    #[test]
    fn extraction_failure_is_an_error_verdict() {
        let (failure, success) = patterns();
        let result = classify(false, "", &failure, &success);
        assert_eq!(result.verdict, Verdict::Error);
        assert_eq!(result.reason, "could not extract last frame");
    }

    #[test]
    fn empty_text_is_unknown() {
        let (failure, success) = patterns();
        assert_eq!(classify(true, "", &failure, &success).verdict, Verdict::Unknown);
        assert_eq!(
            classify(true, "  \n\t ", &failure, &success).verdict,
            Verdict::Unknown
        );
    }

    #[test]
    fn cancelled_session_is_incomplete() {
        let (failure, success) = patterns();
        let result = classify(true, "Operation Cancelled By User", &failure, &success);
        assert_eq!(result.verdict, Verdict::Incomplete);
        assert!(result.reason.contains("operation cancelled by user"));
    }

    #[test]
    fn prompt_banner_is_ok() {
        let (failure, success) = patterns();
        let result = classify(true, "done!\nType @ to mention files", &failure, &success);
        assert_eq!(result.verdict, Verdict::Ok);
    }

    #[test]
    fn failure_patterns_beat_success_patterns_in_the_same_frame() {
        let (failure, success) = patterns();
        let text = "type @ to mention files\noperation cancelled by user";
        let result = classify(true, text, &failure, &success);
        assert_eq!(result.verdict, Verdict::Incomplete);
    }

    #[test]
    fn first_matching_failure_pattern_wins() {
        let (failure, success) = patterns();
        let text = "ctrl+c again to exit\noperation cancelled by user";
        let result = classify(true, text, &failure, &success);
        assert!(result.reason.contains("operation cancelled by user"));
    }

    #[test]
    fn mixed_case_configured_patterns_still_match() {
        let failure = vec!["Operation Cancelled By User".to_string()];
        let success = vec!["Remaining Requests".to_string()];

        let result = classify(true, "operation cancelled by user", &failure, &success);
        assert_eq!(result.verdict, Verdict::Incomplete);
        assert!(result.reason.contains("Operation Cancelled By User"));

        let result = classify(true, "you have 12 remaining requests", &failure, &success);
        assert_eq!(result.verdict, Verdict::Ok);
    }

    #[test]
    fn unmatched_text_defaults_to_uncertain_ok() {
        let (failure, success) = patterns();
        let result = classify(true, "some terminal scrollback", &failure, &success);
        assert_eq!(result.verdict, Verdict::OkUncertain);
        assert_eq!(result.reason, "has text, no failure patterns detected");
    }

    #[test]
    fn recognizer_runs_from_the_still_directory() {
        let runner = FakeProcessRunner::default();
        runner.push_success("hello world\n");
        let cfg = AppConfig::default();
        let ocr = OcrClient::new(&runner, &cfg.verify);

        let text = ocr.recognize(Path::new("/tmp/frames/01-demo.png"));
        assert_eq!(text, "hello world\n");

        let request = &runner.requests()[0];
        assert_eq!(request.program, "tesseract");
        assert_eq!(request.args, vec!["01-demo.png".to_string(), "stdout".to_string()]);
        assert_eq!(request.cwd, Some(PathBuf::from("/tmp/frames")));
    }

    #[test]
    fn recognizer_failure_degrades_to_empty_text() {
        let runner = FakeProcessRunner::default();
        runner.push_failure(1, "cannot open image");
        let cfg = AppConfig::default();
        let ocr = OcrClient::new(&runner, &cfg.verify);
        assert_eq!(ocr.recognize(Path::new("/tmp/frames/01-demo.png")), "");
    }
}
