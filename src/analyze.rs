use std::fmt;
use std::io::Write;

use clustercap_core::{ArchiveError, Reader, Tag};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{AnalyzeConfig, CHECKS};

/// Example cap applied when the user asks for all of them.
const UNLIMITED_EXAMPLES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckStatus {
    Pass,
    SomeIssues,
}

impl CheckStatus {
    pub(crate) fn badge(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::SomeIssues => "WARN",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.badge())
    }
}

#[derive(Debug, Error)]
#[error("check '{check}' error: {source}")]
pub(crate) struct CheckError {
    pub(crate) check: &'static str,
    #[source]
    pub(crate) source: ArchiveError,
}

/// Bounded list of issue examples; overflow is only counted.
#[derive(Debug, Clone, Default)]
pub(crate) struct Examples {
    examples: Vec<String>,
    limit: usize,
    dropped: usize,
}

impl Examples {
    pub(crate) fn new(limit: usize) -> Self {
        let limit = if limit == 0 { UNLIMITED_EXAMPLES } else { limit };
        Self {
            examples: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    pub(crate) fn add(&mut self, example: impl Into<String>) {
        if self.examples.len() < self.limit {
            self.examples.push(example.into());
        } else {
            self.dropped += 1;
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.examples.len() + self.dropped
    }

    pub(crate) fn shown(&self) -> &[String] {
        &self.examples
    }

    pub(crate) fn dropped(&self) -> usize {
        self.dropped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NoteKind {
    Issue,
    Info,
    Warning,
    Debug,
}

impl NoteKind {
    fn prefix(self) -> &'static str {
        match self {
            NoteKind::Issue => "!!",
            NoteKind::Info => "i ",
            NoteKind::Warning => "? ",
            NoteKind::Debug => "..",
        }
    }
}

/// State handed to a single check: the archive, thresholds, and the
/// messages and examples the check produces.
pub(crate) struct CheckRun<'a> {
    pub(crate) reader: &'a Reader,
    pub(crate) config: &'a AnalyzeConfig,
    pub(crate) examples: Examples,
    notes: Vec<(NoteKind, String)>,
    very_verbose: bool,
}

impl<'a> CheckRun<'a> {
    pub(crate) fn new(
        reader: &'a Reader,
        config: &'a AnalyzeConfig,
        examples_limit: usize,
        very_verbose: bool,
    ) -> Self {
        Self {
            reader,
            config,
            examples: Examples::new(examples_limit),
            notes: Vec::new(),
            very_verbose,
        }
    }

    /// A problem in the captured system.
    pub(crate) fn issue(&mut self, message: impl Into<String>) {
        self.notes.push((NoteKind::Issue, message.into()));
    }

    pub(crate) fn info(&mut self, message: impl Into<String>) {
        self.notes.push((NoteKind::Info, message.into()));
    }

    /// A problem running the check itself, such as a missing artifact.
    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.notes.push((NoteKind::Warning, message));
    }

    pub(crate) fn debug(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        if self.very_verbose {
            self.notes.push((NoteKind::Debug, message));
        }
    }

    pub(crate) fn notes(&self) -> &[(NoteKind, String)] {
        &self.notes
    }

    /// Loads the single artifact matching `query`. A missing artifact is
    /// reported with `missing` and yields `None`; any other failure is returned.
    pub(crate) fn load_or_warn<T: DeserializeOwned>(
        &mut self,
        query: &[Tag],
        missing: impl FnOnce() -> String,
    ) -> Result<Option<T>, ArchiveError> {
        match self.reader.load(query) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_no_matches() => {
                self.warning(missing());
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Closes out a check: `SomeIssues` with the examples when any were
    /// collected, `Pass` otherwise.
    pub(crate) fn finish(&mut self, issue: impl Into<String>) -> CheckStatus {
        if self.examples.count() > 0 {
            self.issue(issue);
            CheckStatus::SomeIssues
        } else {
            CheckStatus::Pass
        }
    }
}

pub(crate) type CheckFn = fn(&mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError>;

pub(crate) struct Check {
    pub(crate) name: &'static str,
    pub(crate) run: CheckFn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckOutcome {
    pub(crate) name: &'static str,
    pub(crate) status: CheckStatus,
    pub(crate) issues: usize,
}

pub(crate) struct Analyzer<'a> {
    reader: &'a Reader,
    config: &'a AnalyzeConfig,
    examples_limit: usize,
    very_verbose: bool,
}

impl<'a> Analyzer<'a> {
    pub(crate) fn new(reader: &'a Reader, config: &'a AnalyzeConfig) -> Self {
        Self {
            reader,
            config,
            examples_limit: 5,
            very_verbose: false,
        }
    }

    /// Zero lifts the cap.
    pub(crate) fn examples_limit(mut self, limit: usize) -> Self {
        self.examples_limit = limit;
        self
    }

    pub(crate) fn very_verbose(mut self, very_verbose: bool) -> Self {
        self.very_verbose = very_verbose;
        self
    }

    pub(crate) fn run_check(&self, check: &Check) -> Result<(CheckStatus, CheckRun<'a>), CheckError> {
        let mut run = CheckRun::new(self.reader, self.config, self.examples_limit, self.very_verbose);
        run.debug(format!("Running check: {}", check.name));
        let status = (check.run)(&mut run).map_err(|source| CheckError {
            check: check.name,
            source,
        })?;
        Ok((status, run))
    }

    /// Runs every check in order, writing the report to `out`. The first
    /// check error aborts the run.
    pub(crate) fn run(&self, out: &mut impl Write) -> Result<Vec<CheckOutcome>, Box<dyn std::error::Error>> {
        let mut outcomes = Vec::with_capacity(CHECKS.len());
        for check in &CHECKS {
            writeln!(out, "\n--")?;
            let (status, run) = self.run_check(check)?;
            write_run(out, &run)?;
            writeln!(out, "{} - {}\n--", status.badge(), check.name)?;
            outcomes.push(CheckOutcome {
                name: check.name,
                status,
                issues: run.examples.count(),
            });
        }
        Ok(outcomes)
    }
}

fn write_run(out: &mut impl Write, run: &CheckRun<'_>) -> std::io::Result<()> {
    for (kind, message) in run.notes() {
        writeln!(out, "{} {message}", kind.prefix())?;
    }
    let examples = &run.examples;
    if examples.count() > 0 {
        for example in examples.shown() {
            writeln!(out, "   - {example}")?;
        }
        if examples.dropped() > 0 {
            writeln!(out, "   - ...{} more...", examples.dropped())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn examples_are_capped_and_counted() {
        let mut examples = Examples::new(2);
        for n in 0..5 {
            examples.add(format!("example {n}"));
        }
        assert_eq!(examples.shown(), ["example 0", "example 1"]);
        assert_eq!(examples.dropped(), 3);
        assert_eq!(examples.count(), 5);
    }

    #[test]
    fn zero_limit_means_all() {
        let mut examples = Examples::new(0);
        for n in 0..100 {
            examples.add(n.to_string());
        }
        assert_eq!(examples.shown().len(), 100);
        assert_eq!(examples.dropped(), 0);
    }

    #[test]
    fn finish_warns_only_when_examples_were_collected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.zip");
        clustercap_core::Writer::create(&path).unwrap().close().unwrap();
        let reader = Reader::open(&path).unwrap();
        let config = AnalyzeConfig::default();

        let mut run = CheckRun::new(&reader, &config, 5, false);
        assert_eq!(run.finish("nothing wrong"), CheckStatus::Pass);
        assert!(run.notes().is_empty());

        run.examples.add("server s1");
        assert_eq!(run.finish("1 server affected"), CheckStatus::SomeIssues);
        assert_eq!(run.notes(), [(NoteKind::Issue, "1 server affected".to_string())]);
    }

    #[test]
    fn badges() {
        assert_eq!(CheckStatus::Pass.to_string(), "PASS");
        assert_eq!(CheckStatus::SomeIssues.badge(), "WARN");
    }
}
