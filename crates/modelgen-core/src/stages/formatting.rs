//! Batch source formatting with per-file fallback.
//!
//! Write requests are copied into a scratch directory inside the frontend
//! root, formatted there and read back. The originals are only replaced by
//! content the formatter accepted. The scratch directory is removed when the
//! stage returns, on success and on failure.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use walkdir::WalkDir;

use crate::artifacts::WriteRequest;
use crate::context::{keys, GenerationContext, MetadataValue, StageExecution};
use crate::diagnostic::{GeneratorError, Result};
use crate::report::FileStatus;

use super::{priority, Stage, StageEnv};

/// Directories searched, in order, for the frontend manifest.
pub const FRONTEND_CANDIDATES: &[&str] = &[".", "frontend", "client", "web"];

/// Manifest file that marks a frontend root.
pub const MANIFEST: &str = "package.json";

/// Extensions the formatter is run over. Anything else passes through.
pub const FORMATTABLE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "svelte"];

/// Estimated in-memory overhead of the formatter per source byte.
pub const MEMORY_MULTIPLIER: u64 = 8;

/// Counters for one formatting pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormattingReport {
    /// Files the formatter accepted.
    pub processed: usize,
    /// Files that failed individual formatting.
    pub errors: usize,
    pub batch_operations: usize,
    /// Batches that failed and were retried file by file.
    pub individual_fallbacks: usize,
    pub individual_operations: usize,
    pub elapsed: Duration,
    pub estimated_memory_bytes: u64,
    pub skipped: bool,
    /// Paths a dry run would have formatted, relative to the output directory.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub would_format: Vec<PathBuf>,
}

impl FormattingReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    /// Sums counters across runs. The merged report is skipped only if both were.
    pub fn merge(&mut self, other: &FormattingReport) {
        let was_empty = *self == Self::default();
        self.processed += other.processed;
        self.errors += other.errors;
        self.batch_operations += other.batch_operations;
        self.individual_fallbacks += other.individual_fallbacks;
        self.individual_operations += other.individual_operations;
        self.elapsed += other.elapsed;
        self.estimated_memory_bytes = self.estimated_memory_bytes.max(other.estimated_memory_bytes);
        self.skipped = if was_empty { other.skipped } else { self.skipped && other.skipped };
        for path in &other.would_format {
            if !self.would_format.contains(path) {
                self.would_format.push(path.clone());
            }
        }
    }
}

/// Runs the external formatter. `working_dir` is the frontend root so the
/// project's own formatter config applies.
pub trait FormatterRunner {
    fn format_batch(&self, working_dir: &Path, files: &[PathBuf]) -> Result<()>;

    fn format_file(&self, working_dir: &Path, file: &Path) -> Result<()> {
        self.format_batch(working_dir, &[file.to_path_buf()])
    }
}

/// Invokes `npx prettier --write --config-precedence prefer-file`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettierRunner;

impl FormatterRunner for PrettierRunner {
    fn format_batch(&self, working_dir: &Path, files: &[PathBuf]) -> Result<()> {
        let output = Command::new("npx")
            .args(["prettier", "--write", "--config-precedence", "prefer-file"])
            .args(files)
            .current_dir(working_dir)
            .output()
            .map_err(|e| GeneratorError::Formatting {
                message: format!("failed to spawn prettier: {}", e),
            })?;

        if !output.status.success() {
            return Err(GeneratorError::Formatting {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Finds the first candidate directory under `project_root` holding a manifest.
pub fn detect_frontend_root(project_root: &Path) -> Result<PathBuf> {
    let searched: Vec<PathBuf> = FRONTEND_CANDIDATES.iter().map(|c| project_root.join(c)).collect();
    match searched.iter().position(|dir| dir.join(MANIFEST).is_file()) {
        Some(found) => Ok(searched[found].clone()),
        None => Err(GeneratorError::FrontendRootNotFound { searched }),
    }
}

/// Confirms prettier is declared in `dependencies` or `devDependencies`.
pub fn ensure_prettier(frontend_root: &Path) -> Result<()> {
    let manifest = frontend_root.join(MANIFEST);
    let content = fs::read_to_string(&manifest).map_err(|e| GeneratorError::io(&manifest, e.to_string()))?;
    let parsed: serde_json::Value = serde_json::from_str(&content).map_err(|e| GeneratorError::Formatting {
        message: format!("{}: {}", manifest.display(), e),
    })?;

    let declared = ["dependencies", "devDependencies"]
        .iter()
        .any(|section| parsed.get(section).and_then(|deps| deps.get("prettier")).is_some());
    if declared {
        Ok(())
    } else {
        Err(GeneratorError::PrettierNotFound { manifest })
    }
}

pub fn is_formattable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| FORMATTABLE_EXTENSIONS.contains(&ext))
}

pub fn estimate_memory(bytes: u64) -> u64 {
    bytes.saturating_mul(MEMORY_MULTIPLIER)
}

/// Splits requests into batches bounded by file count and estimated memory.
/// A single oversized file still gets a batch of its own.
pub fn plan_batches<'a>(
    requests: &[&'a WriteRequest],
    max_files: usize,
    max_memory_mb: usize,
) -> Vec<Vec<&'a WriteRequest>> {
    let memory_limit = (max_memory_mb as u64).saturating_mul(1024 * 1024);
    let max_files = max_files.max(1);

    let mut batches = Vec::new();
    let mut current: Vec<&'a WriteRequest> = Vec::new();
    let mut current_bytes = 0u64;

    for &request in requests {
        let bytes = request.content.len() as u64;
        let over_count = current.len() >= max_files;
        let over_memory = estimate_memory(current_bytes + bytes) > memory_limit;
        if !current.is_empty() && (over_count || over_memory) {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(request);
        current_bytes += bytes;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

pub struct FormattingStage {
    runner: Rc<dyn FormatterRunner>,
}

impl FormattingStage {
    pub fn new(runner: Rc<dyn FormatterRunner>) -> Self {
        Self { runner }
    }

    fn skip(
        &self,
        context: &GenerationContext,
        requests: &[WriteRequest],
        env: &StageEnv<'_>,
    ) -> Result<GenerationContext> {
        for request in requests.iter().filter(|r| is_formattable(&r.path)) {
            env.reporter
                .file_status(FileStatus::Skip, &context.options().output_dir.join(&request.path));
        }
        Ok(context
            .with_metadata(keys::FORMATTING, MetadataValue::Formatting(Arc::new(FormattingReport::skipped())))?
            .with_execution(StageExecution::new(self.name(), env.clock.now()).with_counter("skipped", 1)))
    }

    /// Dry run: touches nothing and lists the planned paths the formatter
    /// would have been run over.
    fn dry_run(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext> {
        let options = context.options();
        let would_format: Vec<PathBuf> = if options.skip_formatter {
            Vec::new()
        } else {
            context
                .json(keys::PLANNED_PATHS)
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
                .filter_map(|p| p.as_str())
                .map(PathBuf::from)
                .filter(|p| is_formattable(p))
                .collect()
        };

        for path in &would_format {
            env.reporter
                .file_status(FileStatus::WouldFormat, &options.output_dir.join(path));
        }

        let count = would_format.len() as u64;
        let report = FormattingReport {
            would_format,
            ..FormattingReport::skipped()
        };
        Ok(context
            .with_metadata(keys::FORMATTING, MetadataValue::Formatting(Arc::new(report)))?
            .with_execution(StageExecution::new(self.name(), env.clock.now()).with_counter("would_format", count)))
    }

    /// Formats one batch in `scratch`, falling back to per-file runs when the
    /// batch invocation fails. Returns the relative paths that were accepted.
    fn format_batch(
        &self,
        frontend_root: &Path,
        scratch: &Path,
        batch: &[&WriteRequest],
        report: &mut FormattingReport,
    ) -> Result<Vec<PathBuf>> {
        let mut staged = Vec::with_capacity(batch.len());
        for request in batch {
            let target = scratch.join(&request.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| GeneratorError::io(parent, e.to_string()))?;
            }
            fs::write(&target, &request.content).map_err(|e| GeneratorError::io(&target, e.to_string()))?;
            staged.push(target);
        }

        report.batch_operations += 1;
        match self.runner.format_batch(frontend_root, &staged) {
            Ok(()) => {
                report.processed += batch.len();
                return Ok(batch.iter().map(|r| r.path.clone()).collect());
            }
            Err(e) => {
                tracing::warn!(files = batch.len(), error = %e, "batch format failed, retrying per file");
                report.individual_fallbacks += 1;
            }
        }

        let mut accepted = Vec::new();
        for (request, file) in batch.iter().zip(&staged) {
            report.individual_operations += 1;
            match self.runner.format_file(frontend_root, file) {
                Ok(()) => {
                    report.processed += 1;
                    accepted.push(request.path.clone());
                }
                Err(e) => {
                    tracing::warn!(path = %request.path.display(), error = %e, "format failed");
                    report.errors += 1;
                }
            }
        }
        Ok(accepted)
    }
}

/// Reads every file under `scratch`, keyed by path relative to it.
fn read_back(scratch: &Path) -> Result<BTreeMap<PathBuf, String>> {
    let mut formatted = BTreeMap::new();
    for entry in WalkDir::new(scratch).into_iter() {
        let entry = entry.map_err(|e| GeneratorError::io(scratch, e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = pathdiff::diff_paths(entry.path(), scratch) else {
            continue;
        };
        let content =
            fs::read_to_string(entry.path()).map_err(|e| GeneratorError::io(entry.path(), e.to_string()))?;
        formatted.insert(relative, content);
    }
    Ok(formatted)
}

impl Stage for FormattingStage {
    fn name(&self) -> &'static str {
        "formatting"
    }

    fn description(&self) -> &'static str {
        "Formats generated sources with the project's formatter"
    }

    fn priority(&self) -> i32 {
        priority::FORMATTING
    }

    fn can_run(&self, context: &GenerationContext) -> bool {
        if context.options().dry_run {
            return context.json(keys::PLANNED_PATHS).is_some();
        }
        context.write_requests(keys::WRITE_REQUESTS).is_some()
    }

    fn process(&self, context: &GenerationContext, env: &StageEnv<'_>) -> Result<GenerationContext> {
        let options = context.options();
        if options.dry_run {
            return self.dry_run(context, env);
        }

        let requests = context
            .write_requests(keys::WRITE_REQUESTS)
            .ok_or_else(|| GeneratorError::validation("formatting needs write_requests"))?;
        if options.skip_formatter {
            return self.skip(context, requests, env);
        }

        let frontend_root = detect_frontend_root(&options.project_root)?;
        ensure_prettier(&frontend_root)?;

        let started = Instant::now();
        let formattable: Vec<&WriteRequest> = requests.iter().filter(|r| is_formattable(&r.path)).collect();
        let total_bytes: u64 = formattable.iter().map(|r| r.content.len() as u64).sum();

        let mut report = FormattingReport {
            estimated_memory_bytes: estimate_memory(total_bytes),
            ..Default::default()
        };

        let scratch = tempfile::Builder::new()
            .prefix(&format!(".modelgen-format-{}-", env.clock.now().timestamp_millis()))
            .tempdir_in(&frontend_root)
            .map_err(|e| GeneratorError::io(&frontend_root, e.to_string()))?;

        let mut accepted = BTreeSet::new();
        for batch in plan_batches(&formattable, options.batch_max_files, options.batch_max_memory_mb) {
            accepted.extend(self.format_batch(&frontend_root, scratch.path(), &batch, &mut report)?);
        }
        let formatted = read_back(scratch.path())?;
        scratch
            .close()
            .map_err(|e| GeneratorError::io(&frontend_root, format!("scratch cleanup: {}", e)))?;

        let rewritten: Vec<WriteRequest> = requests
            .iter()
            .map(|request| match formatted.get(&request.path) {
                Some(content) if accepted.contains(&request.path) => {
                    env.reporter
                        .file_status(FileStatus::Format, &options.output_dir.join(&request.path));
                    WriteRequest::new(request.path.clone(), content.clone(), request.kind)
                }
                _ => request.clone(),
            })
            .collect();

        report.elapsed = started.elapsed();
        tracing::debug!(
            processed = report.processed,
            errors = report.errors,
            batches = report.batch_operations,
            fallbacks = report.individual_fallbacks,
            "formatting finished"
        );

        let counters = StageExecution::new(self.name(), env.clock.now())
            .with_counter("processed", report.processed as u64)
            .with_counter("errors", report.errors as u64)
            .with_counter("batch_operations", report.batch_operations as u64);

        Ok(context
            .with_metadata(keys::FORMATTED_WRITE_REQUESTS, MetadataValue::WriteRequests(Arc::new(rewritten)))?
            .with_metadata(keys::FORMATTING, MetadataValue::Formatting(Arc::new(report)))?
            .with_execution(counters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::WriteKind;
    use crate::clock::SystemClock;
    use crate::config::GenerationOptions;
    use crate::report::NullReporter;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;

    /// Fails the first `failing_batches` batch calls, uppercases files otherwise.
    #[derive(Default)]
    struct ScriptedRunner {
        failing_batches: usize,
        failing_files: Vec<String>,
        batch_calls: Cell<usize>,
        file_calls: RefCell<Vec<PathBuf>>,
    }

    impl ScriptedRunner {
        fn upper(file: &Path) -> Result<()> {
            let content = fs::read_to_string(file).map_err(|e| GeneratorError::io(file, e.to_string()))?;
            fs::write(file, content.to_uppercase()).map_err(|e| GeneratorError::io(file, e.to_string()))
        }
    }

    impl FormatterRunner for ScriptedRunner {
        fn format_batch(&self, _working_dir: &Path, files: &[PathBuf]) -> Result<()> {
            let call = self.batch_calls.get();
            self.batch_calls.set(call + 1);
            if call < self.failing_batches {
                return Err(GeneratorError::Formatting {
                    message: "batch exploded".to_string(),
                });
            }
            files.iter().try_for_each(|f| Self::upper(f))
        }

        fn format_file(&self, _working_dir: &Path, file: &Path) -> Result<()> {
            self.file_calls.borrow_mut().push(file.to_path_buf());
            let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if self.failing_files.iter().any(|f| f == name) {
                return Err(GeneratorError::Formatting {
                    message: format!("cannot parse {}", name),
                });
            }
            Self::upper(file)
        }
    }

    fn project(prettier: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        let manifest = if prettier {
            r#"{"devDependencies": {"prettier": "^3.0.0"}}"#
        } else {
            r#"{"dependencies": {"svelte": "^4.0.0"}}"#
        };
        fs::create_dir_all(dir.path().join("frontend")).unwrap();
        fs::write(dir.path().join("frontend/package.json"), manifest).unwrap();
        dir
    }

    fn requests(n: usize) -> Vec<WriteRequest> {
        let mut out: Vec<WriteRequest> = (0..n)
            .map(|i| WriteRequest::new(format!("model-{}.ts", i), format!("export const m{} = 1;\n", i), WriteKind::ActiveModel))
            .collect();
        out.push(WriteRequest::new("README.md", "leave me\n", WriteKind::Index));
        out
    }

    fn run(runner: Rc<dyn FormatterRunner>, options: GenerationOptions, n: usize) -> Result<GenerationContext> {
        let ctx = GenerationContext::new(options)
            .with_metadata(keys::WRITE_REQUESTS, MetadataValue::WriteRequests(Arc::new(requests(n))))?;
        FormattingStage::new(runner).process(&ctx, &StageEnv { clock: &SystemClock, reporter: &NullReporter })
    }

    fn options(root: &Path) -> GenerationOptions {
        GenerationOptions {
            project_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_batch_success() {
        let dir = project(true);
        let runner = Rc::new(ScriptedRunner::default());
        let ctx = run(runner.clone(), options(dir.path()), 3).unwrap();

        let report = ctx.formatting().unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.batch_operations, 1);
        assert_eq!(report.individual_fallbacks, 0);
        assert!(runner.file_calls.borrow().is_empty());

        let formatted = ctx.write_requests(keys::FORMATTED_WRITE_REQUESTS).unwrap();
        assert_eq!(formatted[0].content, "EXPORT CONST M0 = 1;\n");
        assert_eq!(formatted[3].content, "leave me\n");
    }

    #[test]
    fn test_batch_failure_falls_back_per_file() {
        let dir = project(true);
        let runner = Rc::new(ScriptedRunner {
            failing_batches: 1,
            ..Default::default()
        });
        let ctx = run(runner.clone(), options(dir.path()), 4).unwrap();

        let report = ctx.formatting().unwrap();
        assert_eq!(report.processed, 4);
        assert_eq!(report.errors, 0);
        assert_eq!(report.individual_fallbacks, 1);
        assert_eq!(report.individual_operations, 4);
        assert_eq!(runner.file_calls.borrow().len(), 4);
    }

    #[test]
    fn test_one_bad_file_does_not_stop_siblings() {
        let dir = project(true);
        let runner = Rc::new(ScriptedRunner {
            failing_batches: 1,
            failing_files: vec!["model-1.ts".to_string()],
            ..Default::default()
        });
        let ctx = run(runner, options(dir.path()), 3).unwrap();

        let report = ctx.formatting().unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors, 1);

        let formatted = ctx.write_requests(keys::FORMATTED_WRITE_REQUESTS).unwrap();
        assert_eq!(formatted[1].content, "export const m1 = 1;\n");
        assert_eq!(formatted[2].content, "EXPORT CONST M2 = 1;\n");
    }

    #[test]
    fn test_scratch_directory_is_removed() {
        let dir = project(true);
        run(Rc::new(ScriptedRunner::default()), options(dir.path()), 2).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("frontend"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".modelgen-format-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_missing_prettier_never_invokes_runner() {
        let dir = project(false);
        let runner = Rc::new(ScriptedRunner::default());
        let err = run(runner.clone(), options(dir.path()), 2).unwrap_err();

        assert!(matches!(err, GeneratorError::PrettierNotFound { .. }));
        assert!(err.to_string().contains("not found in dependencies"));
        assert_eq!(runner.batch_calls.get(), 0);
    }

    #[test]
    fn test_missing_frontend_root() {
        let dir = TempDir::new().unwrap();
        let err = run(Rc::new(ScriptedRunner::default()), options(dir.path()), 1).unwrap_err();
        match err {
            GeneratorError::FrontendRootNotFound { searched } => assert_eq!(searched.len(), 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_skip_formatter_bypasses_environment() {
        let dir = TempDir::new().unwrap();
        let options = GenerationOptions {
            skip_formatter: true,
            ..options(dir.path())
        };
        let ctx = run(Rc::new(ScriptedRunner::default()), options, 2).unwrap();
        assert!(ctx.formatting().unwrap().skipped);
        assert!(ctx.write_requests(keys::FORMATTED_WRITE_REQUESTS).is_none());
    }

    #[test]
    fn test_dry_run_lists_formattable_planned_paths() {
        let dir = TempDir::new().unwrap();
        let planned = serde_json::json!(["user.ts", "types/user-data.ts", "README.md"]);
        let ctx = GenerationContext::new(GenerationOptions {
            dry_run: true,
            ..options(dir.path())
        })
        .with_metadata(keys::PLANNED_PATHS, MetadataValue::Json(planned))
        .unwrap();

        let runner = Rc::new(ScriptedRunner::default());
        let stage = FormattingStage::new(runner.clone());
        assert!(stage.can_run(&ctx));

        let out = stage
            .process(&ctx, &StageEnv { clock: &SystemClock, reporter: &NullReporter })
            .unwrap();
        let report = out.formatting().unwrap();
        assert!(report.skipped);
        assert_eq!(
            report.would_format,
            vec![PathBuf::from("user.ts"), PathBuf::from("types/user-data.ts")]
        );
        assert_eq!(runner.batch_calls.get(), 0);
        assert!(out.write_requests(keys::FORMATTED_WRITE_REQUESTS).is_none());
    }

    #[test]
    fn test_dry_run_without_plan_cannot_run() {
        let ctx = GenerationContext::new(GenerationOptions {
            dry_run: true,
            ..Default::default()
        })
        .with_metadata(keys::WRITE_REQUESTS, MetadataValue::WriteRequests(Arc::new(requests(1))))
        .unwrap();
        assert!(!FormattingStage::new(Rc::new(ScriptedRunner::default())).can_run(&ctx));
    }

    #[test]
    fn test_plan_batches_respects_limits() {
        let reqs = requests(5);
        let refs: Vec<&WriteRequest> = reqs.iter().collect();

        let by_count = plan_batches(&refs, 2, 256);
        assert_eq!(by_count.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 2]);

        let big = WriteRequest::new("big.ts", "x".repeat(200 * 1024), WriteKind::ActiveModel);
        let small = WriteRequest::new("small.ts", "y", WriteKind::ActiveModel);
        let by_memory = plan_batches(&[&big, &small], 50, 1);
        assert_eq!(by_memory.len(), 2);
    }

    #[test]
    fn test_merge_reports() {
        let mut total = FormattingReport::default();
        total.merge(&FormattingReport {
            processed: 3,
            batch_operations: 1,
            ..Default::default()
        });
        total.merge(&FormattingReport {
            processed: 2,
            individual_fallbacks: 1,
            ..Default::default()
        });
        assert_eq!(total.processed, 5);
        assert_eq!(total.individual_fallbacks, 1);
        assert!(!total.skipped);

        let mut skipped = FormattingReport::default();
        skipped.merge(&FormattingReport::skipped());
        assert!(skipped.skipped);

        let mut planned = FormattingReport::default();
        for _ in 0..2 {
            planned.merge(&FormattingReport {
                would_format: vec![PathBuf::from("index.ts")],
                ..FormattingReport::skipped()
            });
        }
        assert_eq!(planned.would_format, vec![PathBuf::from("index.ts")]);
    }
}
