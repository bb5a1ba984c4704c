use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use modelgen_core::{
    FixedClock, FormatterRunner, GenerationOptions, Generator, GeneratorError, NullReporter, Result, SchemaSource,
};

const SCHEMA: &str = r#"{
  "tables": [
    {
      "name": "users",
      "columns": [
        {"name": "id", "type": "integer", "nullable": false, "primary_key": true},
        {"name": "email", "type": "varchar", "nullable": false},
        {"name": "name", "type": "varchar"},
        {"name": "created_at", "type": "datetime", "nullable": false},
        {"name": "updated_at", "type": "datetime", "nullable": false}
      ]
    },
    {
      "name": "posts",
      "columns": [
        {"name": "id", "type": "integer", "nullable": false, "primary_key": true},
        {"name": "title", "type": "varchar", "nullable": false},
        {"name": "user_id", "type": "integer", "nullable": false},
        {"name": "discarded_at", "type": "datetime"}
      ]
    }
  ],
  "relationships": {
    "posts": {"belongs_to": [{"name": "user", "target_table": "users", "foreign_key": "user_id"}]}
  },
  "patterns": {},
  "indexes": {},
  "constraints": {}
}"#;

/// `jobs` records both the creating and the updating user.
const TRACKED_SCHEMA: &str = r#"{
  "tables": [
    {
      "name": "users",
      "columns": [
        {"name": "id", "type": "integer"},
        {"name": "email", "type": "varchar", "nullable": false}
      ]
    },
    {
      "name": "jobs",
      "columns": [
        {"name": "id", "type": "integer"},
        {"name": "title", "type": "varchar", "nullable": false},
        {"name": "created_by_id", "type": "integer"},
        {"name": "updated_by_id", "type": "integer"}
      ]
    }
  ],
  "relationships": {
    "jobs": {
      "belongs_to": [
        {"name": "created_by", "target_table": "users", "foreign_key": "created_by_id"},
        {"name": "updated_by", "target_table": "users", "foreign_key": "updated_by_id"}
      ]
    }
  },
  "patterns": {},
  "indexes": {},
  "constraints": {}
}"#;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        Self::with_schema(SCHEMA)
    }

    fn with_schema(schema: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("schema.json"), schema).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn models(&self) -> PathBuf {
        self.root().join("models")
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.models().join(relative)).unwrap()
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            output_dir: self.models(),
            project_root: self.root().to_path_buf(),
            skip_formatter: true,
            ..Default::default()
        }
    }

    fn generator(&self, options: GenerationOptions) -> Generator {
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        Generator::new(options, SchemaSource::from_path(self.root().join("schema.json")))
            .with_clock(Rc::new(clock))
            .with_reporter(Rc::new(NullReporter))
    }

    fn with_frontend(self, prettier: bool) -> Self {
        let manifest = if prettier {
            r#"{"devDependencies": {"prettier": "^3.3.0"}}"#
        } else {
            r#"{"dependencies": {"svelte": "^5.0.0"}}"#
        };
        fs::write(self.root().join("package.json"), manifest).unwrap();
        self
    }
}

/// Leaves files untouched, optionally failing every batch call.
#[derive(Default)]
struct FlakyFormatter {
    batch_calls: Cell<usize>,
    file_calls: Cell<usize>,
    fail_batches: bool,
}

impl FormatterRunner for FlakyFormatter {
    fn format_batch(&self, _working_dir: &Path, _files: &[PathBuf]) -> Result<()> {
        self.batch_calls.set(self.batch_calls.get() + 1);
        if self.fail_batches {
            return Err(GeneratorError::Formatting {
                message: "prettier crashed".to_string(),
            });
        }
        Ok(())
    }

    fn format_file(&self, _working_dir: &Path, _file: &Path) -> Result<()> {
        self.file_calls.set(self.file_calls.get() + 1);
        Ok(())
    }
}

#[test]
fn generate_writes_every_artifact() {
    let project = Project::new();
    let result = project.generator(project.options()).generate().unwrap();

    assert_eq!(result.tables, vec!["users".to_string(), "posts".to_string()]);
    assert_eq!(result.created, 8);
    assert_eq!(result.identical, 0);
    assert_eq!(result.errors, 0);
    assert!(result.formatting.skipped);

    for file in [
        "types/user-data.ts",
        "user.ts",
        "reactive-user.ts",
        "types/post-data.ts",
        "post.ts",
        "reactive-post.ts",
        "index.ts",
        "config/loggable-models.ts",
    ] {
        assert!(project.models().join(file).is_file(), "missing {}", file);
    }

    let index = project.read("index.ts");
    assert!(index.contains("initializeClient"));
    assert!(index.contains("Post"));
    assert!(project.read("types/user-data.ts").starts_with("// Generated: 2025-06-01T12:00:00Z"));
}

#[test]
fn users_gain_has_many_posts() {
    let project = Project::new();
    let options = GenerationOptions {
        table: Some("users".to_string()),
        ..project.options()
    };
    project.generator(options).generate().unwrap();

    let data = project.read("types/user-data.ts");
    assert!(data.contains("import type { PostData } from './post-data';"));
    assert!(data.contains("  id: number;\n  email: string;\n  name?: string;\n"));
    assert!(data.contains("  posts?: PostData[];"));

    let post = fs::read_to_string(project.models().join("types/post-data.ts"));
    assert!(post.is_err(), "single-table run must only write its own table");
}

#[test]
fn rerun_is_identical_and_force_rewrites() {
    let project = Project::new();
    project.generator(project.options()).generate().unwrap();

    let before = fs::metadata(project.models().join("user.ts")).unwrap().modified().unwrap();
    let rerun = project.generator(project.options()).generate().unwrap();
    assert_eq!(rerun.created, 0);
    assert_eq!(rerun.identical, 8);
    let after = fs::metadata(project.models().join("user.ts")).unwrap().modified().unwrap();
    assert_eq!(before, after);

    let forced = project
        .generator(GenerationOptions {
            force: true,
            ..project.options()
        })
        .generate()
        .unwrap();
    assert_eq!(forced.created, 8);
}

#[test]
fn dry_run_plans_without_writing() {
    let project = Project::new();
    let options = GenerationOptions {
        dry_run: true,
        ..project.options()
    };
    let result = project.generator(options).generate().unwrap();

    assert_eq!(result.planned.len(), 8);
    assert!(result.planned.contains(&"index.ts".to_string()));
    assert!(result.write_results.is_empty());
    assert!(!project.models().exists());
}

#[test]
fn dry_run_reports_what_would_be_formatted() {
    let project = Project::new().with_frontend(true);
    let formatter = Rc::new(FlakyFormatter::default());
    let options = GenerationOptions {
        dry_run: true,
        skip_formatter: false,
        ..project.options()
    };

    let result = project.generator(options).with_formatter(formatter.clone()).generate().unwrap();

    let formatting = &result.formatting;
    assert!(formatting.skipped);
    assert_eq!(formatting.processed, 0);
    assert_eq!(formatting.would_format.len(), 8);
    assert!(formatting.would_format.contains(&PathBuf::from("index.ts")));
    assert!(formatting.would_format.contains(&PathBuf::from("types/post-data.ts")));
    assert_eq!(formatter.batch_calls.get(), 0);
    assert!(!project.models().exists());

    let skipped = project
        .generator(GenerationOptions {
            dry_run: true,
            ..project.options()
        })
        .generate()
        .unwrap();
    assert!(skipped.formatting.skipped);
    assert!(skipped.formatting.would_format.is_empty());
}

#[test]
fn two_foreign_keys_to_one_parent() {
    let project = Project::with_schema(TRACKED_SCHEMA);
    let result = project.generator(project.options()).generate().unwrap();
    assert_eq!(result.errors, 0);
    assert_eq!(result.created, 8);

    let users = project.read("types/user-data.ts");
    assert!(users.contains("  id: number;\n"));
    assert!(users.contains("  jobs_as_created_by?: JobData[];"));
    assert!(users.contains("  jobs_as_updated_by?: JobData[];"));
    assert_eq!(users.matches("import type { JobData } from './job-data';").count(), 1);

    let jobs = project.read("types/job-data.ts");
    assert!(jobs.contains("  created_by?: UserData;"));
    assert!(jobs.contains("  updated_by?: UserData;"));
}

#[test]
fn batch_failure_falls_back_to_individual_files() {
    let project = Project::new().with_frontend(true);
    let formatter = Rc::new(FlakyFormatter {
        fail_batches: true,
        ..Default::default()
    });
    let options = GenerationOptions {
        table: Some("users".to_string()),
        skip_formatter: false,
        ..project.options()
    };

    let result = project.generator(options).with_formatter(formatter.clone()).generate().unwrap();

    // three model files plus the index
    assert_eq!(result.formatting.processed, 4);
    assert_eq!(result.formatting.errors, 0);
    assert_eq!(result.formatting.individual_fallbacks, 1);
    assert_eq!(formatter.file_calls.get(), 4);
    assert_eq!(result.errors, 0);
    assert!(project.models().join("user.ts").is_file());
}

#[test]
fn missing_prettier_stops_before_formatting() {
    let project = Project::new().with_frontend(false);
    let formatter = Rc::new(FlakyFormatter::default());
    let options = GenerationOptions {
        table: Some("users".to_string()),
        skip_formatter: false,
        ..project.options()
    };

    let err = project.generator(options).with_formatter(formatter.clone()).generate().unwrap_err();

    assert!(err.is_environment());
    assert!(err.root_cause().to_string().contains("not found in dependencies"));
    assert_eq!(formatter.batch_calls.get(), 0);
    assert!(!project.models().join("user.ts").exists());
}

#[test]
fn unknown_table_names_the_stage() {
    let project = Project::new();
    let options = GenerationOptions {
        table: Some("comments".to_string()),
        ..project.options()
    };

    let err = project.generator(options).generate().unwrap_err();
    match &err {
        GeneratorError::Stage { stage, .. } => assert_eq!(stage, "schema_analysis"),
        other => panic!("expected a stage error, got {other}"),
    }
    assert!(matches!(err.root_cause(), GeneratorError::TableFiltering { .. }));
}

#[test]
fn sqlite_source_end_to_end() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("app.sqlite3");
    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
         CREATE TABLE posts (
             id INTEGER PRIMARY KEY,
             user_id INTEGER NOT NULL REFERENCES users(id),
             status TEXT NOT NULL CHECK (status IN ('draft', 'published'))
         );",
    )
    .unwrap();
    drop(conn);

    let options = GenerationOptions {
        table: Some("posts".to_string()),
        output_dir: dir.path().join("models"),
        skip_formatter: true,
        ..Default::default()
    };
    Generator::new(options, SchemaSource::from_path(&db))
        .with_reporter(Rc::new(NullReporter))
        .generate()
        .unwrap();

    let data = fs::read_to_string(dir.path().join("models/types/post-data.ts")).unwrap();
    assert!(data.contains("  status: 'draft' | 'published';"));
    assert!(data.contains("  user?: UserData;"));
}

#[test]
fn sqlite_source_generates_every_table() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("app.sqlite3");
    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
         CREATE TABLE jobs (
             id INTEGER PRIMARY KEY,
             title TEXT NOT NULL,
             created_by_id INTEGER REFERENCES users(id),
             updated_by_id INTEGER REFERENCES users(id)
         );",
    )
    .unwrap();
    drop(conn);

    let models = dir.path().join("models");
    let generator = || {
        let options = GenerationOptions {
            output_dir: models.clone(),
            skip_formatter: true,
            ..Default::default()
        };
        Generator::new(options, SchemaSource::from_path(&db)).with_reporter(Rc::new(NullReporter))
    };

    let result = generator().generate().unwrap();
    assert_eq!(result.tables.len(), 2);
    assert_eq!(result.created, 8);
    assert_eq!(result.errors, 0);

    let users = fs::read_to_string(models.join("types/user-data.ts")).unwrap();
    assert!(users.contains("  jobs_as_created_by?: JobData[];"));
    assert!(users.contains("  jobs_as_updated_by?: JobData[];"));
    let index = fs::read_to_string(models.join("index.ts")).unwrap();
    assert!(index.contains("Job"));

    let rerun = generator().generate().unwrap();
    assert_eq!(rerun.identical, 8);
}
