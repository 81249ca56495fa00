//! Tests for the Job Runner and backups
//!
//! These tests verify:
//! - `.out` contents for READ/DELETE/SHOW/WAIT
//! - Invalid lines, including non-UTF-8 ones, are skipped without stopping
//!   the job
//! - Backups are numbered per job and hold a point-in-time snapshot
//! - Every job file is run exactly once across workers
//! - The backup limit is respected

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pipekv::backup::BackupLimiter;
use pipekv::jobs::{is_job_file, JobRunner};
use pipekv::table::KvTable;
use pipekv::{Config, Engine};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(max_threads: usize, max_backups: usize) -> (TempDir, Arc<Engine>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .jobs_dir(temp_dir.path())
        .max_threads(max_threads)
        .max_backups(max_backups)
        .build();
    let engine = Arc::new(Engine::open(config).unwrap());
    (temp_dir, engine)
}

fn write_job(dir: &Path, name: &str, lines: &[&str]) {
    fs::write(dir.join(name), lines.join("\n") + "\n").unwrap();
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

// =============================================================================
// Output Tests
// =============================================================================

#[test]
fn test_job_output() {
    let (temp, engine) = setup(1, 1);
    write_job(
        temp.path(),
        "basic.job",
        &[
            "WRITE [(apple,1)(banana,2)]",
            "READ [pear,banana,apple]",
            "DELETE [banana,kiwi]",
            "DELETE [apple]",
            "WRITE [(apple,2)]",
            "READ [banana]",
            "SHOW",
        ],
    );

    let count = JobRunner::new(Arc::clone(&engine)).run().unwrap();

    assert_eq!(count, 1);
    assert_eq!(
        read(temp.path(), "basic.out"),
        "[(apple,1)(banana,2)(pear,KVSERROR)]\n\
         [(kiwi,KVSMISSING)]\n\
         [(banana,KVSERROR)]\n\
         (apple, 2)\n"
    );
}

#[test]
fn test_wait_and_invalid_lines() {
    let (temp, engine) = setup(1, 1);
    write_job(
        temp.path(),
        "misc.job",
        &[
            "# comment",
            "",
            "WAIT 10",
            "WAIT 0",
            "BOGUS",
            "WRITE [(a,1)",
            "HELP",
            "READ [a]",
        ],
    );

    JobRunner::new(Arc::clone(&engine)).run().unwrap();

    assert_eq!(read(temp.path(), "misc.out"), "Waiting...\n[(a,KVSERROR)]\n");
}

#[test]
fn test_non_utf8_line_skipped() {
    let (temp, engine) = setup(1, 1);
    let mut job = b"WRITE [(a,1)]\n".to_vec();
    job.extend_from_slice(b"WRITE [(b,\xff\xfe)]\n");
    job.extend_from_slice(b"WRITE [(c,3)]\nREAD [a,b,c]\n");
    fs::write(temp.path().join("bytes.job"), job).unwrap();

    JobRunner::new(Arc::clone(&engine)).run().unwrap();

    assert_eq!(
        read(temp.path(), "bytes.out"),
        "[(a,1)(b,KVSERROR)(c,3)]\n"
    );
}

#[test]
fn test_non_job_files_ignored() {
    let (temp, engine) = setup(2, 1);
    write_job(temp.path(), "real.job", &["WRITE [(r,1)]"]);
    write_job(temp.path(), "notes.txt", &["WRITE [(n,1)]"]);
    fs::create_dir(temp.path().join("dir.job")).unwrap();

    assert!(is_job_file(&temp.path().join("real.job")));
    assert!(!is_job_file(&temp.path().join("notes.txt")));
    assert!(!is_job_file(&temp.path().join("dir.job")));

    let count = JobRunner::new(Arc::clone(&engine)).run().unwrap();

    assert_eq!(count, 1);
    assert_eq!(engine.table().read("r"), Some("1".to_string()));
    assert_eq!(engine.table().read("n"), None);
    assert!(!temp.path().join("notes.out").exists());
}

// =============================================================================
// Backup Tests
// =============================================================================

#[test]
fn test_backups_numbered_per_job() {
    let (temp, engine) = setup(1, 2);
    write_job(
        temp.path(),
        "snap.job",
        &["WRITE [(a,1)]", "BACKUP", "WRITE [(b,2)]", "BACKUP", "DELETE [a]"],
    );

    JobRunner::new(Arc::clone(&engine)).run().unwrap();
    engine.wait_for_backups().unwrap();

    assert_eq!(read(temp.path(), "snap-1.bck"), "(a, 1)\n");
    assert_eq!(read(temp.path(), "snap-2.bck"), "(a, 1)\n(b, 2)\n");
    assert!(!temp.path().join("snap-3.bck").exists());
}

#[test]
fn test_backup_limit_respected() {
    let temp = TempDir::new().unwrap();
    let table = KvTable::new();
    for i in 0..100 {
        table.write(&format!("k{}", i), "v");
    }

    let limiter = BackupLimiter::new(2);
    for i in 1..=10 {
        limiter
            .start(&table, temp.path().join(format!("t-{}.bck", i)))
            .unwrap();
        assert!(limiter.available() <= 2);
    }
    limiter.wait_all().unwrap();

    assert_eq!(limiter.available(), 2);
    assert_eq!(limiter.pending(), 0);
    for i in 1..=10 {
        let contents = read(temp.path(), &format!("t-{}.bck", i));
        assert_eq!(contents.lines().count(), 100);
    }
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_each_job_runs_exactly_once() {
    let (temp, engine) = setup(4, 2);
    let jobs = 12;
    for j in 0..jobs {
        write_job(
            temp.path(),
            &format!("job{}.job", j),
            &[
                &format!("WRITE [(k{},{})]", j, j),
                &format!("READ [k{}]", j),
                "BACKUP",
            ],
        );
    }

    let count = JobRunner::new(Arc::clone(&engine)).run().unwrap();
    engine.wait_for_backups().unwrap();

    assert_eq!(count, jobs);
    for j in 0..jobs {
        assert_eq!(
            read(temp.path(), &format!("job{}.out", j)),
            format!("[(k{},{})]\n", j, j)
        );
        assert!(temp.path().join(format!("job{}-1.bck", j)).exists());
        assert!(!temp.path().join(format!("job{}-2.bck", j)).exists());
    }
    assert_eq!(engine.table().len(), jobs);
}

#[test]
fn test_more_workers_than_jobs() {
    let (temp, engine) = setup(8, 1);
    write_job(temp.path(), "only.job", &["WRITE [(x,1)]", "SHOW"]);

    assert_eq!(JobRunner::new(Arc::clone(&engine)).run().unwrap(), 1);
    assert_eq!(read(temp.path(), "only.out"), "(x, 1)\n");
}
