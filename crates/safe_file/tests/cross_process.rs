//! Cross-process exclusion, verified by re-running this test binary as a
//! child that takes the lock for a while.

use std::env;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use safe_file::{locking_file, LockMode, Progress, SafeFileOutput};

const CHILD_ENV: &str = "SAFE_FILE_TEST_CHILD_PATH";

const CHILD_HOLD: Duration = Duration::from_millis(1000);

/// Helper body for the cross-process test below: a no-op in a normal test
/// run, the child's workload when re-invoked with the path in the
/// environment.
#[test]
fn child_holds_exclusive_lock() {
    let Ok(path) = env::var(CHILD_ENV) else {
        return;
    };
    let lock = locking_file(&path).unwrap();
    lock.lock(LockMode::Exclusive).unwrap();
    thread::sleep(CHILD_HOLD);
    lock.unlock().unwrap();
}

#[test]
fn test_lock_excludes_other_process() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("shared-target");

    let mut child = Command::new(env::current_exe().unwrap())
        .args(["child_holds_exclusive_lock", "--exact", "--test-threads", "1"])
        .env(CHILD_ENV, &target)
        .spawn()
        .unwrap();

    // Wait for the child's hold to appear. Probing never touches the lock
    // state itself.
    let start = Instant::now();
    while SafeFileOutput::probe(&target).unwrap() != Progress::InProgress {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "never saw the child process hold the lock",
        );
        thread::sleep(Duration::from_millis(5));
    }

    // While the child holds exclusively, even a shared acquisition from
    // this process is refused.
    let lock = locking_file(&target).unwrap();
    assert!(!lock.try_lock(LockMode::Shared).unwrap());

    // Once the child releases, the lock is acquirable again.
    assert!(lock
        .try_lock_for(LockMode::Exclusive, Duration::from_secs(10))
        .unwrap());
    lock.unlock().unwrap();
    assert!(child.wait().unwrap().success());
}
