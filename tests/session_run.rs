mod support;

use cowjail::lock::acquire_lock_at;
use cowjail::{Console, Engine, Error, Phase, Privilege, SessionController, SessionOutcome};
use support::{config_in, target_in, RecordingExec};

fn run_with(exec: &RecordingExec, root: &std::path::Path) -> (cowjail::Result<SessionOutcome>, String) {
    let cfg = config_in(root);
    let target = target_in(root);
    let privilege = Privilege::new(None);
    let engine = Engine::new("docker", None, exec);
    let mut buf = Vec::new();
    let res = {
        let mut ctrl = SessionController::new(
            exec,
            &privilege,
            &engine,
            &cfg.global_run_options,
            Console::new(&mut buf),
        );
        let res = ctrl.run(&target);
        assert_eq!(ctrl.phase(), Phase::Idle);
        res
    };
    (res, String::from_utf8(buf).expect("utf8 console"))
}

#[test]
fn test_run_orders_pre_hooks_container_and_post_hooks() {
    let td = tempfile::tempdir().unwrap();
    let exec = RecordingExec::new();
    let (res, console) = run_with(&exec, td.path());

    match res.expect("run succeeds") {
        SessionOutcome::Ran(report) => {
            assert_eq!(report.exit_code, Some(0));
            assert_eq!(report.hooks_run, 7);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let calls = exec.calls();
    assert_eq!(calls.len(), 6, "{calls:#?}");
    assert!(calls[0].starts_with("mount -t overlay overlay -o lowerdir="));
    assert!(calls[1].starts_with("docker network ls --filter name=weechat-bridge"));
    assert_eq!(
        calls[2],
        "docker network create --driver=bridge --subnet=172.18.0.0/30 \
         --ip-range=172.18.0.0/30 --gateway=172.18.0.1 weechat-bridge"
    );
    assert!(calls[3].starts_with(
        "docker run --rm --interactive --tty --cap-drop=ALL --read-only --privileged=false --volume"
    ));
    assert!(calls[3].ends_with("--network weechat-bridge 0b10/weechat:edge"));
    assert!(calls[4].starts_with("umount "));
    assert!(calls[5].starts_with("docker network ls"));

    // Fresh, empty upper layer left for the next session.
    let upper = td.path().join("cow/upperdir");
    assert!(upper.is_dir());
    assert_eq!(std::fs::read_dir(&upper).unwrap().count(), 0);
    assert!(!td.path().join(".cowjail.lock").exists());

    assert!(console.contains("mounting overlay fs\n"), "{console}");
    assert!(console.contains("  + weechat-bridge network created ...ok"));
    assert!(console.contains("running 'weechat' in 0b10/weechat:edge..."));
    assert!(console.contains("no existing network \"weechat-bridge\" to remove"));
}

#[test]
fn test_failed_mount_skips_run_but_still_tears_down() {
    let td = tempfile::tempdir().unwrap();
    let exec = RecordingExec::new().fail("mount -t overlay", "special device overlay does not exist");
    let (res, console) = run_with(&exec, td.path());

    let err = res.expect_err("mount failure is fatal");
    assert!(matches!(err, Error::Mount(ref m) if m.contains("does not exist")), "{err}");
    assert_eq!(exec.count("docker run"), 0);
    assert_eq!(exec.count("network create"), 0, "remaining pre-hooks skipped");
    assert_eq!(exec.count("umount"), 1, "post-hooks ran");
    assert_eq!(exec.count("docker network ls"), 1);
    assert!(console.contains("  ERROR: mounting overlay fs ...failed"), "{console}");
}

#[test]
fn test_nonzero_container_exit_is_reported_after_teardown() {
    let td = tempfile::tempdir().unwrap();
    let exec = RecordingExec::new().respond("docker run", 3, "");
    let (res, _) = run_with(&exec, td.path());

    assert_eq!(
        res.expect("a non-zero exit is not a session error"),
        SessionOutcome::Ran(cowjail::RunReport {
            exit_code: Some(3),
            hooks_run: 7
        })
    );
    let run_at = exec.position("docker run").unwrap();
    let umount_at = exec.position("umount").unwrap();
    assert!(run_at < umount_at);
}

#[test]
fn test_every_post_hook_runs_and_failures_are_collected() {
    let td = tempfile::tempdir().unwrap();
    let exec = RecordingExec::new().fail("umount", "target is busy");
    let (res, console) = run_with(&exec, td.path());

    match res.expect_err("teardown failure surfaces") {
        Error::Teardown(failures) => {
            assert_eq!(failures.len(), 1);
            assert!(failures.to_string().contains("target is busy"));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(exec.count("docker network ls"), 2, "remove-network still attempted");
    assert!(td.path().join("cow/upperdir").is_dir(), "reset-upper still ran");
    assert!(console.contains("  ERROR: unmount failed"), "{console}");
}

#[test]
fn test_held_lock_refuses_before_any_hook() {
    let td = tempfile::tempdir().unwrap();
    let target = target_in(td.path());
    let _held = acquire_lock_at(&target.lock_path(), "weechat").unwrap();

    let exec = RecordingExec::new();
    let (res, _) = run_with(&exec, td.path());
    assert!(matches!(res, Err(Error::Locked(ref t)) if t == "weechat"));
    assert!(exec.calls().is_empty());
}

#[test]
fn test_plan_lists_hooks_and_engine_command_without_side_effects() {
    let td = tempfile::tempdir().unwrap();
    let cfg = config_in(td.path());
    let target = target_in(td.path());
    let exec = RecordingExec::new();
    let privilege = Privilege::new(None);
    let engine = Engine::new("docker", None, &exec);
    let ctrl = SessionController::new(
        &exec,
        &privilege,
        &engine,
        &cfg.global_run_options,
        Console::new(std::io::sink()),
    );

    let plan = ctrl.plan(&target);
    assert_eq!(plan.len(), 8);
    assert_eq!(plan[0], "pre: discarding any previous overlay data");
    assert!(plan[4].starts_with("run: docker run --rm"));
    assert_eq!(plan[7], "post: removing bridge network");
    assert!(exec.calls().is_empty());
    assert!(!td.path().join("cow").exists());
}
