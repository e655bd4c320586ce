/*!
Session lifecycle controller.

Run path:  Idle -> PreHooks -> Running -> PostHooks -> Idle
Stop path: Idle -> Discovering -> Stopping -> Idle

Post-hooks are owned by a `Teardown` guard armed before the first pre-hook, so they
run after a failed pre-hook, a failed or non-zero container run, and on unwinding.
Pre-hook failures abort the remaining pre-hooks and skip the run; post-hook failures
are collected and every post-hook is attempted.
*/
use crate::color::Console;
use crate::engine::{parse_handles, Engine};
use crate::errors::{Error, Failures, Result};
use crate::firewall::Firewall;
use crate::hooks::{Hook, HookContext};
use crate::lock::acquire_lock_at;
use crate::network::BridgeManager;
use crate::overlay::OverlayManager;
use crate::resolver::{write_hosts_file, HostEntry, HostResolver};
use crate::target::Target;
use crate::util::{Exec, Privilege};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    PreHooks,
    Running,
    PostHooks,
    Discovering,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Container exit code; None when it was terminated by a signal.
    pub exit_code: Option<i32>,
    pub hooks_run: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub found: usize,
    pub stopped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Ran(RunReport),
    Stopped(StopReport),
}

pub struct SessionController<'a> {
    exec: &'a dyn Exec,
    privilege: &'a Privilege,
    engine: &'a Engine<'a>,
    global_run_options: &'a [String],
    console: Console<'a>,
    phase: Phase,
}

impl<'a> SessionController<'a> {
    pub fn new(
        exec: &'a dyn Exec,
        privilege: &'a Privilege,
        engine: &'a Engine<'a>,
        global_run_options: &'a [String],
        console: Console<'a>,
    ) -> Self {
        Self {
            exec,
            privilege,
            engine,
            global_run_options,
            console,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, next: Phase) {
        tracing::debug!(from = ?self.phase, to = ?next, "session phase");
        self.phase = next;
    }

    fn run_args(&self, target: &Target) -> Vec<String> {
        let mut options = self.global_run_options.to_vec();
        options.extend(target.run_options.iter().cloned());
        Engine::run_args(&options, &target.image)
    }

    /// Planned hooks and engine invocation, without side effects.
    pub fn plan(&self, target: &Target) -> Vec<String> {
        let mut lines: Vec<String> = target
            .pre_hooks
            .iter()
            .map(|h| format!("pre: {}", h.description()))
            .collect();
        lines.push(format!(
            "run: {}",
            self.engine.preview(&self.run_args(target))
        ));
        lines.extend(
            target
                .post_hooks
                .iter()
                .map(|h| format!("post: {}", h.description())),
        );
        lines
    }

    /// Discovery command of `stop`, without side effects.
    pub fn plan_stop(&self, target: &Target) -> Vec<String> {
        vec![
            format!(
                "discover: {}",
                self.engine.preview(&Engine::list_running_args(&target.image))
            ),
            format!("stop: each listed container of {}", target.image),
        ]
    }

    /// Commands of `provision_network`, without side effects.
    pub fn plan_network(&self, target: &Target) -> Vec<String> {
        let allow = &target.allowlist;
        let resolver = HostResolver::new(self.exec, &allow.resolver_options);
        let mut lines: Vec<String> = allow
            .hosts
            .iter()
            .map(|h| format!("resolve: {}", resolver.request(h).command_line()))
            .collect();
        lines.extend(
            Firewall::new(self.exec, self.privilege)
                .plan(&allow.set_name, &allow.hosts)
                .into_iter()
                .map(|l| format!("firewall: {l}")),
        );
        lines.push(format!("hosts file: {}", allow.hosts_file.display()));
        lines
    }

    pub fn run(&mut self, target: &Target) -> Result<SessionOutcome> {
        let lock = acquire_lock_at(&target.lock_path(), &target.name)?;
        tracing::debug!(lock = %lock.path().display(), session = %target.name, "run");

        let mut guard = Teardown::arm(self, target);
        guard.ctrl.enter(Phase::PreHooks);
        let outcome = match guard.ctrl.run_pre_hooks(target) {
            Ok(pre_count) => {
                guard.ctrl.enter(Phase::Running);
                guard
                    .ctrl
                    .run_container(target)
                    .map(|code| (pre_count, code))
            }
            Err(e) => Err(e),
        };
        let (teardown, post_count) = guard.finish();

        // The phase error wins; teardown failures were already reported per hook.
        let (pre_count, exit_code) = outcome?;
        teardown?;
        drop(lock);
        Ok(SessionOutcome::Ran(RunReport {
            exit_code,
            hooks_run: pre_count + post_count,
        }))
    }

    fn run_pre_hooks(&mut self, target: &Target) -> Result<usize> {
        for hook in &target.pre_hooks {
            self.console.info(hook.description());
            match self.execute(hook, target) {
                Ok(note) => self.note(note),
                Err(e) => {
                    self.console.failed(hook.description());
                    return Err(e);
                }
            }
        }
        Ok(target.pre_hooks.len())
    }

    /// Every post-hook is attempted; returns the collected failures and the count run.
    fn run_post_hooks(&mut self, target: &Target) -> (Result<()>, usize) {
        self.enter(Phase::PostHooks);
        let mut failures = Failures::new();
        for hook in &target.post_hooks {
            self.console.info(hook.description());
            match self.execute(hook, target) {
                Ok(note) => self.note(note),
                Err(e) => {
                    self.console.error(&e.to_string());
                    failures.push(e);
                }
            }
        }
        self.enter(Phase::Idle);
        (
            failures.into_result(Error::Teardown),
            target.post_hooks.len(),
        )
    }

    fn execute(&self, hook: &Hook, target: &Target) -> Result<Option<String>> {
        let overlay = OverlayManager::new(self.exec, self.privilege);
        let bridge = BridgeManager::new(self.engine);
        let ctx = HookContext {
            overlay: &overlay,
            bridge: &bridge,
            paths: &target.overlay,
            network: &target.network,
        };
        hook.execute(&ctx)
    }

    fn note(&mut self, note: Option<String>) {
        if let Some(msg) = note {
            self.console.complete(&msg);
        }
    }

    fn run_container(&mut self, target: &Target) -> Result<Option<i32>> {
        let args = self.run_args(target);
        let shown = args[1..args.len() - 1].join(" ");
        self.console
            .info(&format!("running '{}' in {}...", target.name, target.image));
        self.console.info(&format!("run options: {shown}"));
        let code = self.engine.run_foreground(&args)?;
        tracing::info!(session = %target.name, ?code, "container exited");
        Ok(code)
    }

    pub fn stop(&mut self, target: &Target) -> Result<SessionOutcome> {
        self.enter(Phase::Discovering);
        let result = self.discover_and_stop(target);
        self.enter(Phase::Idle);
        result
    }

    fn discover_and_stop(&mut self, target: &Target) -> Result<SessionOutcome> {
        let listing = self.engine.list_running(&target.image)?;
        let handles = parse_handles(&listing)?;
        if handles.is_empty() {
            self.console
                .info(&format!("No container for {} is running", target.name));
            return Ok(SessionOutcome::Stopped(StopReport {
                found: 0,
                stopped: 0,
            }));
        }

        self.enter(Phase::Stopping);
        let mut failures = Failures::new();
        for handle in &handles {
            self.console.info(&format!(
                "stopping '{}' - IMG:{}; ID:{}...",
                target.name, target.image, handle
            ));
            match self.engine.stop(handle) {
                Ok(()) => self.console.complete(handle.as_str()),
                Err(e) => {
                    self.console.failed(handle.as_str());
                    failures.push(e);
                }
            }
        }
        let found = handles.len();
        let stopped = found - failures.len();
        failures.into_result(Error::Stop)?;
        Ok(SessionOutcome::Stopped(StopReport { found, stopped }))
    }

    /// Resolve the allow-list, program the firewall, write the hosts file.
    /// Resolution failures abort before any firewall state is touched.
    pub fn provision_network(&mut self, target: &Target) -> Result<Vec<HostEntry>> {
        let allow = &target.allowlist;
        self.console.info(&format!(
            "resolving {} allow-listed host(s)",
            allow.hosts.len()
        ));
        let entries =
            HostResolver::new(self.exec, &allow.resolver_options).resolve(&allow.hosts)?;
        for e in &entries {
            self.console
                .complete(&format!("{} -> {}", e.hostname, e.address));
        }

        self.console
            .info(&format!("programming ip set '{}'", allow.set_name));
        Firewall::new(self.exec, self.privilege).program(&allow.set_name, &entries)?;
        self.console
            .complete(&format!("egress allowed to set '{}'", allow.set_name));

        write_hosts_file(&allow.hosts_file, &entries)?;
        self.console
            .complete(&format!("hosts file {}", allow.hosts_file.display()));
        Ok(entries)
    }
}

/// Scoped owner of the post-hooks of one run.
struct Teardown<'s, 'a> {
    ctrl: &'s mut SessionController<'a>,
    target: &'s Target,
    armed: bool,
}

impl<'s, 'a> Teardown<'s, 'a> {
    fn arm(ctrl: &'s mut SessionController<'a>, target: &'s Target) -> Self {
        Self {
            ctrl,
            target,
            armed: true,
        }
    }

    fn finish(mut self) -> (Result<()>, usize) {
        self.armed = false;
        self.ctrl.run_post_hooks(self.target)
    }
}

impl Drop for Teardown<'_, '_> {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            if let (Err(e), _) = self.ctrl.run_post_hooks(self.target) {
                tracing::error!(error = %e, "teardown after abort failed");
            }
        }
    }
}
