use std::process::ExitCode;

use clap::Parser;

use cowjail::{
    container_runtime_path, exit_code_for_error, set_color_mode,
    telemetry_init, Config, Console, Engine, Error, ExecService, Privilege, SessionController,
    SessionOutcome,
};

mod cli;
use crate::cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(mode) = cli.color {
        set_color_mode(mode);
    }
    telemetry_init(cli.verbose);

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    match &cli.command {
        Command::Targets => {
            print_targets(&cfg);
            ExitCode::SUCCESS
        }
        Command::Run { target } | Command::Stop { target } | Command::Net { target } => {
            match dispatch(&cli, &cfg, target) {
                Ok(code) => code,
                Err(e) => fail(&e),
            }
        }
    }
}

fn dispatch(cli: &Cli, cfg: &Config, name: &str) -> Result<ExitCode, Error> {
    // Validation first: no engine lookup or OS call for a bad target.
    let target = cfg.target(name)?;
    let timeout = cfg.command_timeout()?;

    let exec = ExecService::new(timeout);
    let privilege = Privilege::detect(cfg.privilege_helper.as_deref());
    let runtime = match container_runtime_path(&cfg.engine) {
        Ok(p) => p,
        // Dry-run previews with the bare engine name; `net` never calls the engine.
        Err(_) if cli.dry_run || matches!(cli.command, Command::Net { .. }) => {
            cfg.engine.clone().into()
        }
        Err(e) => return Err(Error::Io(e)),
    };
    let engine = Engine::new(runtime, cfg.daemon_url.as_deref(), &exec);
    let mut ctrl = SessionController::new(
        &exec,
        &privilege,
        &engine,
        &cfg.global_run_options,
        Console::stdout(),
    );

    if cli.verbose {
        eprintln!("cowjail: target: {} ({})", target.name, target.image);
        eprintln!("cowjail: engine: {}", engine.program().display());
        if let Some(helper) = privilege.helper() {
            eprintln!("cowjail: privilege helper: {helper}");
        }
    }
    if !privilege.can_elevate() && !cli.dry_run && !matches!(cli.command, Command::Stop { .. }) {
        Console::stdout().warn("no privilege helper and not root; mount and firewall calls may fail");
    }

    match &cli.command {
        _ if cli.dry_run => {
            let plan = match &cli.command {
                Command::Stop { .. } => ctrl.plan_stop(&target),
                Command::Net { .. } => ctrl.plan_network(&target),
                _ => ctrl.plan(&target),
            };
            for line in plan {
                println!("{line}");
            }
            eprintln!("cowjail: dry-run requested; nothing executed.");
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { .. } => match ctrl.run(&target)? {
            SessionOutcome::Ran(report) => Ok(match report.exit_code {
                Some(c) => ExitCode::from(c.clamp(0, 255) as u8),
                None => ExitCode::from(1),
            }),
            SessionOutcome::Stopped(_) => Ok(ExitCode::SUCCESS),
        },
        Command::Stop { .. } => {
            ctrl.stop(&target)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Net { .. } => {
            ctrl.provision_network(&target)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Targets => Ok(ExitCode::SUCCESS),
    }
}

fn print_targets(cfg: &Config) {
    for (name, tc) in &cfg.targets {
        let aliases = cfg.aliases_of(name);
        if aliases.is_empty() {
            println!("{name}\t{}", tc.image);
        } else {
            println!("{name}\t{}\taliases: {}", tc.image, aliases.join(", "));
        }
    }
}

fn fail(e: &Error) -> ExitCode {
    Console::stderr().error(&e.to_string());
    ExitCode::from(exit_code_for_error(e))
}
