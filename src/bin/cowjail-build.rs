use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cowjail::images::{build_images, install_packages, parse_build_targets, PackageManager};
use cowjail::{
    container_runtime_path, exit_code_for_error, set_color_mode, telemetry_init, Config,
    Console, Engine, Error, ExecService, Privilege,
};

#[derive(Parser, Debug)]
#[command(
    name = "cowjail-build",
    version,
    about = "Build local container images and install host packages for cowjail"
)]
struct BuildCli {
    /// Images to build, as dir=base/name:tag
    #[arg(long, num_args = 1.., value_name = "DIR=REPO/NAME:TAG")]
    build: Option<Vec<String>>,

    /// OS packages to install on the host
    #[arg(long = "system-packages", num_args = 1.., value_name = "PKG")]
    system_packages: Option<Vec<String>>,

    /// Package manager used for --system-packages
    #[arg(long = "package-manager", value_enum, default_value = "dnf")]
    package_manager: PackageManager,

    /// Base directory for build directories
    #[arg(long = "project-dir", default_value = ".")]
    project_dir: PathBuf,

    #[arg(long, env = "COWJAIL_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, short)]
    verbose: bool,

    /// Colorize output: auto|always|never
    #[arg(long, value_enum)]
    color: Option<cowjail::ColorMode>,
}

fn main() -> ExitCode {
    let cli = BuildCli::parse();
    if let Some(mode) = cli.color {
        set_color_mode(mode);
    }
    telemetry_init(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Console::stderr().error(&e.to_string());
            ExitCode::from(exit_code_for_error(&e))
        }
    }
}

fn run(cli: &BuildCli) -> Result<(), Error> {
    if cli.build.is_none() && cli.system_packages.is_none() {
        return Err(Error::InputValidation(
            "nothing to do: pass --build and/or --system-packages".to_string(),
        ));
    }
    // Every argument is validated before anything is installed or built.
    let targets = match &cli.build {
        Some(specs) => Some(parse_build_targets(specs)?),
        None => None,
    };
    if let Some(pkgs) = &cli.system_packages {
        if pkgs.is_empty() {
            return Err(Error::InputValidation(
                "system package list is empty".to_string(),
            ));
        }
    }

    let cfg = Config::load(cli.config.as_deref())?;
    let exec = ExecService::new(cfg.command_timeout()?);
    let privilege = Privilege::detect(cfg.privilege_helper.as_deref());
    let mut console = Console::stdout();

    if let Some(pkgs) = &cli.system_packages {
        install_packages(&exec, &privilege, cli.package_manager, pkgs, &mut console)?;
    }
    if let Some(targets) = &targets {
        let runtime = container_runtime_path(&cfg.engine)?;
        let engine = Engine::new(runtime, cfg.daemon_url.as_deref(), &exec);
        build_images(&engine, &cli.project_dir, targets, &mut console)?;
    }
    Ok(())
}
