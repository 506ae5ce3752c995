mod config;
mod media;
mod network;
mod provision;
mod system;
mod utils;

use anyhow::{bail, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::fs;
use std::path::PathBuf;

use crate::config::loader::{load_config, resolve_host, HostEnv, CONFIG_PATH};
use crate::config::structs::{Config, Host};
use crate::media::cleanup::{Cleanup, CleanupMode};
use crate::media::import::import_default_media;
use crate::media::index::MediaIndex;
use crate::network::hotspot::{FallbackAction, Hotspot};
use crate::network::powersave::{WifiConfigurator, WifiReport};
use crate::network::wifi::DiscoverySource;
use crate::provision::state::{write_atomic, DesiredFile};
use crate::provision::template::TemplateParams;
use crate::provision::templates::LOGROTATE;
use crate::system::boot;
use crate::system::packages::PackageReconciler;
use crate::system::platform;
use crate::system::python::PythonEnv;
use crate::system::services::ServiceInstaller;
use crate::utils::command::{CommandRunner, HostRunner};
use crate::utils::term::{self, BOLD, NC};

#[derive(Parser)]
#[command(name = "loop-setup")]
#[command(version)]
#[command(about = "Provision a Raspberry Pi as a LOOP media frame", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Provisioning config file
    #[arg(long, global = true, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// LOOP checkout to install from (defaults to the current directory)
    #[arg(long, global = true, env = "LOOP_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Full installation (default)
    Install,
    /// Wipe local media and logs, then restart the service
    Cleanup,
    /// Wipe local media and logs, then reinstall everything
    Reset,
    /// Manage the LOOP systemd services
    Service {
        #[command(subcommand)]
        action: Option<ServiceAction>,
    },
    /// Start the setup hotspot if Wi-Fi has no connection (run at boot)
    WifiFallback,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum ServiceAction {
    /// Install, enable and start the services (default)
    Install,
    /// Report service and Wi-Fi state; exits 1 if anything is wrong
    Check,
    /// Disable Wi-Fi power save and grant NetworkManager permissions
    SetupWifi,
}

/// Exit status for a command line clap rejected: help and version are not failures
fn usage_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = usage_exit_code(&e);
            let _ = e.print();
            std::process::exit(code);
        }
    };
    utils::logger::init(cli.verbose);

    let read_only = matches!(
        cli.command,
        Some(Commands::Service {
            action: Some(ServiceAction::Check)
        })
    );
    if !read_only && !utils::privilege::is_root() {
        error!("This command must be run as root.");
        error!("Try: sudo loop-setup");
        std::process::exit(1);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            println!();
            term::fail(&format!("{:#}", e));
            error!("Installation aborted: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Dispatch a command. `Ok(false)` means a check failed.
fn run(cli: Cli) -> Result<bool> {
    let config = load_config(&cli.config);
    let host = resolve_host(&config, &HostEnv::from_process(cli.project_dir))?;
    let runner = HostRunner;

    match cli.command.unwrap_or(Commands::Install) {
        Commands::Install => run_install(&config, &host, &runner)?,
        Commands::Cleanup => run_cleanup(&config, &host, &runner, CleanupMode::Cleanup)?,
        Commands::Reset => run_reset(&config, &host, &runner)?,
        Commands::Service { action } => match action.unwrap_or(ServiceAction::Install) {
            ServiceAction::Install => run_service_install(&config, &host, &runner)?,
            ServiceAction::Check => return Ok(run_check(&config, &host, &runner)),
            ServiceAction::SetupWifi => run_setup_wifi(&config, &host, &runner)?,
        },
        Commands::WifiFallback => run_wifi_fallback(&config, &host, &runner)?,
    }

    Ok(true)
}

fn template_params(config: &Config, host: &Host) -> TemplateParams {
    TemplateParams {
        user: host.user.clone(),
        home: host.home.clone(),
        project_dir: host.project_dir.clone(),
        bin: config.paths.binary.clone(),
    }
}

/// Copy this executable to its persistent location so units can call it
fn install_binary(config: &Config) -> Result<()> {
    let current_exe = std::env::current_exe()?;
    let target = &config.paths.binary;

    if let (Ok(a), Ok(b)) = (current_exe.canonicalize(), target.canonicalize()) {
        if a == b {
            info!("Running from {}, not copying", target.display());
            return Ok(());
        }
    }

    info!("Copying binary to {}", target.display());
    let data = fs::read(&current_exe)?;
    write_atomic(target, &data, 0o755)
}

/// Media directories and an index the appliance can start with
fn prepare_state(host: &Host) -> Result<()> {
    let state = host.state();
    for dir in [&state.raw_media, &state.processed_media, &state.logs] {
        fs::create_dir_all(dir)?;
    }
    if !state.index.exists() {
        info!("Creating empty media index {}", state.index.display());
        MediaIndex::default().save(&state.index)?;
    }
    Ok(())
}

fn print_wifi_report(report: &WifiReport) {
    let source = match report.interface.source {
        DiscoverySource::Candidate => "detected",
        DiscoverySource::WirelessQuery => "reported by iw",
        DiscoverySource::Fallback => "assumed, no adapter found",
    };
    term::note(&format!("Interface: {} ({})", report.interface.name, source));

    match report.power_save {
        Some(false) => term::ok("Wi-Fi power save is off"),
        Some(true) => term::fail("Wi-Fi power save is on"),
        None => term::fail("Wi-Fi power save state unknown"),
    }
    if !report.nm_config_ok {
        term::warn("NetworkManager power-save config missing; power save returns after reboot");
    }
    if report.policy_present {
        term::ok("NetworkManager permissions granted");
    } else {
        term::fail("NetworkManager permission rule missing");
    }
}

fn run_install(config: &Config, host: &Host, runner: &dyn CommandRunner) -> Result<()> {
    const TOTAL: usize = 9;
    term::banner("LOOP Installation");
    let params = template_params(config, host);

    // 1. Preconditions
    term::step(1, TOTAL, "Checking prerequisites");
    let pi_model = platform::detect_pi(&config.paths.device_tree_model);
    match &pi_model {
        Some(model) => term::ok(&format!("Detected {}", model)),
        None => term::warn("Not a Raspberry Pi; display overlay will be skipped"),
    }
    if !host.backend_dir().is_dir() {
        bail!("Backend directory not found: {}", host.backend_dir().display());
    }
    if !host.backend_config().is_file() {
        bail!("Config file not found: {}", host.backend_config().display());
    }
    params.validate()?;
    term::ok(&format!(
        "Installing for user {} from {}",
        host.user,
        host.project_dir.display()
    ));

    // 2. OS packages
    term::step(2, TOTAL, "Installing system packages");
    let installed = PackageReconciler::new(runner).reconcile(&config.packages.required)?;
    if installed.is_empty() {
        term::ok("All packages already installed");
    } else {
        term::ok(&format!("Installed {}", installed.join(", ")));
    }

    // 3. Backend runtime
    term::step(3, TOTAL, "Setting up Python environment");
    PythonEnv::new(runner, &host.backend_dir()).ensure()?;
    term::ok("Python environment ready");

    // 4. Services
    term::step(4, TOTAL, "Installing services");
    install_binary(config)?;
    let installer = ServiceInstaller::new(runner, config, &params);
    let outcome = installer.install_units()?;
    for unit in &outcome.installed {
        term::ok(&format!("Registered {}", unit));
    }
    for unit in &outcome.skipped {
        term::warn(&format!("Skipped {} (no template)", unit));
    }
    DesiredFile::new(&config.paths.logrotate, LOGROTATE.render(&params)?).reconcile()?;
    term::ok("Log rotation configured");

    // 5. Display overlay
    term::step(5, TOTAL, "Configuring display");
    if pi_model.is_some() {
        let Some(boot_config) = boot::locate(&config.paths.boot_configs) else {
            bail!(
                "Boot config not found (looked in {})",
                config
                    .paths
                    .boot_configs
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        };
        let added = boot::ensure_directives(&boot_config, &config.display.boot_directives)?;
        if added.is_empty() {
            term::ok("Boot overlay already configured");
        } else {
            term::ok(&format!("Added {} (reboot required)", added.join(", ")));
        }
    } else {
        term::warn("Skipped");
    }

    // 6. Wi-Fi
    term::step(6, TOTAL, "Configuring Wi-Fi");
    let wifi = WifiConfigurator::new(runner, config, &params);
    let ifc = wifi.configure()?;
    term::ok(&format!("Power save disabled on {}", ifc.name));
    match Hotspot::new(runner, &config.hotspot).ensure_profile(&ifc) {
        Ok(true) => term::ok(&format!("Hotspot fallback {} created", config.hotspot.ssid)),
        Ok(false) => term::ok("Hotspot fallback ready"),
        Err(e) => {
            warn!("Hotspot setup failed: {:#}", e);
            term::warn("Hotspot fallback not configured");
        }
    }

    // 7. Local state
    term::step(7, TOTAL, "Preparing media storage");
    prepare_state(host)?;
    let imported = import_default_media(
        &host.project_dir.join(&config.media.default_media_dir),
        &host.state(),
    )?;
    if imported > 0 {
        term::ok(&format!("Imported {} default media item(s)", imported));
    } else {
        term::ok("Media storage ready");
    }

    // 8. Start
    term::step(8, TOTAL, "Starting services");
    installer.start_primary()?;
    term::ok("LOOP service running");

    // 9. Verify
    term::step(9, TOTAL, "Verifying");
    print_wifi_report(&wifi.verify());

    let state = host.state();
    fs::write(&state.setup_marker, b"")?;
    if let Err(e) = utils::privilege::chown_recursive(&state.root, &host.user) {
        warn!("Could not hand {} to {}: {:#}", state.root.display(), host.user, e);
    }

    print_summary(config);
    Ok(())
}

fn print_summary(config: &Config) {
    let unit = config
        .services
        .primary()
        .map(|p| p.unit.as_str())
        .unwrap_or("loop.service");
    let hostname = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "raspberrypi".to_string());

    term::banner("Installation Complete");
    println!("{}Web UI:{}   http://{}.local", BOLD, NC, hostname);
    println!("{}Status:{}   sudo systemctl status {}", BOLD, NC, unit);
    println!("{}Logs:{}     journalctl -u {} -f", BOLD, NC, unit);
    println!("{}Check:{}    loop-setup service check", BOLD, NC);
    println!("{}Reset:{}    sudo loop-setup reset", BOLD, NC);
    println!();
}

fn run_cleanup(
    config: &Config,
    host: &Host,
    runner: &dyn CommandRunner,
    mode: CleanupMode,
) -> Result<()> {
    term::banner(match mode {
        CleanupMode::Cleanup => "LOOP Cleanup",
        CleanupMode::Reset => "LOOP Reset",
    });

    let summary = Cleanup::new(runner, config, host.state())
        .owned_by(&host.user)
        .run(mode)?;
    if summary.service_was_active {
        term::ok("Service stopped");
    }
    term::ok(&format!("Removed {} media entries", summary.removed_entries));
    term::ok(&format!("Removed {} rotated log file(s)", summary.removed_logs));
    term::ok("Media index reset");
    if summary.restarted {
        term::ok("Service restarted");
    }
    Ok(())
}

/// Wipe local state, then reinstall from scratch
fn run_reset(config: &Config, host: &Host, runner: &dyn CommandRunner) -> Result<()> {
    run_cleanup(config, host, runner, CleanupMode::Reset)?;
    run_install(config, host, runner)
}

fn run_service_install(config: &Config, host: &Host, runner: &dyn CommandRunner) -> Result<()> {
    term::banner("Installing LOOP Services");
    let params = template_params(config, host);

    install_binary(config)?;
    let installer = ServiceInstaller::new(runner, config, &params);
    let outcome = installer.install_units()?;
    for unit in &outcome.skipped {
        term::warn(&format!("Skipped {} (no template)", unit));
    }
    installer.start_primary()?;
    term::ok("LOOP service running");

    let wifi = WifiConfigurator::new(runner, config, &params);
    wifi.configure()?;
    print_wifi_report(&wifi.verify());
    Ok(())
}

/// Read-only health report. Returns whether everything passed.
fn run_check(config: &Config, host: &Host, runner: &dyn CommandRunner) -> bool {
    term::banner("LOOP Service Check");
    let params = template_params(config, host);

    let installer = ServiceInstaller::new(runner, config, &params);
    if !installer.primary_registered() {
        term::note("Primary service not registered. Run: sudo loop-setup service install");
    }

    let mut passed = true;
    for status in installer.check() {
        let line = format!("{}: {}", status.unit, status.state.label());
        if status.healthy() {
            term::ok(&line);
        } else {
            term::fail(&line);
            passed = false;
        }
    }

    let report = WifiConfigurator::new(runner, config, &params).verify();
    print_wifi_report(&report);
    passed &= report.passed();

    println!();
    if passed {
        term::ok("All checks passed");
    } else {
        term::fail("Some checks failed");
    }
    passed
}

fn run_setup_wifi(config: &Config, host: &Host, runner: &dyn CommandRunner) -> Result<()> {
    let params = template_params(config, host);
    let wifi = WifiConfigurator::new(runner, config, &params);
    wifi.configure()?;
    print_wifi_report(&wifi.verify());
    Ok(())
}

fn run_wifi_fallback(config: &Config, host: &Host, runner: &dyn CommandRunner) -> Result<()> {
    let params = template_params(config, host);
    let ifc = WifiConfigurator::new(runner, config, &params).discover();

    match Hotspot::new(runner, &config.hotspot).fallback(&ifc)? {
        FallbackAction::Connected => info!("Wi-Fi connected on {}", ifc.name),
        FallbackAction::HotspotStarted => info!("Hotspot {} is up", config.hotspot.ssid),
        FallbackAction::Disabled => info!("Hotspot fallback disabled"),
    }
    Ok(())
}
