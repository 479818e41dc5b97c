use clap::Parser;
use log::error;
use pistrap_installer::cli::{self, Cli};
use pistrap_installer::config::ProvisionConfig;
use pistrap_installer::errors::{PistrapError, Result};
use pistrap_installer::partitions::default_layout;
use pistrap_installer::runlog::RunLog;
use pistrap_installer::{confirm, interrupt, logging, pipeline, preflight};
use pistrap_hal::LinuxHal;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let code = match provision(&cli) {
        Ok(()) => 0,
        Err(err) => {
            if matches!(
                err.downcast_ref::<PistrapError>(),
                Some(PistrapError::Aborted)
            ) {
                // A refused confirmation is a clean exit, not an error.
                log::info!("Aborted. {} was not touched.", cli.sdcard.display());
                0
            } else {
                error!("{:#}", err);
                1
            }
        }
    };
    std::process::exit(code);
}

fn provision(cli: &Cli) -> Result<()> {
    // Ctrl-C must unwind through teardown, not kill the process mid-mount.
    interrupt::install_handlers()?;

    if let Err(msg) = cli::validate_device_path(&cli.sdcard) {
        return Err(PistrapError::ValidationFailed(msg).into());
    }
    if !cli.dry_run && !cli.sdcard.exists() {
        return Err(PistrapError::ValidationFailed(format!(
            "no such device: {}",
            cli.sdcard.display()
        ))
        .into());
    }

    let mut cfg = ProvisionConfig::new(&cli.sdcard, default_layout(cli.boot_size))
        .with_extra_packages(&cli.packages);
    cfg.tuning = cli.tuning;
    cfg.dry_run = cli.dry_run;

    confirm::confirm_gate(&cli.sdcard, cli.yes_i_know || cli.dry_run)?;
    cfg.confirmed = true;

    let hal = LinuxHal::new();
    preflight::run(&hal, &cfg)?;

    let runlog = RunLog::open("pistrap.log")?;
    pipeline::run(&hal, &runlog, &cfg)
}
