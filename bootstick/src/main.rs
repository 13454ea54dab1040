use anyhow::Result;
use bootstick_core::device::Device;
use bootstick_core::provision::{self, Event, Plan, Step, StepOutcome, SystemHost};
use bootstick_core::select::Selection;
use bootstick_core::{image, platform, preflight, select};
use clap::{ArgAction, Parser};
use console::{Term, style};
use dialoguer::{Input, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const RULE: &str = "____________________________________________________";

#[derive(Parser)]
#[command(name = "bootstick")]
#[command(about = "Turns an ISO image into a bootable USB drive", version)]
struct Cli {
    /// Directory to search for ISO files [default: the current directory]
    #[arg(long, value_name = "DIR")]
    iso_dir: Option<PathBuf>,

    /// Where the USB drive is mounted while files are copied
    #[arg(long, value_name = "DIR", default_value = provision::DEFAULT_TARGET_MOUNT)]
    target_mount: PathBuf,

    /// Where the ISO image is mounted while files are copied
    #[arg(long, value_name = "DIR", default_value = provision::DEFAULT_IMAGE_MOUNT)]
    image_mount: PathBuf,

    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Installs a stderr logger. `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_error(message: impl Display) {
    println!("{} {}", style("Error:").red().bold(), message);
}

/// Prints a 1-based menu and reads the operator's choice.
///
/// Piped answers are read line by line; `dialoguer` needs a terminal.
/// Returns `None` if the answer is not one of the listed numbers.
fn choose<T: Display>(items: &[T], prompt: &str) -> Result<Option<usize>> {
    for (i, item) in items.iter().enumerate() {
        println!("[{}] {}", style(i + 1).cyan(), item);
    }

    if !io::stdin().is_terminal() {
        println!("{prompt}:");
        return read_choice(io::stdin().lock(), items.len());
    }

    let answer: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    Ok(select::parse_choice(&answer, items.len()))
}

/// Reads one answer line. End of input counts as an invalid choice.
fn read_choice(mut input: impl BufRead, count: usize) -> Result<Option<usize>> {
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(None);
    }
    Ok(select::parse_choice(&answer, count))
}

/// Draws the operator-facing side of the workflow's events.
struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    fn new() -> Self {
        Self { bar: None }
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn handle(&mut self, plan: &Plan, event: Event) {
        match event {
            Event::StepStarted(step) => {
                println!("{}...", step.description());
                self.bar = match step {
                    Step::Wipe => Some(byte_bar("Erasing", plan.wipe_len)),
                    Step::Format => Some(spinner("Formatting")),
                    Step::Copy => Some(percent_bar("Copying")),
                    _ => None,
                };
            }
            Event::WipeStarted(len) => {
                if let Some(bar) = &self.bar {
                    bar.set_length(len);
                }
            }
            Event::WipeProgress(bytes) => {
                if let Some(bar) = &self.bar {
                    bar.set_position(bytes);
                }
            }
            Event::CopyProgress(progress) => {
                if let Some(bar) = &self.bar {
                    bar.set_position(progress.percent.into());
                    bar.set_message(progress.rate);
                }
            }
            Event::StepFinished(_, outcome) => {
                self.finish_bar();
                match outcome {
                    StepOutcome::Done => {}
                    StepOutcome::Tolerated(reason) => {
                        println!("  {}", style(reason).dim());
                    }
                    StepOutcome::Warned(reason) => {
                        println!("  {} {}", style("Warning:").yellow().bold(), reason);
                    }
                }
            }
        }
    }
}

fn byte_bar(prefix: &'static str, len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_prefix(prefix);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{prefix:12} [{elapsed_precise}] [{bar:40.green/black}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("■ "),
    );
    bar
}

fn percent_bar(prefix: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_prefix(prefix);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:12} [{elapsed_precise}] [{bar:40.magenta/black}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("■ "),
    );
    bar
}

fn spinner(prefix: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_prefix(prefix);
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:12} [{elapsed_precise}] {spinner:.blue}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Runs discovery and selection. `None` means the run was aborted and the
/// reason was already printed.
fn select_target(cli: &Cli) -> Result<Option<Selection>> {
    let cwd = std::env::current_dir()?;
    let iso_dir = match &cli.iso_dir {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };

    let devices = match platform::get_usb_devices() {
        Ok(devices) => devices,
        Err(e) => {
            print_error(format_args!("Failed to list USB devices: {e:#}"));
            return Ok(None);
        }
    };
    if devices.is_empty() {
        println!("No USB device found.");
        return Ok(None);
    }

    println!("USB devices found:");
    let Some(device_index) = choose(&devices, "Enter the number of the USB device")? else {
        println!("Invalid choice.");
        return Ok(None);
    };
    let device = devices[device_index].clone();

    let images = match image::list_iso_files(&iso_dir) {
        Ok(images) => images,
        Err(e) => {
            print_error(format_args!("Failed to list ISO files: {e:#}"));
            return Ok(None);
        }
    };
    if images.is_empty() {
        println!("No ISO file found in {}.", iso_dir.display());
        return Ok(None);
    }

    println!("Select the ISO file:");
    let Some(image_index) = choose(&images, "Enter the number of the ISO file")? else {
        println!("Invalid choice.");
        return Ok(None);
    };

    Ok(Some(Selection {
        device,
        image: images[image_index].clone(),
    }))
}

fn provision_drive(plan: &Plan, device: &Device) {
    println!();
    println!(
        "{} This will erase all data on '{}' ({}).",
        style("WARNING:").red().bold(),
        device.name,
        device.size,
    );
    println!("  Device: {}", style(plan.device.display()).cyan());
    println!("  Image:  {}", style(plan.image.display()).cyan());
    println!();

    info!(device = %plan.device.display(), image = %plan.image.display(), "provisioning");
    let mut reporter = ProgressReporter::new();
    let result = provision::run(&mut SystemHost, plan, |event| reporter.handle(plan, event));
    reporter.finish_bar();

    match result {
        Ok(()) => {
            info!(device = %plan.device.display(), "completed");
            println!(
                "\n✨ Successfully wrote {} to {}.",
                style(plan.image.display()).cyan(),
                style(plan.device.display()).cyan()
            );
        }
        Err(e) => {
            info!(step = %e.step, "aborted");
            print_error(format_args!(
                "Aborted at step {}: {}",
                e.step.number(),
                e.step.description()
            ));
            println!("{:#}", e.source);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    Term::stdout().clear_screen().ok();

    if let Err(e) = preflight::check() {
        println!("{e}");
        return Ok(());
    }

    println!("{RULE}");
    println!("{}", style("bootstick: bootable USB drive creator").bold());
    println!("Place the ISO file(s) in the directory you run this from.");
    println!("{RULE}");

    let Some(selection) = select_target(&cli)? else {
        return Ok(());
    };

    let plan = Plan::new(&selection.device, &selection.image)
        .with_mount_points(cli.target_mount.clone(), cli.image_mount.clone());
    if let Err(e) = plan.validate() {
        print_error(format_args!("{e:#}"));
        return Ok(());
    }
    provision_drive(&plan, &selection.device);

    println!("{RULE}");
    println!("Process finished.");
    println!("{RULE}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_choice_from_piped_input() {
        assert_eq!(read_choice(Cursor::new("2\n"), 3).unwrap(), Some(1));
        assert_eq!(read_choice(Cursor::new(" 1 \r\n"), 3).unwrap(), Some(0));
    }

    #[test]
    fn test_read_choice_reads_a_single_line() {
        let mut input = Cursor::new("1\n3\n");

        assert_eq!(read_choice(&mut input, 3).unwrap(), Some(0));
        assert_eq!(read_choice(&mut input, 3).unwrap(), Some(2));
    }

    #[test]
    fn test_read_choice_rejects_bad_or_missing_answers() {
        assert_eq!(read_choice(Cursor::new("4\n"), 3).unwrap(), None);
        assert_eq!(read_choice(Cursor::new("\n"), 3).unwrap(), None);
        assert_eq!(read_choice(Cursor::new(""), 3).unwrap(), None);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["bootstick"]);

        assert_eq!(cli.iso_dir, None);
        assert_eq!(cli.target_mount, PathBuf::from(provision::DEFAULT_TARGET_MOUNT));
        assert_eq!(cli.image_mount, PathBuf::from(provision::DEFAULT_IMAGE_MOUNT));
        assert_eq!(cli.verbose, 0);
    }
}
