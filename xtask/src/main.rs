use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use litra_core::catalog::{self, LOGITECH_VENDOR_ID};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the CLI, passing any extra arguments through
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print udev rules granting the logged-in user access to supported lights
    UdevRules {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn udev_rules() -> String {
    let mut rules = String::from("# Logitech Litra lights\n");
    for product in catalog::products() {
        let _ = writeln!(
            rules,
            "# Litra {}\nSUBSYSTEM==\"usb\", ATTRS{{idVendor}}==\"{:04x}\", ATTRS{{idProduct}}==\"{:04x}\", MODE=\"0660\", TAG+=\"uaccess\"",
            product.display_name, LOGITECH_VENDOR_ID, product.product_id
        );
    }
    rules
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            let status = Command::new("cargo").arg("build").status()?;
            if !status.success() {
                anyhow::bail!("Build failed");
            }
        }
        Commands::Run { args } => {
            println!("Running CLI...");
            let status = Command::new("cargo")
                .args(["run", "-p", "litra-cli", "--"])
                .args(args)
                .status()?;
            if !status.success() {
                anyhow::bail!("Run failed");
            }
        }
        Commands::UdevRules { output } => {
            let rules = udev_rules();
            match output {
                Some(path) => {
                    std::fs::write(path, rules)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} (reload with: udevadm control --reload-rules)", path.display());
                }
                None => print!("{}", rules),
            }
        }
    }

    Ok(())
}
