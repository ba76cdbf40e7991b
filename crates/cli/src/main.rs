mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use policy::{Access, ArgRule, Decision, Perm, Table};

use error::{Error, Result};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Validate and inspect taming policy tables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a policy file
    Check {
        /// Path to the policy TOML
        file: PathBuf,
    },
    /// Print every rule in a policy file
    Show {
        /// Path to the policy TOML
        file: PathBuf,
    },
    /// Evaluate a single access against a policy file
    Decide {
        /// Path to the policy TOML
        file: PathBuf,
        /// Decide a property read
        #[arg(long, value_name = "PROPERTY", conflicts_with_all = ["write", "call"])]
        read: Option<String>,
        /// Decide a property write (use with --value)
        #[arg(long, value_name = "PROPERTY", conflicts_with = "call")]
        write: Option<String>,
        /// The value being written
        #[arg(long, requires = "write")]
        value: Option<String>,
        /// Decide a method call
        #[arg(long, value_name = "FUNCTION")]
        call: Option<String>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => cmd_check(&file),
        Commands::Show { file } => cmd_show(&file),
        Commands::Decide {
            file,
            read,
            write,
            value,
            call,
        } => cmd_decide(&file, read, write, value, call),
    }
}

fn cmd_check(file: &PathBuf) -> Result<()> {
    let table = Table::load(file)?;
    println!(
        "ok: {} properties, {} functions",
        table.properties.len(),
        table.functions.len()
    );
    Ok(())
}

fn cmd_show(file: &PathBuf) -> Result<()> {
    let table = Table::load(file)?;

    if !table.properties.is_empty() {
        println!("properties:");
        for (name, rule) in &table.properties {
            let mut line = format!("  {name}: {}", perm_str(rule.perm));
            if rule.perm == Perm::Allow {
                line.push_str(match rule.access {
                    Access::ReadOnly => ", read-only",
                    Access::Write => ", write",
                });
            }
            if let Some(values) = &rule.allowed_values {
                line.push_str(&format!(", allowed values: {}", values.join(", ")));
            }
            if !rule.comment.is_empty() {
                line.push_str(&format!("  # {}", rule.comment));
            }
            println!("{line}");
        }
    }

    if !table.functions.is_empty() {
        println!("functions:");
        for (name, rule) in &table.functions {
            let mut line = format!("  {name}: {}", perm_str(rule.perm));
            if !rule.args.is_empty() {
                let args: Vec<String> = rule.args.iter().map(arg_str).collect();
                line.push_str(&format!(", args: [{}]", args.join(", ")));
            }
            if !rule.comment.is_empty() {
                line.push_str(&format!("  # {}", rule.comment));
            }
            println!("{line}");
        }
    }

    if table.properties.is_empty() && table.functions.is_empty() {
        println!("empty table: everything is denied");
    }

    Ok(())
}

fn cmd_decide(
    file: &PathBuf,
    read: Option<String>,
    write: Option<String>,
    value: Option<String>,
    call: Option<String>,
) -> Result<()> {
    let table = Table::load(file)?;

    let decision = if let Some(name) = read {
        table.decide_read(&name)
    } else if let Some(name) = write {
        table.decide_write(&name, value.as_deref())
    } else if let Some(name) = call {
        table.decide_call(&name)
    } else {
        return Err(Error::Invocation(
            "one of --read, --write, or --call is required".into(),
        ));
    };

    match decision {
        Decision::Allow => println!("allow"),
        Decision::Deny { reason } => println!("deny: {reason}"),
    }
    Ok(())
}

fn perm_str(perm: Perm) -> &'static str {
    match perm {
        Perm::Allow => "allow",
        Perm::Deny => "deny",
    }
}

fn arg_str(arg: &ArgRule) -> String {
    match arg {
        ArgRule::Any => "any".to_string(),
        ArgRule::OneOf(values) => format!("one of {{{}}}", values.join(", ")),
        ArgRule::Filter(name) => format!("filter '{name}'"),
    }
}
