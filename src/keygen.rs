//! Account generation utility for ontgate
//!
//! Usage:
//!   ontgate keygen --label ops                  Print a new encrypted account
//!   ontgate keygen --label ops --admin --save   Store it as the service admin
//!
//! The password is read from the first line of stdin.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context};

use ontgate::config::ServiceConfig;
use ontgate::store::Database;
use ontgate::wallet::{Account, AccountRole, AccountStore};

#[derive(Default)]
struct KeygenOptions {
    label: String,
    admin: bool,
    save: bool,
    config_path: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> anyhow::Result<KeygenOptions> {
    let mut options = KeygenOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--label" | "-l" => {
                let Some(label) = iter.next() else {
                    bail!("--label needs a value");
                };
                options.label.clone_from(label);
            }
            "--config" | "-c" => {
                let Some(path) = iter.next() else {
                    bail!("--config needs a path");
                };
                options.config_path = Some(PathBuf::from(path));
            }
            "--admin" => options.admin = true,
            "--save" => options.save = true,
            other => bail!("unknown argument {other}"),
        }
    }
    Ok(options)
}

fn read_password() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("empty password");
    }
    Ok(password)
}

pub fn run(args: &[String]) -> anyhow::Result<()> {
    let options = parse_args(args)?;
    let config = ServiceConfig::load_or_default(options.config_path.as_deref())
        .context("loading configuration")?;
    let password = read_password()?;

    let mut account = Account::create(&options.label, &password, Some(config.scrypt))
        .context("generating account")?;
    if options.admin {
        account = account.with_role(AccountRole::Admin);
    }

    println!("{}", serde_json::to_string_pretty(&account)?);

    if options.save {
        let db = Database::open(&config.database.path)
            .with_context(|| format!("opening {}", config.database.path.display()))?;
        AccountStore::new(&db)?.save(&account)?;
        db.flush()?;
        eprintln!("Account {} saved to {}", account.address, config.database.path.display());
    }
    Ok(())
}
