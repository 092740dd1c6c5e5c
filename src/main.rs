//! ontgate - account, identity and contract gateway
//!
//! Single binary with subcommands:
//!   ontgate serve      - Run the HTTP gateway
//!   ontgate keygen     - Generate an encrypted account record

mod keygen;
mod serve;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let rest = args.get(2..).map(<[String]>::to_vec).unwrap_or_default();

    let result = match args.get(1).map(String::as_str) {
        Some("serve") => serve::run(rest),
        Some("keygen") => keygen::run(&rest),
        Some("--version" | "-V") => {
            println!("ontgate {}", ontgate::VERSION);
            Ok(())
        }
        _ => {
            print_help();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_help() {
    println!("ontgate v{}", ontgate::VERSION);
    println!("Account, OntID and smart contract gateway");
    println!();
    println!("USAGE:");
    println!("    ontgate <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    serve       Run the HTTP gateway");
    println!("                  --config <PATH>  TOML configuration file");
    println!("                  --port <PORT>    Override the listen port");
    println!("    keygen      Generate an encrypted account (password on stdin)");
    println!("                  --label <LABEL>  Account label");
    println!("                  --admin          Tag the account as service admin");
    println!("                  --save           Store it in the configured database");
    println!("                  --config <PATH>  TOML configuration file");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help      Print help");
    println!("    -V, --version   Print version");
    println!();
    println!("EXAMPLES:");
    println!("    ontgate serve --config ontgate.toml");
    println!("    echo secret | ontgate keygen --label ops --admin --save");
}
