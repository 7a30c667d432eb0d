//
// main.rs
//
// Copyright (C) 2022-2025 Posit Software, PBC. All rights reserved.
// Modifications copyright (C) 2026 Jonathan Marc Bearak
//

use std::env;

use phpcs_ls::backend;
use phpcs_ls::cli::check;

fn print_usage() {
    println!(
        "phpcs-ls {}, a PHP_CodeSniffer language server.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: phpcs-ls [OPTIONS]
       phpcs-ls check <file> [--standard <name>] [--executables-folder <dir>]

Available options:

--stdio                      Start the LSP server using stdio transport
--version                    Print the version
--help                       Print this help message

Subcommands:

check                        Lint one file once and print its diagnostics

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut use_stdio = false;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--stdio" => use_stdio = true,
            "--version" => {
                println!("phpcs-ls {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            "check" => {
                let args = check::parse_args(&mut argv).map_err(|e| anyhow::anyhow!(e))?;
                env_logger::init();
                let found = check::run_check(&args).await?;
                if found > 0 {
                    std::process::exit(1);
                }
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("Unknown argument: '{other}'"));
            }
        }
    }

    if !use_stdio {
        print_usage();
        return Ok(());
    }

    env_logger::init();

    backend::start_lsp().await
}
