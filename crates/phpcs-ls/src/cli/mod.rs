// cli/mod.rs - Subcommands that run outside the LSP loop

pub mod check;
