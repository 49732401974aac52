//! `cellarbook completions <shell>`

use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

/// Completion script for `shell`, generated from the clap command tree
pub fn completion_script(shell: CompletionShell) -> Vec<u8> {
    match shell {
        CompletionShell::Bash => render(shells::Bash),
        CompletionShell::Zsh => render(shells::Zsh),
        CompletionShell::Fish => render(shells::Fish),
    }
}

fn render(generator: impl Generator) -> Vec<u8> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();
    let mut script = Vec::new();
    generate(generator, &mut command, bin_name, &mut script);
    script
}

pub fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let script = completion_script(shell);
    match output_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &script)?;
            tracing::info!("Wrote {shell:?} completions to {}", path.display());
            println!("{}", path.display());
        }
        None => io::stdout().write_all(&script)?,
    }
    Ok(())
}
