//! Completions and man pages generated from the clap definition.

use std::io::Write;
use std::path::PathBuf;

use clap::CommandFactory;

use crate::Cli;

const BIN_NAME: &str = "tailsync";

fn render_completions(shell: clap_complete::Shell, out: &mut impl Write) {
    clap_complete::generate(shell, &mut Cli::command(), BIN_NAME, out);
}

fn render_man(out: &mut impl Write) -> std::io::Result<()> {
    clap_mangen::Man::new(Cli::command()).render(out)
}

pub(crate) fn handle_completions(
    shell: clap_complete::Shell,
) -> Result<(), Box<dyn std::error::Error>> {
    render_completions(shell, &mut std::io::stdout().lock());
    Ok(())
}

/// Print the top-level page, or write one page per subcommand into `output`.
pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(dir) = output else {
        render_man(&mut std::io::stdout().lock())?;
        return Ok(());
    };

    std::fs::create_dir_all(&dir)?;
    clap_mangen::generate_to(Cli::command(), &dir)?;
    println!("Generated man pages in: {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_mention_subcommands() {
        let mut out = Vec::new();
        render_completions(clap_complete::Shell::Zsh, &mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains(BIN_NAME));
        assert!(script.contains("checkpoint"));
    }

    #[test]
    fn man_page_has_title_and_sync_command() {
        let mut out = Vec::new();
        render_man(&mut out).unwrap();
        let page = String::from_utf8(out).unwrap().to_lowercase();
        assert!(page.contains(".th tailsync"));
        assert!(page.contains("sync"));
    }

    #[test]
    fn man_pages_are_written_per_subcommand() {
        let dir = std::env::temp_dir().join(format!("tailsync-man-{}", std::process::id()));
        handle_man(Some(dir.clone())).unwrap();

        let pages: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(pages.iter().any(|p| p.starts_with("tailsync-sync")));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
