//! Saída de terminal do voxrelay: spinner enquanto o job roda e resultados
//! coloridos.
//!
//! Usa `indicatif` para o spinner e `console` para as cores.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::jobs::{JobOutput, JobSnapshot, JobState};

/// Acompanha um job no terminal até o estado final.
pub struct JobProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    // Sucesso.
    green: Style,
    // Falha.
    red: Style,
    // Avisos e estados intermediários.
    yellow: Style,
}

impl JobProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("pending: {label}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Reflect a non-terminal snapshot in the spinner message.
    pub fn update(&self, snapshot: &JobSnapshot) {
        if !snapshot.status.is_terminal() {
            self.pb
                .set_message(format!("{}: {} {}", snapshot.status, snapshot.kind, snapshot.id));
        }
    }

    pub fn finish(&self, snapshot: &JobSnapshot) {
        self.pb.finish_and_clear();
        let text = snapshot.display_text.as_deref().unwrap_or_default();
        match snapshot.status {
            JobState::Completed => {
                println!("  {} {text}", self.green.apply_to("✓"));
                if let Some(JobOutput::Reply(reply)) = &snapshot.result
                    && let Some(category) = reply.failure
                {
                    println!(
                        "  {} language model unavailable ({category:?})",
                        self.yellow.apply_to("!")
                    );
                }
            }
            JobState::Failed => {
                println!("  {} {text}", self.red.apply_to("✗"));
                if let Some(error) = &snapshot.error {
                    println!("    {}", self.red.apply_to(error));
                }
            }
            JobState::Pending | JobState::Processing => {
                println!("  {} {text}", self.yellow.apply_to("…"));
            }
        }
    }

    /// Drop the spinner without printing a result.
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }
}

/// One `name: state` line for the status command.
pub fn status_line(name: &str, available: bool, detail: &str) {
    let mark = if available {
        Style::new().green().apply_to("✓")
    } else {
        Style::new().red().apply_to("✗")
    };
    println!("  {mark} {name:<12} {detail}");
}
