//! Interface de terminal do labflow: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente
//! a execução de um rollup ou de uma exportação no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::{RunKind, RunRecord, RunStatus, StoreStatus};
use crate::rollup::CandidateOutcome;

/// Indicador visual de progresso para uma execução em lote.
///
/// Exibe um spinner animado durante o processamento e mensagens
/// coloridas para sucesso (verde), falha (vermelho) e pendências (amarelo).
pub struct RunProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl RunProgress {
    /// Inicia o spinner com a mensagem fornecida.
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Finaliza o spinner e exibe o resumo da execução.
    ///
    /// Sucesso é mostrado em verde com checkmark; falha em vermelho com X.
    pub fn complete(&self, record: &RunRecord) {
        self.pb.finish_and_clear();
        match record.status {
            RunStatus::Succeeded => {
                println!("  {} {}", self.green.apply_to("✓"), summary_line(record));
            }
            RunStatus::Failed => {
                println!(
                    "  {} {} failed: {}",
                    self.red.apply_to("✗"),
                    kind_label(record.kind),
                    record.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    /// Lista cada candidato avaliado pelo rollup com o seu desfecho.
    pub fn print_candidates(&self, record: &RunRecord) {
        for candidate in &record.candidates {
            let line = match &candidate.outcome {
                CandidateOutcome::Promoted => {
                    format!("{} {}", self.green.apply_to("billed "), candidate.job)
                }
                CandidateOutcome::Held { first_unbilled } => format!(
                    "{} {} {}",
                    self.yellow.apply_to("held   "),
                    candidate.job,
                    self.dim.apply_to(format!("(test {first_unbilled} not billed)"))
                ),
                CandidateOutcome::HeldEmpty => format!(
                    "{} {} {}",
                    self.yellow.apply_to("held   "),
                    candidate.job,
                    self.dim.apply_to("(no tests)")
                ),
                CandidateOutcome::Skipped { error } => format!(
                    "{} {} {}",
                    self.red.apply_to("skipped"),
                    candidate.job,
                    self.dim.apply_to(format!("({error})"))
                ),
            };
            println!("    {line}");
        }
    }

    /// Lista as linhas descartadas por referências quebradas.
    pub fn print_skipped_rows(&self, record: &RunRecord) {
        for skipped in &record.skipped_rows {
            println!(
                "    {} {} {} {}",
                self.yellow.apply_to("skipped"),
                skipped.kind,
                skipped.id,
                self.dim.apply_to(format!("({})", skipped.error))
            );
        }
    }
}

/// Imprime o registro da execução formatado em JSON.
pub fn print_json(record: &RunRecord) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// Imprime a contagem de jobs por status e os candidatos atuais.
pub fn print_status(status: &StoreStatus, pending: &str) {
    let bold = Style::new().bold();
    println!("{}", bold.apply_to("Jobs by state"));
    for (state, count) in &status.jobs_by_state {
        println!("  {state:<16} {count}");
    }
    println!();
    println!(
        "{} ({pending}): {}",
        bold.apply_to("Rollup candidates"),
        status.candidates.len()
    );
    for id in &status.candidates {
        println!("  {id}");
    }
}

fn kind_label(kind: RunKind) -> &'static str {
    match kind {
        RunKind::Rollup => "Rollup",
        RunKind::Export => "Export",
    }
}

// Linha de resumo de uma execução bem-sucedida.
fn summary_line(record: &RunRecord) -> String {
    match record.kind {
        RunKind::Rollup => {
            let verb = if record.dry_run { "would promote" } else { "promoted" };
            format!(
                "Rollup {verb} {} job(s), {} held, {} skipped",
                record.promoted, record.held, record.skipped
            )
        }
        RunKind::Export => format!(
            "Export wrote {} row(s) to {} ({} skipped)",
            record.rows_written,
            record.target.as_deref().unwrap_or("-"),
            record.skipped
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabflowConfig;
    use crate::orchestrator::BatchRunner;
    use crate::rollup::RollupOptions;
    use crate::store::MemoryStore;

    #[test]
    fn summary_line_for_dry_run() {
        let mut store = MemoryStore::new();
        store.add_phrase("BILLING_STATUS", "BILLED", "Billed");
        let runner = BatchRunner::new(LabflowConfig::default());

        let record = runner.rollup(&mut store, RollupOptions { dry_run: true });
        assert_eq!(
            summary_line(&record),
            "Rollup would promote 0 job(s), 0 held, 0 skipped"
        );
    }

    #[test]
    fn print_json_reports_success() {
        let mut store = MemoryStore::new();
        store.add_phrase("BILLING_STATUS", "BILLED", "Billed");
        let runner = BatchRunner::new(LabflowConfig::default());

        let record = runner.rollup(&mut store, RollupOptions::default());
        assert!(print_json(&record).is_ok());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(kind_label(RunKind::Rollup), "Rollup");
        assert_eq!(kind_label(RunKind::Export), "Export");
    }
}
