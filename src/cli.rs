//! Interface de linha de comando do labflow baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (rollup, export, status, demo)
//! e flags globais (--store, --config, --json, --verbose, --quiet).

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// labflow: rollup de faturamento e exportação de resultados de laboratório.
#[derive(Debug, Parser)]
#[command(name = "labflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Snapshot JSON do record store.
    #[arg(long, global = true, default_value = "labflow-store.json")]
    pub store: PathBuf,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Imprime o registro da execução em JSON em vez do resumo colorido.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Mostra apenas erros.
    #[arg(long, short, global = true, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Promove para faturado os jobs pendentes cujos testes estão todos faturados.
    Rollup {
        /// Avalia e reporta sem gravar nada no store.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Exporta os resultados da seleção para um novo arquivo CSV.
    Export {
        #[command(flatten)]
        roots: RootArgs,

        /// Diretório de saída (sobrepõe `export_dir` da configuração).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Mostra a contagem de jobs por status e os candidatos ao rollup.
    Status,

    /// Executa os dois pipelines sobre uma hierarquia de exemplo embutida.
    Demo,
}

/// Seleção raiz: exatamente um tipo de unidade por chamada.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct RootArgs {
    /// IDs de jobs.
    #[arg(long = "job", num_args = 1..)]
    pub jobs: Vec<String>,

    /// IDs de amostras.
    #[arg(long = "sample", num_args = 1..)]
    pub samples: Vec<String>,

    /// IDs de testes.
    #[arg(long = "test", num_args = 1..)]
    pub tests: Vec<String>,
}
