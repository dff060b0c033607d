//! Configuração do labflow carregada a partir de `labflow.toml`.
//!
//! A struct [`LabflowConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `LABFLOW_EXPORT_DIR` tem precedência sobre o arquivo.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::LabflowError;
use crate::rollup::{EmptyJobPolicy, RollupSettings};

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "labflow.toml";

/// Configuração de nível superior carregada de `labflow.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LabflowConfig {
    /// Categoria de frase onde os valores de status vivem.
    #[serde(default = "default_status_category")]
    pub status_category: String,

    /// Status dos jobs que aguardam reavaliação (filtro de candidatos).
    #[serde(default = "default_pending_status")]
    pub pending_status: String,

    /// Status que indica faturado.
    #[serde(default = "default_billed_status")]
    pub billed_status: String,

    /// O que fazer com jobs sem nenhum teste.
    #[serde(default)]
    pub empty_jobs: EmptyJobPolicy,

    /// Diretório raiz das exportações.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Subdiretório (chave) do destino de exportação.
    #[serde(default = "default_export_key")]
    pub export_key: String,

    /// Extensão dos arquivos exportados.
    #[serde(default = "default_export_extension")]
    pub export_extension: String,
}

// Valor padrão para a categoria: "BILLING_STATUS".
fn default_status_category() -> String {
    "BILLING_STATUS".to_string()
}

fn default_pending_status() -> String {
    "PENDING".to_string()
}

fn default_billed_status() -> String {
    "BILLED".to_string()
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_export_key() -> String {
    "results".to_string()
}

fn default_export_extension() -> String {
    "csv".to_string()
}

impl Default for LabflowConfig {
    fn default() -> Self {
        Self {
            status_category: default_status_category(),
            pending_status: default_pending_status(),
            billed_status: default_billed_status(),
            empty_jobs: EmptyJobPolicy::default(),
            export_dir: default_export_dir(),
            export_key: default_export_key(),
            export_extension: default_export_extension(),
        }
    }
}

impl LabflowConfig {
    /// Carrega a configuração de `labflow.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, LabflowError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito, com os mesmos defaults.
    pub fn load_from(path: &Path) -> Result<Self, LabflowError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<LabflowConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para o diretório de exportação.
        if let Some(dir) = export_dir_override(std::env::var("LABFLOW_EXPORT_DIR")) {
            config.export_dir = dir;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejeita valores vazios que tornariam o filtro de candidatos sem sentido.
    pub fn validate(&self) -> Result<(), LabflowError> {
        let required = [
            ("status_category", &self.status_category),
            ("pending_status", &self.pending_status),
            ("billed_status", &self.billed_status),
            ("export_key", &self.export_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(LabflowError::Config(format!("`{name}` must not be empty")));
            }
        }
        if self.pending_status == self.billed_status {
            return Err(LabflowError::Config(
                "`pending_status` and `billed_status` must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Parâmetros do motor de rollup derivados desta configuração.
    pub fn rollup_settings(&self) -> RollupSettings {
        RollupSettings {
            status_category: self.status_category.clone(),
            pending_status: self.pending_status.clone(),
            billed_status: self.billed_status.clone(),
            empty_jobs: self.empty_jobs,
        }
    }
}

/// Diretório vindo de `LABFLOW_EXPORT_DIR`; ausente ou vazio não sobrepõe nada.
fn export_dir_override(var: Result<String, std::env::VarError>) -> Option<PathBuf> {
    if let Ok(dir) = var
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    None
}
