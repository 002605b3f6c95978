//! Configuração do reelgen carregada a partir de `reelgen.toml`.
//!
//! A struct [`ReelgenConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis, e cada
//! provedor pode sobrescrever intervalos e limites em `[providers.<tipo>]`.
//! As variáveis de ambiente `GROK_API_KEY`, `LUMA_API_KEY` e
//! `ELEVENLABS_API_KEY` têm precedência sobre a tabela `[credentials]`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ReelgenError, Result};
use crate::orchestrator::PollPolicy;
use crate::placer::ReplacePolicy;
use crate::provider::{HttpTimeouts, ProviderKind};
use crate::state_machine::RetryConfig;

pub const DEFAULT_CONFIG_FILE: &str = "reelgen.toml";

/// Configuração de nível superior carregada de `reelgen.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReelgenConfig {
    /// Diretório onde os arquivos gerados são gravados. Quando ausente, usa a
    /// pasta de mídia do projeto informada pelo host.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// O que fazer com o clipe original após uma edição de vídeo.
    #[serde(default)]
    pub replace_policy: ReplacePolicy,

    /// Faixa de áudio (1-based) que recebe efeitos sonoros.
    #[serde(default = "default_sound_effect_track")]
    pub sound_effect_track: u32,

    /// Endpoint de upload para publicar mídia de origem.
    #[serde(default = "default_publish_url")]
    pub publish_url: String,

    /// Timeout de conexão HTTP em segundos.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout de requisições longas (envio, download) em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Chaves de API por provedor: `grok`, `luma`, `elevenlabs`.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,

    /// Política de retentativa comum a todos os provedores.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Ajustes por provedor, indexados por `video_edit`, `transition`, `sound_effect`.
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

/// Espelho de [`RetryConfig`] com todos os campos opcionais.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySettings {
    pub max_transport_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_not_found: Option<u32>,
    pub max_integrity_retries: Option<u32>,
}

impl RetrySettings {
    fn apply(&self, base: &mut RetryConfig) {
        if let Some(v) = self.max_transport_retries {
            base.max_transport_retries = v;
        }
        if let Some(v) = self.base_delay_ms {
            base.base_delay_ms = v;
        }
        if let Some(v) = self.max_delay_ms {
            base.max_delay_ms = v;
        }
        if let Some(v) = self.max_not_found {
            base.max_not_found = v;
        }
        if let Some(v) = self.max_integrity_retries {
            base.max_integrity_retries = v;
        }
    }
}

/// Sobrescritas para um único provedor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub poll_timeout_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry: RetrySettings,
}

// Valor padrão para a faixa de efeitos sonoros: A1.
fn default_sound_effect_track() -> u32 {
    1
}

fn default_publish_url() -> String {
    "https://tmpfiles.org/api/v1/upload".to_string()
}

// Valor padrão para o timeout de conexão: 10s.
fn default_connect_timeout_secs() -> u64 {
    10
}

// Valor padrão para o timeout de requisição: 120s.
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ReelgenConfig {
    fn default() -> Self {
        Self {
            staging_dir: None,
            replace_policy: ReplacePolicy::default(),
            sound_effect_track: default_sound_effect_track(),
            publish_url: default_publish_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            credentials: BTreeMap::new(),
            retry: RetrySettings::default(),
            providers: HashMap::new(),
        }
    }
}

impl ReelgenConfig {
    /// Carrega a configuração de `path`, ou de `reelgen.toml` no diretório
    /// atual. Um caminho explícito inexistente é erro; o arquivo padrão
    /// ausente resulta nos defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let path = match path {
            Some(path) => Some(path),
            None if default_path.exists() => Some(default_path),
            None => None,
        };
        let config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    ReelgenError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::parse(&contents)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str::<ReelgenConfig>(contents)?)
    }

    /// Rejeita combinações de tempo inconsistentes.
    pub fn validate(&self) -> Result<()> {
        if self.sound_effect_track == 0 {
            return Err(ReelgenError::Config(
                "sound_effect_track is 1-based".into(),
            ));
        }
        if let Some(unknown) = self
            .providers
            .keys()
            .find(|key| !ProviderKind::ALL.iter().any(|k| k.config_key() == key.as_str()))
        {
            return Err(ReelgenError::Config(format!(
                "unknown provider table [providers.{unknown}]"
            )));
        }
        for kind in ProviderKind::ALL {
            let policy = self.poll_policy(kind);
            if policy.poll_interval.is_zero() {
                return Err(ReelgenError::Config(format!(
                    "{kind}: poll interval must be positive"
                )));
            }
            if policy.poll_timeout >= policy.poll_interval {
                return Err(ReelgenError::Config(format!(
                    "{kind}: poll timeout ({}ms) must be shorter than the poll interval ({}ms)",
                    policy.poll_timeout.as_millis(),
                    policy.poll_interval.as_millis()
                )));
            }
            if policy.timeout < policy.poll_interval {
                return Err(ReelgenError::Config(format!(
                    "{kind}: timeout is shorter than one poll interval"
                )));
            }
        }
        Ok(())
    }

    /// Política de espera efetiva para `kind` (defaults + sobrescritas).
    pub fn poll_policy(&self, kind: ProviderKind) -> PollPolicy {
        let mut policy = PollPolicy::for_kind(kind);
        self.retry.apply(&mut policy.retry);
        if let Some(settings) = self.providers.get(kind.config_key()) {
            if let Some(ms) = settings.poll_interval_ms {
                policy.poll_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = settings.poll_timeout_ms {
                policy.poll_timeout = Duration::from_millis(ms);
            }
            if let Some(secs) = settings.timeout_secs {
                policy.timeout = Duration::from_secs(secs);
            }
            settings.retry.apply(&mut policy.retry);
        }
        policy
    }

    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            request: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn base_url(&self, kind: ProviderKind) -> Option<String> {
        self.providers
            .get(kind.config_key())
            .and_then(|s| s.base_url.clone())
    }
}

/// Chaves de API resolvidas uma única vez na inicialização.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<ProviderKind, String>,
}

impl Credentials {
    pub fn resolve(config: &ReelgenConfig) -> Self {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve com uma fonte de ambiente injetável; o ambiente vence o arquivo.
    pub fn resolve_with(config: &ReelgenConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut keys = HashMap::new();
        for kind in ProviderKind::ALL {
            let value = env(kind.env_var())
                .filter(|v| !v.trim().is_empty())
                .or_else(|| {
                    config
                        .credentials
                        .get(kind.credential_name())
                        .filter(|v| !v.trim().is_empty())
                        .cloned()
                });
            if let Some(value) = value {
                keys.insert(kind, value);
            }
        }
        Self { keys }
    }

    pub fn require(&self, kind: ProviderKind) -> Result<&str> {
        self.keys.get(&kind).map(String::as_str).ok_or_else(|| {
            ReelgenError::Config(format!(
                "no credential for {kind}: set {} or [credentials].{}",
                kind.env_var(),
                kind.credential_name()
            ))
        })
    }
}
