//! Interface de linha de comando do reelgen baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (edit, transition,
//! sfx) e flags globais (--config, --host, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::placer::ReplacePolicy;

pub const DEFAULT_HOST_STATE: &str = "reelgen-host.json";

/// reelgen: gera mídia com IA e posiciona o resultado na timeline.
#[derive(Debug, Parser)]
#[command(name = "reelgen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: ./reelgen.toml, se existir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Arquivo JSON com o estado do host (timeline, seleção, media pool).
    #[arg(long, global = true, default_value = DEFAULT_HOST_STATE)]
    pub host: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Política aplicada ao clipe original, mapeada para [`ReplacePolicy`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReplaceArg {
    /// Remove o clipe original.
    Remove,
    /// Apara o início do original até o fim do clipe novo.
    Trim,
}

impl From<ReplaceArg> for ReplacePolicy {
    fn from(arg: ReplaceArg) -> Self {
        match arg {
            ReplaceArg::Remove => ReplacePolicy::Remove,
            ReplaceArg::Trim => ReplacePolicy::Trim,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Edita com IA o clipe sob o playhead e o substitui na timeline.
    Edit {
        /// Descrição da edição desejada.
        #[arg(long, short)]
        prompt: String,

        /// Proporção de saída (16:9, 4:3, 1:1, 9:16, 3:4, 3:2, 2:3 ou Original).
        #[arg(long)]
        aspect_ratio: Option<String>,

        /// Resolução de saída (720p, 480p ou Original).
        #[arg(long)]
        resolution: Option<String>,

        /// Sobrescreve `replace_policy` do arquivo de configuração.
        #[arg(long)]
        replace: Option<ReplaceArg>,
    },

    /// Gera uma transição entre o clipe sob o playhead e o seguinte.
    Transition {
        /// Descrição da transição; vazio usa o prompt padrão.
        #[arg(long, short, default_value = "")]
        prompt: String,
    },

    /// Gera um efeito sonoro e o coloca no playhead.
    Sfx {
        /// Descrição do som.
        #[arg(long, short)]
        prompt: String,

        /// Duração em segundos (0.5 a 22); omitido deixa o provedor decidir.
        #[arg(long)]
        duration: Option<f64>,

        /// Influência do prompt (0 a 1).
        #[arg(long)]
        influence: Option<f32>,

        /// Faixa de áudio de destino; sobrescreve a configuração.
        #[arg(long)]
        track: Option<u32>,
    },
}
