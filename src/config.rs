use clap::Parser;
use codec::cid::CidType;
use engine::CompressorOptions;
use serde::*;
use std::fs::read_to_string;

#[derive(Deserialize, Debug)]
pub struct Rohc {
    /// maximum context identifier
    ///
    /// the highest CID the compressor may assign. with small CIDs the
    /// channel supports 0..15, with large CIDs 0..16383. flows beyond
    /// the maximum recycle the least recently used context.
    #[serde(default = "Rohc::max_cid")]
    pub max_cid: u16,

    /// large CID channel
    ///
    /// whether the channel to the decompressor was negotiated with
    /// large CIDs. both sides must agree on this out of band.
    #[serde(default)]
    pub large_cid: bool,

    /// optimistic approach repetitions
    ///
    /// how often a changed field is repeated before the compressor
    /// trusts that the decompressor saw at least one copy. higher
    /// values survive worse channels at the cost of compression.
    #[serde(default = "Rohc::oa_repetitions_nr")]
    pub oa_repetitions_nr: u8,

    /// periodic IR refresh, in packets
    ///
    /// in unidirectional mode the compressor periodically drops back
    /// to the IR state so a decompressor that lost its context can
    /// recover without a feedback channel.
    #[serde(default = "Rohc::periodic_refreshes_ir_timeout")]
    pub periodic_refreshes_ir_timeout: usize,

    /// periodic FO refresh, in packets
    #[serde(default = "Rohc::periodic_refreshes_fo_timeout")]
    pub periodic_refreshes_fo_timeout: usize,

    /// W-LSB window depth
    #[serde(default = "Rohc::wlsb_window_width")]
    pub wlsb_window_width: usize,

    /// enabled profile identifiers
    ///
    /// the RFC 3095 profile registry ids to enable, e.g. 0 for
    /// uncompressed, 2 for UDP, 4 for IP-only and 8 for UDP-Lite.
    #[serde(default = "Rohc::profiles")]
    pub profiles: Vec<u16>,
}

impl Rohc {
    fn max_cid() -> u16 {
        15
    }

    fn oa_repetitions_nr() -> u8 {
        4
    }

    fn periodic_refreshes_ir_timeout() -> usize {
        1700
    }

    fn periodic_refreshes_fo_timeout() -> usize {
        700
    }

    fn wlsb_window_width() -> usize {
        4
    }

    fn profiles() -> Vec<u16> {
        vec![0x0000, 0x0002, 0x0004, 0x0008]
    }

    pub fn to_options(&self) -> CompressorOptions {
        CompressorOptions {
            cid_type: if self.large_cid {
                CidType::Large
            } else {
                CidType::Small
            },
            max_cid: self.max_cid,
            oa_repetitions_nr: self.oa_repetitions_nr,
            periodic_refreshes_ir_timeout: self.periodic_refreshes_ir_timeout,
            periodic_refreshes_fo_timeout: self.periodic_refreshes_fo_timeout,
            wlsb_window_width: self.wlsb_window_width,
        }
    }
}

impl Default for Rohc {
    fn default() -> Self {
        Self {
            max_cid: Self::max_cid(),
            large_cid: false,
            oa_repetitions_nr: Self::oa_repetitions_nr(),
            periodic_refreshes_ir_timeout: Self::periodic_refreshes_ir_timeout(),
            periodic_refreshes_fo_timeout: Self::periodic_refreshes_fo_timeout(),
            wlsb_window_width: Self::wlsb_window_width(),
            profiles: Self::profiles(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    /// log level
    ///
    /// An enum representing the available verbosity levels of the logger.
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub rohc: Rohc,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    disable_help_flag = true,
)]
pub struct Cli {
    /// print this usage and exit
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    pub help: bool,

    /// specify the configuration file path.
    #[arg(long)]
    pub config: Option<String>,

    /// the flow of frames to compress (in PCAP format)
    pub flow: Option<String>,

    /// the packet type expected for the last packet, among: ir, irdyn,
    /// uo0, uo1, uor2 and normal
    pub packet_type: Option<String>,
}

impl Config {
    /// Read the configuration from the given file, or fall back to the
    /// defaults when no file was specified.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let cfg_str = match path {
            Some(path) => read_to_string(path)?,
            None => "".to_string(),
        };

        Ok(toml::from_str(&cfg_str)?)
    }
}
