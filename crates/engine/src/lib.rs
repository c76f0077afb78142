//! ## ROHC compressor engine
//!
//! [RFC3095]: https://tools.ietf.org/html/rfc3095
//! [Section 4.1]: https://tools.ietf.org/html/rfc3095#section-4.1
//!
//! The ROHC compressor of [RFC3095]. A compressor instance owns a
//! table of per-flow contexts, a set of enabled profiles and the CRC
//! tables shared by every context. For each packet handed to
//! [`Compressor::compress`] the instance picks (or creates) the
//! context the packet belongs to and lets the context's profile build
//! the smallest ROHC packet the decompressor can still reconstruct the
//! original header from ([Section 4.1]).
//!
//! Calls against one compressor must be serialized by the caller; the
//! `&mut self` receivers encode that contract. Independent compressors
//! share nothing.

pub mod context;
pub mod packet;
pub mod profiles;
pub mod rfc3095;

use bytes::BytesMut;
use codec::{
    cid::{self, CidType},
    crc::CrcTables,
    feedback::{self, Feedback},
    headers::{IPPROTO_UDP, IPPROTO_UDPLITE, IpHeader, PacketHeaders},
    writer::PacketWriter,
};

use crate::{
    context::ContextTable,
    packet::{Mode, PacketType, RohcProfile, State},
    profiles::{
        ProfileContext, ip::IpBehavior, udp::UdpBehavior, udp_lite::UdpLiteBehavior,
        uncompressed::UncompressedContext,
    },
    rfc3095::{Env, Rfc3095Context},
};

#[derive(Debug)]
pub enum EngineError {
    BufferTooSmall,
    MalformedPacket,
    MalformedFeedback,
    ProfileNotFound,
    UnsupportedProfile,
    UnknownPacketType,
    CidTooLarge,
}

impl std::error::Error for EngineError {}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<codec::Error> for EngineError {
    fn from(value: codec::Error) -> Self {
        match value {
            codec::Error::BufferTooSmall => Self::BufferTooSmall,
            codec::Error::MalformedFeedback => Self::MalformedFeedback,
            codec::Error::CidTooLarge => Self::CidTooLarge,
            codec::Error::InvalidInput | codec::Error::TryFromSliceError(_) => Self::MalformedPacket,
        }
    }
}

/// Compressor-wide tunables.
pub struct CompressorOptions {
    pub cid_type: CidType,
    pub max_cid: u16,
    /// Optimistic approach: how often a changed field is repeated
    /// before the compressor trusts the decompressor saw it.
    pub oa_repetitions_nr: u8,
    /// Packets between forced IR refreshes in unidirectional mode.
    pub periodic_refreshes_ir_timeout: usize,
    /// Packets between forced FO refreshes in unidirectional mode.
    pub periodic_refreshes_fo_timeout: usize,
    /// Depth of the W-LSB windows.
    pub wlsb_window_width: usize,
}

impl Default for CompressorOptions {
    fn default() -> Self {
        Self {
            cid_type: CidType::Small,
            max_cid: cid::SMALL_CID_MAX,
            oa_repetitions_nr: 4,
            periodic_refreshes_ir_timeout: 1700,
            periodic_refreshes_fo_timeout: 700,
            wlsb_window_width: 4,
        }
    }
}

/// What [`Compressor::compress`] produced last, as the test drivers
/// inspect it.
#[derive(Debug, Clone, Copy)]
pub struct LastPacketInfo {
    pub profile: RohcProfile,
    pub cid: u16,
    pub packet_type: PacketType,
    pub mode: Mode,
    pub state: State,
}

/// Fixed priority order in which enabled profiles are probed for a new
/// flow; the uncompressed profile accepts anything, so it goes last.
const PROFILE_REGISTRY: [RohcProfile; 4] = [
    RohcProfile::Udp,
    RohcProfile::UdpLite,
    RohcProfile::Ip,
    RohcProfile::Uncompressed,
];

pub struct Compressor {
    options: CompressorOptions,
    enabled: Vec<RohcProfile>,
    contexts: ContextTable,
    tables: CrcTables,
    random_cb: Box<dyn FnMut() -> u32 + Send>,
    feedback_scratch: BytesMut,
    last: Option<LastPacketInfo>,
}

impl Compressor {
    pub fn new(mut options: CompressorOptions) -> Self {
        options.max_cid = options.max_cid.min(options.cid_type.max_cid());

        Self {
            options,
            enabled: Vec::new(),
            contexts: ContextTable::new(),
            tables: CrcTables::default(),
            random_cb: Box::new(|| rand::random::<u32>()),
            feedback_scratch: BytesMut::with_capacity(64),
            last: None,
        }
    }

    /// Enable a compression profile. Recognized but unimplemented
    /// profiles (RTP, ESP, RTP/UDP-Lite) are rejected.
    pub fn activate_profile(&mut self, profile: RohcProfile) -> Result<(), EngineError> {
        if !profile.is_supported() {
            return Err(EngineError::UnsupportedProfile);
        }

        if !self.enabled.contains(&profile) {
            self.enabled.push(profile);
        }

        Ok(())
    }

    /// Switch the channel between small and large CIDs. Only sensible
    /// before the first packet; live contexts keep their CIDs.
    pub fn set_large_cid(&mut self, large_cid: bool) {
        self.options.cid_type = if large_cid {
            CidType::Large
        } else {
            CidType::Small
        };

        self.options.max_cid = self.options.max_cid.min(self.options.cid_type.max_cid());
    }

    /// Install the random source used to seed the sequence number of
    /// new contexts (RFC 3095, 5.11.1). It is polled exactly once per
    /// created context.
    pub fn set_random_cb(&mut self, callback: impl FnMut() -> u32 + Send + 'static) {
        self.random_cb = Box::new(callback);
    }

    /// Compress one uncompressed IP packet into `output`.
    ///
    /// Returns the number of octets written. A too-small output buffer
    /// fails without touching the flow's context; a malformed packet
    /// fails and regresses the context (if any was identified) to IR
    /// so the peers re-synchronize.
    pub fn compress(&mut self, packet: &[u8], output: &mut [u8]) -> Result<usize, EngineError> {
        let headers = PacketHeaders::parse(packet)?;

        // compressed chains never outgrow the headers they replace:
        // rejecting short buffers up front keeps the context untouched
        // on capacity failures.
        if output.len() < packet.len() + 8 {
            return Err(EngineError::BufferTooSmall);
        }

        let profile = self
            .select_profile(&headers)
            .ok_or(EngineError::ProfileNotFound)?;

        let cid = match self.contexts.find(profile, &headers) {
            Some(cid) => cid,
            None => self.create_context(profile, &headers)?,
        };

        let env = Env {
            cid_type: self.options.cid_type,
            oa_repetitions_nr: self.options.oa_repetitions_nr,
            periodic_refreshes_ir_timeout: self.options.periodic_refreshes_ir_timeout,
            periodic_refreshes_fo_timeout: self.options.periodic_refreshes_fo_timeout,
            tables: &self.tables,
        };

        let Some(context) = self.contexts.get_mut(cid) else {
            return Err(EngineError::ProfileNotFound);
        };

        let mut writer = PacketWriter::new(output);
        match context
            .specific
            .encode(&mut context.core, &headers, &mut writer, &env)
        {
            Ok((packet_type, payload_offset)) => {
                writer.extend(&packet[payload_offset..])?;

                self.last = Some(LastPacketInfo {
                    profile,
                    cid,
                    packet_type,
                    mode: context.core.mode,
                    state: context.core.state,
                });
                self.contexts.touch(cid);

                log::debug!(
                    "compressed {} octets to {} ({} via profile {:?}, cid={})",
                    packet.len(),
                    writer.len(),
                    packet_type,
                    profile,
                    cid
                );

                Ok(writer.len())
            }
            Err(error) => {
                if matches!(error, EngineError::MalformedPacket) {
                    context.core.state = State::Ir;
                }

                Err(error)
            }
        }
    }

    pub fn last_packet_info(&self) -> Option<&LastPacketInfo> {
        self.last.as_ref()
    }

    /// Hand a feedback element received from the decompressor peer to
    /// the context it addresses.
    ///
    /// Undecodable feedback is dropped with a diagnostic, never fatal:
    /// feedback travels on a lossy channel and the state machines are
    /// built to survive without it.
    pub fn deliver_feedback(&mut self, data: &[u8]) -> Result<(), EngineError> {
        if data.is_empty() {
            return Err(EngineError::MalformedFeedback);
        }

        self.feedback_scratch.clear();
        self.feedback_scratch.extend_from_slice(data);

        let (cid, specific_offset) =
            match cid::decode(&self.feedback_scratch, self.options.cid_type) {
                Ok(parsed) => parsed,
                Err(_) => {
                    log::warn!("feedback with undecodable CID information, dropped");
                    return Ok(());
                }
            };

        let Some(context) = self.contexts.get_mut(cid) else {
            log::warn!("feedback for unknown cid={}, dropped", cid);
            return Ok(());
        };

        let parsed = match feedback::parse(&mut self.feedback_scratch, specific_offset, &self.tables)
        {
            Ok(parsed) => parsed,
            Err(error) => {
                log::warn!("undecodable feedback for cid={}: {}, dropped", cid, error);
                return Ok(());
            }
        };

        if let Feedback::Feedback2(fb) = &parsed {
            for option in &fb.ignored_options {
                log::debug!("cid={}: ignoring feedback option {}", cid, option);
            }
        }

        context.specific.feedback(&mut context.core, &parsed);
        Ok(())
    }

    fn select_profile(&self, headers: &PacketHeaders<'_>) -> Option<RohcProfile> {
        PROFILE_REGISTRY
            .into_iter()
            .filter(|profile| self.enabled.contains(profile))
            .find(|profile| match profile {
                RohcProfile::Udp => {
                    headers.udp.is_some()
                        && headers.inner.protocol() == IPPROTO_UDP
                        && compressible_ip(headers)
                }
                RohcProfile::UdpLite => {
                    headers.udp.is_some()
                        && headers.inner.protocol() == IPPROTO_UDPLITE
                        && compressible_ip(headers)
                }
                RohcProfile::Ip => compressible_ip(headers),
                RohcProfile::Uncompressed => true,
                _ => false,
            })
    }

    fn create_context(
        &mut self,
        profile: RohcProfile,
        headers: &PacketHeaders<'_>,
    ) -> Result<u16, EngineError> {
        let width = self.options.wlsb_window_width;

        let specific = match profile {
            RohcProfile::Uncompressed => ProfileContext::Uncompressed(UncompressedContext::new()),
            RohcProfile::Ip => {
                let seed = (self.random_cb)() as u16;
                ProfileContext::Ip(Rfc3095Context::new(headers, IpBehavior, seed, width))
            }
            RohcProfile::Udp => {
                let udp = headers.udp.ok_or(EngineError::MalformedPacket)?;
                let seed = (self.random_cb)() as u16;
                ProfileContext::Udp(Rfc3095Context::new(
                    headers,
                    UdpBehavior::new(udp),
                    seed,
                    width,
                ))
            }
            RohcProfile::UdpLite => {
                let udp = headers.udp.ok_or(EngineError::MalformedPacket)?;
                let seed = (self.random_cb)() as u16;
                ProfileContext::UdpLite(Rfc3095Context::new(
                    headers,
                    UdpLiteBehavior::new(udp),
                    seed,
                    width,
                ))
            }
            _ => return Err(EngineError::UnsupportedProfile),
        };

        let cid = self.contexts.insert(self.options.max_cid, specific);
        log::info!("new context cid={} with profile {:?}", cid, profile);

        Ok(cid)
    }
}

/// Whether the RFC 3095 IP compression can describe the header stack:
/// no fragments, no IPv4 options on any level.
fn compressible_ip(headers: &PacketHeaders<'_>) -> bool {
    let level_ok = |header: &IpHeader| match header {
        IpHeader::V4(v4) => !v4.is_fragmented() && !v4.has_options(),
        IpHeader::V6(_) => true,
    };

    headers.outer.as_ref().map(level_ok).unwrap_or(true) && level_ok(&headers.inner)
}
