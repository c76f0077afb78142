//! Generic RFC 3095 compression engine.
//!
//! [Section 4.3]: https://tools.ietf.org/html/rfc3095#section-4.3
//! [Section 5.7]: https://tools.ietf.org/html/rfc3095#section-5.7
//!
//! The IP-only, UDP and UDP-Lite profiles share almost everything: the
//! IR/FO/SO state machine of [Section 4.3], the W-LSB tracking of the
//! sequence number and the IP-ID offsets, the change detection over the
//! IP headers and the packet builders of [Section 5.7]. The pieces that
//! differ per profile - the transport static/dynamic chains, the UO
//! packet tail and the CRC coverage of the transport header - are
//! behind the [`ProfileBehavior`] trait, one implementation per
//! profile.

use codec::{
    cid::{self, CidType},
    crc::{CrcKind, CrcTables},
    feedback::{AckType, CrcStatus, Feedback},
    headers::{IpHeader, PacketHeaders},
    wlsb::{ShiftParam, Wlsb},
    writer::PacketWriter,
};

use crate::{
    EngineError,
    context::ContextCore,
    packet::{Mode, PacketType, RohcProfile, State},
};

/// Per-packet environment handed down from the compressor.
pub struct Env<'a> {
    pub cid_type: CidType,
    pub oa_repetitions_nr: u8,
    pub periodic_refreshes_ir_timeout: usize,
    pub periodic_refreshes_fo_timeout: usize,
    pub tables: &'a CrcTables,
}

/// The hook set a profile installs into the generic engine.
///
/// The original architecture wires these as function pointers in the
/// profile context; here the closed set of profiles makes them a trait
/// with one concrete implementation each.
pub trait ProfileBehavior {
    fn profile(&self) -> RohcProfile;

    /// Length of the transport header consumed by the compressed
    /// chain, on top of the IP headers.
    fn next_header_len(&self) -> usize;

    /// Whether an incoming packet still belongs to this context
    /// (transport part only, IP levels are matched generically).
    fn matches(&self, headers: &PacketHeaders<'_>) -> bool;

    /// Per-packet change detection over the transport header. Returns
    /// true when the profile demands a regression to the IR state.
    fn detect_changes(&mut self, headers: &PacketHeaders<'_>, oa_repetitions_nr: u8) -> bool;

    fn code_static_part(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError>;

    fn code_dynamic_part(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError>;

    /// Transport fields riding in the tail of every UO packet.
    fn code_uo_remainder(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError>;

    fn crc_static(
        &self,
        headers: &PacketHeaders<'_>,
        kind: CrcKind,
        crc: u8,
        tables: &CrcTables,
    ) -> u8;

    fn crc_dynamic(
        &self,
        headers: &PacketHeaders<'_>,
        kind: CrcKind,
        crc: u8,
        tables: &CrcTables,
    ) -> u8;

    /// Commit transport context updates once a packet was built.
    fn update(&mut self, headers: &PacketHeaders<'_>, packet_type: PacketType, oa_repetitions_nr: u8);
}

/// IP-ID deltas larger than this are treated as random jumps.
const IP_ID_MAX_DELTA: u16 = 20;

/// One IP header level of the context.
struct IpLevel {
    header: IpHeader,
    /// W-LSB window over the IP-ID offset (IP-ID minus SN).
    id_window: Wlsb,
    rnd: bool,
    nbo: bool,
    rnd_count: u8,
    nbo_count: u8,
    tos_count: u8,
    ttl_count: u8,
    df_count: u8,
}

impl IpLevel {
    fn new(header: IpHeader, window_depth: usize) -> Self {
        Self {
            header,
            id_window: Wlsb::new(window_depth, ShiftParam::Zero),
            rnd: false,
            nbo: true,
            rnd_count: 0,
            nbo_count: 0,
            tos_count: 0,
            ttl_count: 0,
            df_count: 0,
        }
    }
}

/// Change analysis of one IP level for the packet under compression.
#[derive(Debug, Default, Clone, Copy)]
struct LevelChanges {
    new_rnd: bool,
    new_nbo: bool,
    rnd_changed: bool,
    nbo_changed: bool,
    send_tos: bool,
    send_ttl: bool,
    send_df: bool,
    /// W-LSB bits required for the IP-ID offset; zero for IPv6 and for
    /// random IP-IDs, which travel in full.
    id_bits: u8,
    id_offset: u16,
}

impl LevelChanges {
    fn dynamic_fields(&self) -> usize {
        [
            self.rnd_changed,
            self.nbo_changed,
            self.send_tos,
            self.send_ttl,
            self.send_df,
        ]
        .iter()
        .filter(|flag| **flag)
        .count()
    }

    fn needs_flags_octet(&self) -> bool {
        self.send_tos || self.send_ttl || self.send_df || self.rnd_changed || self.nbo_changed
    }
}

/// Scratch results of the per-packet analysis phase. Rebuilt for every
/// packet, never carried across packets.
#[derive(Debug, Default)]
struct Changes {
    static_changed: bool,
    force_ir: bool,
    sn_bits: u8,
    inner: LevelChanges,
    outer: LevelChanges,
}

impl Changes {
    fn dynamic_fields(&self) -> usize {
        self.inner.dynamic_fields() + self.outer.dynamic_fields()
    }
}

/// How the state machine moves for the packet under compression.
struct StateDecision {
    next: State,
    refresh_ir: bool,
    refresh_fo: bool,
    bump_go_back_ir: bool,
    bump_go_back_fo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extension {
    None,
    Ext0,
    Ext1,
    Ext2,
    Ext3,
}

/// The generic part of an RFC 3095 compression context.
pub struct Rfc3095Context<B> {
    sn: u16,
    sn_window: Wlsb,
    outer: Option<IpLevel>,
    inner: IpLevel,
    ir_count: usize,
    fo_count: usize,
    so_count: usize,
    go_back_ir_count: usize,
    go_back_fo_count: usize,
    tmp: Changes,
    pub behavior: B,
}

impl<B: ProfileBehavior> Rfc3095Context<B> {
    /// Create the generic context part. `sn_seed` comes from the
    /// compressor's random source, which is polled exactly once per
    /// context (RFC 3095, 5.11.1).
    pub fn new(
        headers: &PacketHeaders<'_>,
        behavior: B,
        sn_seed: u16,
        window_depth: usize,
    ) -> Self {
        Self {
            sn: sn_seed,
            sn_window: Wlsb::new(window_depth, ShiftParam::Sn),
            outer: headers.outer.map(|header| IpLevel::new(header, window_depth)),
            inner: IpLevel::new(headers.inner, window_depth),
            ir_count: 0,
            fo_count: 0,
            so_count: 0,
            go_back_ir_count: 0,
            go_back_fo_count: 0,
            tmp: Changes::default(),
            behavior,
        }
    }

    /// Whether the IP part of `headers` still belongs to this context.
    pub fn matches(&self, headers: &PacketHeaders<'_>) -> bool {
        let outer_matches = match (&self.outer, &headers.outer) {
            (None, None) => true,
            (Some(level), Some(header)) => level.header.same_flow(header),
            _ => false,
        };

        outer_matches && self.inner.header.same_flow(&headers.inner) && self.behavior.matches(headers)
    }

    /// Compress one packet into `writer`.
    ///
    /// Returns the packet classification and the offset into the
    /// uncompressed packet where the untouched payload starts. Context
    /// state is only committed after the packet was fully built, so a
    /// too-small output buffer leaves the context untouched.
    pub fn encode(
        &mut self,
        core: &mut ContextCore,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(PacketType, usize), EngineError> {
        let new_sn = self.sn.wrapping_add(1);

        self.detect_changes(headers, new_sn, env.oa_repetitions_nr);
        let decision = self.decide_state(core, env);
        let packet_type = self.decide_packet(&decision, headers);

        log::debug!(
            "cid={}: state {:?} -> {:?}, packet {}",
            core.cid,
            core.state,
            decision.next,
            packet_type
        );

        match packet_type {
            PacketType::Ir => self.build_ir(core, headers, new_sn, writer, env)?,
            PacketType::IrDyn => self.build_ir_dyn(core, headers, new_sn, writer, env)?,
            PacketType::Uo0 => self.build_uo0(core, headers, new_sn, writer, env)?,
            PacketType::Uo1 => self.build_uo1(core, headers, new_sn, writer, env)?,
            PacketType::Uor2 => self.build_uor2(core, headers, new_sn, writer, env)?,
            PacketType::Normal => unreachable!("normal packets belong to the uncompressed profile"),
        }

        self.commit(core, headers, new_sn, packet_type, decision, env);

        let payload_offset = headers.ip_headers_len() + self.behavior.next_header_len();
        Ok((packet_type, payload_offset))
    }

    /// Apply a feedback element to this context.
    pub fn feedback(&mut self, core: &mut ContextCore, feedback: &Feedback) {
        let fb = match feedback {
            Feedback::Ack1 { sn } => {
                log::trace!("cid={}: FEEDBACK-1 ACK (sn bits 0x{:02x})", core.cid, sn);
                return;
            }
            Feedback::Feedback2(fb) => fb,
        };

        if fb.crc == CrcStatus::Invalid {
            log::warn!("cid={}: feedback CRC check failed, feedback ignored", core.cid);
            return;
        }

        if fb.mode != 0 {
            if fb.crc == CrcStatus::Valid && matches!(fb.acktype, AckType::Ack | AckType::Nack) {
                if let Ok(mode) = Mode::try_from(fb.mode) {
                    self.change_mode(core, mode);
                }
            } else {
                log::warn!("cid={}: mode change requested but no CRC was given", core.cid);
            }
        }

        match fb.acktype {
            AckType::Ack => {
                if !fb.sn_not_valid {
                    let sn = fb.sn as u16;
                    self.sn_window.ack(sn);
                    self.inner.id_window.ack(sn);
                    if let Some(outer) = self.outer.as_mut() {
                        outer.id_window.ack(sn);
                    }
                }
            }
            AckType::Nack => {
                if core.state == State::So {
                    self.change_state(core, State::Fo);
                }
            }
            AckType::StaticNack => {
                self.change_state(core, State::Ir);
            }
            AckType::Reserved => {
                log::warn!("cid={}: reserved acktype used", core.cid);
            }
        }
    }

    pub fn change_state(&mut self, core: &mut ContextCore, new_state: State) {
        if core.state != new_state {
            log::trace!(
                "cid={}: leaving {:?} after {}/{}/{} packets",
                core.cid,
                core.state,
                self.ir_count,
                self.fo_count,
                self.so_count
            );

            self.ir_count = 0;
            self.fo_count = 0;
            self.so_count = 0;
            core.state = new_state;
        }
    }

    fn change_mode(&mut self, core: &mut ContextCore, new_mode: Mode) {
        if core.mode != new_mode {
            log::info!("cid={}: mode {:?} -> {:?}", core.cid, core.mode, new_mode);
            core.mode = new_mode;
            self.change_state(core, State::Ir);
        }
    }

    /*
     * Analysis phase.
     */

    fn detect_changes(&mut self, headers: &PacketHeaders<'_>, new_sn: u16, oa: u8) {
        let mut tmp = Changes {
            sn_bits: self.sn_window.k(new_sn),
            ..Changes::default()
        };

        tmp.inner = detect_level(&self.inner, &headers.inner, new_sn, oa);
        if let (Some(level), Some(header)) = (&self.outer, &headers.outer) {
            tmp.outer = detect_level(level, header, new_sn, oa);
        }

        tmp.static_changed = !self.inner.header.same_flow(&headers.inner)
            || self.inner.header.version() != headers.inner.version();

        // a flipped IP-ID behaviour invalidates the decompressor's
        // reference, only a full refresh recovers it.
        tmp.force_ir = (tmp.inner.rnd_changed && tmp.inner.new_rnd != self.inner.rnd)
            || (tmp.outer.rnd_changed
                && self
                    .outer
                    .as_ref()
                    .is_some_and(|level| tmp.outer.new_rnd != level.rnd));

        if self.behavior.detect_changes(headers, oa) {
            tmp.force_ir = true;
        }

        self.tmp = tmp;
    }

    fn decide_state(&self, core: &ContextCore, env: &Env<'_>) -> StateDecision {
        let oa = env.oa_repetitions_nr as usize;
        let changing = self.tmp.dynamic_fields() > 0;

        let mut next = if self.tmp.static_changed || self.tmp.force_ir {
            State::Ir
        } else {
            match core.state {
                State::Ir if self.ir_count >= oa => {
                    if changing {
                        State::Fo
                    } else {
                        State::So
                    }
                }
                State::Ir => State::Ir,
                State::Fo if self.fo_count >= oa && !changing => State::So,
                State::Fo => State::Fo,
                State::So if changing => State::Fo,
                State::So => State::So,
            }
        };

        let mut decision = StateDecision {
            next,
            refresh_ir: false,
            refresh_fo: false,
            bump_go_back_ir: false,
            bump_go_back_fo: false,
        };

        // periodic refreshes apply in unidirectional mode only, where
        // no feedback channel keeps the peers honest.
        if core.mode == Mode::Unidirectional {
            decision.bump_go_back_ir = next != State::Ir;
            decision.bump_go_back_fo = next == State::So;

            if next != State::Ir && self.go_back_ir_count >= env.periodic_refreshes_ir_timeout {
                decision.refresh_ir = true;
                next = State::Ir;
            } else if next == State::So
                && self.go_back_fo_count >= env.periodic_refreshes_fo_timeout
            {
                decision.refresh_fo = true;
                next = State::Fo;
            }

            decision.next = next;
        }

        decision
    }

    fn decide_packet(&self, decision: &StateDecision, headers: &PacketHeaders<'_>) -> PacketType {
        match decision.next {
            State::Ir => PacketType::Ir,
            State::Fo => {
                // a periodic FO refresh exists to repeat the dynamic
                // chain, which only IR-DYN carries in full.
                if decision.refresh_fo || self.tmp.dynamic_fields() > 2 {
                    PacketType::IrDyn
                } else {
                    PacketType::Uor2
                }
            }
            State::So => {
                let tmp = &self.tmp;
                let inner_seq = self.inner_is_sequential_v4(headers);

                if tmp.sn_bits <= 4 && tmp.inner.id_bits == 0 && tmp.outer.id_bits == 0 {
                    PacketType::Uo0
                } else if inner_seq
                    && tmp.sn_bits <= 5
                    && tmp.inner.id_bits <= 6
                    && tmp.outer.id_bits == 0
                {
                    PacketType::Uo1
                } else {
                    PacketType::Uor2
                }
            }
        }
    }

    fn inner_is_sequential_v4(&self, headers: &PacketHeaders<'_>) -> bool {
        matches!(headers.inner, IpHeader::V4(_)) && !self.tmp.inner.new_rnd
    }

    /// Pick the smallest UOR-2 extension that still carries every
    /// outstanding bit.
    fn decide_extension(&self, headers: &PacketHeaders<'_>) -> Extension {
        let tmp = &self.tmp;

        if tmp.inner.needs_flags_octet() || tmp.outer.needs_flags_octet() {
            return Extension::Ext3;
        }

        let inner_seq = self.inner_is_sequential_v4(headers);
        let two_levels = headers.outer.is_some();

        if tmp.sn_bits <= 5 && tmp.inner.id_bits == 0 && tmp.outer.id_bits == 0 {
            Extension::None
        } else if inner_seq && tmp.sn_bits <= 8 && tmp.inner.id_bits <= 3 && tmp.outer.id_bits == 0
        {
            Extension::Ext0
        } else if inner_seq && tmp.sn_bits <= 8 && tmp.inner.id_bits <= 11 && tmp.outer.id_bits == 0
        {
            Extension::Ext1
        } else if inner_seq
            && two_levels
            && tmp.sn_bits <= 8
            && tmp.inner.id_bits <= 8
            && tmp.outer.id_bits <= 11
        {
            Extension::Ext2
        } else {
            Extension::Ext3
        }
    }

    /*
     * Packet builders, RFC 3095 section 5.7.
     */

    fn build_ir(
        &self,
        core: &ContextCore,
        headers: &PacketHeaders<'_>,
        new_sn: u16,
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(), EngineError> {
        let first = cid::encode(writer, env.cid_type, core.cid)?;

        writer.push(self.behavior.profile() as u8)?;
        let crc_position = writer.reserve()?;

        self.code_static_chain(headers, writer)?;
        self.code_dynamic_chain(headers, writer)?;

        // IR remainder: the 16-bit SN the decompressor starts from.
        writer.extend(&new_sn.to_be_bytes())?;

        writer.commit(first, 0xfd);
        let crc = codec::crc::crc_calculate(
            CrcKind::Crc8,
            writer.as_slice(),
            CrcKind::Crc8.init(),
            env.tables,
        );
        writer.commit(crc_position, crc);

        Ok(())
    }

    fn build_ir_dyn(
        &self,
        core: &ContextCore,
        headers: &PacketHeaders<'_>,
        new_sn: u16,
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(), EngineError> {
        let first = cid::encode(writer, env.cid_type, core.cid)?;

        writer.push(self.behavior.profile() as u8)?;
        let crc_position = writer.reserve()?;

        self.code_dynamic_chain(headers, writer)?;
        writer.extend(&new_sn.to_be_bytes())?;

        writer.commit(first, 0xf8);
        let crc = codec::crc::crc_calculate(
            CrcKind::Crc8,
            writer.as_slice(),
            CrcKind::Crc8.init(),
            env.tables,
        );
        writer.commit(crc_position, crc);

        Ok(())
    }

    fn build_uo0(
        &self,
        core: &ContextCore,
        headers: &PacketHeaders<'_>,
        new_sn: u16,
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(), EngineError> {
        let first = cid::encode(writer, env.cid_type, core.cid)?;

        let crc = self.uo_crc(headers, CrcKind::Crc3, env.tables);
        writer.commit(first, ((new_sn as u8 & 0x0f) << 3) | crc);

        self.code_uo_tail(headers, writer)
    }

    fn build_uo1(
        &self,
        core: &ContextCore,
        headers: &PacketHeaders<'_>,
        new_sn: u16,
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(), EngineError> {
        let first = cid::encode(writer, env.cid_type, core.cid)?;

        writer.commit(first, 0x80 | (self.tmp.inner.id_offset as u8 & 0x3f));
        let crc = self.uo_crc(headers, CrcKind::Crc3, env.tables);
        writer.push(((new_sn as u8 & 0x1f) << 3) | crc)?;

        self.code_uo_tail(headers, writer)
    }

    fn build_uor2(
        &self,
        core: &ContextCore,
        headers: &PacketHeaders<'_>,
        new_sn: u16,
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(), EngineError> {
        let extension = self.decide_extension(headers);
        let first = cid::encode(writer, env.cid_type, core.cid)?;

        let sn_base = match extension {
            Extension::None => new_sn as u8 & 0x1f,
            Extension::Ext0 | Extension::Ext1 | Extension::Ext2 => (new_sn >> 3) as u8 & 0x1f,
            Extension::Ext3 => {
                if self.tmp.sn_bits > 5 {
                    (new_sn >> 8) as u8 & 0x1f
                } else {
                    new_sn as u8 & 0x1f
                }
            }
        };
        writer.commit(first, 0xc0 | sn_base);

        let crc = self.uo_crc(headers, CrcKind::Crc7, env.tables);
        let extension_bit = if extension == Extension::None { 0 } else { 0x80 };
        writer.push(extension_bit | crc)?;

        match extension {
            Extension::None => {}
            Extension::Ext0 => {
                writer.push(
                    ((new_sn as u8 & 0x07) << 3) | (self.tmp.inner.id_offset as u8 & 0x07),
                )?;
            }
            Extension::Ext1 => {
                writer.push(
                    0x40 | ((new_sn as u8 & 0x07) << 3) | ((self.tmp.inner.id_offset >> 8) as u8 & 0x07),
                )?;
                writer.push(self.tmp.inner.id_offset as u8)?;
            }
            Extension::Ext2 => {
                writer.push(
                    0x80 | ((new_sn as u8 & 0x07) << 3) | ((self.tmp.outer.id_offset >> 8) as u8 & 0x07),
                )?;
                writer.push(self.tmp.outer.id_offset as u8)?;
                writer.push(self.tmp.inner.id_offset as u8)?;
            }
            Extension::Ext3 => self.build_ext3(core, headers, new_sn, writer)?,
        }

        self.code_uo_tail(headers, writer)
    }

    /// Extension 3 for non-RTP profiles, RFC 3095 section 5.7.5:
    ///
    /// ```text
    ///    +-----+-----+-----+-----+-----+-----+-----+-----+
    ///    |  1     1  |  S  |   Mode    |  I  | ip  | ip2 |
    ///    +-----+-----+-----+-----+-----+-----+-----+-----+
    /// ```
    fn build_ext3(
        &self,
        core: &ContextCore,
        headers: &PacketHeaders<'_>,
        new_sn: u16,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        let tmp = &self.tmp;

        let s = tmp.sn_bits > 5;
        let send_inner_id =
            matches!(headers.inner, IpHeader::V4(_)) && !tmp.inner.new_rnd && tmp.inner.id_bits > 0;
        let ip = tmp.inner.needs_flags_octet() || send_inner_id;
        let send_outer_id = matches!(headers.outer, Some(IpHeader::V4(_)))
            && !tmp.outer.new_rnd
            && tmp.outer.id_bits > 0;
        let ip2 = tmp.outer.needs_flags_octet() || send_outer_id;

        writer.push(
            0xc0 | ((s as u8) << 5)
                | ((core.mode as u8) << 3)
                | ((send_inner_id as u8) << 2)
                | ((ip as u8) << 1)
                | ip2 as u8,
        )?;

        if ip {
            writer.push(
                ((tmp.inner.send_tos as u8) << 7)
                    | ((tmp.inner.send_ttl as u8) << 6)
                    | ((tmp.inner.send_df as u8) << 5)
                    | ((tmp.inner.new_nbo as u8) << 2)
                    | ((tmp.inner.new_rnd as u8) << 1),
            )?;
        }

        if ip2 {
            writer.push(
                ((tmp.outer.send_tos as u8) << 7)
                    | ((tmp.outer.send_ttl as u8) << 6)
                    | ((tmp.outer.send_df as u8) << 5)
                    | ((tmp.outer.new_nbo as u8) << 2)
                    | ((tmp.outer.new_rnd as u8) << 1)
                    | send_outer_id as u8,
            )?;
        }

        if s {
            writer.push(new_sn as u8)?;
        }

        if ip {
            self.code_ext3_ip_fields(&headers.inner, &tmp.inner, writer)?;
        }

        if send_inner_id {
            if let IpHeader::V4(v4) = &headers.inner {
                writer.extend(&v4.id().to_be_bytes())?;
            }
        }

        if ip2 {
            if let Some(outer) = &headers.outer {
                self.code_ext3_ip_fields(outer, &tmp.outer, writer)?;

                if send_outer_id {
                    if let IpHeader::V4(v4) = outer {
                        writer.extend(&v4.id().to_be_bytes())?;
                    }
                }
            }
        }

        Ok(())
    }

    fn code_ext3_ip_fields(
        &self,
        header: &IpHeader,
        changes: &LevelChanges,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        if changes.send_tos {
            writer.push(match header {
                IpHeader::V4(v4) => v4.tos(),
                IpHeader::V6(v6) => v6.traffic_class(),
            })?;
        }

        if changes.send_ttl {
            writer.push(match header {
                IpHeader::V4(v4) => v4.ttl(),
                IpHeader::V6(v6) => v6.hop_limit(),
            })?;
        }

        Ok(())
    }

    /// Static chain of the IR packet: outer IP, inner IP, transport.
    fn code_static_chain(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        if let Some(outer) = &headers.outer {
            code_ip_static(outer, writer)?;
        }

        code_ip_static(&headers.inner, writer)?;
        self.behavior.code_static_part(headers, writer)
    }

    /// Dynamic chain of the IR and IR-DYN packets.
    fn code_dynamic_chain(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        if let Some(outer) = &headers.outer {
            code_ip_dynamic(outer, &self.tmp.outer, writer)?;
        }

        code_ip_dynamic(&headers.inner, &self.tmp.inner, writer)?;
        self.behavior.code_dynamic_part(headers, writer)
    }

    /// Tail shared by all UO packets: full IP-IDs of levels with random
    /// behaviour (outer first), then the transport remainder.
    fn code_uo_tail(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        if self.tmp.outer.new_rnd {
            if let Some(IpHeader::V4(v4)) = &headers.outer {
                writer.extend(&v4.id().to_be_bytes())?;
            }
        }

        if self.tmp.inner.new_rnd {
            if let IpHeader::V4(v4) = &headers.inner {
                writer.extend(&v4.id().to_be_bytes())?;
            }
        }

        self.behavior.code_uo_remainder(headers, writer)
    }

    /// Header CRC of the UO packets: CRC-STATIC regions of every
    /// header, then the CRC-DYNAMIC regions, outer to inner to
    /// transport (RFC 3095, 5.9.2).
    fn uo_crc(&self, headers: &PacketHeaders<'_>, kind: CrcKind, tables: &CrcTables) -> u8 {
        let mut crc = kind.init();

        if let Some(outer) = &headers.outer {
            crc = outer.crc_static(kind, crc, tables);
        }
        crc = headers.inner.crc_static(kind, crc, tables);
        crc = self.behavior.crc_static(headers, kind, crc, tables);

        if let Some(outer) = &headers.outer {
            crc = outer.crc_dynamic(kind, crc, tables);
        }
        crc = headers.inner.crc_dynamic(kind, crc, tables);
        self.behavior.crc_dynamic(headers, kind, crc, tables)
    }

    /*
     * Commit phase.
     */

    fn commit(
        &mut self,
        core: &mut ContextCore,
        headers: &PacketHeaders<'_>,
        new_sn: u16,
        packet_type: PacketType,
        decision: StateDecision,
        env: &Env<'_>,
    ) {
        let oa = env.oa_repetitions_nr;
        let dynamic_chain = matches!(packet_type, PacketType::Ir | PacketType::IrDyn);
        let ext3 = packet_type == PacketType::Uor2
            && (self.tmp.inner.needs_flags_octet() || self.tmp.outer.needs_flags_octet());

        self.sn = new_sn;
        self.sn_window.add(new_sn, new_sn);

        let inner_changes = self.tmp.inner;
        commit_level(&mut self.inner, &headers.inner, &inner_changes, new_sn, oa, dynamic_chain, ext3);

        let outer_changes = self.tmp.outer;
        if let (Some(level), Some(header)) = (self.outer.as_mut(), &headers.outer) {
            commit_level(level, header, &outer_changes, new_sn, oa, dynamic_chain, ext3);
        }

        self.behavior.update(headers, packet_type, oa);

        self.change_state(core, decision.next);

        if decision.refresh_ir {
            // a periodic refresh emits one IR and falls straight back.
            self.ir_count = oa as usize;
            self.go_back_ir_count = 0;
        }
        if decision.refresh_fo {
            self.fo_count = oa as usize;
            self.go_back_fo_count = 0;
        }
        if decision.bump_go_back_ir {
            self.go_back_ir_count += 1;
        }
        if decision.bump_go_back_fo {
            self.go_back_fo_count += 1;
        }

        match core.state {
            State::Ir => self.ir_count += 1,
            State::Fo => self.fo_count += 1,
            State::So => self.so_count += 1,
        }
    }
}

fn detect_level(level: &IpLevel, header: &IpHeader, new_sn: u16, oa: u8) -> LevelChanges {
    let mut changes = LevelChanges::default();

    match (header, &level.header) {
        (IpHeader::V4(new), IpHeader::V4(old)) => {
            let delta_nbo = new.id().wrapping_sub(old.id());
            let delta_swapped = new.id().swap_bytes().wrapping_sub(old.id().swap_bytes());

            if delta_nbo <= IP_ID_MAX_DELTA {
                changes.new_rnd = false;
                changes.new_nbo = true;
            } else if delta_swapped <= IP_ID_MAX_DELTA {
                changes.new_rnd = false;
                changes.new_nbo = false;
            } else {
                changes.new_rnd = true;
                changes.new_nbo = level.nbo;
            }

            changes.rnd_changed = changes.new_rnd != level.rnd || level.rnd_count < oa;
            changes.nbo_changed = changes.new_nbo != level.nbo || level.nbo_count < oa;
            changes.send_tos = new.tos() != old.tos() || level.tos_count < oa;
            changes.send_ttl = new.ttl() != old.ttl() || level.ttl_count < oa;
            changes.send_df = new.df() != old.df() || level.df_count < oa;

            let id = if changes.new_nbo {
                new.id()
            } else {
                new.id().swap_bytes()
            };
            changes.id_offset = id.wrapping_sub(new_sn);
            changes.id_bits = if changes.new_rnd {
                0
            } else {
                level.id_window.k(changes.id_offset)
            };
        }
        (IpHeader::V6(new), IpHeader::V6(old)) => {
            changes.send_tos = new.traffic_class() != old.traffic_class() || level.tos_count < oa;
            changes.send_ttl = new.hop_limit() != old.hop_limit() || level.ttl_count < oa;
        }
        _ => {
            // version flip is a static change, handled by the caller.
        }
    }

    changes
}

#[allow(clippy::too_many_arguments)]
fn commit_level(
    level: &mut IpLevel,
    header: &IpHeader,
    changes: &LevelChanges,
    new_sn: u16,
    oa: u8,
    dynamic_chain: bool,
    ext3: bool,
) {
    if let IpHeader::V4(new) = header {
        if let IpHeader::V4(old) = &level.header {
            if changes.new_rnd != level.rnd {
                level.rnd_count = 0;
            }
            if changes.new_nbo != level.nbo {
                level.nbo_count = 0;
            }
            if new.tos() != old.tos() {
                level.tos_count = 0;
            }
            if new.ttl() != old.ttl() {
                level.ttl_count = 0;
            }
            if new.df() != old.df() {
                level.df_count = 0;
            }
        }

        level.rnd = changes.new_rnd;
        level.nbo = changes.new_nbo;

        if !changes.new_rnd {
            level.id_window.add(new_sn, changes.id_offset);
        }
    } else if let (IpHeader::V6(new), IpHeader::V6(old)) = (header, &level.header) {
        if new.traffic_class() != old.traffic_class() {
            level.tos_count = 0;
        }
        if new.hop_limit() != old.hop_limit() {
            level.ttl_count = 0;
        }
    }

    // fields are repeated until seen oa times; the dynamic chain
    // carries all of them, extension 3 the flagged subset.
    if dynamic_chain {
        level.tos_count = (level.tos_count + 1).min(oa);
        level.ttl_count = (level.ttl_count + 1).min(oa);
        level.df_count = (level.df_count + 1).min(oa);
        level.rnd_count = (level.rnd_count + 1).min(oa);
        level.nbo_count = (level.nbo_count + 1).min(oa);
    } else if ext3 {
        if changes.send_tos {
            level.tos_count = (level.tos_count + 1).min(oa);
        }
        if changes.send_ttl {
            level.ttl_count = (level.ttl_count + 1).min(oa);
        }
        if changes.send_df {
            level.df_count = (level.df_count + 1).min(oa);
        }
        level.rnd_count = (level.rnd_count + 1).min(oa);
        level.nbo_count = (level.nbo_count + 1).min(oa);
    }

    level.header = *header;
}

/// Static part of an IP header, RFC 3095 sections 5.7.7.3 and 5.7.7.4.
fn code_ip_static(header: &IpHeader, writer: &mut PacketWriter<'_>) -> Result<(), EngineError> {
    match header {
        IpHeader::V4(v4) => {
            writer.push(0x40)?;
            writer.push(v4.protocol())?;
            writer.extend(v4.src())?;
            writer.extend(v4.dst())?;
        }
        IpHeader::V6(v6) => {
            writer.push(0x60 | ((v6.flow_label() >> 16) as u8 & 0x0f))?;
            writer.extend(&(v6.flow_label() as u16).to_be_bytes())?;
            writer.push(v6.next_header())?;
            writer.extend(v6.src())?;
            writer.extend(v6.dst())?;
        }
    }

    Ok(())
}

/// Dynamic part of an IP header, RFC 3095 sections 5.7.7.3 and 5.7.7.4.
fn code_ip_dynamic(
    header: &IpHeader,
    changes: &LevelChanges,
    writer: &mut PacketWriter<'_>,
) -> Result<(), EngineError> {
    match header {
        IpHeader::V4(v4) => {
            writer.push(v4.tos())?;
            writer.push(v4.ttl())?;
            writer.extend(&v4.id().to_be_bytes())?;
            writer.push(
                ((v4.df() as u8) << 7)
                    | ((changes.new_rnd as u8) << 6)
                    | ((changes.new_nbo as u8) << 5),
            )?;
        }
        IpHeader::V6(v6) => {
            writer.push(v6.traffic_class())?;
            writer.push(v6.hop_limit())?;
        }
    }

    Ok(())
}
