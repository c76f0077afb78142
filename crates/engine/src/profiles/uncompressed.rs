//! Uncompressed profile (0x0000).
//!
//! [Section 5.10]: https://tools.ietf.org/html/rfc3095#section-5.10
//!
//! The profile never compresses anything; it exists so that flows no
//! other profile can describe still travel over the ROHC channel. Each
//! packet is framed either as an IR packet advertising profile zero:
//!
//! ```text
//!      0   1   2   3   4   5   6   7
//!     --- --- --- --- --- --- --- ---
//!  1 :         Add-CID octet         : if for small CIDs and (CID != 0)
//!    +---+---+---+---+---+---+---+---+
//!  2 | 1   1   1   1   1   1   0 |res|
//!    +---+---+---+---+---+---+---+---+
//!    :                               :
//!  3 /    0-2 octets of CID info     / 1-2 octets if for large CIDs
//!    :                               :
//!    +---+---+---+---+---+---+---+---+
//!  4 |          Profile = 0          | 1 octet
//!    +---+---+---+---+---+---+---+---+
//!  5 |              CRC              | 1 octet
//!    +---+---+---+---+---+---+---+---+
//! ```
//!
//! or as a Normal packet, whose only overhead is the CID information
//! woven around the first octet of the IP packet ([Section 5.10]).
//!
//! Only the IR and FO states are used. In unidirectional mode the
//! context periodically drops back to IR for one packet so that a
//! decompressor which lost its context (or joined late) can recover.

use codec::{
    cid,
    crc::{CrcKind, crc_calculate},
    feedback::{AckType, CrcStatus, Feedback},
    writer::PacketWriter,
};

use crate::{
    EngineError,
    context::ContextCore,
    packet::{Mode, PacketType, RohcProfile, State},
    rfc3095::Env,
};

/// Successive IR packets before the context advances to FO.
const MAX_IR_COUNT: usize = 3;

pub struct UncompressedContext {
    /// The number of IR packets sent by the compressor.
    ir_count: usize,
    /// The number of Normal packets sent by the compressor.
    normal_count: usize,
    /// Packets sent while outside IR, driving the periodic refresh.
    go_back_ir_count: usize,
}

struct StateDecision {
    next: State,
    refresh: bool,
    bump_go_back_ir: bool,
}

impl Default for UncompressedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl UncompressedContext {
    pub fn new() -> Self {
        Self {
            ir_count: 0,
            normal_count: 0,
            go_back_ir_count: 0,
        }
    }

    /// Frame one packet.
    ///
    /// Returns the packet classification and the offset of the payload
    /// the caller appends: the whole IP packet for IR, everything
    /// behind the first octet for Normal.
    pub fn encode(
        &mut self,
        core: &mut ContextCore,
        packet: &[u8],
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(PacketType, usize), EngineError> {
        let decision = self.decide_state(core, env);

        let (packet_type, payload_offset) = match decision.next {
            State::Ir => {
                self.build_ir(core, writer, env)?;
                (PacketType::Ir, 0)
            }
            _ => {
                self.build_normal(core, packet, writer, env)?;
                (PacketType::Normal, 1)
            }
        };

        self.commit(core, packet_type, decision);

        Ok((packet_type, payload_offset))
    }

    pub fn feedback(&mut self, core: &mut ContextCore, feedback: &Feedback) {
        let fb = match feedback {
            Feedback::Ack1 { .. } => return,
            Feedback::Feedback2(fb) => fb,
        };

        if fb.crc == CrcStatus::Invalid {
            log::warn!("cid={}: feedback CRC check failed, feedback ignored", core.cid);
            return;
        }

        if fb.mode != 0 {
            // mode can be changed only if feedback is protected by a CRC.
            if fb.crc == CrcStatus::Valid && matches!(fb.acktype, AckType::Ack | AckType::Nack) {
                if let Ok(mode) = Mode::try_from(fb.mode) {
                    self.change_mode(core, mode);
                }
            } else {
                log::warn!("cid={}: mode change requested but no CRC was given", core.cid);
            }
        }

        match fb.acktype {
            AckType::Ack | AckType::Nack => {}
            AckType::StaticNack => self.change_state(core, State::Ir),
            AckType::Reserved => log::warn!("cid={}: reserved acktype used", core.cid),
        }
    }

    fn decide_state(&self, core: &ContextCore, env: &Env<'_>) -> StateDecision {
        let mut next = core.state;

        if next == State::Ir && self.ir_count >= MAX_IR_COUNT {
            next = State::Fo;
        }

        let mut decision = StateDecision {
            next,
            refresh: false,
            // counted against the packets spent outside IR, including
            // the refresh packet itself.
            bump_go_back_ir: next == State::Fo,
        };

        if core.mode == Mode::Unidirectional
            && next == State::Fo
            && self.go_back_ir_count >= env.periodic_refreshes_ir_timeout
        {
            decision.refresh = true;
            decision.next = State::Ir;
        }

        decision
    }

    fn commit(&mut self, core: &mut ContextCore, packet_type: PacketType, decision: StateDecision) {
        self.change_state(core, decision.next);

        if decision.refresh {
            // one refresh IR, then straight back to FO.
            self.ir_count = MAX_IR_COUNT;
            self.go_back_ir_count = 0;
        }
        if decision.bump_go_back_ir && core.mode == Mode::Unidirectional {
            self.go_back_ir_count += 1;
        }

        match packet_type {
            PacketType::Ir => self.ir_count += 1,
            _ => self.normal_count += 1,
        }
    }

    fn change_mode(&mut self, core: &mut ContextCore, new_mode: Mode) {
        if core.mode != new_mode {
            log::info!("cid={}: mode {:?} -> {:?}", core.cid, core.mode, new_mode);
            core.mode = new_mode;
            self.change_state(core, State::Ir);
        }
    }

    fn change_state(&mut self, core: &mut ContextCore, new_state: State) {
        // reset counters only if different state
        if core.state != new_state {
            log::trace!(
                "cid={}: leaving {:?} after {} IR / {} Normal packets",
                core.cid,
                core.state,
                self.ir_count,
                self.normal_count
            );

            self.ir_count = 0;
            self.normal_count = 0;
            core.state = new_state;
        }
    }

    fn build_ir(
        &self,
        core: &ContextCore,
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(), EngineError> {
        let first = cid::encode(writer, env.cid_type, core.cid)?;
        writer.commit(first, 0xfc);

        writer.push(RohcProfile::Uncompressed as u8)?;
        let crc_position = writer.reserve()?;

        let crc = crc_calculate(
            CrcKind::Crc8,
            writer.as_slice(),
            CrcKind::Crc8.init(),
            env.tables,
        );
        writer.commit(crc_position, crc);

        Ok(())
    }

    fn build_normal(
        &self,
        core: &ContextCore,
        packet: &[u8],
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(), EngineError> {
        let first = cid::encode(writer, env.cid_type, core.cid)?;
        writer.commit(first, packet[0]);

        Ok(())
    }
}
