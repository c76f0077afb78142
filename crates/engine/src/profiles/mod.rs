//! The closed set of compression profiles.
//!
//! The original framework registers profiles through tables of function
//! pointers and hides their state behind untyped context pointers. Here
//! the set is closed: each context carries a typed payload and dispatch
//! is a match over this enum. New profiles extend the variant set.

pub mod ip;
pub mod udp;
pub mod udp_lite;
pub mod uncompressed;

use codec::{feedback::Feedback, headers::PacketHeaders, writer::PacketWriter};

use crate::{
    EngineError,
    context::ContextCore,
    packet::{PacketType, RohcProfile},
    rfc3095::{Env, Rfc3095Context},
};

use self::{
    ip::IpBehavior, udp::UdpBehavior, udp_lite::UdpLiteBehavior,
    uncompressed::UncompressedContext,
};

/// The profile-specific payload of a context.
pub enum ProfileContext {
    Uncompressed(UncompressedContext),
    Ip(Rfc3095Context<IpBehavior>),
    Udp(Rfc3095Context<UdpBehavior>),
    UdpLite(Rfc3095Context<UdpLiteBehavior>),
}

impl ProfileContext {
    pub fn profile(&self) -> RohcProfile {
        match self {
            Self::Uncompressed(_) => RohcProfile::Uncompressed,
            Self::Ip(_) => RohcProfile::Ip,
            Self::Udp(_) => RohcProfile::Udp,
            Self::UdpLite(_) => RohcProfile::UdpLite,
        }
    }

    /// Whether an incoming packet belongs to this context. The
    /// uncompressed profile accepts everything; the RFC 3095 profiles
    /// match the IP levels and their transport header.
    pub fn matches(&self, headers: &PacketHeaders<'_>) -> bool {
        match self {
            Self::Uncompressed(_) => true,
            Self::Ip(ctx) => ctx.matches(headers),
            Self::Udp(ctx) => ctx.matches(headers),
            Self::UdpLite(ctx) => ctx.matches(headers),
        }
    }

    /// Build the compressed header for one packet.
    ///
    /// Returns the packet classification and the offset into the
    /// uncompressed packet where the payload to append starts.
    pub fn encode(
        &mut self,
        core: &mut ContextCore,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
        env: &Env<'_>,
    ) -> Result<(PacketType, usize), EngineError> {
        match self {
            Self::Uncompressed(ctx) => ctx.encode(core, headers.as_bytes(), writer, env),
            Self::Ip(ctx) => ctx.encode(core, headers, writer, env),
            Self::Udp(ctx) => ctx.encode(core, headers, writer, env),
            Self::UdpLite(ctx) => ctx.encode(core, headers, writer, env),
        }
    }

    /// Apply a decompressor feedback element to this context.
    pub fn feedback(&mut self, core: &mut ContextCore, feedback: &Feedback) {
        match self {
            Self::Uncompressed(ctx) => ctx.feedback(core, feedback),
            Self::Ip(ctx) => ctx.feedback(core, feedback),
            Self::Udp(ctx) => ctx.feedback(core, feedback),
            Self::UdpLite(ctx) => ctx.feedback(core, feedback),
        }
    }
}
