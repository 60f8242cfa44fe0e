use super::{
    super::{
        codec::Codec,
        error::{Error, Result},
        frame::{
            be, build_cotp_cr_message, build_cotp_data_message, build_setup_comm, Cotp,
            CotpCcParams, CotpCrParams, S7AppBody, S7Function,
        },
    },
    recv_frame, send_frame,
    state::{Negotiated, PlcFamily, SessionConfig},
};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Connection request for the configured family.
pub(super) fn connection_request(config: &SessionConfig) -> CotpCrParams {
    match config.family {
        PlcFamily::S7 => CotpCrParams {
            src_tsap: config.tsap.local.into(),
            dst_tsap: config.tsap.remote.into(),
            ..Default::default()
        },
        PlcFamily::Cp243 => CotpCrParams::cp243(),
    }
}

/// Perform the COTP CR/CC handshake on an already connected framed transport.
pub(super) async fn iso_connect(
    framed: &mut Framed<TcpStream, Codec>,
    config: &SessionConfig,
) -> Result<CotpCcParams> {
    let cr = connection_request(config);
    send_frame(framed, build_cotp_cr_message(cr), config.write_timeout).await?;
    let msg = recv_frame(framed, config.read_timeout).await?;
    match msg.cotp {
        Cotp::Cc(params) => Ok(params),
        Cotp::Dr(params) => {
            tracing::warn!(reason = params.reason, "S7 connection request refused");
            Err(Error::ErrUseClosedConnection)
        }
        _ => Err(Error::ErrUnexpectedPdu),
    }
}

/// Send S7 SetupCommunication and return negotiated values.
pub(super) async fn negotiation(
    framed: &mut Framed<TcpStream, Codec>,
    config: &SessionConfig,
    pdu_ref: u16,
) -> Result<Negotiated> {
    let msg = build_cotp_data_message(build_setup_comm(
        pdu_ref,
        config.preferred_amq_caller,
        config.preferred_amq_callee,
        config.preferred_pdu_size,
    ));
    send_frame(framed, msg, config.write_timeout).await?;

    let pkt = recv_frame(framed, config.read_timeout).await?;
    let pdu = match pkt.app {
        Some(S7AppBody::Parsed(p)) => p,
        Some(S7AppBody::Segmented(_)) => return Err(Error::ErrInvalidFrame),
        None => return Err(Error::ErrUnexpectedPdu),
    };
    pdu.expect_function(S7Function::SetupCommunication)?;

    let negotiated = Negotiated {
        amq_caller: be::get_u16(&pdu.param, 2)?,
        amq_callee: be::get_u16(&pdu.param, 4)?,
        pdu_len: be::get_u16(&pdu.param, 6)?,
    };
    if negotiated.pdu_len == 0 {
        return Err(Error::ProtocolViolation {
            context: "PLC granted a zero PDU length",
        });
    }
    Ok(negotiated)
}
