use crate::config::DataHostPolicy;
use crate::core_error::PortError;
use crate::session::{DataPort, SessionContext};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Parses `h1,h2,h3,h4,p1,p2` into the advertised endpoint.
/// The port is `p1 * 256 + p2`.
pub fn parse_port_argument(arg: &str) -> Result<DataPort, PortError> {
    let parts: Vec<&str> = arg.trim().split(',').map(str::trim).collect();
    if parts.len() != 6 {
        return Err(PortError::Malformed(arg.to_string()));
    }

    let mut octets = [0u8; 6];
    for (slot, part) in octets.iter_mut().zip(&parts) {
        *slot = part
            .parse::<u8>()
            .map_err(|_| PortError::InvalidNumber(part.to_string()))?;
    }

    let host = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = (octets[4] as u16) << 8 | octets[5] as u16;
    if port == 0 {
        return Err(PortError::ZeroPort);
    }
    Ok(DataPort { host, port })
}

/// Applies the configured data host policy to an advertised endpoint.
pub fn apply_host_policy(
    policy: DataHostPolicy,
    advertised: DataPort,
    peer: SocketAddr,
) -> Result<DataPort, PortError> {
    match policy {
        DataHostPolicy::Advertised => Ok(advertised),
        DataHostPolicy::Loopback => Ok(DataPort {
            host: Ipv4Addr::LOCALHOST,
            port: advertised.port,
        }),
        DataHostPolicy::Peer => {
            let matches = match peer.ip() {
                IpAddr::V4(ip) => ip == advertised.host,
                IpAddr::V6(ip) => ip.to_ipv4_mapped() == Some(advertised.host),
            };
            if matches {
                Ok(advertised)
            } else {
                Err(PortError::HostMismatch {
                    advertised: advertised.host,
                    peer: peer.ip().to_string(),
                })
            }
        }
    }
}

/// Handles the PORT (Active Mode) FTP command.
///
/// Only records the endpoint; the connection is opened by the next transfer.
pub async fn handle_port_command(
    ctx: SessionContext,
    args: Vec<String>,
) -> Result<(), std::io::Error> {
    let Some(arg) = args.first() else {
        return ctx.reply(501, "No argument").await;
    };

    let result = {
        let mut session = ctx.session.lock().await;
        let result = parse_port_argument(arg)
            .and_then(|advertised| {
                apply_host_policy(ctx.config.server.data_host_policy, advertised, session.peer)
            });
        session.pending_port = result.as_ref().ok().copied();
        result
    };

    match result {
        Ok(data_port) => {
            ctx.log.info(&format!(
                "Received PORT command, data endpoint is {}",
                data_port.socket_addr()
            ));
            ctx.reply(200, &format!("Port is set to {}", data_port.port))
                .await
        }
        Err(e) => {
            ctx.log.warn(&format!("Rejected PORT {}: {}", arg, e));
            ctx.send_line(&e.to_ftp_response()).await
        }
    }
}
