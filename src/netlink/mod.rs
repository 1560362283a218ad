pub mod error;
pub mod links;

use std::fmt::Debug;

use netlink_packet_core::{
    NetlinkDeserializable, NetlinkHeader, NetlinkMessage, NetlinkPayload, NetlinkSerializable,
    NLMSG_DONE, NLM_F_DUMP, NLM_F_REQUEST,
};

use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};

use error::NetlinkError;

const RECV_BUFFER: usize = 32 * 1024;

/// Serializes `payload` as a `NLM_F_REQUEST | NLM_F_DUMP` message.
fn dump_request<R>(payload: R) -> Vec<u8>
where
    R: NetlinkSerializable + Debug,
{
    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST | NLM_F_DUMP;

    let mut msg = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(payload));
    msg.finalize();

    let mut buf = vec![0; msg.buffer_len()];
    msg.serialize(&mut buf[..]);
    buf
}

pub struct Netlink {
    route: Socket,
}

impl Netlink {
    pub fn new() -> Result<Self, NetlinkError> {
        let socket = Socket::new(NETLINK_ROUTE)?;
        socket.connect(&SocketAddr::new(0, 0))?;

        Ok(Self { route: socket })
    }

    /// Sends a dump request and collects every inner message until `NLMSG_DONE`.
    #[inline(never)]
    pub(crate) fn dump<R, T>(sock: &Socket, payload: R) -> Result<Vec<T>, NetlinkError>
    where
        R: NetlinkSerializable + Debug,
        T: NetlinkDeserializable + Debug,
    {
        let buf = dump_request(payload);
        sock.send(&buf, 0)?;

        let mut out = Vec::new();
        let mut receive_buffer = Vec::with_capacity(RECV_BUFFER);
        loop {
            receive_buffer.clear();
            let size = sock.recv(&mut receive_buffer, 0)?;
            let mut offset = 0;

            while offset < size {
                let bytes = &receive_buffer[offset..size];
                let rx_packet = <NetlinkMessage<T>>::deserialize(bytes)?;
                if rx_packet.header.message_type == NLMSG_DONE {
                    return Ok(out);
                }

                let len = rx_packet.header.length as usize;
                match rx_packet.payload {
                    NetlinkPayload::InnerMessage(t) => out.push(t),
                    NetlinkPayload::Error(e) => return Err(NetlinkError::from(e.code)),
                    _ => {}
                }

                if len == 0 {
                    return Err(NetlinkError::UnexpectedResponse);
                }
                offset += len;
            }
        }
    }
}
