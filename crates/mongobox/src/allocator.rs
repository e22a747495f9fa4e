use std::{io, net::TcpListener};

use mongobox_process::InstanceId;
use rand::RngCore;

use crate::error::{Error, Result};

const NAME_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz1234567890";

/// Length of the token naming an instance and its staged executable.
pub const INSTANCE_ID_LEN: usize = 7;
/// Length of the random workspace directory name.
pub const WORKSPACE_NAME_LEN: usize = 12;

/// Returns a tcp port that was free at the time of the call.
///
/// `preferred == 0` asks the OS for an ephemeral port. The listener is released
/// before returning, so the port may be taken again before mongod binds it; the
/// server then fails to start and the caller sees a connection failure.
pub fn allocate_tcp_port(preferred: u16) -> Result<u16> {
    if preferred != 0 {
        // Validate availability.
        return match TcpListener::bind(("0.0.0.0", preferred)) {
            Ok(_) => Ok(preferred),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(Error::PortAllocation(
                io::Error::new(e.kind(), format!("port already in use: {preferred}")),
            )),
            Err(e) => Err(Error::PortAllocation(e)),
        };
    }

    let listener = TcpListener::bind(("0.0.0.0", 0)).map_err(Error::PortAllocation)?;
    let port = listener.local_addr().map_err(Error::PortAllocation)?.port();
    Ok(port)
}

/// Lowercase alphanumeric name drawn from the OS random source.
pub fn random_name(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf.iter()
        .map(|b| NAME_ALPHABET[*b as usize % NAME_ALPHABET.len()] as char)
        .collect()
}

pub fn new_instance_id() -> InstanceId {
    InstanceId(random_name(INSTANCE_ID_LEN))
}
