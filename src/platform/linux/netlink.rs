//! Per-socket byte counters via `NETLINK_SOCK_DIAG` (`inet_diag`), joined to
//! owning PIDs by scanning `/proc/<pid>/fd/*` for `socket:[<inode>]` links.
//!
//! Ported from `Platform::NetlinkSocketStats` / `buildInodeToPidMap` /
//! `aggregateByPid`. This is the only way to attribute network bytes to a
//! process on Linux: there is no per-process network counter in `/proc/<pid>`.

use std::collections::HashMap;
use std::mem;

const NETLINK_BUFFER_SIZE: usize = 65536;
const SOCK_DIAG_BY_FAMILY: u16 = 20;
const INET_DIAG_INFO: u16 = 2;

#[repr(C)]
#[derive(Clone, Copy)]
struct InetDiagSockId {
    sport: u16,
    dport: u16,
    src: [u32; 4],
    dst: [u32; 4],
    interface: u32,
    cookie: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct InetDiagReqV2 {
    sdiag_family: u8,
    sdiag_protocol: u8,
    idiag_ext: u8,
    pad: u8,
    idiag_states: u32,
    id: InetDiagSockId,
}

#[repr(C)]
struct InetDiagRequest {
    nlh: libc::nlmsghdr,
    req: InetDiagReqV2,
}

#[repr(C)]
struct InetDiagMsg {
    idiag_family: u8,
    idiag_state: u8,
    idiag_timer: u8,
    idiag_retrans: u8,
    id: InetDiagSockId,
    idiag_expires: u32,
    idiag_rqueue: u32,
    idiag_wqueue: u32,
    idiag_uid: u32,
    idiag_inode: u32,
}

/// Socket-level byte counters as reported by `tcp_info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketStats {
    pub inode: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Thin wrapper over a bound `NETLINK_SOCK_DIAG` socket. Construction never
/// panics: if the socket can't be created or bound, `is_available()` returns
/// `false` and `query_all_sockets` returns an empty vec, matching the
/// capability-absence contract used throughout the platform layer.
pub struct NetlinkSocketStats {
    fd: i32,
    available: bool,
}

impl Drop for NetlinkSocketStats {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

impl NetlinkSocketStats {
    pub fn new() -> Self {
        let mut this = Self {
            fd: -1,
            available: false,
        };
        this.init();
        this
    }

    fn init(&mut self) {
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
                libc::NETLINK_SOCK_DIAG,
            )
        };
        if fd < 0 {
            tracing::debug!("failed to create NETLINK_SOCK_DIAG socket");
            return;
        }

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as u16;
        addr.nl_pid = 0;
        addr.nl_groups = 0;

        let bind_rc = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if bind_rc < 0 {
            tracing::debug!("failed to bind netlink socket");
            unsafe {
                libc::close(fd);
            }
            return;
        }

        self.fd = fd;
        self.available = true;
        tracing::info!("netlink inet_diag available for per-process network attribution");
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn query_all_sockets(&self) -> Vec<SocketStats> {
        let mut results = Vec::with_capacity(256);
        if !self.available {
            return results;
        }
        self.query_protocol(libc::IPPROTO_TCP, &mut results);
        self.query_protocol(libc::IPPROTO_UDP, &mut results);
        results
    }

    fn query_protocol(&self, protocol: i32, results: &mut Vec<SocketStats>) {
        for family in [libc::AF_INET, libc::AF_INET6] {
            self.query_family(family, protocol, results);
        }
    }

    fn query_family(&self, family: i32, protocol: i32, results: &mut Vec<SocketStats>) {
        let req = InetDiagRequest {
            nlh: libc::nlmsghdr {
                nlmsg_len: mem::size_of::<InetDiagRequest>() as u32,
                nlmsg_type: SOCK_DIAG_BY_FAMILY,
                nlmsg_flags: (libc::NLM_F_REQUEST | libc::NLM_F_DUMP) as u16,
                nlmsg_seq: 1,
                nlmsg_pid: 0,
            },
            req: InetDiagReqV2 {
                sdiag_family: family as u8,
                sdiag_protocol: protocol as u8,
                idiag_ext: (1u8 << (INET_DIAG_INFO - 1)),
                pad: 0,
                idiag_states: u32::MAX,
                id: unsafe { mem::zeroed() },
            },
        };

        let sent = unsafe {
            libc::send(
                self.fd,
                &req as *const _ as *const libc::c_void,
                mem::size_of::<InetDiagRequest>(),
                0,
            )
        };
        if sent < 0 {
            tracing::debug!("failed to send inet_diag request");
            return;
        }

        let mut buffer = vec![0u8; NETLINK_BUFFER_SIZE];
        loop {
            let len = unsafe {
                libc::recv(
                    self.fd,
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                    0,
                )
            };
            if len < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::debug!("failed to receive inet_diag response: {err}");
                return;
            }
            if Self::process_buffer(&buffer[..len as usize], results) {
                return;
            }
        }
    }

    /// Walks one recv()'d buffer of `nlmsghdr`s. Returns `true` once
    /// `NLMSG_DONE`/`NLMSG_ERROR` is seen (caller should stop looping).
    fn process_buffer(buffer: &[u8], results: &mut Vec<SocketStats>) -> bool {
        let mut offset = 0usize;
        while offset + mem::size_of::<libc::nlmsghdr>() <= buffer.len() {
            let nlh = unsafe { &*(buffer[offset..].as_ptr() as *const libc::nlmsghdr) };
            let msg_len = nlh.nlmsg_len as usize;
            if msg_len < mem::size_of::<libc::nlmsghdr>() || offset + msg_len > buffer.len() {
                break;
            }

            match nlh.nlmsg_type as i32 {
                libc::NLMSG_DONE => return true,
                libc::NLMSG_ERROR => return true,
                t if t as u16 == SOCK_DIAG_BY_FAMILY => {
                    let payload_off = offset + nlmsg_align(mem::size_of::<libc::nlmsghdr>());
                    let payload_len = msg_len - nlmsg_align(mem::size_of::<libc::nlmsghdr>());
                    if payload_off + payload_len <= buffer.len() {
                        Self::parse_socket_message(&buffer[payload_off..payload_off + payload_len], results);
                    }
                }
                _ => {}
            }

            offset += nlmsg_align(msg_len);
        }
        false
    }

    fn parse_socket_message(msg: &[u8], results: &mut Vec<SocketStats>) {
        if msg.len() < mem::size_of::<InetDiagMsg>() {
            return;
        }
        let diag = unsafe { &*(msg.as_ptr() as *const InetDiagMsg) };
        let mut stats = SocketStats {
            inode: diag.idiag_inode as u64,
            ..Default::default()
        };
        if stats.inode != 0 {
            parse_tcp_info(&msg[mem::size_of::<InetDiagMsg>()..], &mut stats);
            results.push(stats);
        }
    }
}

impl Default for NetlinkSocketStats {
    fn default() -> Self {
        Self::new()
    }
}

fn nlmsg_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Walks the `rtattr` chain after an `inet_diag_msg` looking for
/// `INET_DIAG_INFO`, then reads `tcpi_bytes_received`/`tcpi_bytes_acked` out
/// of the embedded `tcp_info` by explicit offset, bounds-checked against the
/// attribute's reported length (these fields were added in Linux 4.2; older
/// kernels simply won't have room for them and the stats stay zero).
fn parse_tcp_info(attrs: &[u8], stats: &mut SocketStats) {
    const RTA_INFO: u16 = INET_DIAG_INFO;
    // Offsets of tcpi_bytes_acked / tcpi_bytes_received within struct tcp_info,
    // as laid out by the Linux UAPI header (linux/tcp.h) on x86_64/aarch64.
    const TCPI_BYTES_ACKED_OFFSET: usize = 136;
    const TCPI_BYTES_RECEIVED_OFFSET: usize = 144;
    const FIELD_SIZE: usize = 8;

    let mut offset = 0usize;
    while offset + mem::size_of::<libc::rtattr>() <= attrs.len() {
        let rta = unsafe { &*(attrs[offset..].as_ptr() as *const libc::rtattr) };
        let rta_len = rta.rta_len as usize;
        if rta_len < mem::size_of::<libc::rtattr>() || offset + rta_len > attrs.len() {
            break;
        }
        let payload_off = offset + nlmsg_align_rta(mem::size_of::<libc::rtattr>());
        let payload_len = rta_len - nlmsg_align_rta(mem::size_of::<libc::rtattr>());

        if rta.rta_type == RTA_INFO && payload_off + payload_len <= attrs.len() {
            let payload = &attrs[payload_off..payload_off + payload_len];
            if payload.len() >= TCPI_BYTES_RECEIVED_OFFSET + FIELD_SIZE {
                stats.bytes_received = u64::from_ne_bytes(
                    payload[TCPI_BYTES_RECEIVED_OFFSET..TCPI_BYTES_RECEIVED_OFFSET + FIELD_SIZE]
                        .try_into()
                        .unwrap(),
                );
            }
            if payload.len() >= TCPI_BYTES_ACKED_OFFSET + FIELD_SIZE {
                stats.bytes_sent = u64::from_ne_bytes(
                    payload[TCPI_BYTES_ACKED_OFFSET..TCPI_BYTES_ACKED_OFFSET + FIELD_SIZE]
                        .try_into()
                        .unwrap(),
                );
            }
            break;
        }

        offset += nlmsg_align_rta(rta_len);
    }
}

fn nlmsg_align_rta(len: usize) -> usize {
    (len + 3) & !3
}

/// Scans `/proc/<pid>/fd/*` for `socket:[<inode>]` symlinks to build an
/// inode → pid map. Ported from `buildInodeToPidMap`.
pub fn build_inode_to_pid_map() -> HashMap<u64, u32> {
    let mut map = HashMap::with_capacity(1024);

    let Ok(proc_dir) = std::fs::read_dir("/proc") else {
        return map;
    };

    for entry in proc_dir.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let fd_dir = entry.path().join("fd");
        let Ok(fds) = std::fs::read_dir(&fd_dir) else {
            continue;
        };
        for fd_entry in fds.flatten() {
            let Ok(target) = std::fs::read_link(fd_entry.path()) else {
                continue;
            };
            let target = target.to_string_lossy();
            if let Some(rest) = target.strip_prefix("socket:[") {
                if let Some(inode_str) = rest.strip_suffix(']') {
                    if let Ok(inode) = inode_str.parse::<u64>() {
                        if inode != 0 {
                            map.insert(inode, pid);
                        }
                    }
                }
            }
        }
    }

    map
}

/// Sums per-socket stats into per-pid `(received, sent)` totals. Sockets with
/// no entry in `inode_to_pid` (e.g. owned by a process we can't read, or a
/// kernel socket) are dropped, matching `aggregateByPid`.
pub fn aggregate_by_pid(
    sockets: &[SocketStats],
    inode_to_pid: &HashMap<u64, u32>,
) -> HashMap<u32, (u64, u64)> {
    let mut totals: HashMap<u32, (u64, u64)> = HashMap::new();
    for socket in sockets {
        if let Some(&pid) = inode_to_pid.get(&socket.inode) {
            let entry = totals.entry(pid).or_insert((0, 0));
            entry.0 += socket.bytes_received;
            entry.1 += socket.bytes_sent;
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_by_pid_sums_and_drops_unmapped() {
        let sockets = vec![
            SocketStats {
                inode: 1,
                bytes_received: 100,
                bytes_sent: 10,
            },
            SocketStats {
                inode: 1,
                bytes_received: 50,
                bytes_sent: 5,
            },
            SocketStats {
                inode: 2,
                bytes_received: 30,
                bytes_sent: 3,
            },
            SocketStats {
                inode: 999,
                bytes_received: 1000,
                bytes_sent: 1000,
            },
        ];
        let mut inode_to_pid = HashMap::new();
        inode_to_pid.insert(1, 42);
        inode_to_pid.insert(2, 43);

        let totals = aggregate_by_pid(&sockets, &inode_to_pid);
        assert_eq!(totals.get(&42), Some(&(150, 15)));
        assert_eq!(totals.get(&43), Some(&(30, 3)));
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn unavailable_socket_returns_empty() {
        let stats = NetlinkSocketStats {
            fd: -1,
            available: false,
        };
        assert!(!stats.is_available());
        assert!(stats.query_all_sockets().is_empty());
    }
}
