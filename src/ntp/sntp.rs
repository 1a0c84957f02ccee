//! Minimal SNTP (RFC 4330) client.
//!
//! Performs a single client-mode exchange over UDP and reports the server's
//! transmit time and the round-trip delay. No clock filtering, no retries.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{NtpReading, TimeSource};

/// Default NTP service port.
pub const NTP_PORT: u16 = 123;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const PACKET_LEN: usize = 48;

const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;
const MODE_BROADCAST: u8 = 5;

const LEAP_UNSYNCHRONIZED: u8 = 3;

/// Failure of a single SNTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("cannot resolve address '{0}'")]
    Resolve(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no response within {} seconds", .0.as_secs())]
    TimedOut(Duration),
    #[error("malformed response: {0}")]
    Malformed(&'static str),
    #[error("server sent kiss-o'-death code '{0}'")]
    KissOfDeath(String),
    #[error("server clock is not synchronized")]
    Unsynchronized,
    #[error("query worker interrupted: {0}")]
    Interrupted(String),
}

/// NTP 32.32 fixed-point timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp(u64);

impl NtpTimestamp {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn from_unix_seconds(unix: f64) -> Self {
        let ntp = unix + NTP_UNIX_OFFSET as f64;
        let seconds = ntp.trunc() as u64 & 0xFFFF_FFFF;
        let fraction = (ntp.fract() * 4_294_967_296.0) as u64 & 0xFFFF_FFFF;
        Self((seconds << 32) | fraction)
    }

    /// Convert to Unix seconds.
    ///
    /// A clear high bit in the seconds field is read as era 1 (after
    /// 2036-02-07), which keeps the conversion valid from 1968 to 2104.
    pub fn to_unix_seconds(self) -> f64 {
        let mut seconds = self.0 >> 32;
        if seconds & 0x8000_0000 == 0 {
            seconds += 1 << 32;
        }
        let fraction = (self.0 & 0xFFFF_FFFF) as f64 / 4_294_967_296.0;
        seconds as f64 - NTP_UNIX_OFFSET as f64 + fraction
    }
}

/// The fixed 48-byte NTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub leap: u8,
    pub version: u8,
    pub mode: u8,
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    pub root_delay: u32,
    pub root_dispersion: u32,
    pub reference_id: [u8; 4],
    pub reference: NtpTimestamp,
    pub originate: NtpTimestamp,
    pub receive: NtpTimestamp,
    pub transmit: NtpTimestamp,
}

impl Packet {
    /// NTPv3 client request carrying `transmit` as its transmit timestamp.
    pub fn client_request(transmit: NtpTimestamp) -> Self {
        Self {
            leap: 0,
            version: 3,
            mode: MODE_CLIENT,
            stratum: 0,
            poll: 0,
            precision: 0,
            root_delay: 0,
            root_dispersion: 0,
            reference_id: [0; 4],
            reference: NtpTimestamp::default(),
            originate: NtpTimestamp::default(),
            receive: NtpTimestamp::default(),
            transmit,
        }
    }

    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[0] = (self.leap << 6) | ((self.version & 0x07) << 3) | (self.mode & 0x07);
        buf[1] = self.stratum;
        buf[2] = self.poll as u8;
        buf[3] = self.precision as u8;
        buf[4..8].copy_from_slice(&self.root_delay.to_be_bytes());
        buf[8..12].copy_from_slice(&self.root_dispersion.to_be_bytes());
        buf[12..16].copy_from_slice(&self.reference_id);
        buf[16..24].copy_from_slice(&self.reference.raw().to_be_bytes());
        buf[24..32].copy_from_slice(&self.originate.raw().to_be_bytes());
        buf[32..40].copy_from_slice(&self.receive.raw().to_be_bytes());
        buf[40..48].copy_from_slice(&self.transmit.raw().to_be_bytes());
        buf
    }

    /// Decode the header; trailing extension fields or MACs are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, QueryError> {
        if buf.len() < PACKET_LEN {
            return Err(QueryError::Malformed("packet shorter than 48 bytes"));
        }
        let word = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let stamp = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[at..at + 8]);
            NtpTimestamp::from_raw(u64::from_be_bytes(raw))
        };
        Ok(Self {
            leap: buf[0] >> 6,
            version: (buf[0] >> 3) & 0x07,
            mode: buf[0] & 0x07,
            stratum: buf[1],
            poll: buf[2] as i8,
            precision: buf[3] as i8,
            root_delay: word(4),
            root_dispersion: word(8),
            reference_id: [buf[12], buf[13], buf[14], buf[15]],
            reference: stamp(16),
            originate: stamp(24),
            receive: stamp(32),
            transmit: stamp(40),
        })
    }

    /// Check a server reply against the request that produced it.
    pub fn validate_reply(&self, sent: NtpTimestamp) -> Result<(), QueryError> {
        if self.mode != MODE_SERVER && self.mode != MODE_BROADCAST {
            return Err(QueryError::Malformed("unexpected association mode"));
        }
        if self.originate != sent {
            return Err(QueryError::Malformed("originate timestamp does not match request"));
        }
        if self.stratum == 0 {
            let code = String::from_utf8_lossy(&self.reference_id)
                .trim_end_matches('\0')
                .to_string();
            return Err(QueryError::KissOfDeath(code));
        }
        if self.leap == LEAP_UNSYNCHRONIZED {
            return Err(QueryError::Unsynchronized);
        }
        if self.transmit.is_zero() {
            return Err(QueryError::Malformed("zero transmit timestamp"));
        }
        Ok(())
    }
}

/// UDP SNTP client.
#[derive(Debug, Clone)]
pub struct SntpClient {
    default_port: u16,
}

impl Default for SntpClient {
    fn default() -> Self {
        Self {
            default_port: NTP_PORT,
        }
    }
}

impl TimeSource for SntpClient {
    fn query(&self, server: &str, timeout: Duration) -> Result<NtpReading, QueryError> {
        let addr = resolve_addr(server, self.default_port)?;
        let local = if addr.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(timeout))?;
        socket.set_write_timeout(Some(timeout))?;
        socket.connect(addr)?;

        let t1 = unix_now();
        let sent = NtpTimestamp::from_unix_seconds(t1);
        socket.send(&Packet::client_request(sent).encode())?;

        let mut buf = [0u8; 512];
        let n = socket.recv(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                QueryError::TimedOut(timeout)
            }
            _ => QueryError::Io(e),
        })?;
        let t4 = unix_now();

        let reply = Packet::decode(&buf[..n])?;
        reply.validate_reply(sent)?;

        let t2 = reply.receive.to_unix_seconds();
        let t3 = reply.transmit.to_unix_seconds();
        Ok(NtpReading {
            transmit_time: t3,
            round_trip_delay: (t4 - t1) - (t3 - t2),
        })
    }
}

/// Resolve `host`, `host:port`, `ip` or `[v6]:port` to a socket address.
fn resolve_addr(server: &str, default_port: u16) -> Result<SocketAddr, QueryError> {
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port
                .parse::<u16>()
                .map_err(|_| QueryError::Resolve(server.to_string()))?;
            (host, port)
        }
        _ => (server, default_port),
    };

    (host, port)
        .to_socket_addrs()
        .map_err(|_| QueryError::Resolve(server.to_string()))?
        .next()
        .ok_or_else(|| QueryError::Resolve(server.to_string()))
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_reply(request: &[u8], transmit_unix: f64) -> [u8; PACKET_LEN] {
        let request = Packet::decode(request).unwrap();
        Packet {
            leap: 0,
            version: 3,
            mode: MODE_SERVER,
            stratum: 2,
            poll: 4,
            precision: -20,
            root_delay: 0,
            root_dispersion: 0,
            reference_id: *b"GPS\0",
            reference: NtpTimestamp::from_unix_seconds(transmit_unix - 10.0),
            originate: request.transmit,
            receive: NtpTimestamp::from_unix_seconds(transmit_unix),
            transmit: NtpTimestamp::from_unix_seconds(transmit_unix),
        }
        .encode()
    }

    #[test]
    fn timestamp_converts_to_unix_seconds() {
        let ts = NtpTimestamp::from_unix_seconds(1_700_000_000.25);
        let back = ts.to_unix_seconds();
        assert!((back - 1_700_000_000.25).abs() < 1e-6, "got {back}");
    }

    #[test]
    fn timestamp_handles_era_one() {
        // 2040-01-01T00:00:00Z lies past the 2036 rollover.
        let unix = 2_208_988_800.0;
        let ts = NtpTimestamp::from_unix_seconds(unix);
        assert_eq!(ts.raw() >> 63, 0, "era 1 seconds have a clear high bit");
        assert!((ts.to_unix_seconds() - unix).abs() < 1e-6);
    }

    #[test]
    fn client_request_header_byte() {
        let bytes = Packet::client_request(NtpTimestamp::from_raw(42)).encode();
        assert_eq!(bytes[0], 0x1B, "LI=0, VN=3, Mode=3");
        assert_eq!(u64::from_be_bytes(bytes[40..48].try_into().unwrap()), 42);
    }

    #[test]
    fn decode_rejects_short_packet() {
        let err = Packet::decode(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, QueryError::Malformed(_)));
    }

    #[test]
    fn kiss_of_death_reports_code() {
        let sent = NtpTimestamp::from_raw(7);
        let mut reply = Packet::client_request(NtpTimestamp::from_raw(9));
        reply.mode = MODE_SERVER;
        reply.stratum = 0;
        reply.originate = sent;
        reply.reference_id = *b"RATE";

        match reply.validate_reply(sent) {
            Err(QueryError::KissOfDeath(code)) => assert_eq!(code, "RATE"),
            other => panic!("expected kiss-o'-death, got {other:?}"),
        }
    }

    #[test]
    fn reply_must_echo_originate() {
        let mut reply = Packet::client_request(NtpTimestamp::from_raw(9));
        reply.mode = MODE_SERVER;
        reply.stratum = 1;
        reply.originate = NtpTimestamp::from_raw(1);

        let err = reply.validate_reply(NtpTimestamp::from_raw(2)).unwrap_err();
        assert!(matches!(err, QueryError::Malformed(_)));
    }

    #[test]
    fn unsynchronized_server_rejected() {
        let sent = NtpTimestamp::from_raw(5);
        let mut reply = Packet::client_request(NtpTimestamp::from_raw(9));
        reply.mode = MODE_SERVER;
        reply.stratum = 3;
        reply.leap = LEAP_UNSYNCHRONIZED;
        reply.originate = sent;

        assert!(matches!(
            reply.validate_reply(sent),
            Err(QueryError::Unsynchronized)
        ));
    }

    #[test]
    fn resolve_addr_variants() {
        assert_eq!(
            resolve_addr("127.0.0.1", NTP_PORT).unwrap(),
            "127.0.0.1:123".parse().unwrap()
        );
        assert_eq!(
            resolve_addr("127.0.0.1:1123", NTP_PORT).unwrap(),
            "127.0.0.1:1123".parse().unwrap()
        );
        assert_eq!(
            resolve_addr("::1", NTP_PORT).unwrap(),
            "[::1]:123".parse().unwrap()
        );
        assert!(matches!(
            resolve_addr("localhost:notaport", NTP_PORT),
            Err(QueryError::Resolve(_))
        ));
    }

    #[test]
    fn query_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let server_time = 1_800_000_000.5;

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 128];
            let (n, peer) = server.recv_from(&mut buf).unwrap();
            let reply = server_reply(&buf[..n], server_time);
            server.send_to(&reply, peer).unwrap();
        });

        let reading = SntpClient::default()
            .query(&addr.to_string(), Duration::from_secs(5))
            .unwrap();
        handle.join().unwrap();

        assert!((reading.transmit_time - server_time).abs() < 1e-6);
        assert!(reading.round_trip_delay >= 0.0);
        assert!(reading.round_trip_delay < 5.0);
    }

    #[test]
    fn query_times_out_when_server_is_silent() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap();

        let err = SntpClient::default()
            .query(&addr.to_string(), Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, QueryError::TimedOut(_)), "got {err:?}");
        drop(silent);
    }
}
