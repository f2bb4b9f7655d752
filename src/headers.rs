//! RTSP header types, currently just the `Transport` header of
//! [RFC 2326 section 12.39](https://tools.ietf.org/html/rfc2326#section-12.39).

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use failure::{bail, format_err, Error};

/// Lower-level transport protocol carrying the RTP stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Protocol {
    Udp,
    Tcp,
}

/// Unicast vs multicast delivery.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Delivery {
    Unicast,
    Multicast,
}

/// Transport mode: `play` to receive a stream, `record` to send one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    Play,
    Record,
}

/// An RTSP `Transport` header value.
///
/// Port-like parameters are pairs so that "not specified" stays distinct
/// from any concrete value; a single port `n` on the wire parses as
/// `(n, n+1)`.
///
/// Parsing is deliberately laxer than RFC 2326 where real servers deviate
/// from it: an `ssrc` parameter that can't be parsed as a 32-bit hex
/// number (padded, overlong) leaves `ssrc` unset instead of failing the
/// whole header, and an empty `source=` means "unspecified".
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transport {
    pub protocol: Protocol,
    pub delivery: Option<Delivery>,
    pub source: Option<IpAddr>,
    pub destination: Option<IpAddr>,
    pub ttl: Option<u32>,
    pub ports: Option<(u16, u16)>,
    pub client_ports: Option<(u16, u16)>,
    pub server_ports: Option<(u16, u16)>,
    pub interleaved_ids: Option<(u16, u16)>,
    pub ssrc: Option<u32>,
    pub mode: Option<Mode>,
}

/// Parses a port parameter value: either `n` (meaning the pair `(n, n+1)`)
/// or `n-m`.
fn parse_ports(value: &str) -> Result<(u16, u16), Error> {
    let invalid = || format_err!("invalid ports ({})", value);
    let parts: Vec<&str> = value.split('-').collect();
    match parts[..] {
        [port] => {
            let port: u16 = port.parse().map_err(|_| invalid())?;
            Ok((port, port.checked_add(1).ok_or_else(invalid)?))
        }
        [first, second] => Ok((
            first.parse().map_err(|_| invalid())?,
            second.parse().map_err(|_| invalid())?,
        )),
        _ => Err(invalid()),
    }
}

impl Transport {
    /// Parses the values of a `Transport` header. RTSP allows a header to
    /// be repeated, but for `Transport` exactly one value must be present.
    pub fn parse(values: &[&str]) -> Result<Self, Error> {
        match values {
            [] => bail!("value not provided"),
            [value] => value.parse(),
            _ => bail!("value provided multiple times ({:?})", values),
        }
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let mut protocol = None;
        let mut delivery = None;
        let mut source = None;
        let mut destination = None;
        let mut ttl = None;
        let mut ports = None;
        let mut client_ports = None;
        let mut server_ports = None;
        let mut interleaved_ids = None;
        let mut ssrc = None;
        let mut mode = None;

        for part in s.split(';') {
            let part = part.trim();
            match part {
                "RTP/AVP" | "RTP/AVP/UDP" => protocol = Some(Protocol::Udp),
                "RTP/AVP/TCP" => protocol = Some(Protocol::Tcp),
                "unicast" => delivery = Some(Delivery::Unicast),
                "multicast" => delivery = Some(Delivery::Multicast),
                _ => {
                    let (key, value) = match part.split_once('=') {
                        Some(kv) => kv,
                        // Unknown bare tokens are vendor extensions; skip.
                        None => continue,
                    };
                    match key {
                        "source" => {
                            // Some servers (e.g. Ubiquiti) send `source=`
                            // with no value; treat it as unspecified.
                            if !value.is_empty() {
                                source = Some(value.parse().map_err(|_| {
                                    format_err!("invalid source ({})", value)
                                })?);
                            }
                        }
                        "destination" => {
                            destination = Some(value.parse().map_err(|_| {
                                format_err!("invalid destination ({})", value)
                            })?);
                        }
                        "ttl" => {
                            ttl = Some(value.parse().map_err(|_| {
                                format_err!("invalid ttl ({})", value)
                            })?);
                        }
                        "port" => ports = Some(parse_ports(value)?),
                        "client_port" => client_ports = Some(parse_ports(value)?),
                        "server_port" => server_ports = Some(parse_ports(value)?),
                        "interleaved" => interleaved_ids = Some(parse_ports(value)?),
                        "ssrc" => {
                            // Hikvision and Dahua servers pad the SSRC with
                            // leading spaces, and others emit values that
                            // don't fit in 32 bits. Parse failure leaves the
                            // field unset rather than rejecting the header.
                            ssrc = u32::from_str_radix(value.trim_start(), 16).ok();
                        }
                        "mode" => {
                            let value = value.trim_matches('"').to_lowercase();
                            mode = Some(match value.as_str() {
                                "play" => Mode::Play,
                                // Darwin Streaming Server sends `receive`.
                                "record" | "receive" => Mode::Record,
                                _ => bail!("invalid transport mode: '{}'", value),
                            });
                        }
                        // Unknown parameters are vendor extensions; skip.
                        _ => {}
                    }
                }
            }
        }

        let protocol = protocol.ok_or_else(|| format_err!("protocol not found ({})", s))?;
        Ok(Transport {
            protocol,
            delivery,
            source,
            destination,
            ttl,
            ports,
            client_ports,
            server_ports,
            interleaved_ids,
            ssrc,
            mode,
        })
    }
}

impl fmt::Display for Transport {
    /// Serializes to the canonical wire form: fixed parameter order,
    /// single ports expanded to pairs, SSRC as 8 uppercase hex digits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.protocol {
            Protocol::Udp => "RTP/AVP",
            Protocol::Tcp => "RTP/AVP/TCP",
        })?;
        if let Some(delivery) = self.delivery {
            f.write_str(match delivery {
                Delivery::Unicast => ";unicast",
                Delivery::Multicast => ";multicast",
            })?;
        }
        if let Some(source) = self.source {
            write!(f, ";source={}", source)?;
        }
        if let Some(destination) = self.destination {
            write!(f, ";destination={}", destination)?;
        }
        if let Some(ttl) = self.ttl {
            write!(f, ";ttl={}", ttl)?;
        }
        if let Some((first, second)) = self.ports {
            write!(f, ";port={}-{}", first, second)?;
        }
        if let Some((first, second)) = self.client_ports {
            write!(f, ";client_port={}-{}", first, second)?;
        }
        if let Some((first, second)) = self.server_ports {
            write!(f, ";server_port={}-{}", first, second)?;
        }
        if let Some((first, second)) = self.interleaved_ids {
            write!(f, ";interleaved={}-{}", first, second)?;
        }
        if let Some(ssrc) = self.ssrc {
            write!(f, ";ssrc={:08X}", ssrc)?;
        }
        if let Some(mode) = self.mode {
            f.write_str(match mode {
                Mode::Play => ";mode=play",
                Mode::Record => ";mode=record",
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Transport {
        Transport {
            protocol: Protocol::Udp,
            delivery: None,
            source: None,
            destination: None,
            ttl: None,
            ports: None,
            client_ports: None,
            server_ports: None,
            interleaved_ids: None,
            ssrc: None,
            mode: None,
        }
    }

    /// (name, wire input, canonical output, expected value) conformance
    /// table; each entry is checked parse → value, value → output, and
    /// output → value again (idempotence after one normalization).
    fn cases() -> Vec<(&'static str, &'static str, &'static str, Transport)> {
        vec![
            (
                "udp unicast play request",
                r#"RTP/AVP;unicast;client_port=3456-3457;mode="PLAY""#,
                "RTP/AVP;unicast;client_port=3456-3457;mode=play",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    client_ports: Some((3456, 3457)),
                    mode: Some(Mode::Play),
                    ..base()
                },
            ),
            (
                "udp unicast play response",
                "RTP/AVP/UDP;unicast;client_port=3056-3057;server_port=5000-5001",
                "RTP/AVP;unicast;client_port=3056-3057;server_port=5000-5001",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    client_ports: Some((3056, 3057)),
                    server_ports: Some((5000, 5001)),
                    ..base()
                },
            ),
            (
                "udp multicast play request / response",
                "RTP/AVP;multicast;destination=225.219.201.15;port=7000-7001;ttl=127",
                "RTP/AVP;multicast;destination=225.219.201.15;ttl=127;port=7000-7001",
                Transport {
                    delivery: Some(Delivery::Multicast),
                    destination: Some("225.219.201.15".parse().unwrap()),
                    ttl: Some(127),
                    ports: Some((7000, 7001)),
                    ..base()
                },
            ),
            (
                "tcp play request / response",
                "RTP/AVP/TCP;interleaved=0-1",
                "RTP/AVP/TCP;interleaved=0-1",
                Transport {
                    protocol: Protocol::Tcp,
                    interleaved_ids: Some((0, 1)),
                    ..base()
                },
            ),
            (
                "udp unicast play response with a single port and ssrc",
                "RTP/AVP/UDP;unicast;server_port=8052;client_port=14186;ssrc=0B6020AD;mode=PLAY",
                "RTP/AVP;unicast;client_port=14186-14187;server_port=8052-8053;\
                 ssrc=0B6020AD;mode=play",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    client_ports: Some((14186, 14187)),
                    server_ports: Some((8052, 8053)),
                    ssrc: Some(0x0b60_20ad),
                    mode: Some(Mode::Play),
                    ..base()
                },
            ),
            (
                "udp record response with receive",
                "RTP/AVP/UDP;unicast;mode=receive;source=127.0.0.1;client_port=14186-14187;\
                 server_port=5000-5001",
                "RTP/AVP;unicast;source=127.0.0.1;client_port=14186-14187;\
                 server_port=5000-5001;mode=record",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    source: Some("127.0.0.1".parse().unwrap()),
                    client_ports: Some((14186, 14187)),
                    server_ports: Some((5000, 5001)),
                    mode: Some(Mode::Record),
                    ..base()
                },
            ),
            (
                "unsorted udp unicast play request",
                r#"client_port=3456-3457;RTP/AVP;mode="PLAY";unicast"#,
                "RTP/AVP;unicast;client_port=3456-3457;mode=play",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    client_ports: Some((3456, 3457)),
                    mode: Some(Mode::Play),
                    ..base()
                },
            ),
            (
                "ssrc shorter than 8 digits",
                "RTP/AVP/UDP;unicast;client_port=14186;server_port=8052;ssrc=4317f;mode=play",
                "RTP/AVP;unicast;client_port=14186-14187;server_port=8052-8053;\
                 ssrc=0004317F;mode=play",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    client_ports: Some((14186, 14187)),
                    server_ports: Some((8052, 8053)),
                    ssrc: Some(0x0004_317f),
                    mode: Some(Mode::Play),
                    ..base()
                },
            ),
            (
                "hikvision ssrc with initial space",
                "RTP/AVP/UDP;unicast;client_port=14186;server_port=8052;ssrc= 4317f;mode=play",
                "RTP/AVP;unicast;client_port=14186-14187;server_port=8052-8053;\
                 ssrc=0004317F;mode=play",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    client_ports: Some((14186, 14187)),
                    server_ports: Some((8052, 8053)),
                    ssrc: Some(0x0004_317f),
                    mode: Some(Mode::Play),
                    ..base()
                },
            ),
            (
                "dahua ssrc with initial spaces",
                "RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=     D93FF",
                "RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=000D93FF",
                Transport {
                    protocol: Protocol::Tcp,
                    delivery: Some(Delivery::Unicast),
                    interleaved_ids: Some((0, 1)),
                    ssrc: Some(0x000d_93ff),
                    ..base()
                },
            ),
            (
                "empty source",
                "RTP/AVP/UDP;unicast;source=;client_port=32560-32561;server_port=3046-3047;\
                 ssrc=45dcb578",
                "RTP/AVP;unicast;client_port=32560-32561;server_port=3046-3047;ssrc=45DCB578",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    client_ports: Some((32560, 32561)),
                    server_ports: Some((3046, 3047)),
                    ssrc: Some(0x45dc_b578),
                    ..base()
                },
            ),
            (
                "ssrc too large for 32 bits",
                "RTP/AVP;unicast;client_port=14236;source=172.16.8.2;server_port=56002;\
                 ssrc=1449463210",
                "RTP/AVP;unicast;source=172.16.8.2;client_port=14236-14237;\
                 server_port=56002-56003",
                Transport {
                    delivery: Some(Delivery::Unicast),
                    source: Some("172.16.8.2".parse().unwrap()),
                    client_ports: Some((14236, 14237)),
                    server_ports: Some((56002, 56003)),
                    ..base()
                },
            ),
        ]
    }

    #[test]
    fn parse() {
        for (name, input, _, expected) in cases() {
            let t = Transport::parse(&[input]).unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert_eq!(t, expected, "{}", name);
        }
    }

    #[test]
    fn serialize() {
        for (name, _, output, value) in cases() {
            assert_eq!(value.to_string(), output, "{}", name);
        }
    }

    #[test]
    fn round_trip() {
        for (name, _, output, value) in cases() {
            let reparsed: Transport = output.parse().unwrap();
            assert_eq!(reparsed, value, "{}", name);
            assert_eq!(reparsed.to_string(), output, "{}", name);
        }
    }

    #[test]
    fn parse_errors() {
        for (name, values, err) in &[
            ("empty", &[][..], "value not provided"),
            (
                "two values",
                &["a", "b"][..],
                r#"value provided multiple times (["a", "b"])"#,
            ),
            (
                "protocol not found",
                &["invalid;unicast;client_port=14186-14187"][..],
                "protocol not found (invalid;unicast;client_port=14186-14187)",
            ),
            (
                "invalid interleaved ids",
                &["RTP/AVP;unicast;interleaved=aa-14187"][..],
                "invalid ports (aa-14187)",
            ),
            ("invalid ttl", &["RTP/AVP;unicast;ttl=aa"][..], "invalid ttl (aa)"),
            (
                "invalid destination",
                &["RTP/AVP;unicast;destination=aa"][..],
                "invalid destination (aa)",
            ),
            (
                "invalid source",
                &["RTP/AVP;unicast;source=aa"][..],
                "invalid source (aa)",
            ),
            ("invalid port", &["RTP/AVP;unicast;port=aa"][..], "invalid ports (aa)"),
            (
                "too many port parts",
                &["RTP/AVP;unicast;port=aa-bb-cc"][..],
                "invalid ports (aa-bb-cc)",
            ),
            (
                "invalid first port",
                &["RTP/AVP;unicast;port=aa-14187"][..],
                "invalid ports (aa-14187)",
            ),
            (
                "invalid second port",
                &["RTP/AVP;unicast;port=14186-aa"][..],
                "invalid ports (14186-aa)",
            ),
            (
                "invalid client port",
                &["RTP/AVP;unicast;client_port=aa-14187"][..],
                "invalid ports (aa-14187)",
            ),
            (
                "invalid server port",
                &["RTP/AVP;unicast;server_port=aa-14187"][..],
                "invalid ports (aa-14187)",
            ),
            (
                "invalid mode",
                &["RTP/AVP;unicast;mode=aa"][..],
                "invalid transport mode: 'aa'",
            ),
        ] {
            let e = Transport::parse(values).unwrap_err();
            assert_eq!(&e.to_string(), err, "{}", name);
        }
    }
}
