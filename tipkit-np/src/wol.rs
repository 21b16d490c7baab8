//! Wake-on-LAN protocol
//!
//! Brings the processing worker from asleep/off to serving. The coordinator
//! probes the worker's health endpoint first so an already-running worker
//! never receives a wake packet, then transmits magic packets and polls
//! until the worker answers or the poll budget expires.

use crate::worker_client::WorkerClient;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tipkit_common::config::Settings;
use tokio::net::UdpSocket;

/// UDP port magic packets are sent to.
const WOL_PORT: u16 = 9;
/// Packet transmissions per wake attempt, spaced [`RESEND_INTERVAL`] apart.
const SEND_COUNT: u32 = 3;
const RESEND_INTERVAL: Duration = Duration::from_secs(2);

/// Wake protocol errors
#[derive(Debug, Error)]
pub enum WakeError {
    /// The worker never became ready. Fatal for the current run.
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Invalid MAC address: {0:?}")]
    InvalidMac(String),

    #[error("Invalid broadcast address: {0:?}")]
    InvalidBroadcast(String),

    #[error("Wake packet send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Worker host state as observed by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    Unknown,
    Probing,
    Awake,
    Ready,
    Unreachable,
}

/// 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl FromStr for MacAddr {
    type Err = WakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(WakeError::InvalidMac(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| WakeError::InvalidMac(s.to_string()))?;
        }
        Ok(MacAddr(bytes))
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Build a magic packet: six `0xFF` bytes followed by the target MAC
/// repeated sixteen times (102 bytes total).
pub fn magic_packet(mac: MacAddr) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for repetition in 0..16 {
        let offset = 6 + repetition * 6;
        packet[offset..offset + 6].copy_from_slice(&mac.0);
    }
    packet
}

/// Wake packet sender bound to one target host.
#[derive(Debug, Clone)]
pub struct WakeOnLan {
    mac: MacAddr,
    broadcast: SocketAddr,
}

impl WakeOnLan {
    pub fn new(mac: MacAddr, broadcast: IpAddr) -> Self {
        Self {
            mac,
            broadcast: SocketAddr::new(broadcast, WOL_PORT),
        }
    }

    /// Transmit the magic packet, then twice more at 2 s intervals to
    /// tolerate datagram loss.
    pub async fn send(&self) -> Result<(), WakeError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;

        let packet = magic_packet(self.mac);
        for attempt in 0..SEND_COUNT {
            if attempt > 0 {
                tokio::time::sleep(RESEND_INTERVAL).await;
            }
            socket.send_to(&packet, self.broadcast).await?;
            tracing::debug!(
                mac = %self.mac,
                target = %self.broadcast,
                attempt = attempt + 1,
                "Magic packet sent"
            );
        }
        Ok(())
    }
}

/// Full wake protocol: probe, wake, poll, give up.
#[derive(Debug, Clone)]
pub struct WakeProtocol {
    /// `None` when waking is disabled for the run
    wake: Option<WakeOnLan>,
    poll_interval: Duration,
    wake_timeout: Duration,
}

impl WakeProtocol {
    pub fn new(wake: Option<WakeOnLan>, poll_interval: Duration, wake_timeout: Duration) -> Self {
        Self {
            wake,
            poll_interval,
            wake_timeout,
        }
    }

    /// Build from settings. `wake_override=false` (the `--no-wake` flag)
    /// disables waking regardless of `WAKE_ENABLED`.
    pub fn from_settings(settings: &Settings, wake_override: bool) -> Result<Self, WakeError> {
        let wake_enabled = settings.wake_enabled && wake_override;

        let wake = if wake_enabled {
            let raw_mac = settings.worker_mac.as_deref().ok_or_else(|| {
                WakeError::InvalidMac("WORKER_MAC required when wake is enabled".to_string())
            })?;
            let mac: MacAddr = raw_mac.parse()?;

            // Prefer the directed broadcast address; fall back to the
            // worker's own address, then the limited broadcast
            let target = settings
                .worker_broadcast
                .as_deref()
                .or(settings.worker_ip.as_deref());
            let broadcast = match target {
                Some(raw) => raw
                    .parse::<IpAddr>()
                    .map_err(|_| WakeError::InvalidBroadcast(raw.to_string()))?,
                None => IpAddr::V4(Ipv4Addr::BROADCAST),
            };
            Some(WakeOnLan::new(mac, broadcast))
        } else {
            None
        };

        Ok(Self::new(
            wake,
            settings.wake_poll_interval,
            settings.wake_timeout,
        ))
    }

    /// Drive the worker host to `Ready`, or fail with
    /// [`WakeError::WorkerUnavailable`].
    pub async fn ensure_ready(&self, client: &WorkerClient) -> Result<(), WakeError> {
        let mut state = WakeState::Probing;
        tracing::debug!(?state, "Probing worker readiness");

        if client.health_check().await {
            tracing::info!("Worker is already serving, skipping wake");
            return Ok(());
        }

        let Some(wake) = &self.wake else {
            state = WakeState::Unreachable;
            tracing::warn!(?state, "Worker not reachable and waking is disabled");
            return Err(WakeError::WorkerUnavailable(
                "worker did not answer the readiness probe and waking is disabled".to_string(),
            ));
        };

        tracing::info!(mac = %wake.mac, "Worker asleep, sending wake packets");
        wake.send().await?;
        state = WakeState::Awake;

        let deadline = tokio::time::Instant::now() + self.wake_timeout;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.poll_interval).await;
            if client.health_check().await {
                state = WakeState::Ready;
                tracing::info!(?state, "Worker became ready");
                return Ok(());
            }
            tracing::debug!(?state, "Worker not ready yet");
        }

        state = WakeState::Unreachable;
        tracing::error!(?state, timeout = ?self.wake_timeout, "Worker never became ready");
        Err(WakeError::WorkerUnavailable(format!(
            "worker did not become ready within {:?}",
            self.wake_timeout
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_parses_colon_and_dash_forms() {
        let colon: MacAddr = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let dash: MacAddr = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        assert_eq!(colon, dash);
        assert_eq!(colon.0, [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(colon.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn malformed_mac_is_rejected() {
        assert!("aa:bb:cc:dd:ee".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:dd:ee:ff:00".parse::<MacAddr>().is_err());
        assert!("gg:bb:cc:dd:ee:ff".parse::<MacAddr>().is_err());
        assert!("".parse::<MacAddr>().is_err());
    }

    #[test]
    fn magic_packet_layout() {
        let mac: MacAddr = "01:02:03:04:05:06".parse().unwrap();
        let packet = magic_packet(mac);

        assert_eq!(packet.len(), 102);
        assert!(packet[..6].iter().all(|&b| b == 0xFF));
        for repetition in 0..16 {
            let offset = 6 + repetition * 6;
            assert_eq!(&packet[offset..offset + 6], &[1, 2, 3, 4, 5, 6]);
        }
    }

    #[test]
    fn from_settings_requires_mac_when_wake_enabled() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("DATABASE_URL".to_string(), "postgres://x".to_string());
        let settings = Settings::from_map(&vars).unwrap();

        // Wake enabled by default but no MAC configured
        assert!(WakeProtocol::from_settings(&settings, true).is_err());
        // Disabled via override: no MAC needed
        let protocol = WakeProtocol::from_settings(&settings, false).unwrap();
        assert!(protocol.wake.is_none());
    }

    #[test]
    fn packet_targets_the_worker_ip_when_no_broadcast_is_set() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("DATABASE_URL".to_string(), "postgres://x".to_string());
        vars.insert("WORKER_MAC".to_string(), "aa:bb:cc:dd:ee:ff".to_string());
        vars.insert("WORKER_IP".to_string(), "192.168.1.40".to_string());
        let settings = Settings::from_map(&vars).unwrap();

        let protocol = WakeProtocol::from_settings(&settings, true).unwrap();
        let wake = protocol.wake.expect("wake configured");
        assert_eq!(wake.broadcast, "192.168.1.40:9".parse().unwrap());

        // An explicit broadcast address wins
        vars.insert("WORKER_BROADCAST".to_string(), "192.168.1.255".to_string());
        let settings = Settings::from_map(&vars).unwrap();
        let protocol = WakeProtocol::from_settings(&settings, true).unwrap();
        assert_eq!(
            protocol.wake.unwrap().broadcast,
            "192.168.1.255:9".parse().unwrap()
        );
    }
}
