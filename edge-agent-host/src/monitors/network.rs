//! Network interfaces, addresses and traffic counters
//!
//! The primary IP follows interface priority: Ethernet > WiFi > Other,
//! IPv4 preferred within an interface.

use edge_telemetry::{Monitor, MonitorContext, MonitorError, MonitorMode, MonitorState, Snapshot};
use if_addrs::{get_if_addrs, IfAddr};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use sysinfo::Networks;
use tracing::{debug, info, warn};

/// Interface type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Ethernet,
    Wireless,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    #[serde(rename = "type")]
    pub interface_type: InterfaceType,
    pub ips: Vec<String>,
    pub bytes_recv: u64,
    pub bytes_sent: u64,
}

impl NetworkInterface {
    fn primary_ip(&self) -> Option<&String> {
        self.ips
            .iter()
            .find(|ip| !ip.contains(':'))
            .or_else(|| self.ips.first())
    }
}

/// Value of the `network` field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkInfo {
    pub ip: Option<String>,
    pub interfaces: Vec<NetworkInterface>,
}

pub struct NetworkMonitor {
    name: String,
    mode: MonitorMode,
    period: Duration,
    state: MonitorState,
    counters: Networks,
    info: Option<NetworkInfo>,
}

impl NetworkMonitor {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            name: ctx.name,
            mode: ctx.mode,
            period: ctx.period,
            state: MonitorState::new(),
            counters: Networks::new_with_refreshed_list(),
            info: None,
        }
    }

    pub fn info(&self) -> Option<&NetworkInfo> {
        self.info.as_ref()
    }
}

fn discover(counters: &mut Networks) -> Result<NetworkInfo, MonitorError> {
    let addrs = get_if_addrs()
        .map_err(|e| MonitorError::Collection(format!("Failed to enumerate network interfaces: {}", e)))?;

    counters.refresh_list();
    let traffic: BTreeMap<&str, (u64, u64)> = counters
        .iter()
        .map(|(name, data)| (name.as_str(), (data.total_received(), data.total_transmitted())))
        .collect();

    let mut by_name: BTreeMap<String, NetworkInterface> = BTreeMap::new();
    for addr in addrs {
        if addr.is_loopback() {
            continue;
        }

        let ip = match addr.addr {
            IfAddr::V4(v4) => v4.ip.to_string(),
            IfAddr::V6(v6) => v6.ip.to_string(),
        };

        let interface = by_name.entry(addr.name.clone()).or_insert_with(|| {
            let (bytes_recv, bytes_sent) = traffic.get(addr.name.as_str()).copied().unwrap_or((0, 0));
            NetworkInterface {
                name: addr.name.clone(),
                interface_type: classify_interface(&addr.name),
                ips: Vec::new(),
                bytes_recv,
                bytes_sent,
            }
        });
        interface.ips.push(ip);
    }

    let interfaces: Vec<NetworkInterface> = by_name.into_values().collect();
    let ip = select_primary(&interfaces).and_then(|i| i.primary_ip().cloned());

    debug!("Found {} interfaces, primary IP {:?}", interfaces.len(), ip);
    Ok(NetworkInfo { ip, interfaces })
}

/// Classify interface type based on name patterns
pub fn classify_interface(name: &str) -> InterfaceType {
    let name_lower = name.to_lowercase();

    if name_lower.starts_with("wlan")
        || name_lower.starts_with("wlp")
        || name_lower.starts_with("wlo")
        || name_lower.contains("wifi")
    {
        return InterfaceType::Wireless;
    }

    // "en" covers ens/enp/eno as well
    if name_lower.starts_with("eth") || name_lower.starts_with("en") {
        return InterfaceType::Ethernet;
    }

    InterfaceType::Other
}

/// Ethernet first, then wireless, then whatever has an address
pub fn select_primary(interfaces: &[NetworkInterface]) -> Option<&NetworkInterface> {
    let with_ip = || interfaces.iter().filter(|i| !i.ips.is_empty());

    if let Some(interface) = with_ip().find(|i| i.interface_type == InterfaceType::Ethernet) {
        debug!("Selected Ethernet interface as primary: {}", interface.name);
        return Some(interface);
    }

    if let Some(interface) = with_ip().find(|i| i.interface_type == InterfaceType::Wireless) {
        info!("Selected WiFi interface as primary: {}", interface.name);
        return Some(interface);
    }

    let fallback = with_ip().next();
    if let Some(interface) = fallback {
        warn!("No Ethernet/WiFi found, using first interface: {}", interface.name);
    }
    fallback
}

impl Monitor for NetworkMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> MonitorMode {
        self.mode
    }

    fn is_updated(&self) -> bool {
        self.state.is_updated()
    }

    fn refresh(&mut self) -> Result<(), MonitorError> {
        self.state.track(|| {
            self.info = Some(discover(&mut self.counters)?);
            Ok(())
        })
    }

    fn contribute(&mut self, buffer: &mut Snapshot) -> Result<(), MonitorError> {
        let Some(info) = &self.info else {
            return Ok(());
        };

        let mut fields = Snapshot::new();
        fields.set_serialized("network", info)?;
        if let Some(ip) = &info.ip {
            fields.set("ip", json!(ip))?;
        }

        buffer.merge(fields);
        self.state.consume();
        Ok(())
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn last_process_duration(&self) -> Option<Duration> {
        self.state.last_process_duration()
    }
}
