// wifi.rs

use std::{fmt, net::Ipv4Addr};

use log::*;
use tokio::time::{sleep, Duration, Instant};

use crate::*;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONNECT_CHECK_INTERVAL: Duration = Duration::from_millis(500);
pub const STATUS_HOLD: Duration = Duration::from_secs(2);

pub const AP_SSID: &str = "SubCounter Setup";

pub trait Radio {
    /// Configure station mode and start associating. Does not wait.
    fn start_station(&mut self, ssid: &str, secret: &str) -> anyhow::Result<()>;
    fn is_connected(&self) -> bool;
    fn station_ip(&self) -> Option<Ipv4Addr>;
    fn start_access_point(&mut self, ssid: &str) -> anyhow::Result<Ipv4Addr>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectivityState {
    #[default]
    Unconfigured,
    Connecting,
    Connected(Ipv4Addr),
    ApFallback(Ipv4Addr),
}

impl ConnectivityState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityState::Connected(_))
    }

    pub fn portal_addr(&self) -> Option<Ipv4Addr> {
        match self {
            ConnectivityState::Connected(ip) | ConnectivityState::ApFallback(ip) => Some(*ip),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Unconfigured => write!(f, "unconfigured"),
            ConnectivityState::Connecting => write!(f, "connecting"),
            ConnectivityState::Connected(ip) => write!(f, "connected ({ip})"),
            ConnectivityState::ApFallback(ip) => write!(f, "access point ({ip})"),
        }
    }
}

pub struct ConnectivityManager<R> {
    radio: R,
    ap_addr: Option<Ipv4Addr>,
}

impl<R: Radio> ConnectivityManager<R> {
    pub fn new(radio: R) -> Self {
        Self {
            radio,
            ap_addr: None,
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Single bounded station attempt, falling back to the setup access point.
    ///
    /// Every path leaves a human readable status on the display. Only a failure
    /// to host the access point itself is returned as an error.
    pub async fn bootstrap<D: CharDisplay>(
        &mut self,
        config: &MyConfig,
        display: &mut DisplayScheduler<D>,
    ) -> anyhow::Result<ConnectivityState> {
        if config.ssid.is_empty() {
            info!("No WiFi credentials stored.");
            return self.fallback(display);
        }

        show(display, "Connecting...", "");
        info!("WiFi connecting to {:?}...", config.ssid);
        if let Err(e) = self.radio.start_station(&config.ssid, &config.pass) {
            error!("WiFi station start failed: {e:#}");
            return self.fallback(display);
        }

        let start = Instant::now();
        loop {
            if self.radio.is_connected() {
                break;
            }
            if start.elapsed() >= CONNECT_TIMEOUT {
                error!("WiFi connection timed out after {:?}", start.elapsed());
                return self.fallback(display);
            }
            sleep(CONNECT_CHECK_INTERVAL).await;
        }

        let ip = self.radio.station_ip().unwrap_or(Ipv4Addr::UNSPECIFIED);
        info!("WiFi connected, IP {ip}");
        show(display, "Connected!", "");
        sleep(STATUS_HOLD).await;
        show(display, "For config:", &ip.to_string());
        sleep(STATUS_HOLD).await;

        Ok(ConnectivityState::Connected(ip))
    }

    fn fallback<D: CharDisplay>(
        &mut self,
        display: &mut DisplayScheduler<D>,
    ) -> anyhow::Result<ConnectivityState> {
        info!("Starting access point {AP_SSID:?}...");
        let ip = self.radio.start_access_point(AP_SSID)?;
        self.ap_addr = Some(ip);
        info!("Access point up, portal at http://{ip}/");
        show(display, "Open in browser:", &ip.to_string());
        Ok(ConnectivityState::ApFallback(ip))
    }

    pub fn current_state(&self, config: &MyConfig) -> ConnectivityState {
        if let Some(ip) = self.ap_addr {
            ConnectivityState::ApFallback(ip)
        } else if config.ssid.is_empty() {
            ConnectivityState::Unconfigured
        } else if self.radio.is_connected() {
            let ip = self.radio.station_ip().unwrap_or(Ipv4Addr::UNSPECIFIED);
            ConnectivityState::Connected(ip)
        } else {
            ConnectivityState::Connecting
        }
    }
}

// a broken display must not keep the device off the network
fn show<D: CharDisplay>(display: &mut DisplayScheduler<D>, line1: &str, line2: &str) {
    if let Err(e) = display.show_status(line1, line2) {
        error!("Display error: {e:#}");
    }
}

#[cfg(target_os = "espidf")]
pub struct EspRadio {
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
}

#[cfg(target_os = "espidf")]
impl EspRadio {
    pub fn new(wifi: esp_idf_svc::wifi::EspWifi<'static>) -> Self {
        Self { wifi }
    }
}

#[cfg(target_os = "espidf")]
impl Radio for EspRadio {
    fn start_station(&mut self, ssid: &str, secret: &str) -> anyhow::Result<()> {
        use anyhow::anyhow;
        use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let auth_method = if secret.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid.try_into().map_err(|_| anyhow!("SSID too long"))?,
                password: secret.try_into().map_err(|_| anyhow!("WiFi password too long"))?,
                auth_method,
                ..Default::default()
            }))?;

        info!("WiFi driver starting...");
        self.wifi.start()?;
        self.wifi.connect()?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        self.wifi.sta_netif().get_ip_info().ok().map(|i| i.ip)
    }

    fn start_access_point(&mut self, ssid: &str) -> anyhow::Result<Ipv4Addr> {
        use anyhow::anyhow;
        use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod, Configuration};

        if self.wifi.is_started()? {
            if let Err(e) = self.wifi.disconnect() {
                debug!("WiFi disconnect: {e:?}");
            }
            self.wifi.stop()?;
        }
        self.wifi
            .set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
                ssid: ssid.try_into().map_err(|_| anyhow!("AP SSID too long"))?,
                auth_method: AuthMethod::None,
                channel: 1,
                ..Default::default()
            }))?;
        self.wifi.start()?;

        Ok(self.wifi.ap_netif().get_ip_info()?.ip)
    }
}


// EOF
